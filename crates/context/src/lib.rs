//! Context store backends for Stepwise.
//!
//! - [`SqliteStore`]: durable, one SQLite file shared by every session
//! - [`InMemoryStore`]: ephemeral, for tests and throwaway runs
//!
//! [`open_store`] picks one from configuration.

mod clock;
pub mod in_memory;
pub mod replay;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use replay::{describe, render_query, render_replay};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

#[cfg(feature = "sqlite")]
use std::path::Path;
use std::sync::Arc;
use stepwise_config::ContextConfig;
use stepwise_core::context::ContextStore;
use stepwise_core::error::ContextError;
use tracing::info;

/// Open the backend named in the configuration.
pub async fn open_store(config: &ContextConfig) -> Result<Arc<dyn ContextStore>, ContextError> {
    info!(backend = %config.backend, path = %config.path, "Opening context store");
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let store = if config.path.starts_with("sqlite:") {
                SqliteStore::new(&config.path).await?
            } else {
                SqliteStore::open(Path::new(&config.path)).await?
            };
            Ok(Arc::new(store))
        }
        other => Err(ContextError::Storage(format!(
            "Unknown context backend '{other}'"
        ))),
    }
}
