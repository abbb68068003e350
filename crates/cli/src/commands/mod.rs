pub mod clear;
pub mod onboard;
pub mod query;
pub mod replay;
pub mod run;
pub mod sessions;
pub mod status;

use std::sync::Arc;
use stepwise_config::AppConfig;
use stepwise_core::context::{ContextStore, EntryType};

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Open the context store the configuration points at.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn ContextStore>, Box<dyn std::error::Error>> {
    Ok(stepwise_context::open_store(&config.context)
        .await
        .map_err(|e| format!("Failed to open context store: {e}"))?)
}

pub fn parse_entry_type(name: Option<&str>) -> Result<Option<EntryType>, Box<dyn std::error::Error>> {
    Ok(name.map(str::parse::<EntryType>).transpose()?)
}
