//! `stepwise replay`: print recorded context grouped by session.

use stepwise_context::render_replay;
use stepwise_core::context::{ContextQuery, SessionId};

use super::{CommandResult, load_config, open_store, parse_entry_type};

pub async fn run(
    limit: Option<usize>,
    entry_type: Option<String>,
    session: Option<String>,
) -> CommandResult {
    let config = load_config()?;
    let store = open_store(&config).await?;

    let query = ContextQuery {
        session_id: session.as_deref().map(SessionId::from),
        entry_type: parse_entry_type(entry_type.as_deref())?,
        limit,
        ..Default::default()
    };
    let entries = store.query(query).await?;

    println!("📜 Replaying context history:");
    print!("{}", render_replay(&entries));

    Ok(())
}
