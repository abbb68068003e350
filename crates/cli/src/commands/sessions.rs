//! `stepwise sessions`: list recorded session ids.

use super::{CommandResult, load_config, open_store};

pub async fn run() -> CommandResult {
    let config = load_config()?;
    let store = open_store(&config).await?;
    let sessions = store.sessions().await?;

    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!("Available sessions:");
    for (idx, session) in sessions.iter().enumerate() {
        let entries = store.count(Some(session)).await?;
        println!("  {}. {session} ({entries} entries)", idx + 1);
    }

    Ok(())
}
