//! `stepwise clear`: delete recorded context.

use stepwise_core::context::SessionId;

use super::{CommandResult, load_config, open_store};

pub async fn run(session: Option<String>, confirm: bool) -> CommandResult {
    let scope = match &session {
        Some(id) => format!("all entries of session {id}"),
        None => "ALL recorded context".to_string(),
    };

    if !confirm {
        println!("⚠️  This will delete {scope} permanently.");
        println!("   Run with --confirm to proceed:");
        match &session {
            Some(id) => println!("   stepwise clear --session {id} --confirm"),
            None => println!("   stepwise clear --confirm"),
        }
        return Ok(());
    }

    let config = load_config()?;
    let store = open_store(&config).await?;
    let session = session.as_deref().map(SessionId::from);
    let removed = store.clear(session.as_ref()).await?;

    println!("🗑️  Deleted {removed} entries ({scope}).");

    Ok(())
}
