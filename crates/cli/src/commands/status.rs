//! `stepwise status`: show configuration and store status.

use stepwise_config::AppConfig;

use super::{CommandResult, load_config, open_store};

pub async fn run() -> CommandResult {
    let config = load_config()?;

    println!("🧭 Stepwise Status");
    println!("==================");
    println!("  Config dir:     {}", AppConfig::config_dir().display());
    println!("  Model:          {}", config.model);
    println!("  API base URL:   {}", config.api_base_url);
    println!("  API key:        {}", if config.has_api_key() { "configured" } else { "missing" });
    println!("  Temperature:    {}", config.temperature);
    println!("  Collaboration:  {}", if config.collaboration { "enabled" } else { "disabled" });
    println!("  Context store:  {} ({})", config.context.backend, config.context.path);
    println!(
        "  Context limit:  {}",
        config
            .agent
            .context_limit
            .map_or_else(|| "whole session".to_string(), |n| n.to_string())
    );
    println!(
        "  Max turns:      {}",
        config
            .agent
            .max_turns
            .map_or_else(|| "unlimited".to_string(), |n| n.to_string())
    );

    match open_store(&config).await {
        Ok(store) => {
            let sessions = store.sessions().await?.len();
            let entries = store.count(None).await?;
            println!("  Recorded:       {entries} entries in {sessions} sessions");
        }
        Err(e) => println!("  Recorded:       unavailable ({e})"),
    }

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file. Run `stepwise onboard` first");
    }

    Ok(())
}
