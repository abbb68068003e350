//! `stepwise run`: run the agent on a goal in a fresh session.

use std::sync::Arc;
use stepwise_agent::{AgentController, FinishReason};
use stepwise_core::agent::AgentState;
use stepwise_core::event::EventBus;
use stepwise_providers::OpenAiCompatProvider;

use super::{CommandResult, load_config, open_store};
use crate::{progress, stdin_input::StdinInput};

pub struct RunArgs {
    pub goal: String,
    pub context_limit: Option<usize>,
    pub collaborate: bool,
    pub max_turns: Option<u32>,
}

pub async fn run(args: RunArgs) -> CommandResult {
    let mut config = load_config()?;
    if args.collaborate {
        config.collaboration = true;
    }
    if args.max_turns.is_some() {
        config.agent.max_turns = args.max_turns;
    }

    // Check for API key early, give a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!("    STEPWISE_API_KEY=sk-...   (takes priority)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", stepwise_config::AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider = Arc::new(OpenAiCompatProvider::from_config(&config)?);
    let store = open_store(&config).await?;
    let tools = Arc::new(stepwise_tools::default_registry());
    let events = Arc::new(EventBus::default());

    let mut controller = AgentController::new(provider, tools, store, config.agent_settings())
        .with_event_bus(events.clone());
    if config.collaboration {
        controller = controller.with_human_input(Arc::new(StdinInput::new()));
    }

    let printer = progress::spawn(&events);
    let context_limit = args.context_limit.or(config.agent.context_limit);
    let controller = Arc::new(controller);
    let handle = controller.handle();
    let mut states = handle.subscribe();

    let mut task = tokio::spawn({
        let controller = controller.clone();
        async move { controller.start(&args.goal, context_limit).await }
    });

    let result = tokio::select! {
        joined = &mut task => joined?,
        // Ctrl-C is only taken over once the run is live; before that the
        // default handler ends the process
        _ = async {
            let _ = states.wait_for(|s| *s != AgentState::Idle).await;
            let _ = tokio::signal::ctrl_c().await;
        } => {
            eprintln!("\n  Stopping after the current turn...");
            handle.stop();
            task.await?
        }
    };

    let session = controller
        .current_session_id()
        .map(|s| s.to_string())
        .unwrap_or_default();

    // The printer exits once every sender of the bus is gone
    drop((controller, handle, events));
    let _ = printer.await;

    let outcome = result?;
    println!();
    match outcome.reason {
        FinishReason::Completed => {
            let answer = match outcome.result.unwrap_or_default() {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            println!("✅ Final result: {answer}");
        }
        FinishReason::StoppedExternally => println!("⏹️  Stopped"),
        FinishReason::MaxTurns => println!("⚠️  Turn limit reached after {} turns", outcome.turns),
        FinishReason::InputClosed => println!("👋 Input closed"),
    }
    println!("🧾 Session ID: {session}");

    Ok(())
}
