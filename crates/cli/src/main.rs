//! Stepwise CLI: the main entry point.
//!
//! Commands:
//! - `run`      Run the agent on a goal in a fresh session
//! - `replay`   Replay recorded context, grouped by session
//! - `query`    Filter recorded context by time range, type, or session
//! - `sessions` List recorded session ids
//! - `clear`    Delete recorded context
//! - `onboard`  Write the default config file
//! - `status`   Show configuration and store status

use clap::{Parser, Subcommand};

mod commands;
mod progress;
mod stdin_input;

#[derive(Parser)]
#[command(
    name = "stepwise",
    about = "Stepwise: a tool-using agent loop with a replayable context log",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent on a goal
    Run {
        /// What the agent should accomplish
        #[arg(default_value = "Calculate 3 + 2")]
        goal: String,

        /// Number of recent entries to include in each prompt
        #[arg(short = 'n', long)]
        context_limit: Option<usize>,

        /// Ask for input on stdin after every turn
        #[arg(short, long)]
        collaborate: bool,

        /// Stop after this many turns
        #[arg(long)]
        max_turns: Option<u32>,
    },

    /// Replay recorded context, grouped by session
    Replay {
        /// Show at most this many entries
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only entries of this type (e.g. tool_result, error)
        #[arg(short = 't', long)]
        entry_type: Option<String>,

        /// Only this session
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Query recorded context
    Query {
        /// Inclusive lower bound (ISO-8601)
        #[arg(long)]
        start_time: Option<String>,

        /// Inclusive upper bound (ISO-8601)
        #[arg(long)]
        end_time: Option<String>,

        /// Only entries of this type
        #[arg(short = 't', long)]
        entry_type: Option<String>,

        /// Only this session
        #[arg(short, long)]
        session: Option<String>,

        /// Show at most this many entries
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List recorded session ids
    Sessions,

    /// Delete recorded context
    Clear {
        /// Only this session (default: everything)
        #[arg(short, long)]
        session: Option<String>,

        /// Confirm the deletion
        #[arg(long)]
        confirm: bool,
    },

    /// Write the default configuration file
    Onboard,

    /// Show configuration and store status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            goal,
            context_limit,
            collaborate,
            max_turns,
        } => {
            commands::run::run(commands::run::RunArgs {
                goal,
                context_limit,
                collaborate,
                max_turns,
            })
            .await?
        }
        Commands::Replay {
            limit,
            entry_type,
            session,
        } => commands::replay::run(limit, entry_type, session).await?,
        Commands::Query {
            start_time,
            end_time,
            entry_type,
            session,
            limit,
        } => {
            commands::query::run(commands::query::QueryArgs {
                start_time,
                end_time,
                entry_type,
                session,
                limit,
            })
            .await?
        }
        Commands::Sessions => commands::sessions::run().await?,
        Commands::Clear { session, confirm } => commands::clear::run(session, confirm).await?,
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
