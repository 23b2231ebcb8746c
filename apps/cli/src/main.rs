//! Broker CLI - drives the modal interaction broker from the command line.
//!
//! Provides a `broker` command that simulates clients answering dialogues and
//! context menus, and prints the effective broker configuration.

mod commands;
mod render;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use commands::{config, simulate};

/// Broker CLI - modal interaction broker playground
#[derive(Parser, Debug)]
#[command(
    name = "broker",
    author,
    version,
    about = "Modal interaction broker - simulate sessions and inspect configuration"
)]
struct Args {
    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run simulated sessions against a live broker
    ///
    /// Every session asks a message box and a text prompt, then opens a context
    /// menu, while a simulated client answers each of them.
    Simulate {
        /// Number of concurrent sessions
        #[arg(short, long, default_value = "4")]
        sessions: usize,

        /// Interaction rounds per session
        #[arg(short, long, default_value = "2")]
        rounds: usize,

        /// Delay before the simulated client answers, in milliseconds
        #[arg(long, default_value = "5")]
        answer_delay_ms: u64,

        /// Override the quiet interval between modals, in milliseconds
        #[arg(long)]
        quiet_interval_ms: Option<u64>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    match args.command {
        Command::Simulate { sessions, rounds, answer_delay_ms, quiet_interval_ms, json } => {
            let options = simulate::SimulateOptions {
                sessions,
                rounds,
                answer_delay_ms,
                quiet_interval_ms,
                json,
            };
            simulate::execute(args.config.as_deref(), options).await?;
        }
        Command::Config => {
            config::execute(args.config.as_deref())?;
        }
    }

    Ok(())
}
