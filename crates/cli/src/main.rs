//! toolchat CLI: the main entry point.
//!
//! Commands:
//! - `onboard` Write a default config file
//! - `chat`    Interactive chat with the tool-augmented loop
//! - `ask`     Answer a single message and exit
//! - `team`    Run a configured multi-agent team on a task
//! - `tools`   List the tools the model can call
//! - `serve`   Serve the built-in tools as a stdio tool server

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "toolchat",
    about = "toolchat — tool-augmented chat in the terminal",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file (default: ~/.toolchat/config.toml)
    #[arg(short, long, global = true, env = "TOOLCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Onboard,

    /// Chat with the assistant interactively
    Chat,

    /// Send a single message and print the answer
    Ask {
        /// The message to send
        message: String,
    },

    /// Run a configured team of agents on a task
    Team {
        /// Team name from the config file
        name: String,

        /// The task the team works on
        task: String,
    },

    /// List available tools
    Tools,

    /// Serve the built-in tools over stdin/stdout
    Serve {
        /// Also expose the financial data tools
        #[arg(long)]
        financial_data: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Logs go to stderr so `serve` keeps stdout for the protocol.
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Onboard => commands::onboard::run(config).await?,
        Commands::Chat => commands::chat::run(config).await?,
        Commands::Ask { message } => commands::ask::run(config, message).await?,
        Commands::Team { name, task } => commands::team::run(config, &name, task).await?,
        Commands::Tools => commands::tools::run(config).await?,
        Commands::Serve { financial_data } => commands::serve::run(config, financial_data).await?,
    }

    Ok(())
}
