//! GPU hub CLI
//!
//! A command-line tool for inspecting the fleet state held by the GPU
//! telemetry hub and for pushing snapshot files by hand.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{history, push, status, summary};
use std::path::PathBuf;

/// GPU hub CLI
#[derive(Parser)]
#[command(name = "gpuhub")]
#[command(author, version, about = "CLI for the GPU telemetry hub", long_about = None)]
pub struct Cli {
    /// Hub URL (can also be set via GPUHUB_API_URL or ~/.config/gpuhub/config.json)
    #[arg(long, env = "GPUHUB_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the latest device readings of each agent
    Status {
        /// Only show this agent
        #[arg(long, short)]
        agent: Option<String>,

        /// Hide agents that stopped reporting
        #[arg(long)]
        online_only: bool,
    },

    /// Show the memory usage history of an agent
    History {
        /// Agent name
        agent: String,

        /// Only show the newest N points
        #[arg(long, short)]
        last: Option<usize>,
    },

    /// Show fleet counters
    Summary,

    /// Send a snapshot JSON file to the hub
    Push {
        /// Path to the snapshot file
        file: PathBuf,

        /// Report under this agent name instead of the one in the file
        #[arg(long, short)]
        agent: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let api_url = config::Config::load()?.resolve_api_url(cli.api_url);
    let client = client::ApiClient::new(&api_url)?;

    match cli.command {
        Commands::Status { agent, online_only } => {
            status::show_status(&client, agent, online_only, cli.format).await?;
        }
        Commands::History { agent, last } => {
            history::show_history(&client, &agent, last, cli.format).await?;
        }
        Commands::Summary => {
            summary::show_summary(&client, cli.format).await?;
        }
        Commands::Push { file, agent } => {
            push::push_snapshot(&client, &file, agent, cli.format).await?;
        }
    }

    Ok(())
}
