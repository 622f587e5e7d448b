//! `gpuhub summary`: fleet counters

use anyhow::Result;
use colored::Colorize;

use crate::client::ApiClient;
use crate::output::{format_duration_secs, print_json, OutputFormat};

/// Show fleet counters
pub async fn show_summary(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let summary = client.summary().await?;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            println!("{}", "GPU Fleet".bold());
            println!("{}", "=".repeat(40));
            println!("Agents:                 {}", summary.total_agents);
            println!(
                "Online:                 {}",
                summary.online_agents.to_string().green()
            );

            let offline = summary.offline_agents.to_string();
            if summary.offline_agents > 0 {
                println!("Offline:                {}", offline.red());
            } else {
                println!("Offline:                {}", offline);
            }

            println!("Online GPUs:            {}", summary.online_devices);
            println!(
                "Hub uptime:             {}",
                format_duration_secs(summary.uptime_secs).dimmed()
            );
        }
    }

    Ok(())
}
