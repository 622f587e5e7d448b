//! `gpuhub history`: memory usage time series of one agent

use anyhow::Result;
use colored::Colorize;
use tabled::{builder::Builder, settings::Style};

use crate::client::{AgentHistory, ApiClient};
use crate::output::{format_percent, print_json, print_warning, OutputFormat};

/// Keep only the newest `last` points
fn tail(mut history: AgentHistory, last: Option<usize>) -> AgentHistory {
    let Some(last) = last else {
        return history;
    };
    let skip = history.timestamps.len().saturating_sub(last);
    if skip == 0 {
        return history;
    }

    history.timestamps.drain(..skip);
    history.total_memory_percent.drain(..skip.min(history.total_memory_percent.len()));
    for series in history.per_device_memory_percent.values_mut() {
        series.drain(..skip.min(series.len()));
    }
    history
}

/// Render parallel arrays as rows: time, total, then one column per device
fn render(history: &AgentHistory) -> String {
    let mut builder = Builder::default();

    let mut header = vec!["Time".to_string(), "Total".to_string()];
    header.extend(
        history
            .per_device_memory_percent
            .keys()
            .map(|index| format!("GPU {}", index)),
    );
    builder.push_record(header);

    for (i, timestamp) in history.timestamps.iter().enumerate() {
        let mut record = vec![
            timestamp.clone(),
            history
                .total_memory_percent
                .get(i)
                .map(|v| format_percent(*v))
                .unwrap_or_default(),
        ];
        record.extend(history.per_device_memory_percent.values().map(|series| {
            match series.get(i).copied().flatten() {
                Some(v) => format_percent(v),
                None => "-".to_string(),
            }
        }));
        builder.push_record(record);
    }

    builder.build().with(Style::rounded()).to_string()
}

/// Show the memory history of one agent
pub async fn show_history(
    client: &ApiClient,
    agent: &str,
    last: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let history = tail(client.agent_history(agent).await?, last);

    match format {
        OutputFormat::Json => print_json(&history)?,
        OutputFormat::Table => {
            if history.timestamps.is_empty() {
                print_warning(&format!("No history recorded for {}", agent));
                return Ok(());
            }
            println!("{} {}", "Memory usage for".bold(), agent.cyan());
            println!("{}", render(&history));
        }
    }

    Ok(())
}
