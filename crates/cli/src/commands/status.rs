//! `gpuhub status`: latest device readings per agent

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use tabled::Tabled;

use crate::client::{AgentStatus, ApiClient};
use crate::output::{color_liveness, color_percent, format_duration_secs, print_json, print_table, OutputFormat};

/// One device of one agent
#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Agent")]
    agent: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Last Seen")]
    last_seen: String,
    #[tabled(rename = "GPU")]
    index: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Util")]
    utilization: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Mem %")]
    memory_percent: String,
    #[tabled(rename = "Temp")]
    temperature: String,
    #[tabled(rename = "Power")]
    power: String,
}

/// Keep the requested agents
fn select(
    mut agents: BTreeMap<String, AgentStatus>,
    agent: Option<&str>,
    online_only: bool,
) -> BTreeMap<String, AgentStatus> {
    if let Some(name) = agent {
        agents.retain(|k, _| k == name);
    }
    if online_only {
        agents.retain(|_, status| status.online);
    }
    agents
}

/// Flatten agents into one row per device; agents without devices get a placeholder row
fn rows(agents: &BTreeMap<String, AgentStatus>) -> Vec<DeviceRow> {
    let mut rows = Vec::new();

    for (name, status) in agents {
        let state = color_liveness(status.online);
        let last_seen = format!("{} ago", format_duration_secs(status.last_seen_secs));

        if status.devices.is_empty() {
            rows.push(DeviceRow {
                agent: name.clone(),
                state,
                last_seen,
                index: "-".to_string(),
                name: "-".to_string(),
                utilization: "-".to_string(),
                memory: "-".to_string(),
                memory_percent: "-".to_string(),
                temperature: "-".to_string(),
                power: "-".to_string(),
            });
            continue;
        }

        for device in &status.devices {
            rows.push(DeviceRow {
                agent: name.clone(),
                state: state.clone(),
                last_seen: last_seen.clone(),
                index: device.index.to_string(),
                name: device.name.clone(),
                utilization: format!("{:.0}%", device.utilization_percent),
                memory: format!("{} / {}", device.memory_used_label, device.memory_total_label),
                memory_percent: color_percent(device.memory_used_percent),
                temperature: device
                    .temperature_c
                    .map(|t| format!("{:.0}°C", t))
                    .unwrap_or_else(|| "N/A".to_string()),
                power: format!("{} / {}", device.power_draw_label, device.power_limit_label),
            });
        }
    }

    rows
}

/// Show the latest status of every agent, or of one
pub async fn show_status(
    client: &ApiClient,
    agent: Option<String>,
    online_only: bool,
    format: OutputFormat,
) -> Result<()> {
    let agents = select(client.data().await?, agent.as_deref(), online_only);

    if let Some(name) = &agent {
        if agents.is_empty() && !online_only {
            bail!("agent '{}' is not known to the hub", name);
        }
    }

    match format {
        OutputFormat::Json => print_json(&agents)?,
        OutputFormat::Table => print_table(rows(&agents), "No agents reporting"),
    }

    Ok(())
}
