//! Snapshot ingestion
//!
//! Agents push loosely typed JSON: numbers may arrive as strings with units
//! (`"45 %"`, `"8000 MiB"`), fields may be missing, and older pollers use
//! different field names (`server_name`, `gpus`). This module decodes that
//! payload and normalizes it into an [`AgentSnapshot`]. Only a body that is
//! not JSON, has the wrong structural shape, or repeats a device index is
//! rejected; everything else degrades to defaults.

use crate::models::{
    clamp_percent, memory_percent, parse_leading_number, AgentSnapshot, DeviceSample,
    ProcessUsage, NOT_AVAILABLE,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Instant;
use thiserror::Error;

/// Agent name used when the payload does not carry one
pub const UNKNOWN_AGENT: &str = "unknown";

const UNKNOWN_NAME: &str = "Unknown";

/// Reasons a payload is rejected as a whole
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("duplicate device index {index} in snapshot from {agent}")]
    DuplicateDeviceIndex { agent: String, index: u32 },
}

/// Snapshot payload as sent over the wire
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestPayload {
    #[serde(rename = "agentName", alias = "agent_name", alias = "server_name")]
    pub agent_name: Option<String>,

    pub timestamp: Option<String>,

    #[serde(alias = "gpus")]
    pub devices: Option<Vec<RawDevice>>,
}

/// Device entry before normalization
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDevice {
    pub index: Option<Value>,
    pub name: Option<Value>,
    #[serde(alias = "temperatureC", alias = "temperature_c")]
    pub temperature: Option<Value>,
    #[serde(alias = "utilizationPercent", alias = "utilization_percent")]
    pub utilization: Option<Value>,
    #[serde(alias = "memoryUsedLabel")]
    pub memory_used: Option<Value>,
    #[serde(alias = "memoryTotalLabel")]
    pub memory_total: Option<Value>,
    #[serde(alias = "powerDrawLabel")]
    pub power_draw: Option<Value>,
    #[serde(alias = "powerLimitLabel")]
    pub power_limit: Option<Value>,
    pub processes: Option<Vec<RawProcess>>,
}

/// Process entry before normalization
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProcess {
    pub pid: Option<Value>,
    #[serde(alias = "process_name")]
    pub name: Option<Value>,
    #[serde(alias = "memoryBytesLabel", alias = "used_memory")]
    pub memory: Option<Value>,
}

/// Decode a request body into a payload
pub fn parse_payload(body: &[u8]) -> Result<IngestPayload, IngestError> {
    Ok(serde_json::from_slice(body)?)
}

impl IngestPayload {
    /// Apply defaults and derivations, producing an immutable snapshot
    pub fn normalize(self, received_at: Instant) -> Result<AgentSnapshot, IngestError> {
        let agent_name = self
            .agent_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNKNOWN_AGENT.to_string());

        let reported_timestamp = self
            .timestamp
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        let raw_devices = self.devices.unwrap_or_default();
        let explicit: Vec<Option<u32>> = raw_devices
            .iter()
            .map(|d| d.index.as_ref().and_then(as_u32))
            .collect();

        // Only explicitly reported indices can collide
        let mut taken = HashSet::with_capacity(raw_devices.len());
        for &index in explicit.iter().flatten() {
            if !taken.insert(index) {
                return Err(IngestError::DuplicateDeviceIndex {
                    agent: agent_name,
                    index,
                });
            }
        }

        let mut next_free = 0u32;
        let mut devices = Vec::with_capacity(raw_devices.len());
        for (raw, index) in raw_devices.into_iter().zip(explicit) {
            let index = match index {
                Some(index) => index,
                None => {
                    while taken.contains(&next_free) {
                        next_free += 1;
                    }
                    taken.insert(next_free);
                    next_free
                }
            };
            devices.push(raw.normalize(index));
        }

        Ok(AgentSnapshot {
            agent_name,
            reported_timestamp,
            devices,
            received_at,
        })
    }
}

impl RawDevice {
    fn normalize(self, index: u32) -> DeviceSample {
        let memory_used_label = label_or_na(self.memory_used.as_ref());
        let memory_total_label = label_or_na(self.memory_total.as_ref());
        let memory_used_percent = memory_percent(&memory_used_label, &memory_total_label);

        DeviceSample {
            index,
            name: label(self.name.as_ref()).unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            temperature_c: self.temperature.as_ref().and_then(as_f64),
            utilization_percent: clamp_percent(
                self.utilization.as_ref().and_then(as_f64).unwrap_or(0.0),
            ),
            memory_used_label,
            memory_total_label,
            memory_used_percent,
            power_draw_label: label_or_na(self.power_draw.as_ref()),
            power_limit_label: label_or_na(self.power_limit.as_ref()),
            processes: self
                .processes
                .unwrap_or_default()
                .into_iter()
                .map(RawProcess::normalize)
                .collect(),
        }
    }
}

impl RawProcess {
    fn normalize(self) -> ProcessUsage {
        ProcessUsage {
            pid: self.pid.as_ref().and_then(as_u32).unwrap_or(0),
            name: label(self.name.as_ref()).unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            memory_bytes_label: label_or_na(self.memory.as_ref()),
        }
    }
}

/// Numeric reading from a JSON number or a string like `"65 C"`
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_leading_number(s),
        _ => None,
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn label(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn label_or_na(value: Option<&Value>) -> String {
    label(value).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}
