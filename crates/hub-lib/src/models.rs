//! Core data models for the GPU hub
//!
//! Snapshots pushed by agents are normalized into these immutable value
//! types before they reach the aggregate store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Placeholder for labels the agent did not report
pub const NOT_AVAILABLE: &str = "N/A";

/// GPU memory held by one process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessUsage {
    pub pid: u32,
    pub name: String,
    pub memory_bytes_label: String,
}

/// Readings for a single device at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSample {
    /// Device ordinal, unique within one snapshot
    pub index: u32,
    pub name: String,
    pub temperature_c: Option<f64>,
    /// Always within 0..=100
    pub utilization_percent: f64,
    pub memory_used_label: String,
    pub memory_total_label: String,
    /// Derived from the memory labels, 0 when they cannot be parsed
    pub memory_used_percent: f64,
    pub power_draw_label: String,
    pub power_limit_label: String,
    pub processes: Vec<ProcessUsage>,
}

/// One agent's complete set of device readings
#[derive(Debug, Clone)]
pub struct AgentSnapshot {
    pub agent_name: String,
    /// Timestamp string as reported by the agent
    pub reported_timestamp: String,
    pub devices: Vec<DeviceSample>,
    pub received_at: Instant,
}

impl AgentSnapshot {
    /// Total memory usage across all devices of this snapshot
    pub fn total_memory_percent(&self) -> f64 {
        total_memory_percent(&self.devices)
    }
}

/// One retained point of an agent's memory time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub timestamp: String,
    pub total_memory_percent: f64,
    pub per_device_memory_percent: BTreeMap<u32, f64>,
}

impl HistoryPoint {
    /// Build a history point from a snapshot, rounding to one decimal
    pub fn from_snapshot(snapshot: &AgentSnapshot, timestamp: impl Into<String>) -> Self {
        let per_device_memory_percent = snapshot
            .devices
            .iter()
            .map(|d| (d.index, round1(d.memory_used_percent)))
            .collect();

        Self {
            timestamp: timestamp.into(),
            total_memory_percent: round1(snapshot.total_memory_percent()),
            per_device_memory_percent,
        }
    }
}

/// Extract the leading number of a label such as `"8000 MiB"` or `"45 %"`
pub fn parse_leading_number(label: &str) -> Option<f64> {
    let token = label.split_whitespace().next()?;
    let token = token.trim_end_matches(['%', 'C', 'W']);
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Memory usage percentage derived from used/total labels
///
/// Unparsable labels or a zero total yield 0; the result is clamped to
/// 0..=100.
pub fn memory_percent(used_label: &str, total_label: &str) -> f64 {
    match (
        parse_leading_number(used_label),
        parse_leading_number(total_label),
    ) {
        (Some(used), Some(total)) if total > 0.0 => clamp_percent(used / total * 100.0),
        _ => 0.0,
    }
}

/// Aggregate memory usage: sum of used over sum of total
pub fn total_memory_percent(devices: &[DeviceSample]) -> f64 {
    let (used, total) = devices.iter().fold((0.0, 0.0), |(used, total), d| {
        (
            used + parse_leading_number(&d.memory_used_label).unwrap_or(0.0),
            total + parse_leading_number(&d.memory_total_label).unwrap_or(0.0),
        )
    });

    if total > 0.0 {
        clamp_percent(used / total * 100.0)
    } else {
        0.0
    }
}

pub(crate) fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(index: u32, used: &str, total: &str) -> DeviceSample {
        DeviceSample {
            index,
            name: "RTX4090".to_string(),
            temperature_c: Some(50.0),
            utilization_percent: 10.0,
            memory_used_label: used.to_string(),
            memory_total_label: total.to_string(),
            memory_used_percent: memory_percent(used, total),
            power_draw_label: NOT_AVAILABLE.to_string(),
            power_limit_label: NOT_AVAILABLE.to_string(),
            processes: vec![],
        }
    }

    #[test]
    fn test_parse_leading_number() {
        assert_eq!(parse_leading_number("8000 MiB"), Some(8000.0));
        assert_eq!(parse_leading_number("45 %"), Some(45.0));
        assert_eq!(parse_leading_number("45%"), Some(45.0));
        assert_eq!(parse_leading_number("65 C"), Some(65.0));
        assert_eq!(parse_leading_number("120.5 W"), Some(120.5));
        assert_eq!(parse_leading_number("N/A"), None);
        assert_eq!(parse_leading_number(""), None);
    }

    #[test]
    fn test_memory_percent() {
        let pct = memory_percent("8000 MiB", "24000 MiB");
        assert!((pct - 33.333).abs() < 0.01);
    }

    #[test]
    fn test_memory_percent_degrades_to_zero() {
        assert_eq!(memory_percent("N/A", "24000 MiB"), 0.0);
        assert_eq!(memory_percent("100 MiB", "0 MiB"), 0.0);
        assert_eq!(memory_percent("100 MiB", "garbage"), 0.0);
    }

    #[test]
    fn test_memory_percent_is_clamped() {
        assert_eq!(memory_percent("300 MiB", "100 MiB"), 100.0);
    }

    #[test]
    fn test_total_memory_percent() {
        let devices = vec![
            device(0, "1000 MiB", "4000 MiB"),
            device(1, "3000 MiB", "4000 MiB"),
        ];
        assert_eq!(total_memory_percent(&devices), 50.0);
        assert_eq!(total_memory_percent(&[]), 0.0);
    }

    #[test]
    fn test_history_point_rounds_values() {
        let snapshot = AgentSnapshot {
            agent_name: "box".to_string(),
            reported_timestamp: "t".to_string(),
            devices: vec![device(0, "8000 MiB", "24000 MiB")],
            received_at: Instant::now(),
        };

        let point = HistoryPoint::from_snapshot(&snapshot, "10:00:00");
        assert_eq!(point.total_memory_percent, 33.3);
        assert_eq!(point.per_device_memory_percent[&0], 33.3);
        assert_eq!(point.timestamp, "10:00:00");
    }
}
