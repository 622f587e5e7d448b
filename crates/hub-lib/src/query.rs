//! Read-only views over the aggregate store
//!
//! These are the shapes served on `/api/data`, `/api/history` and
//! `/api/summary`. All maps are ordered by key so that two reads with no
//! ingest in between serialize identically.

use crate::models::{DeviceSample, HistoryPoint};
use crate::store::{AgentRecord, AggregateStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

/// Point-in-time status of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub online: bool,
    pub latest_timestamp: String,
    pub devices: Vec<DeviceSample>,
    /// Whole seconds since the agent last reported
    pub last_seen_secs: u64,
}

impl AgentStatus {
    fn from_record(record: &AgentRecord, now: Instant, timeout: Duration) -> Self {
        Self {
            online: record.is_online(now, timeout),
            latest_timestamp: record.latest().reported_timestamp.clone(),
            devices: record.latest().devices.clone(),
            last_seen_secs: now.saturating_duration_since(record.last_update()).as_secs(),
        }
    }
}

/// Memory time series of one agent, arrays aligned by position
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentHistory {
    pub timestamps: Vec<String>,
    pub total_memory_percent: Vec<f64>,
    /// Device index to per-point readings; `None` where the device was absent
    pub per_device_memory_percent: BTreeMap<u32, Vec<Option<f64>>>,
}

impl AgentHistory {
    /// Lay out history points as parallel arrays
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a HistoryPoint>) -> Self {
        let points: Vec<&HistoryPoint> = points.into_iter().collect();

        let device_ids: BTreeSet<u32> = points
            .iter()
            .flat_map(|p| p.per_device_memory_percent.keys().copied())
            .collect();

        let per_device_memory_percent = device_ids
            .into_iter()
            .map(|id| {
                let series = points
                    .iter()
                    .map(|p| p.per_device_memory_percent.get(&id).copied())
                    .collect();
                (id, series)
            })
            .collect();

        Self {
            timestamps: points.iter().map(|p| p.timestamp.clone()).collect(),
            total_memory_percent: points.iter().map(|p| p.total_memory_percent).collect(),
            per_device_memory_percent,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Fleet-wide counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetSummary {
    pub total_agents: usize,
    pub online_agents: usize,
    pub offline_agents: usize,
    /// Devices reported by agents that are currently online
    pub online_devices: usize,
    pub uptime_secs: u64,
}

impl AggregateStore {
    /// Status of every known agent
    pub fn all_status(&self) -> BTreeMap<String, AgentStatus> {
        let now = self.now();
        let timeout = self.config().data_timeout;
        self.project(|r| AgentStatus::from_record(r, now, timeout))
    }

    /// Status of one agent, `None` if never seen
    pub fn status_of(&self, agent_name: &str) -> Option<AgentStatus> {
        let now = self.now();
        let timeout = self.config().data_timeout;
        self.with_record(agent_name, |r| AgentStatus::from_record(r, now, timeout))
    }

    /// History of every known agent on its own timeline
    pub fn all_history(&self) -> BTreeMap<String, AgentHistory> {
        self.project(|r| AgentHistory::from_points(r.history().iter()))
    }

    /// History of one agent, `None` if never seen
    pub fn history_of(&self, agent_name: &str) -> Option<AgentHistory> {
        self.with_record(agent_name, |r| AgentHistory::from_points(r.history().iter()))
    }

    /// Raw history points of one agent, empty if never seen
    pub fn history_points(&self, agent_name: &str) -> Vec<HistoryPoint> {
        self.with_record(agent_name, |r| r.history().to_vec())
            .unwrap_or_default()
    }

    /// Fleet counters for dashboards
    pub fn summary(&self) -> FleetSummary {
        let now = self.now();
        let timeout = self.config().data_timeout;

        let mut summary = FleetSummary {
            total_agents: 0,
            online_agents: 0,
            offline_agents: 0,
            online_devices: 0,
            uptime_secs: self.uptime().as_secs(),
        };

        for (online, devices) in self
            .project(|r| (r.is_online(now, timeout), r.latest().devices.len()))
            .into_values()
        {
            summary.total_agents += 1;
            if online {
                summary.online_agents += 1;
                summary.online_devices += devices;
            } else {
                summary.offline_agents += 1;
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(ts: &str, total: f64, devices: &[(u32, f64)]) -> HistoryPoint {
        HistoryPoint {
            timestamp: ts.to_string(),
            total_memory_percent: total,
            per_device_memory_percent: devices.iter().copied().collect(),
        }
    }

    #[test]
    fn test_history_arrays_are_aligned() {
        let points = vec![
            point("10:00:00", 10.0, &[(0, 10.0), (1, 10.0)]),
            point("10:00:05", 20.0, &[(0, 30.0), (1, 10.0)]),
        ];

        let history = AgentHistory::from_points(&points);
        assert_eq!(history.timestamps, vec!["10:00:00", "10:00:05"]);
        assert_eq!(history.total_memory_percent, vec![10.0, 20.0]);
        assert_eq!(
            history.per_device_memory_percent[&0],
            vec![Some(10.0), Some(30.0)]
        );
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_history_null_fills_missing_devices() {
        let points = vec![
            point("10:00:00", 10.0, &[(0, 10.0)]),
            point("10:00:05", 20.0, &[(0, 20.0), (3, 40.0)]),
            point("10:00:10", 30.0, &[(3, 50.0)]),
        ];

        let history = AgentHistory::from_points(&points);
        assert_eq!(
            history.per_device_memory_percent[&0],
            vec![Some(10.0), Some(20.0), None]
        );
        assert_eq!(
            history.per_device_memory_percent[&3],
            vec![None, Some(40.0), Some(50.0)]
        );
    }

    #[test]
    fn test_history_serializes_camel_case() {
        let history = AgentHistory::from_points(&[point("10:00:00", 12.5, &[(0, 12.5)])]);
        let json = serde_json::to_value(&history).unwrap();

        assert_eq!(json["timestamps"][0], "10:00:00");
        assert_eq!(json["totalMemoryPercent"][0], 12.5);
        assert_eq!(json["perDeviceMemoryPercent"]["0"][0], 12.5);
    }

    #[test]
    fn test_empty_history() {
        let history = AgentHistory::from_points(&[]);
        assert!(history.is_empty());
        assert!(history.per_device_memory_percent.is_empty());
    }
}
