//! Observability infrastructure for the GPU hub
//!
//! Provides:
//! - Prometheus metrics (ingest latency and outcomes, tracked/online agents, sweeps)
//! - Structured JSON logging of hub lifecycle and agent events

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter,
    IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for in-memory operations (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<HubMetricsInner> = OnceLock::new();

struct HubMetricsInner {
    ingest_latency_seconds: Histogram,
    ingests_total: IntCounter,
    ingest_rejections_total: IntCounter,
    history_points_admitted_total: IntCounter,
    agents_tracked: IntGauge,
    agents_online: IntGauge,
    agents_evicted_total: IntCounter,
    sweep_duration_seconds: Histogram,
    sweep_failures_total: IntCounter,
}

impl HubMetricsInner {
    fn new() -> Self {
        Self {
            ingest_latency_seconds: register_histogram!(
                "gpu_hub_ingest_latency_seconds",
                "Time spent normalizing and storing one snapshot",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register ingest_latency_seconds"),

            ingests_total: register_int_counter!(
                "gpu_hub_ingests_total",
                "Snapshots accepted from agents"
            )
            .expect("Failed to register ingests_total"),

            ingest_rejections_total: register_int_counter!(
                "gpu_hub_ingest_rejections_total",
                "Snapshots rejected as malformed"
            )
            .expect("Failed to register ingest_rejections_total"),

            history_points_admitted_total: register_int_counter!(
                "gpu_hub_history_points_admitted_total",
                "History points appended across all agents"
            )
            .expect("Failed to register history_points_admitted_total"),

            agents_tracked: register_int_gauge!(
                "gpu_hub_agents_tracked",
                "Agents currently held in the aggregate store"
            )
            .expect("Failed to register agents_tracked"),

            agents_online: register_int_gauge!(
                "gpu_hub_agents_online",
                "Agents that reported within the data timeout"
            )
            .expect("Failed to register agents_online"),

            agents_evicted_total: register_int_counter!(
                "gpu_hub_agents_evicted_total",
                "Agents removed by the retention sweeper"
            )
            .expect("Failed to register agents_evicted_total"),

            sweep_duration_seconds: register_histogram!(
                "gpu_hub_sweep_duration_seconds",
                "Time spent in one retention sweep",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register sweep_duration_seconds"),

            sweep_failures_total: register_int_counter!(
                "gpu_hub_sweep_failures_total",
                "Sweep cycles that failed and were skipped"
            )
            .expect("Failed to register sweep_failures_total"),
        }
    }
}

/// Hub metrics for Prometheus exposition
///
/// A lightweight handle to the process-wide collectors; clones share them.
#[derive(Clone)]
pub struct HubMetrics {
    _private: (),
}

impl Default for HubMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HubMetrics {
    /// Create a metrics handle, registering the collectors on first use
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(HubMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &HubMetricsInner {
        GLOBAL_METRICS.get_or_init(HubMetricsInner::new)
    }

    /// Record an accepted snapshot
    pub fn observe_ingest(&self, duration_secs: f64, history_admitted: bool) {
        let inner = self.inner();
        inner.ingest_latency_seconds.observe(duration_secs);
        inner.ingests_total.inc();
        if history_admitted {
            inner.history_points_admitted_total.inc();
        }
    }

    pub fn inc_ingest_rejections(&self) {
        self.inner().ingest_rejections_total.inc();
    }

    /// Publish the agent population seen by the last sweep
    pub fn set_agents(&self, tracked: usize, online: usize) {
        self.inner().agents_tracked.set(tracked as i64);
        self.inner().agents_online.set(online as i64);
    }

    pub fn observe_sweep(&self, duration_secs: f64, evicted: usize) {
        self.inner().sweep_duration_seconds.observe(duration_secs);
        self.inner().agents_evicted_total.inc_by(evicted as u64);
    }

    pub fn inc_sweep_failures(&self) {
        self.inner().sweep_failures_total.inc();
    }
}

/// Structured logger for hub events
///
/// Every line carries an `event` field so log pipelines can filter on it.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, addr: &str) {
        info!(
            event = "hub_started",
            instance = %self.instance,
            hub_version = %version,
            addr = %addr,
            "GPU hub started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "hub_shutdown",
            instance = %self.instance,
            reason = %reason,
            "GPU hub shutting down"
        );
    }

    /// First snapshot from a previously unseen agent
    pub fn log_agent_registered(&self, agent: &str, devices: usize) {
        info!(
            event = "agent_registered",
            instance = %self.instance,
            agent = %agent,
            devices = devices,
            "New agent reporting"
        );
    }

    pub fn log_agent_evicted(&self, agent: &str, idle_limit_secs: u64) {
        info!(
            event = "agent_evicted",
            instance = %self.instance,
            agent = %agent,
            idle_limit_secs = idle_limit_secs,
            "Evicted idle agent"
        );
    }

    pub fn log_ingest_rejected(&self, reason: &str, body_bytes: usize) {
        warn!(
            event = "ingest_rejected",
            instance = %self.instance,
            reason = %reason,
            body_bytes = body_bytes,
            "Rejected snapshot payload"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_metrics_creation() {
        // Collectors live in the default registry, so repeated handles must
        // not try to register twice.
        let metrics = HubMetrics::new();
        let again = HubMetrics::new();

        metrics.observe_ingest(0.0001, true);
        again.observe_ingest(0.0002, false);
        metrics.inc_ingest_rejections();
        metrics.set_agents(3, 2);
        metrics.observe_sweep(0.001, 1);
        metrics.inc_sweep_failures();

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "gpu_hub_ingests_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("hub-1");
        assert_eq!(logger.instance, "hub-1");
        logger.log_agent_registered("box-1", 2);
    }
}
