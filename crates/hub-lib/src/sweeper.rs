//! Retention sweeper
//!
//! Periodically counts online/offline agents for the metrics endpoint and,
//! when an eviction timeout is configured, removes agents that have been
//! silent for longer than that. A failing cycle is logged and skipped; the
//! loop only stops on the shutdown signal.

use crate::health::{components, ComponentStatus, HealthRegistry};
use crate::observability::{HubMetrics, StructuredLogger};
use crate::store::AggregateStore;
use anyhow::Result;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Default time between sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Default silence after which an agent record is deleted
pub const DEFAULT_EVICTION_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Configuration for the retention sweeper
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Time between sweeps (default: 10 seconds)
    pub interval: Duration,
    /// Age after which records are removed; `None` keeps them forever
    pub eviction_timeout: Option<Duration>,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
            eviction_timeout: Some(DEFAULT_EVICTION_TIMEOUT),
        }
    }
}

/// Result of one sweep cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub online: usize,
    pub offline: usize,
    pub evicted: Vec<String>,
}

/// Background task that maintains the aggregate store
pub struct RetentionSweeper {
    store: AggregateStore,
    config: SweeperConfig,
    metrics: HubMetrics,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
    #[cfg(test)]
    fail_cycles: std::collections::HashSet<u64>,
}

impl RetentionSweeper {
    pub fn new(store: AggregateStore, config: SweeperConfig) -> Self {
        Self {
            store,
            config,
            metrics: HubMetrics::new(),
            health: None,
            logger: None,
            #[cfg(test)]
            fail_cycles: Default::default(),
        }
    }

    /// Run until a shutdown signal is received
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            eviction_timeout_secs = self.config.eviction_timeout.map(|t| t.as_secs()),
            "Starting retention sweeper"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    cycles += 1;
                    self.cycle(cycles);
                }
                _ = shutdown.recv() => {
                    info!(cycles = cycles, "Shutting down retention sweeper");
                    break;
                }
            }
        }
    }

    /// One guarded cycle: sweep, then publish or report the failure
    fn cycle(&self, cycle: u64) {
        let start = Instant::now();

        match guarded(|| {
            self.fail_if_scheduled(cycle);
            self.sweep_once()
        }) {
            Ok(report) => {
                let elapsed = start.elapsed();
                self.metrics
                    .set_agents(report.online + report.offline, report.online);
                self.metrics
                    .observe_sweep(elapsed.as_secs_f64(), report.evicted.len());

                if let (Some(logger), Some(timeout)) = (&self.logger, self.config.eviction_timeout) {
                    for agent in &report.evicted {
                        logger.log_agent_evicted(agent, timeout.as_secs());
                    }
                }

                if let Some(health) = &self.health {
                    if health.status_of(components::SWEEPER) != Some(ComponentStatus::Healthy) {
                        health.set_healthy(components::SWEEPER);
                    }
                }

                debug!(
                    cycle = cycle,
                    online = report.online,
                    offline = report.offline,
                    evicted = report.evicted.len(),
                    elapsed_us = elapsed.as_micros() as u64,
                    "Sweep complete"
                );
            }
            Err(reason) => {
                error!(cycle = cycle, error = %reason, "Sweep failed, retrying next cycle");
                self.metrics.inc_sweep_failures();
                if let Some(health) = &self.health {
                    health.set_degraded(components::SWEEPER, reason);
                }
            }
        }
    }

    #[cfg(test)]
    fn fail_if_scheduled(&self, cycle: u64) {
        if self.fail_cycles.contains(&cycle) {
            panic!("scheduled failure in cycle {}", cycle);
        }
    }

    #[cfg(not(test))]
    fn fail_if_scheduled(&self, _cycle: u64) {}

    /// Evict expired agents and count the rest
    pub fn sweep_once(&self) -> SweepReport {
        let evicted = match self.config.eviction_timeout {
            Some(timeout) => self.store.evict_older_than(timeout),
            None => Vec::new(),
        };
        let (online, offline) = self.store.liveness_counts();

        SweepReport {
            online,
            offline,
            evicted,
        }
    }
}

/// Run one sweep, turning a panic into an error message
fn guarded(sweep: impl FnOnce() -> SweepReport) -> std::result::Result<SweepReport, String> {
    catch_unwind(AssertUnwindSafe(sweep)).map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "sweep panicked".to_string()
    }
}

/// Builder for creating the retention sweeper
pub struct RetentionSweeperBuilder {
    store: Option<AggregateStore>,
    config: SweeperConfig,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
}

impl RetentionSweeperBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            config: SweeperConfig::default(),
            health: None,
            logger: None,
        }
    }

    pub fn store(mut self, store: AggregateStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the eviction timeout; `None` disables eviction
    pub fn eviction_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.eviction_timeout = timeout;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Build the sweeper
    ///
    /// The eviction timeout must be longer than the store's data timeout so
    /// that agents are reported offline before they disappear.
    pub fn build(self) -> Result<RetentionSweeper> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Store is required"))?;

        if self.config.interval.is_zero() {
            anyhow::bail!("Sweep interval must be greater than zero");
        }

        if let Some(timeout) = self.config.eviction_timeout {
            let data_timeout = store.config().data_timeout;
            if timeout <= data_timeout {
                anyhow::bail!(
                    "Eviction timeout ({}s) must exceed the data timeout ({}s)",
                    timeout.as_secs(),
                    data_timeout.as_secs()
                );
            }
        }

        let mut sweeper = RetentionSweeper::new(store, self.config);
        sweeper.health = self.health;
        sweeper.logger = self.logger;
        Ok(sweeper)
    }
}

impl Default for RetentionSweeperBuilder {
    fn default() -> Self {
        Self::new()
    }
}
