//! Aggregate store for agent telemetry
//!
//! Holds the latest snapshot and a bounded rolling history for every agent
//! that has ever reported. The store is an explicit handle: the composition
//! root creates one and hands clones to the HTTP layer and the sweeper.
//!
//! Records live in a sharded [`DashMap`]. An upsert holds only the write lock
//! of the shard owning that agent, and the latest-state update and the
//! history append happen under the same guard, so readers never observe a
//! half-applied record.

mod ring;


pub use ring::{HistoryRing, DEFAULT_HISTORY_CAPACITY};

use crate::clock::{Clock, SystemClock};
use crate::ingest::{parse_payload, IngestError, IngestPayload};
use crate::liveness::{self, DEFAULT_DATA_TIMEOUT};
use crate::models::{AgentSnapshot, HistoryPoint};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default minimum spacing between two history points of one agent
pub const DEFAULT_HISTORY_MIN_INTERVAL: Duration = Duration::from_secs(5);

/// Format of the wall-clock label attached to history points
const HISTORY_TIME_FORMAT: &str = "%H:%M:%S";

/// Tunables for the aggregate store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Staleness after which an agent is reported offline (default: 60 seconds)
    pub data_timeout: Duration,
    /// History points retained per agent (default: 100)
    pub history_capacity: usize,
    /// Minimum spacing between admitted history points (default: 5 seconds)
    pub history_min_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_timeout: DEFAULT_DATA_TIMEOUT,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            history_min_interval: DEFAULT_HISTORY_MIN_INTERVAL,
        }
    }
}

/// Latest state and history of one agent
#[derive(Debug, Clone)]
pub struct AgentRecord {
    latest: AgentSnapshot,
    history: HistoryRing<HistoryPoint>,
    last_update: Instant,
    last_history_at: Option<Instant>,
}

impl AgentRecord {
    fn new(snapshot: AgentSnapshot, history_capacity: usize) -> Self {
        Self {
            last_update: snapshot.received_at,
            latest: snapshot,
            history: HistoryRing::with_capacity(history_capacity),
            last_history_at: None,
        }
    }

    pub fn latest(&self) -> &AgentSnapshot {
        &self.latest
    }

    pub fn history(&self) -> &HistoryRing<HistoryPoint> {
        &self.history
    }

    pub fn last_update(&self) -> Instant {
        self.last_update
    }

    pub fn is_online(&self, now: Instant, timeout: Duration) -> bool {
        liveness::is_online(self.last_update, now, timeout)
    }

    /// Whether a history point may be appended at `now`
    fn admits_history(&self, now: Instant, min_interval: Duration) -> bool {
        match self.last_history_at {
            None => true,
            Some(last) => liveness::age(last, now) >= min_interval,
        }
    }
}

/// What an ingest did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    /// The agent had not been seen before
    pub created: bool,
    /// A history point was appended
    pub history_admitted: bool,
}

/// Concurrent registry of agent records keyed by agent name
#[derive(Clone)]
pub struct AggregateStore {
    agents: Arc<DashMap<String, AgentRecord>>,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    started_at: Instant,
}

impl Default for AggregateStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl std::fmt::Debug for AggregateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateStore")
            .field("agents", &self.agents.len())
            .field("config", &self.config)
            .finish()
    }
}

impl AggregateStore {
    /// Create a store reading time from the system clock
    pub fn new(config: StoreConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a store with an injected clock
    pub fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        let started_at = clock.now();
        Self {
            agents: Arc::new(DashMap::new()),
            config,
            clock,
            started_at,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Current instant according to the store's clock
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Time since the store was created
    pub fn uptime(&self) -> Duration {
        liveness::age(self.started_at, self.now())
    }

    /// Decode, normalize and upsert a raw request body
    ///
    /// Nothing is written unless the whole body is accepted.
    pub fn ingest_bytes(&self, body: &[u8]) -> Result<(AgentSnapshot, IngestOutcome), IngestError> {
        self.ingest_payload(parse_payload(body)?)
    }

    /// Normalize and upsert an already decoded payload
    pub fn ingest_payload(
        &self,
        payload: IngestPayload,
    ) -> Result<(AgentSnapshot, IngestOutcome), IngestError> {
        let snapshot = payload.normalize(self.now())?;
        let outcome = self.ingest(snapshot.clone());
        Ok((snapshot, outcome))
    }

    /// Upsert a snapshot for its agent and apply the history admission policy
    ///
    /// The snapshot's `received_at` is the update instant used for liveness
    /// and admission. It is taken before the shard lock, so a racing writer
    /// may already have stored a later one; the stored instant never moves back.
    pub fn ingest(&self, snapshot: AgentSnapshot) -> IngestOutcome {
        let received_at = snapshot.received_at;
        let point = if snapshot.devices.is_empty() {
            None
        } else {
            let label = self.clock.wall_time().format(HISTORY_TIME_FORMAT).to_string();
            Some(HistoryPoint::from_snapshot(&snapshot, label))
        };

        match self.agents.entry(snapshot.agent_name.clone()) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                let now = record.last_update.max(received_at);
                let history_admitted = match point {
                    Some(point) if record.admits_history(now, self.config.history_min_interval) => {
                        record.history.push(point);
                        record.last_history_at = Some(now);
                        true
                    }
                    _ => false,
                };
                record.latest = snapshot;
                record.last_update = now;

                IngestOutcome {
                    created: false,
                    history_admitted,
                }
            }
            Entry::Vacant(entry) => {
                debug!(agent = %entry.key(), "Registering new agent");
                let mut record = AgentRecord::new(snapshot, self.config.history_capacity);
                let history_admitted = match point {
                    Some(point) => {
                        record.history.push(point);
                        record.last_history_at = Some(received_at);
                        true
                    }
                    None => false,
                };
                entry.insert(record);

                IngestOutcome {
                    created: true,
                    history_admitted,
                }
            }
        }
    }

    /// Run `f` against one agent's record while holding its read guard
    pub fn with_record<R>(&self, agent_name: &str, f: impl FnOnce(&AgentRecord) -> R) -> Option<R> {
        self.agents.get(agent_name).map(|r| f(r.value()))
    }

    /// Project every record through `f` into a name-ordered map
    pub fn project<R>(&self, f: impl Fn(&AgentRecord) -> R) -> BTreeMap<String, R> {
        self.agents
            .iter()
            .map(|r| (r.key().clone(), f(r.value())))
            .collect()
    }

    /// Whether an agent is currently online; `None` if never seen
    pub fn is_online(&self, agent_name: &str) -> Option<bool> {
        let now = self.now();
        let timeout = self.config.data_timeout;
        self.with_record(agent_name, |r| r.is_online(now, timeout))
    }

    /// Sorted names of all known agents
    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of (online, offline) agents right now
    pub fn liveness_counts(&self) -> (usize, usize) {
        let now = self.now();
        let timeout = self.config.data_timeout;
        self.agents.iter().fold((0, 0), |(online, offline), r| {
            if r.value().is_online(now, timeout) {
                (online + 1, offline)
            } else {
                (online, offline + 1)
            }
        })
    }

    /// Remove agents whose last update is older than `max_age`
    ///
    /// Shards are locked one at a time, so ingests for agents in other shards
    /// proceed while this runs. Returns the evicted agent names.
    pub fn evict_older_than(&self, max_age: Duration) -> Vec<String> {
        let now = self.now();
        let mut evicted = Vec::new();

        self.agents.retain(|name, record| {
            let keep = liveness::age(record.last_update, now) <= max_age;
            if !keep {
                evicted.push(name.clone());
            }
            keep
        });

        evicted.sort();
        evicted
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
