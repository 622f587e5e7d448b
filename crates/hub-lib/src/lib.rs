//! Aggregation engine for the GPU hub
//!
//! This crate provides the core functionality for:
//! - Normalizing telemetry snapshots pushed by remote agents
//! - Keeping the latest snapshot and a bounded history per agent
//! - Deriving online/offline liveness from staleness
//! - Sweeping out agents that stopped reporting
//! - Health checks and observability

pub mod clock;
pub mod health;
pub mod ingest;
pub mod liveness;
pub mod models;
pub mod observability;
pub mod query;
pub mod store;
pub mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use ingest::{IngestError, IngestPayload};
pub use models::*;
pub use observability::{HubMetrics, StructuredLogger};
pub use query::{AgentHistory, AgentStatus, FleetSummary};
pub use store::{AggregateStore, IngestOutcome, StoreConfig};
pub use sweeper::{RetentionSweeper, RetentionSweeperBuilder, SweepReport, SweeperConfig};
