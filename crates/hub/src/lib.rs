//! GPU hub server
//!
//! HTTP surface and configuration for the telemetry aggregation hub. The
//! binary in `main.rs` is the composition root; this library exposes the
//! router so it can be exercised in tests without binding a port.

pub mod api;
pub mod config;
