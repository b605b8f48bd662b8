//! HTTP endpoint handlers for the exporter.
//!
//! This module provides handlers for all HTTP endpoints:
//! - `/metrics`: Prometheus metrics endpoint
//! - `/healthz`, `/readyz`: Liveness and readiness probes
//! - `/`: Landing page

pub mod health;
pub mod metrics;
pub mod root;

// Re-export handlers
pub use health::{healthz_handler, readyz_handler};
pub use metrics::metrics_handler;
pub use root::root_handler;
