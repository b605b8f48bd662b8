//! Ondat Metrics Exporter Library
//!
//! Per-volume storage metrics for the Ondat (StorageOS) volumes attached to a
//! node. The binary wraps this library in an HTTP server; everything needed
//! to run a scrape lives here so it can be driven from tests.
//!
//! # Pipeline
//!
//! - [`volumes`] lists the `v.<uuid>` block devices and resolves the owning
//!   PVC from the node-local state file, or from the control plane ([`api`])
//!   once per scrape when the state file is absent
//! - [`procfs`] parses `/proc/diskstats`, the mount table and block device
//!   attributes
//! - [`collectors`] turn both into [`metrics::Sample`]s; filesystem stat calls
//!   are guarded by [`stuck_mounts`]
//! - [`scrape`] runs the collectors concurrently and adds per-collector
//!   duration and success samples
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ondat_metrics_exporter::scrape::{ScrapeSettings, Scraper};
//! use ondat_metrics_exporter::stuck_mounts::StuckMountRegistry;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let scraper = Scraper::from_settings(
//!     &ScrapeSettings::default(),
//!     Arc::new(StuckMountRegistry::new()),
//! )?;
//! let output = scraper.scrape().await;
//! print!("{}", ondat_metrics_exporter::metrics::render(&output.samples)?);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod collectors;
pub mod metrics;
pub mod procfs;
pub mod scrape;
pub mod stuck_mounts;
pub mod volumes;

// Re-export main types for convenience
pub use collectors::{Collector, CollectorError, CollectorKind, MetricSink, ScrapeCycle};
pub use metrics::{render, Sample};
pub use scrape::{CollectorReport, ScrapeOutput, ScrapeSettings, Scraper};
pub use stuck_mounts::StuckMountRegistry;
pub use volumes::{Volume, VolumeDiscovery};
