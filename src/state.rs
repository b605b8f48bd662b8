//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers.

use ondat_metrics_exporter::{Scraper, StuckMountRegistry};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests.
pub struct AppState {
    pub scraper: Arc<Scraper>,
    pub config: Arc<Config>,
    /// Mounts whose stat call hung, shared with the filesystem collector.
    pub stuck_mounts: Arc<StuckMountRegistry>,
    /// Deadline for one `/metrics` request.
    pub scrape_timeout: Duration,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
    scrapes_served: AtomicU64,
    scrapes_timed_out: AtomicU64,
}

impl AppState {
    pub fn new(
        scraper: Scraper,
        config: Config,
        stuck_mounts: Arc<StuckMountRegistry>,
    ) -> Self {
        Self {
            scraper: Arc::new(scraper),
            scrape_timeout: config.scrape_timeout(),
            config: Arc::new(config),
            stuck_mounts,
            start_time: Instant::now(),
            scrapes_served: AtomicU64::new(0),
            scrapes_timed_out: AtomicU64::new(0),
        }
    }

    pub fn record_scrape(&self) {
        self.scrapes_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.scrapes_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn scrapes_served(&self) -> u64 {
        self.scrapes_served.load(Ordering::Relaxed)
    }

    pub fn scrapes_timed_out(&self) -> u64 {
        self.scrapes_timed_out.load(Ordering::Relaxed)
    }
}
