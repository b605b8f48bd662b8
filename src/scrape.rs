//! Scrape orchestration.
//!
//! A [`Scraper`] runs every registered collector concurrently and waits for
//! all of them. Each collector gets one duration and one success sample,
//! emitted after its own samples, whatever the collector did. A failing or
//! panicking collector never affects its siblings.
//!
//! Every scrape opens a fresh [`ScrapeCycle`]: the collectors share its volume
//! set, and nothing survives into the next scrape.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::api::{ApiError, ClaimLookup, HttpControlPlane};
use crate::collectors::{
    enabled_collectors, Collector, CollectorKind, DiskStatsCollector, FileSystemCollector,
    MetricSink, ScrapeCycle,
};
use crate::metrics::{Sample, SCRAPE_COLLECTOR_DURATION, SCRAPE_COLLECTOR_SUCCESS};
use crate::stuck_mounts::{statfs_usage, GuardedStat, StuckMountRegistry, DEFAULT_STAT_TIMEOUT};
use crate::volumes::{LsListing, VolumeDiscovery};

/// Node paths and control-plane settings the collectors are built from.
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub volumes_dir: PathBuf,
    pub state_dir: PathBuf,
    pub diskstats_path: PathBuf,
    pub sys_block_path: PathBuf,
    pub mounts_path: PathBuf,
    pub mounts_fallback_path: PathBuf,
    pub api_endpoint: String,
    pub api_secrets_path: PathBuf,
    pub stat_timeout: Duration,
    pub disabled_collectors: Vec<String>,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            volumes_dir: PathBuf::from("/var/lib/storageos/volumes"),
            state_dir: PathBuf::from("/var/lib/storageos/state"),
            diskstats_path: PathBuf::from("/proc/diskstats"),
            sys_block_path: PathBuf::from("/sys/block"),
            mounts_path: PathBuf::from("/proc/1/mounts"),
            mounts_fallback_path: PathBuf::from("/proc/mounts"),
            api_endpoint: crate::api::DEFAULT_ENDPOINT.to_string(),
            api_secrets_path: PathBuf::from("/etc/storageos/secrets/api"),
            stat_timeout: DEFAULT_STAT_TIMEOUT,
            disabled_collectors: Vec::new(),
        }
    }
}

/// Outcome of one collector within a scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorReport {
    pub name: &'static str,
    pub duration: Duration,
    pub success: bool,
}

/// Everything a scrape produced, in arrival order.
#[derive(Debug, Default)]
pub struct ScrapeOutput {
    pub samples: Vec<Sample>,
    pub reports: Vec<CollectorReport>,
}

impl ScrapeOutput {
    pub fn all_succeeded(&self) -> bool {
        self.reports.iter().all(|r| r.success)
    }
}

pub struct Scraper {
    collectors: Vec<Arc<dyn Collector>>,
    discovery: Option<Arc<VolumeDiscovery>>,
}

impl Scraper {
    pub fn new(collectors: Vec<Arc<dyn Collector>>) -> Self {
        Self {
            collectors,
            discovery: None,
        }
    }

    /// Sets the discovery that builds each scrape's volume set.
    pub fn with_discovery(mut self, discovery: Arc<VolumeDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Builds the enabled production collectors.
    ///
    /// Fails only if the control-plane endpoint cannot be parsed.
    pub fn from_settings(
        settings: &ScrapeSettings,
        stuck_mounts: Arc<StuckMountRegistry>,
    ) -> Result<Self, ApiError> {
        let api = HttpControlPlane::new(&settings.api_endpoint)?;
        debug!("Control plane endpoint: {}", api.base_url());
        let claims = Arc::new(ClaimLookup::new(
            Arc::new(api),
            settings.api_secrets_path.clone(),
        ));
        let discovery = Arc::new(VolumeDiscovery::new(
            settings.volumes_dir.clone(),
            settings.state_dir.clone(),
            Arc::new(LsListing),
            claims,
        ));

        let mut collectors: Vec<Arc<dyn Collector>> = Vec::new();
        for kind in enabled_collectors(&settings.disabled_collectors) {
            let collector: Arc<dyn Collector> = match kind {
                CollectorKind::DiskStats => Arc::new(DiskStatsCollector::new(
                    settings.diskstats_path.clone(),
                    settings.sys_block_path.clone(),
                )),
                CollectorKind::FileSystem => Arc::new(FileSystemCollector::new(
                    settings.volumes_dir.clone(),
                    settings.mounts_path.clone(),
                    settings.mounts_fallback_path.clone(),
                    GuardedStat::new(
                        stuck_mounts.clone(),
                        settings.stat_timeout,
                        Arc::new(statfs_usage),
                    ),
                )),
            };
            collectors.push(collector);
        }

        if collectors.is_empty() {
            warn!("All collectors are disabled, scrapes will be empty");
        }
        Ok(Self::new(collectors).with_discovery(discovery))
    }

    pub fn collector_names(&self) -> Vec<&'static str> {
        self.collectors.iter().map(|c| c.name()).collect()
    }

    /// Runs one scrape to completion.
    pub async fn scrape(&self) -> ScrapeOutput {
        let (sink, mut rx) = MetricSink::channel();
        let cycle = Arc::new(ScrapeCycle::new(self.discovery.clone()));
        let mut tasks = JoinSet::new();

        for collector in &self.collectors {
            tasks.spawn(run_collector(
                Arc::clone(collector),
                Arc::clone(&cycle),
                sink.clone(),
            ));
        }
        drop(sink);

        let mut reports = Vec::with_capacity(self.collectors.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!("Collector task failed: {}", e),
            }
        }

        let mut samples = Vec::new();
        while let Ok(sample) = rx.try_recv() {
            samples.push(sample);
        }

        ScrapeOutput { samples, reports }
    }
}

/// Runs one collector and emits its duration and success samples.
async fn run_collector(
    collector: Arc<dyn Collector>,
    cycle: Arc<ScrapeCycle>,
    sink: MetricSink,
) -> CollectorReport {
    let name = collector.name();
    let start = Instant::now();

    // a panic inside the collector surfaces as a JoinError here
    let inner_sink = sink.clone();
    let result = tokio::spawn(async move { collector.collect(&cycle, &inner_sink).await }).await;
    let duration = start.elapsed();

    let success = match result {
        Ok(Ok(())) => {
            debug!("Collector {} succeeded after {:?}", name, duration);
            true
        }
        Ok(Err(e)) => {
            error!("Collector {} failed after {:?}: {}", name, duration, e);
            false
        }
        Err(e) => {
            error!("Collector {} aborted after {:?}: {}", name, duration, e);
            false
        }
    };

    sink.emit(&SCRAPE_COLLECTOR_DURATION, &[name], duration.as_secs_f64());
    sink.emit(
        &SCRAPE_COLLECTOR_SUCCESS,
        &[name],
        if success { 1.0 } else { 0.0 },
    );

    CollectorReport {
        name,
        duration,
        success,
    }
}
