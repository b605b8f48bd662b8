//! Collectors module for volume metrics.
//!
//! Collectors read the volumes of the current scrape from a shared
//! [`ScrapeCycle`] and stream [`Sample`]s into a [`MetricSink`]. The
//! orchestrator in [`crate::scrape`] only sees the [`Collector`] trait.

pub mod diskstats;
pub mod filesystem;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, OnceCell};
use tracing::warn;

use crate::metrics::{MetricDesc, Sample};
use crate::procfs::ProcfsError;
use crate::volumes::{Volume, VolumeDiscovery, VolumeError};

pub use diskstats::DiskStatsCollector;
pub use filesystem::FileSystemCollector;

/// Error that fails a collector for the current scrape.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// Shared by every collector of the scrape that hit it.
    #[error("volume discovery failed: {0}")]
    Volumes(Arc<VolumeError>),

    #[error("no volume discovery configured for this scrape")]
    NoDiscovery,

    #[error(transparent)]
    Procfs(#[from] ProcfsError),
}

impl From<VolumeError> for CollectorError {
    fn from(e: VolumeError) -> Self {
        CollectorError::Volumes(Arc::new(e))
    }
}

/// State of one scrape, shared by all of its collectors.
///
/// The volume set is discovered by the first collector that asks for it and
/// handed to every other one, so identity resolution and any control-plane
/// fallback run at most once per scrape. A failed discovery is shared too.
#[derive(Default)]
pub struct ScrapeCycle {
    discovery: Option<Arc<VolumeDiscovery>>,
    volumes: OnceCell<Result<Arc<[Volume]>, Arc<VolumeError>>>,
}

impl ScrapeCycle {
    pub fn new(discovery: Option<Arc<VolumeDiscovery>>) -> Self {
        Self {
            discovery,
            volumes: OnceCell::new(),
        }
    }

    pub fn volumes_dir(&self) -> Option<&Path> {
        self.discovery.as_deref().map(VolumeDiscovery::volumes_dir)
    }

    /// The volumes of this scrape, discovering them on first use.
    pub async fn volumes(&self) -> Result<Arc<[Volume]>, CollectorError> {
        let discovery = self.discovery.as_ref().ok_or(CollectorError::NoDiscovery)?;
        let discovered = self
            .volumes
            .get_or_init(|| async {
                discovery
                    .discover()
                    .await
                    .map(Arc::from)
                    .map_err(Arc::new)
            })
            .await;

        match discovered {
            Ok(volumes) => Ok(Arc::clone(volumes)),
            Err(e) => Err(CollectorError::Volumes(Arc::clone(e))),
        }
    }
}

/// A source of samples run once per scrape.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Value of the `collector` label on the scrape samples.
    fn name(&self) -> &'static str;

    async fn collect(&self, cycle: &ScrapeCycle, sink: &MetricSink) -> Result<(), CollectorError>;
}

/// Output side of a scrape. Cloned into every collector task.
#[derive(Debug, Clone)]
pub struct MetricSink {
    tx: mpsc::UnboundedSender<Sample>,
}

impl MetricSink {
    pub fn new(tx: mpsc::UnboundedSender<Sample>) -> Self {
        Self { tx }
    }

    /// A sink together with the receiver draining it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Sample>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, desc: &'static MetricDesc, labels: &[&str], value: f64) {
        self.send(Sample::new(desc, labels, value));
    }

    pub fn send(&self, sample: Sample) {
        // the receiver only goes away once the scrape is over
        let _ = self.tx.send(sample);
    }
}

/// The collectors this exporter knows about, in scrape order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectorKind {
    DiskStats,
    FileSystem,
}

impl CollectorKind {
    pub const ALL: [CollectorKind; 2] = [CollectorKind::DiskStats, CollectorKind::FileSystem];

    pub fn name(self) -> &'static str {
        match self {
            CollectorKind::DiskStats => "diskstats",
            CollectorKind::FileSystem => "filesystem",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl std::fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// All collectors minus the disabled ones. Unknown names are ignored.
pub fn enabled_collectors<S: AsRef<str>>(disabled: &[S]) -> Vec<CollectorKind> {
    for name in disabled {
        if CollectorKind::from_name(name.as_ref()).is_none() {
            warn!("Ignoring unknown collector '{}'", name.as_ref());
        }
    }

    CollectorKind::ALL
        .into_iter()
        .filter(|kind| !disabled.iter().any(|d| d.as_ref() == kind.name()))
        .collect()
}
