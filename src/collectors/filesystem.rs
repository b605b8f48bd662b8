//! Filesystem statistics collector.
//!
//! Reports usage of the filesystems mounted from Ondat volume devices. Every
//! stat call goes through [`GuardedStat`], so a hung mount costs at most one
//! deadline and is skipped afterwards until its stat call returns.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use super::{Collector, CollectorError, CollectorKind, MetricSink, ScrapeCycle};
use crate::metrics::{
    FS_AVAIL_BYTES, FS_DEVICE_ERROR, FS_FILES, FS_FILES_FREE, FS_FREE_BYTES, FS_READONLY,
    FS_SIZE_BYTES,
};
use crate::procfs::{read_mounts, MountEntry};
use crate::stuck_mounts::{GuardedStat, StatOutcome};
use crate::volumes::find_by_device_path;

pub struct FileSystemCollector {
    volumes_dir: PathBuf,
    mounts_path: PathBuf,
    mounts_fallback_path: PathBuf,
    guard: GuardedStat,
}

impl FileSystemCollector {
    pub fn new(
        volumes_dir: impl Into<PathBuf>,
        mounts_path: impl Into<PathBuf>,
        mounts_fallback_path: impl Into<PathBuf>,
        guard: GuardedStat,
    ) -> Self {
        Self {
            volumes_dir: volumes_dir.into(),
            mounts_path: mounts_path.into(),
            mounts_fallback_path: mounts_fallback_path.into(),
            guard,
        }
    }
}

/// Keeps the mounts whose device lives in the volumes directory.
pub fn volume_mounts(mounts: Vec<MountEntry>, volumes_dir: &Path) -> Vec<MountEntry> {
    mounts
        .into_iter()
        .filter(|m| Path::new(&m.device).starts_with(volumes_dir))
        .collect()
}

#[async_trait]
impl Collector for FileSystemCollector {
    fn name(&self) -> &'static str {
        CollectorKind::FileSystem.name()
    }

    #[instrument(skip_all, fields(collector = "filesystem"))]
    async fn collect(&self, cycle: &ScrapeCycle, sink: &MetricSink) -> Result<(), CollectorError> {
        let volumes = cycle.volumes().await?;
        let mounts = read_mounts(&self.mounts_path, &self.mounts_fallback_path)?;
        let mounts = volume_mounts(mounts, &self.volumes_dir);
        debug!("Found {} volume mount(s)", mounts.len());

        for mount in &mounts {
            let (pvc, namespace) = match find_by_device_path(&volumes, &mount.device) {
                Some(vol) => (vol.claim_name.as_str(), vol.claim_namespace.as_str()),
                None => ("", ""),
            };
            let labels = [
                pvc,
                namespace,
                mount.device.as_str(),
                mount.fs_type.as_str(),
                mount.mount_point.as_str(),
            ];

            let usage = match self.guard.stat(&mount.mount_point).await {
                StatOutcome::Ok(usage) => usage,
                StatOutcome::Failed(e) => {
                    debug!("Error on statfs() system call for {}: {}", mount.mount_point, e);
                    sink.emit(&FS_DEVICE_ERROR, &labels, 1.0);
                    continue;
                }
                StatOutcome::Skipped | StatOutcome::TimedOut => {
                    sink.emit(&FS_DEVICE_ERROR, &labels, 1.0);
                    continue;
                }
            };

            sink.emit(&FS_SIZE_BYTES, &labels, usage.size_bytes());
            sink.emit(&FS_FREE_BYTES, &labels, usage.free_bytes());
            sink.emit(&FS_AVAIL_BYTES, &labels, usage.avail_bytes());
            sink.emit(&FS_FILES, &labels, usage.files as f64);
            sink.emit(&FS_FILES_FREE, &labels, usage.files_free as f64);
            sink.emit(
                &FS_READONLY,
                &labels,
                if mount.is_read_only() { 1.0 } else { 0.0 },
            );
            sink.emit(&FS_DEVICE_ERROR, &labels, 0.0);
        }

        Ok(())
    }
}
