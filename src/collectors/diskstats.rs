//! Disk I/O statistics collector.
//!
//! Joins the kernel's per-device counters with the volumes of the current
//! scrape by major/minor number and exposes them per volume device, labeled
//! with the owning PVC.

use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, instrument, warn};

use super::{Collector, CollectorError, CollectorKind, MetricSink, ScrapeCycle};
use crate::metrics::{DISK_COUNTERS, DISK_INFO};
use crate::procfs::{logical_block_size, read_diskstats, CounterRecord, DEFAULT_LOGICAL_BLOCK_SIZE};
use crate::volumes::Volume;

/// Counter columns holding sectors, converted to bytes.
const SECTOR_COLUMNS: [usize; 2] = [2, 6];

/// Counter columns holding milliseconds, converted to seconds.
const MILLISECOND_COLUMNS: [usize; 6] = [3, 7, 9, 10, 14, 16];

const SECONDS_PER_MS: f64 = 0.001;

pub struct DiskStatsCollector {
    diskstats_path: PathBuf,
    sys_block_path: PathBuf,
}

impl DiskStatsCollector {
    pub fn new(diskstats_path: impl Into<PathBuf>, sys_block_path: impl Into<PathBuf>) -> Self {
        Self {
            diskstats_path: diskstats_path.into(),
            sys_block_path: sys_block_path.into(),
        }
    }

    fn block_size(&self, device: &str) -> u64 {
        match logical_block_size(&self.sys_block_path, device) {
            Ok(size) => size,
            Err(e) => {
                warn!(
                    "Error reading logical block size of {}, using {} bytes: {}",
                    device, DEFAULT_LOGICAL_BLOCK_SIZE, e
                );
                DEFAULT_LOGICAL_BLOCK_SIZE
            }
        }
    }

    fn emit_record(&self, sink: &MetricSink, vol: &Volume, record: &CounterRecord) {
        let major = vol.major.to_string();
        let minor = vol.minor.to_string();
        sink.emit(
            &DISK_INFO,
            &[
                &record.device_name,
                &vol.claim_name,
                &vol.claim_namespace,
                &major,
                &minor,
            ],
            1.0,
        );

        let block_size = self.block_size(&record.device_name);
        let labels = [
            record.device_name.as_str(),
            vol.claim_name.as_str(),
            vol.claim_namespace.as_str(),
        ];
        for (index, (desc, raw)) in DISK_COUNTERS.iter().zip(record.counters()).enumerate() {
            sink.emit(desc, &labels, scale_counter(index, *raw, block_size));
        }
    }
}

/// Converts the raw value of counter column `index` into its exported unit.
pub fn scale_counter(index: usize, raw: u64, block_size: u64) -> f64 {
    if SECTOR_COLUMNS.contains(&index) {
        raw as f64 * block_size as f64
    } else if MILLISECOND_COLUMNS.contains(&index) {
        raw as f64 * SECONDS_PER_MS
    } else {
        raw as f64
    }
}

#[async_trait]
impl Collector for DiskStatsCollector {
    fn name(&self) -> &'static str {
        CollectorKind::DiskStats.name()
    }

    #[instrument(skip_all, fields(collector = "diskstats"))]
    async fn collect(&self, cycle: &ScrapeCycle, sink: &MetricSink) -> Result<(), CollectorError> {
        let volumes = cycle.volumes().await?;
        if volumes.is_empty() {
            debug!("No volumes on this node");
            return Ok(());
        }

        let by_device: HashMap<(u32, u32), &Volume> =
            volumes.iter().map(|v| ((v.major, v.minor), v)).collect();

        let records = read_diskstats(&self.diskstats_path)?;
        let mut matched = 0;
        for record in &records {
            if let Some(vol) = by_device.get(&(record.major, record.minor)) {
                self.emit_record(sink, vol, record);
                matched += 1;
            }
        }

        if matched < volumes.len() {
            debug!(
                "{} of {} volume(s) have no kernel counters",
                volumes.len() - matched,
                volumes.len()
            );
        }
        Ok(())
    }
}
