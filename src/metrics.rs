//! Prometheus metric catalog for the exporter.
//!
//! Every metric the exporter can emit is described once here. Collectors send
//! [`Sample`]s referring to these descriptions; [`render`] turns the samples of
//! one scrape into the text exposition format using a registry that lives
//! only for that scrape, so nothing carries over between scrapes.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tracing::warn;

/// Common prefix of every metric name.
pub const NAMESPACE: &str = "ondat";

/// Labels of the per-volume disk counters. `device` keeps volumes with an
/// unresolved claim apart.
pub const DISK_LABELS: &[&str] = &["device", "pvc", "namespace"];

/// Labels of the filesystem gauges.
pub const FS_LABELS: &[&str] = &["pvc", "namespace", "device", "fstype", "mountpoint"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Counter,
    Gauge,
}

/// Static description of a metric: name, help text, label names and type.
#[derive(Debug)]
pub struct MetricDesc {
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
    pub value_type: ValueType,
}

const fn counter(name: &'static str, help: &'static str) -> MetricDesc {
    MetricDesc {
        name,
        help,
        labels: DISK_LABELS,
        value_type: ValueType::Counter,
    }
}

const fn fs_gauge(name: &'static str, help: &'static str) -> MetricDesc {
    MetricDesc {
        name,
        help,
        labels: FS_LABELS,
        value_type: ValueType::Gauge,
    }
}

pub static DISK_INFO: MetricDesc = MetricDesc {
    name: "ondat_disk_info",
    help: "Info of Ondat volumes and devices.",
    labels: &["device", "pvc", "namespace", "major", "minor"],
    value_type: ValueType::Gauge,
};

/// Disk counters in /proc/diskstats column order.
pub static DISK_COUNTERS: [MetricDesc; 17] = [
    counter(
        "ondat_disk_reads_completed_total",
        "The total number of reads completed successfully.",
    ),
    counter(
        "ondat_disk_reads_merged_total",
        "The total number of reads merged.",
    ),
    counter(
        "ondat_disk_read_bytes_total",
        "The total number of bytes read successfully.",
    ),
    counter(
        "ondat_disk_read_time_seconds_total",
        "The total number of seconds spent by all reads.",
    ),
    counter(
        "ondat_disk_writes_completed_total",
        "The total number of writes completed successfully.",
    ),
    counter(
        "ondat_disk_writes_merged_total",
        "The number of writes merged.",
    ),
    counter(
        "ondat_disk_written_bytes_total",
        "The total number of bytes written successfully.",
    ),
    counter(
        "ondat_disk_write_time_seconds_total",
        "The total number of seconds spent by all writes.",
    ),
    MetricDesc {
        name: "ondat_disk_io_now",
        help: "The number of I/Os currently in progress.",
        labels: DISK_LABELS,
        value_type: ValueType::Gauge,
    },
    counter(
        "ondat_disk_io_time_seconds_total",
        "Total seconds spent doing I/Os.",
    ),
    counter(
        "ondat_disk_io_time_weighted_seconds_total",
        "The weighted number of seconds spent doing I/Os.",
    ),
    counter(
        "ondat_disk_discards_completed_total",
        "The total number of discards completed successfully.",
    ),
    counter(
        "ondat_disk_discards_merged_total",
        "The total number of discards merged.",
    ),
    counter(
        "ondat_disk_discarded_sectors_total",
        "The total number of sectors discarded successfully.",
    ),
    counter(
        "ondat_disk_discard_time_seconds_total",
        "The total number of seconds spent by all discards.",
    ),
    counter(
        "ondat_disk_flush_requests_total",
        "The total number of flush requests completed successfully.",
    ),
    counter(
        "ondat_disk_flush_requests_time_seconds_total",
        "The total number of seconds spent by all flush requests.",
    ),
];

pub static FS_SIZE_BYTES: MetricDesc =
    fs_gauge("ondat_filesystem_size_bytes", "Filesystem size in bytes.");
pub static FS_FREE_BYTES: MetricDesc =
    fs_gauge("ondat_filesystem_free_bytes", "Filesystem free space in bytes.");
pub static FS_AVAIL_BYTES: MetricDesc = fs_gauge(
    "ondat_filesystem_avail_bytes",
    "Filesystem space available to non-root users in bytes.",
);
pub static FS_FILES: MetricDesc = fs_gauge("ondat_filesystem_files", "Filesystem total file nodes.");
pub static FS_FILES_FREE: MetricDesc = fs_gauge(
    "ondat_filesystem_files_free",
    "Filesystem total free file nodes.",
);
pub static FS_READONLY: MetricDesc =
    fs_gauge("ondat_filesystem_readonly", "Filesystem read-only status.");
pub static FS_DEVICE_ERROR: MetricDesc = fs_gauge(
    "ondat_filesystem_device_error",
    "Whether an error occurred while getting statistics for the given device.",
);

pub static SCRAPE_COLLECTOR_DURATION: MetricDesc = MetricDesc {
    name: "ondat_scrape_collector_duration_seconds",
    help: "Duration of a collector scrape.",
    labels: &["collector"],
    value_type: ValueType::Gauge,
};

pub static SCRAPE_COLLECTOR_SUCCESS: MetricDesc = MetricDesc {
    name: "ondat_scrape_collector_success",
    help: "Whether a collector succeeded.",
    labels: &["collector"],
    value_type: ValueType::Gauge,
};

/// One value of a catalog metric, with label values in `desc.labels` order.
#[derive(Debug, Clone)]
pub struct Sample {
    pub desc: &'static MetricDesc,
    pub labels: Vec<String>,
    pub value: f64,
}

impl Sample {
    pub fn new(desc: &'static MetricDesc, labels: &[&str], value: f64) -> Self {
        Self {
            desc,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            value,
        }
    }

    /// Value of the label called `name`, if the metric has one.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.desc
            .labels
            .iter()
            .position(|l| *l == name)
            .and_then(|i| self.labels.get(i))
            .map(String::as_str)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("encoded metrics are not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Renders samples in the Prometheus text format.
///
/// Samples whose label count does not match their description are dropped
/// with a warning. A repeated label set keeps the last value and is logged.
pub fn render(samples: &[Sample]) -> Result<String, RenderError> {
    let registry = Registry::new();
    let mut gauges: HashMap<&'static str, GaugeVec> = HashMap::new();
    let mut counters: HashMap<&'static str, CounterVec> = HashMap::new();
    let mut series: HashSet<(&'static str, &[String])> = HashSet::new();

    for sample in samples {
        let desc = sample.desc;
        if sample.labels.len() != desc.labels.len() {
            warn!(
                "Dropping {} sample: expected {} labels, got {}",
                desc.name,
                desc.labels.len(),
                sample.labels.len()
            );
            continue;
        }
        if !series.insert((desc.name, sample.labels.as_slice())) {
            warn!(
                "Duplicate {} series {:?}, keeping the last value",
                desc.name, sample.labels
            );
        }
        let values: Vec<&str> = sample.labels.iter().map(String::as_str).collect();

        match desc.value_type {
            ValueType::Gauge => {
                if !gauges.contains_key(desc.name) {
                    let vec = GaugeVec::new(Opts::new(desc.name, desc.help), desc.labels)?;
                    registry.register(Box::new(vec.clone()))?;
                    gauges.insert(desc.name, vec);
                }
                if let Some(vec) = gauges.get(desc.name) {
                    vec.with_label_values(values.as_slice()).set(sample.value);
                }
            }
            ValueType::Counter => {
                if !(sample.value >= 0.0) {
                    warn!("Dropping {} sample with value {}", desc.name, sample.value);
                    continue;
                }
                if !counters.contains_key(desc.name) {
                    let vec = CounterVec::new(Opts::new(desc.name, desc.help), desc.labels)?;
                    registry.register(Box::new(vec.clone()))?;
                    counters.insert(desc.name, vec);
                }
                if let Some(vec) = counters.get(desc.name) {
                    let counter = vec.with_label_values(values.as_slice());
                    counter.reset();
                    counter.inc_by(sample.value);
                }
            }
        }
    }

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names_are_unique() {
        let mut names: Vec<&str> = DISK_COUNTERS.iter().map(|d| d.name).collect();
        names.extend([
            DISK_INFO.name,
            FS_SIZE_BYTES.name,
            FS_FREE_BYTES.name,
            FS_AVAIL_BYTES.name,
            FS_FILES.name,
            FS_FILES_FREE.name,
            FS_READONLY.name,
            FS_DEVICE_ERROR.name,
            SCRAPE_COLLECTOR_DURATION.name,
            SCRAPE_COLLECTOR_SUCCESS.name,
        ]);
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
        assert!(names.iter().all(|n| n.starts_with(NAMESPACE)));
    }

    /// Finds the exposition line for `name` carrying every `label="value"` pair.
    fn find_line<'a>(text: &'a str, name: &str, pairs: &[&str]) -> Option<&'a str> {
        text.lines().find(|line| {
            line.starts_with(&format!("{name}{{")) && pairs.iter().all(|p| line.contains(p))
        })
    }

    #[test]
    fn test_render_gauge_and_counter() {
        let samples = vec![
            Sample::new(&DISK_INFO, &["sdc", "data", "default", "8", "32"], 1.0),
            Sample::new(&DISK_COUNTERS[2], &["sdc", "data", "default"], 4096.0),
            Sample::new(&SCRAPE_COLLECTOR_SUCCESS, &["diskstats"], 1.0),
        ];
        let text = render(&samples).unwrap();

        assert!(text.contains("# TYPE ondat_disk_read_bytes_total counter"));
        assert!(text.contains("# TYPE ondat_disk_info gauge"));

        let line = find_line(
            &text,
            "ondat_disk_read_bytes_total",
            &[r#"device="sdc""#, r#"pvc="data""#, r#"namespace="default""#],
        )
        .expect("counter line");
        assert!(line.ends_with(" 4096"));

        let line = find_line(
            &text,
            "ondat_disk_info",
            &[r#"device="sdc""#, r#"major="8""#, r#"minor="32""#],
        )
        .expect("info line");
        assert!(line.ends_with(" 1"));

        assert!(find_line(&text, "ondat_scrape_collector_success", &[r#"collector="diskstats""#]).is_some());
    }

    #[test]
    fn test_repeated_counter_keeps_last_value() {
        let samples = vec![
            Sample::new(&DISK_COUNTERS[0], &["sdc", "data", "default"], 10.0),
            Sample::new(&DISK_COUNTERS[0], &["sdc", "data", "default"], 3.0),
        ];
        let text = render(&samples).unwrap();
        let line = find_line(&text, "ondat_disk_reads_completed_total", &[r#"pvc="data""#]).unwrap();
        assert!(line.ends_with(" 3"));
    }

    #[test]
    fn test_unresolved_volumes_stay_separate() {
        let samples = vec![
            Sample::new(&DISK_COUNTERS[0], &["sdc", "", ""], 100.0),
            Sample::new(&DISK_COUNTERS[0], &["sdd", "", ""], 7.0),
        ];
        let text = render(&samples).unwrap();

        let sdc = find_line(&text, "ondat_disk_reads_completed_total", &[r#"device="sdc""#]).unwrap();
        let sdd = find_line(&text, "ondat_disk_reads_completed_total", &[r#"device="sdd""#]).unwrap();
        assert!(sdc.ends_with(" 100"));
        assert!(sdd.ends_with(" 7"));
    }

    #[test]
    fn test_mismatched_labels_are_dropped() {
        let samples = vec![Sample::new(&DISK_INFO, &["sdc"], 1.0)];
        let text = render(&samples).unwrap();
        assert!(!text.contains("ondat_disk_info"));
    }

    #[test]
    fn test_empty_scrape() {
        assert_eq!(render(&[]).unwrap(), "");
    }

    #[test]
    fn test_sample_label_lookup() {
        let sample = Sample::new(&SCRAPE_COLLECTOR_DURATION, &["filesystem"], 0.5);
        assert_eq!(sample.label("collector"), Some("filesystem"));
        assert_eq!(sample.label("pvc"), None);
    }
}
