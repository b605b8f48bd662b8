//! Block device I/O counters from /proc/diskstats.
//!
//! Each line carries `major minor name` followed by 11 to 17 counters,
//! depending on the kernel:
//!
//! - 14 fields: up to 4.17 (reads, writes, in-flight and timing columns)
//! - 18 fields: 4.18+ adds discard statistics
//! - 20 fields: 5.5+ adds flush statistics
//!
//! See <https://www.kernel.org/doc/Documentation/ABI/testing/procfs-diskstats>.

use std::fs;
use std::path::Path;

use super::ProcfsError;

/// Fields every supported kernel reports (identity + 11 counters).
pub const MIN_FIELDS: usize = 14;

/// Fields reported by the newest known layout.
pub const MAX_FIELDS: usize = 20;

/// Leading identity columns: major, minor and device name.
pub const IDENTITY_FIELDS: usize = 3;

/// Number of counter columns in the widest layout.
pub const MAX_COUNTERS: usize = MAX_FIELDS - IDENTITY_FIELDS;

/// One parsed /proc/diskstats line.
///
/// Counters are kept in column order in a fixed array. Only the first
/// `field_count - 3` entries were present in the source line; the optional
/// accessors return `None` for anything beyond that instead of zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRecord {
    pub major: u32,
    pub minor: u32,
    pub device_name: String,
    field_count: usize,
    counters: [u64; MAX_COUNTERS],
}

impl CounterRecord {
    /// Total number of fields observed on the line, identity columns included.
    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// The counters actually present on the line, in kernel column order.
    pub fn counters(&self) -> &[u64] {
        &self.counters[..self.field_count - IDENTITY_FIELDS]
    }

    fn optional(&self, index: usize) -> Option<u64> {
        self.counters().get(index).copied()
    }

    pub fn read_ios(&self) -> u64 {
        self.counters[0]
    }

    pub fn read_merges(&self) -> u64 {
        self.counters[1]
    }

    pub fn read_sectors(&self) -> u64 {
        self.counters[2]
    }

    pub fn read_ticks_ms(&self) -> u64 {
        self.counters[3]
    }

    pub fn write_ios(&self) -> u64 {
        self.counters[4]
    }

    pub fn write_merges(&self) -> u64 {
        self.counters[5]
    }

    pub fn write_sectors(&self) -> u64 {
        self.counters[6]
    }

    pub fn write_ticks_ms(&self) -> u64 {
        self.counters[7]
    }

    pub fn ios_in_progress(&self) -> u64 {
        self.counters[8]
    }

    pub fn io_ticks_ms(&self) -> u64 {
        self.counters[9]
    }

    pub fn weighted_io_ticks_ms(&self) -> u64 {
        self.counters[10]
    }

    pub fn discard_ios(&self) -> Option<u64> {
        self.optional(11)
    }

    pub fn discard_merges(&self) -> Option<u64> {
        self.optional(12)
    }

    pub fn discard_sectors(&self) -> Option<u64> {
        self.optional(13)
    }

    pub fn discard_ticks_ms(&self) -> Option<u64> {
        self.optional(14)
    }

    pub fn flush_requests(&self) -> Option<u64> {
        self.optional(15)
    }

    pub fn flush_ticks_ms(&self) -> Option<u64> {
        self.optional(16)
    }
}

/// Parses a single diskstats line.
///
/// Fields are consumed left to right until the first one that does not fit
/// the layout. Returns `None` when fewer than [`MIN_FIELDS`] were consumed.
pub fn parse_line(line: &str) -> Option<CounterRecord> {
    let mut parts = line.split_whitespace();

    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next()?.parse().ok()?;
    let device_name = parts.next()?.to_string();

    let mut counters = [0u64; MAX_COUNTERS];
    let mut observed = 0;
    for (slot, part) in counters.iter_mut().zip(parts) {
        match part.parse() {
            Ok(value) => {
                *slot = value;
                observed += 1;
            }
            Err(_) => break,
        }
    }

    let field_count = IDENTITY_FIELDS + observed;
    if field_count < MIN_FIELDS {
        return None;
    }

    Some(CounterRecord {
        major,
        minor,
        device_name,
        field_count,
        counters,
    })
}

/// Parses the full content of /proc/diskstats, keeping input order.
///
/// Lines that do not carry at least [`MIN_FIELDS`] well-formed fields are
/// skipped.
pub fn parse_diskstats(content: &str) -> Vec<CounterRecord> {
    content.lines().filter_map(parse_line).collect()
}

/// Reads and parses a diskstats file.
pub fn read_diskstats(path: &Path) -> Result<Vec<CounterRecord>, ProcfsError> {
    let content = fs::read_to_string(path).map_err(|e| ProcfsError::read(path, e))?;
    Ok(parse_diskstats(&content))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KERNEL_4_14: &str = "   8      32 sdc 1045 12 43162 570 2114 1031 36472 2730 0 1990 3300";
    const KERNEL_4_18: &str = "   8      48 sdd 1045 12 43162 570 2114 1031 36472 2730 0 1990 3300 7 1 56 3";
    const KERNEL_5_5: &str =
        "   8      32 sdc 1045 12 43162 570 2114 1031 36472 2730 0 1990 3300 7 1 56 3 91 40";

    #[test]
    fn test_parse_minimal_layout() {
        let record = parse_line(KERNEL_4_14).expect("14 fields must parse");
        assert_eq!(record.major, 8);
        assert_eq!(record.minor, 32);
        assert_eq!(record.device_name, "sdc");
        assert_eq!(record.field_count(), 14);
        assert_eq!(record.counters().len(), 11);
        assert_eq!(record.read_sectors(), 43162);
        assert_eq!(record.weighted_io_ticks_ms(), 3300);
        assert_eq!(record.discard_ios(), None);
        assert_eq!(record.flush_ticks_ms(), None);
    }

    #[test]
    fn test_parse_discard_layout() {
        let record = parse_line(KERNEL_4_18).unwrap();
        assert_eq!(record.field_count(), 18);
        assert_eq!(record.discard_ios(), Some(7));
        assert_eq!(record.discard_ticks_ms(), Some(3));
        assert_eq!(record.flush_requests(), None);
    }

    #[test]
    fn test_parse_full_layout() {
        let record = parse_line(KERNEL_5_5).unwrap();
        assert_eq!(record.field_count(), 20);
        assert_eq!(record.counters().len(), 17);
        assert_eq!(record.flush_requests(), Some(91));
        assert_eq!(record.flush_ticks_ms(), Some(40));
    }

    #[test]
    fn test_short_lines_are_skipped() {
        let content = format!(
            "8 0 sda 1 2 3\n{}\n   7 0 loop0 1 2 3 4 5 6 7 8 9 10\n",
            KERNEL_5_5
        );
        let records = parse_diskstats(&content);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].device_name, "sdc");
    }

    #[test]
    fn test_extra_columns_are_ignored() {
        let line = format!("{} 99 100", KERNEL_5_5);
        let record = parse_line(&line).unwrap();
        assert_eq!(record.field_count(), MAX_FIELDS);
    }

    #[test]
    fn test_counting_stops_at_garbage() {
        // Column 16 is not a number: the record keeps the 15 fields before it.
        let line = "8 32 sdc 1 2 3 4 5 6 7 8 9 10 11 12 x 14 15 16 17";
        let record = parse_line(line).unwrap();
        assert_eq!(record.field_count(), 15);
        assert_eq!(record.discard_ios(), Some(12));
        assert_eq!(record.discard_merges(), None);
    }

    #[test]
    fn test_order_is_preserved() {
        let content = format!("{}\n{}\n", KERNEL_5_5, KERNEL_4_18);
        let names: Vec<_> = parse_diskstats(&content)
            .into_iter()
            .map(|r| r.device_name)
            .collect();
        assert_eq!(names, vec!["sdc", "sdd"]);
    }

    #[test]
    fn test_read_missing_file_is_an_error() {
        let err = read_diskstats(Path::new("/nonexistent/diskstats")).unwrap_err();
        assert!(err.is_not_found());
    }
}
