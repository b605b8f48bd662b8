//! Readers for the kernel pseudo-files the exporter depends on.
//!
//! Everything in here is synchronous and side-effect free apart from the
//! file reads themselves: `/proc/diskstats`, the mount table and the
//! per-device attributes under `/sys/block`.

pub mod block;
pub mod diskstats;
pub mod mounts;

use std::path::PathBuf;

pub use block::{logical_block_size, DEFAULT_LOGICAL_BLOCK_SIZE};
pub use diskstats::{parse_diskstats, read_diskstats, CounterRecord};
pub use mounts::{parse_mounts, read_mounts, MountEntry};

/// Errors raised while reading kernel pseudo-files.
#[derive(Debug, thiserror::Error)]
pub enum ProcfsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value {value:?} in {path}")]
    InvalidValue { path: PathBuf, value: String },
}

impl ProcfsError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProcfsError::Read {
            path: path.into(),
            source,
        }
    }

    /// Returns true when the underlying read failed because the file is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProcfsError::Read { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}
