//! Mount table parsing.
//!
//! Reads `/proc/1/mounts` (the host's view when running with `hostPID`) and
//! falls back to `/proc/mounts` when the former is hidden, e.g. by `hidepid`.

use std::fs;
use std::path::Path;
use tracing::debug;

use super::ProcfsError;

/// One line of the mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
    /// Raw comma-separated mount options.
    pub options: String,
}

impl MountEntry {
    /// Whether the filesystem is mounted with the `ro` option.
    pub fn is_read_only(&self) -> bool {
        self.options.split(',').any(|opt| opt == "ro")
    }
}

/// Decodes the octal escapes fstab(5) uses for space and tab.
fn decode_mount_point(raw: &str) -> String {
    raw.replace("\\040", " ").replace("\\011", "\t")
}

/// Parses mount table content. Lines with fewer than four fields are skipped.
pub fn parse_mounts(content: &str) -> Vec<MountEntry> {
    let mut mounts = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            if !line.trim().is_empty() {
                debug!("Skipping malformed mount line: {:?}", line);
            }
            continue;
        }

        mounts.push(MountEntry {
            device: parts[0].to_string(),
            mount_point: decode_mount_point(parts[1]),
            fs_type: parts[2].to_string(),
            options: parts[3].to_string(),
        });
    }

    mounts
}

/// Reads the mount table from `primary`, or from `fallback` if `primary` does not exist.
pub fn read_mounts(primary: &Path, fallback: &Path) -> Result<Vec<MountEntry>, ProcfsError> {
    let content = match fs::read_to_string(primary) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(
                "Reading {} failed, falling back to {}: {}",
                primary.display(),
                fallback.display(),
                e
            );
            fs::read_to_string(fallback).map_err(|e| ProcfsError::read(fallback, e))?
        }
        Err(e) => return Err(ProcfsError::read(primary, e)),
    };

    Ok(parse_mounts(&content))
}
