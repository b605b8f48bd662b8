//! Enumerates the Ondat block devices on this node.
//!
//! The volumes directory holds one block device per attached volume, named
//! `v.<uuid>`, next to regular presentation files (`d.<uuid>`). The device
//! numbers are taken from `ls -l`, which prints them as `MAJOR, MINOR` in
//! place of the file size.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use super::{Volume, VolumeError};

/// File name prefix of volume block devices.
pub const VOLUME_PREFIX: &str = "v.";

/// `brw-rw---- 1 root disk 8, 32 Feb 25 16:07 v.<uuid>`
static BLOCK_DEVICE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^b\S*\s+\S+\s+\S+\s+\S+\s+(\d+),\s*(\d+)\s+(?:.*\s)?v\.(\S+)\s*$")
        .expect("block device pattern is valid")
});

/// Produces the long-format listing of a directory.
#[async_trait]
pub trait DeviceListing: Send + Sync {
    async fn list(&self, dir: &Path) -> Result<String, VolumeError>;
}

/// Lists the directory with `ls -l`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LsListing;

#[async_trait]
impl DeviceListing for LsListing {
    async fn list(&self, dir: &Path) -> Result<String, VolumeError> {
        let output = Command::new("ls")
            .arg("-l")
            .arg(dir)
            .env("LC_ALL", "C")
            .output()
            .await
            .map_err(|e| VolumeError::ListingFailed {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(VolumeError::ListingFailed {
                path: dir.to_path_buf(),
                reason: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Checks that `path` exists and is a directory.
pub fn validate_dir(path: &Path) -> Result<(), VolumeError> {
    let metadata = fs::metadata(path).map_err(|e| VolumeError::DirectoryUnreadable {
        path: path.to_path_buf(),
        source: e,
    })?;

    if !metadata.is_dir() {
        return Err(VolumeError::NotADirectory(path.to_path_buf()));
    }
    Ok(())
}

/// Parses `ls -l` output into volumes, one per block device line.
///
/// Non block device lines (the `total` header, presentations) and lines
/// that do not match the expected columns are skipped.
pub fn parse_listing(output: &str) -> Vec<Volume> {
    let mut volumes = Vec::new();

    for line in output.lines() {
        if !line.starts_with('b') {
            continue;
        }

        let Some(caps) = BLOCK_DEVICE_LINE.captures(line) else {
            debug!("Skipping unparsable device line: {:?}", line);
            continue;
        };

        let (Ok(major), Ok(minor)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) else {
            debug!("Skipping device line with invalid numbers: {:?}", line);
            continue;
        };

        volumes.push(Volume::new(major, minor, &caps[3]));
    }

    volumes
}
