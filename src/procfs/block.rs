//! Per-device block attributes under /sys/block.

use std::fs;
use std::path::Path;

use super::ProcfsError;

/// Sector size assumed when the device does not expose its logical block size.
pub const DEFAULT_LOGICAL_BLOCK_SIZE: u64 = 512;

/// Reads `<sys_block>/<device>/queue/logical_block_size`.
pub fn logical_block_size(sys_block: &Path, device: &str) -> Result<u64, ProcfsError> {
    let path = sys_block
        .join(device)
        .join("queue")
        .join("logical_block_size");
    let content = fs::read_to_string(&path).map_err(|e| ProcfsError::read(&path, e))?;

    let value = content.trim();
    value.parse().map_err(|_| ProcfsError::InvalidValue {
        path,
        value: value.to_string(),
    })
}
