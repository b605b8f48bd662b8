//! Node-local volume state files.
//!
//! The data plane keeps one JSON document per volume it hosts (master or
//! replica) under the state directory, named after the device: `v.<uuid>`.
//! Only the fields needed to identify the owning PVC are decoded.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::{VolumeError, VOLUME_PREFIX};

/// Label holding the PVC name, set by the CSI provisioner.
pub const PVC_NAME_LABEL: &str = "csi.storage.k8s.io/pvc/name";

/// Label holding the PVC namespace, set by the CSI provisioner.
pub const PVC_NAMESPACE_LABEL: &str = "csi.storage.k8s.io/pvc/namespace";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VolumeState {
    #[serde(default)]
    pub master: Master,
    #[serde(default)]
    pub labels: StateLabels,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Master {
    /// Control Plane volume ID.
    #[serde(rename = "volumeID", default)]
    pub volume_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateLabels {
    #[serde(rename = "csi.storage.k8s.io/pvc/name", default)]
    pub pvc: String,
    #[serde(rename = "csi.storage.k8s.io/pvc/namespace", default)]
    pub pvc_namespace: String,
}

/// Path of the state file for a volume ID.
pub fn state_file_path(state_dir: &Path, internal_id: &str) -> PathBuf {
    state_dir.join(format!("{VOLUME_PREFIX}{internal_id}"))
}

/// Reads and decodes the state file of a volume.
pub fn read_volume_state(state_dir: &Path, internal_id: &str) -> Result<VolumeState, VolumeError> {
    let path = state_file_path(state_dir, internal_id);
    let content = fs::read(&path).map_err(|e| VolumeError::StateRead {
        path: path.clone(),
        source: e,
    })?;

    serde_json::from_slice(&content).map_err(|e| VolumeError::StateParse { path, source: e })
}
