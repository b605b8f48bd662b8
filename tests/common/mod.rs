//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use ondat_metrics_exporter::api::{ApiError, ApiVolume, ClaimLookup, ControlPlane, Namespace, Session};
use ondat_metrics_exporter::volumes::state::{PVC_NAMESPACE_LABEL, PVC_NAME_LABEL};
use ondat_metrics_exporter::volumes::{DeviceListing, VolumeDiscovery, VolumeError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Control plane serving one namespace and counting every call.
#[derive(Default)]
pub struct CountingControlPlane {
    pub volumes: Vec<ApiVolume>,
    pub fail_login: bool,
    pub logins: AtomicUsize,
    pub namespace_listings: AtomicUsize,
    pub volume_listings: AtomicUsize,
}

impl CountingControlPlane {
    pub fn with_claims(claims: &[(&str, &str, &str)]) -> Self {
        let volumes = claims
            .iter()
            .map(|(id, pvc, namespace)| {
                let mut labels = HashMap::new();
                labels.insert(PVC_NAME_LABEL.to_string(), pvc.to_string());
                labels.insert(PVC_NAMESPACE_LABEL.to_string(), namespace.to_string());
                ApiVolume {
                    id: id.to_string(),
                    name: format!("pvc-{id}"),
                    labels,
                }
            })
            .collect();
        Self {
            volumes,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_login: true,
            ..Default::default()
        }
    }

    pub fn namespace_listings(&self) -> usize {
        self.namespace_listings.load(Ordering::SeqCst)
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControlPlane for CountingControlPlane {
    async fn authenticate(&self, _: &str, _: &str) -> Result<Session, ApiError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if self.fail_login {
            return Err(ApiError::Status {
                url: "http://storageos:5705/v2/auth/login".into(),
                status: 401,
            });
        }
        Ok(Session {
            token: "token".into(),
        })
    }

    async fn list_namespaces(&self, _: &Session) -> Result<Vec<Namespace>, ApiError> {
        self.namespace_listings.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Namespace {
            id: "ns-default".into(),
            name: "default".into(),
        }])
    }

    async fn list_volumes(&self, _: &Session, _: &str) -> Result<Vec<ApiVolume>, ApiError> {
        self.volume_listings.fetch_add(1, Ordering::SeqCst);
        Ok(self.volumes.clone())
    }
}

/// Listing that returns canned `ls -l` output.
pub struct FixedListing(pub String);

#[async_trait]
impl DeviceListing for FixedListing {
    async fn list(&self, _: &Path) -> Result<String, VolumeError> {
        Ok(self.0.clone())
    }
}

/// A fake node: volumes, state and secrets directories plus kernel files.
pub struct Node {
    pub root: TempDir,
}

impl Node {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        for dir in ["volumes", "state", "secrets", "sys/block"] {
            fs::create_dir_all(root.path().join(dir)).unwrap();
        }
        fs::write(root.path().join("secrets/username"), "storageos\n").unwrap();
        fs::write(root.path().join("secrets/password"), "storageos\n").unwrap();
        fs::write(root.path().join("diskstats"), "").unwrap();
        fs::write(root.path().join("mounts"), "").unwrap();
        Self { root }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    pub fn volumes_dir(&self) -> PathBuf {
        self.path("volumes")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.path("state")
    }

    pub fn write_state(&self, id: &str, pvc: &str, namespace: &str) {
        fs::write(
            self.state_dir().join(format!("v.{id}")),
            format!(
                r#"{{"master":{{"volumeID":"{id}"}},"labels":{{"{PVC_NAME_LABEL}":"{pvc}","{PVC_NAMESPACE_LABEL}":"{namespace}"}}}}"#
            ),
        )
        .unwrap();
    }

    pub fn write_block_size(&self, device: &str, size: u64) {
        let dir = self.path(&format!("sys/block/{device}/queue"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("logical_block_size"), format!("{size}\n")).unwrap();
    }

    pub fn write(&self, rel: &str, content: &str) {
        fs::write(self.path(rel), content).unwrap();
    }

    pub fn claims(&self, api: Arc<dyn ControlPlane>) -> Arc<ClaimLookup> {
        Arc::new(ClaimLookup::new(api, self.path("secrets")))
    }

    pub fn discovery(&self, listing: &str, api: Arc<dyn ControlPlane>) -> Arc<VolumeDiscovery> {
        Arc::new(VolumeDiscovery::new(
            self.volumes_dir(),
            self.state_dir(),
            Arc::new(FixedListing(listing.to_string())),
            self.claims(api),
        ))
    }
}

/// `ls -l` line for a volume block device.
pub fn device_line(major: u32, minor: u32, id: &str) -> String {
    format!("brw-rw---- 1 root disk {major:>6}, {minor} Feb 25 16:07 v.{id}\n")
}
