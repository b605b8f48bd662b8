//! Discovery of the Ondat volumes attached to this node.
//!
//! A scrape cycle starts by listing the block devices under the volumes
//! directory ([`enumerate`]) and then attaching the owning PVC to each of
//! them ([`resolver`]). The resulting `Vec<Volume>` belongs to that cycle only;
//! nothing is cached between scrapes.

pub mod enumerate;
pub mod resolver;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::api::ClaimLookup;

pub use enumerate::{parse_listing, validate_dir, DeviceListing, LsListing, VOLUME_PREFIX};
pub use resolver::IdentityResolver;
pub use state::{read_volume_state, VolumeState};

/// A storage-system block device present on this node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Volume {
    pub major: u32,
    pub minor: u32,
    /// Control-plane volume ID, taken from the `v.<uuid>` device name.
    pub internal_id: String,
    /// PVC name, empty while unresolved.
    pub claim_name: String,
    /// PVC namespace, empty while unresolved.
    pub claim_namespace: String,
}

impl Volume {
    pub fn new(major: u32, minor: u32, internal_id: impl Into<String>) -> Self {
        Self {
            major,
            minor,
            internal_id: internal_id.into(),
            ..Default::default()
        }
    }

    pub fn is_resolved(&self) -> bool {
        !self.claim_name.is_empty()
    }
}

/// Errors raised while discovering or identifying volumes.
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error("could not read directory {path}: {source}")]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("listing {path} failed: {reason}")]
    ListingFailed { path: PathBuf, reason: String },

    #[error("failed to read volume state file {path}: {source}")]
    StateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse volume state file {path}: {source}")]
    StateParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl VolumeError {
    /// True only for a state file that does not exist, the one case that
    /// triggers the control-plane fallback.
    pub fn is_state_missing(&self) -> bool {
        matches!(self, VolumeError::StateRead { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Builds the per-cycle volume set: enumerate, then resolve identities.
pub struct VolumeDiscovery {
    volumes_dir: PathBuf,
    state_dir: PathBuf,
    listing: Arc<dyn DeviceListing>,
    claims: Arc<ClaimLookup>,
}

impl VolumeDiscovery {
    pub fn new(
        volumes_dir: impl Into<PathBuf>,
        state_dir: impl Into<PathBuf>,
        listing: Arc<dyn DeviceListing>,
        claims: Arc<ClaimLookup>,
    ) -> Self {
        Self {
            volumes_dir: volumes_dir.into(),
            state_dir: state_dir.into(),
            listing,
            claims,
        }
    }

    pub fn volumes_dir(&self) -> &std::path::Path {
        &self.volumes_dir
    }

    /// Lists the local volumes and attaches their claim identity.
    ///
    /// Fails only on the volumes directory precondition or the listing itself;
    /// identity failures leave the affected volumes unresolved.
    pub async fn discover(&self) -> Result<Vec<Volume>, VolumeError> {
        validate_dir(&self.volumes_dir)?;

        let output = self.listing.list(&self.volumes_dir).await?;
        let mut volumes = parse_listing(&output);
        debug!(
            "Found {} volume device(s) in {}",
            volumes.len(),
            self.volumes_dir.display()
        );

        if volumes.is_empty() {
            return Ok(volumes);
        }

        let mut resolver = IdentityResolver::new(&self.state_dir, &self.claims);
        resolver.resolve_all(&mut volumes).await;

        Ok(volumes)
    }
}

/// Looks up a volume by the ID embedded in a device path such as
/// `/var/lib/storageos/volumes/v.06115715-2901-49d4-9a05-fd4641b82d6d`.
pub fn find_by_device_path<'a>(volumes: &'a [Volume], device: &str) -> Option<&'a Volume> {
    let id = volume_id_from_device(device)?;
    volumes.iter().find(|v| v.internal_id == id)
}

/// Extracts the volume ID from the last segment of a device path.
pub fn volume_id_from_device(device: &str) -> Option<&str> {
    device
        .rsplit('/')
        .next()
        .and_then(|name| name.strip_prefix(VOLUME_PREFIX))
        .filter(|id| !id.is_empty())
}
