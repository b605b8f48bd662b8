//! Attaches PVC identity to volumes.
//!
//! The local state file is tried first. Only when it does not exist is the
//! control plane consulted, and then at most once per resolver: the first
//! volume that needs it fetches the cluster-wide index and every later one
//! reuses it, including when that fetch failed.

use std::path::Path;
use tracing::{debug, warn};

use super::state::read_volume_state;
use super::Volume;
use crate::api::{ClaimIndex, ClaimLookup};

enum RemoteIndex {
    NotFetched,
    Fetched(ClaimIndex),
    Failed,
}

/// Resolves claim identities for one scrape cycle.
pub struct IdentityResolver<'a> {
    state_dir: &'a Path,
    claims: &'a ClaimLookup,
    remote: RemoteIndex,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(state_dir: &'a Path, claims: &'a ClaimLookup) -> Self {
        Self {
            state_dir,
            claims,
            remote: RemoteIndex::NotFetched,
        }
    }

    /// Resolves every volume in place. Unresolvable volumes keep empty claim fields.
    pub async fn resolve_all(&mut self, volumes: &mut [Volume]) {
        for vol in volumes.iter_mut() {
            self.resolve(vol).await;
        }
    }

    /// Resolves a single volume in place.
    pub async fn resolve(&mut self, vol: &mut Volume) {
        match read_volume_state(self.state_dir, &vol.internal_id) {
            Ok(state) => {
                vol.claim_name = state.labels.pvc;
                vol.claim_namespace = state.labels.pvc_namespace;
            }
            Err(e) if e.is_state_missing() => {
                debug!(
                    "No local state for volume {}, using control plane",
                    vol.internal_id
                );
                self.resolve_remote(vol).await;
            }
            Err(e) => {
                warn!("Error reading volume {} state file: {}", vol.internal_id, e);
            }
        }
    }

    async fn resolve_remote(&mut self, vol: &mut Volume) {
        if matches!(self.remote, RemoteIndex::NotFetched) {
            self.remote = match self.claims.fetch_index().await {
                Ok(index) => RemoteIndex::Fetched(index),
                Err(e) => {
                    warn!("Failed to fetch volumes from the control plane: {}", e);
                    RemoteIndex::Failed
                }
            };
        }

        if let RemoteIndex::Fetched(index) = &self.remote {
            match index.get(&vol.internal_id) {
                Some(claim) => {
                    vol.claim_name = claim.name.clone();
                    vol.claim_namespace = claim.namespace.clone();
                }
                None => debug!("Volume {} unknown to the control plane", vol.internal_id),
            }
        }
    }

    /// Whether the control plane has been queried by this resolver.
    pub fn used_control_plane(&self) -> bool {
        !matches!(self.remote, RemoteIndex::NotFetched)
    }
}
