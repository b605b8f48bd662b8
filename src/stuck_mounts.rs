//! Stuck mount detection for filesystem statistics.
//!
//! `statfs(2)` on a dead network-backed mount can block forever. Each call is
//! therefore run on the blocking pool and raced against a watchdog. If the
//! deadline passes first, the mount point is recorded in the
//! [`StuckMountRegistry`] and skipped by every later scrape until the
//! abandoned call finally returns.
//!
//! The call and the watchdog share a one-shot completion signal. The call
//! fires it and the watchdog inspects it, both while holding the registry
//! lock, so for every call exactly one of "completed in time" or "marked
//! stuck" is recorded.

use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, info, warn};

/// Time a stat call may take before its mount is considered stuck.
pub const DEFAULT_STAT_TIMEOUT: Duration = Duration::from_secs(5);

/// Mount points whose last stat call has not returned in time.
///
/// The lock is only held to check or update the set, never across I/O.
#[derive(Debug, Default)]
pub struct StuckMountRegistry {
    mounts: Mutex<HashSet<String>>,
}

impl StuckMountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.mounts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_stuck(&self, mount_point: &str) -> bool {
        self.lock().contains(mount_point)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sorted copy of the stuck mount points.
    pub fn snapshot(&self) -> Vec<String> {
        let mut mounts: Vec<String> = self.lock().iter().cloned().collect();
        mounts.sort();
        mounts
    }

    /// Called by the stat call once it returns, whatever the result.
    fn complete(&self, mount_point: &str, done: oneshot::Sender<()>) {
        let mut mounts = self.lock();
        let _ = done.send(());
        if mounts.remove(mount_point) {
            info!(
                "Mount point {} has recovered, monitoring will resume",
                mount_point
            );
        }
    }

    /// Called by the watchdog when the deadline fires. Returns whether the mount was marked.
    fn mark_if_pending(&self, mount_point: &str, done: &mut oneshot::Receiver<()>) -> bool {
        let mut mounts = self.lock();
        match done.try_recv() {
            Err(TryRecvError::Empty) => {
                warn!(
                    "Mount point {} timed out, it is being labeled as stuck and will not be monitored",
                    mount_point
                );
                mounts.insert(mount_point.to_string());
                true
            }
            // completed right after the deadline
            Ok(()) | Err(TryRecvError::Closed) => false,
        }
    }
}

/// Raw `statfs(2)` figures of a mounted filesystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsUsage {
    pub block_size: u64,
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_available: u64,
    pub files: u64,
    pub files_free: u64,
}

impl FsUsage {
    pub fn size_bytes(&self) -> f64 {
        self.blocks as f64 * self.block_size as f64
    }

    pub fn free_bytes(&self) -> f64 {
        self.blocks_free as f64 * self.block_size as f64
    }

    /// Free space available to unprivileged users.
    pub fn avail_bytes(&self) -> f64 {
        self.blocks_available as f64 * self.block_size as f64
    }
}

/// Blocking filesystem statistics call.
pub type StatFn = Arc<dyn Fn(&Path) -> io::Result<FsUsage> + Send + Sync>;

/// `statfs(2)` through nix.
pub fn statfs_usage(path: &Path) -> io::Result<FsUsage> {
    let stat = nix::sys::statfs::statfs(path).map_err(io::Error::from)?;
    Ok(FsUsage {
        block_size: stat.block_size() as u64,
        blocks: stat.blocks() as u64,
        blocks_free: stat.blocks_free() as u64,
        blocks_available: stat.blocks_available() as u64,
        files: stat.files() as u64,
        files_free: stat.files_free() as u64,
    })
}

/// Result of a guarded stat call.
#[derive(Debug)]
pub enum StatOutcome {
    Ok(FsUsage),
    /// The call returned an error.
    Failed(io::Error),
    /// The mount was already stuck; no call was made.
    Skipped,
    /// The deadline passed; the call was abandoned and the mount marked stuck.
    TimedOut,
}

/// Runs stat calls under the stuck mount watchdog.
#[derive(Clone)]
pub struct GuardedStat {
    registry: Arc<StuckMountRegistry>,
    deadline: Duration,
    stat: StatFn,
}

impl GuardedStat {
    pub fn new(registry: Arc<StuckMountRegistry>, deadline: Duration, stat: StatFn) -> Self {
        Self {
            registry,
            deadline,
            stat,
        }
    }

    /// Guarded `statfs(2)` with the default deadline.
    pub fn with_statfs(registry: Arc<StuckMountRegistry>) -> Self {
        Self::new(registry, DEFAULT_STAT_TIMEOUT, Arc::new(statfs_usage))
    }

    pub fn registry(&self) -> &Arc<StuckMountRegistry> {
        &self.registry
    }

    pub async fn stat(&self, mount_point: &str) -> StatOutcome {
        if self.registry.is_stuck(mount_point) {
            debug!("Mount point {} is in an unresponsive state", mount_point);
            return StatOutcome::Skipped;
        }

        let (done_tx, done_rx) = oneshot::channel();
        let watchdog = tokio::spawn(watch(
            Arc::clone(&self.registry),
            mount_point.to_string(),
            done_rx,
            self.deadline,
        ));

        let registry = Arc::clone(&self.registry);
        let stat = Arc::clone(&self.stat);
        let path = mount_point.to_string();
        let mut call = tokio::task::spawn_blocking(move || {
            let result = stat(Path::new(&path));
            registry.complete(&path, done_tx);
            result
        });

        tokio::select! {
            biased;
            joined = &mut call => outcome(joined),
            verdict = watchdog => match verdict {
                Ok(true) => StatOutcome::TimedOut,
                // the completion signal was seen, the call is returning
                _ => outcome(call.await),
            },
        }
    }
}

fn outcome(joined: Result<io::Result<FsUsage>, tokio::task::JoinError>) -> StatOutcome {
    match joined {
        Ok(Ok(usage)) => StatOutcome::Ok(usage),
        Ok(Err(e)) => StatOutcome::Failed(e),
        Err(e) => StatOutcome::Failed(io::Error::new(io::ErrorKind::Other, e)),
    }
}

/// Waits for the completion signal; past the deadline, marks the mount stuck.
async fn watch(
    registry: Arc<StuckMountRegistry>,
    mount_point: String,
    mut done: oneshot::Receiver<()>,
    deadline: Duration,
) -> bool {
    tokio::select! {
        _ = &mut done => false,
        _ = tokio::time::sleep(deadline) => registry.mark_if_pending(&mount_point, &mut done),
    }
}
