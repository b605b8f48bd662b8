//! Stuck mount detection across scrape cycles.

use ondat_metrics_exporter::stuck_mounts::{FsUsage, GuardedStat, StatFn, StatOutcome, StuckMountRegistry};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Blocks stat calls until opened.
#[derive(Default)]
struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cond.wait(open).unwrap();
        }
    }

    fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cond.notify_all();
    }
}

fn gated_stat(gate: Arc<Gate>, calls: Arc<AtomicUsize>) -> StatFn {
    Arc::new(move |_: &Path| -> io::Result<FsUsage> {
        calls.fetch_add(1, Ordering::SeqCst);
        gate.wait();
        Ok(FsUsage {
            block_size: 4096,
            blocks: 10,
            ..Default::default()
        })
    })
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stuck_mount_round_trip() {
    const MOUNT: &str = "/var/lib/kubelet/pods/abc/volumes/mount";

    let registry = Arc::new(StuckMountRegistry::new());
    let gate = Arc::new(Gate::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let guard = GuardedStat::new(
        registry.clone(),
        Duration::from_millis(50),
        gated_stat(gate.clone(), calls.clone()),
    );

    // cycle 1: the call hangs past the deadline
    assert!(matches!(guard.stat(MOUNT).await, StatOutcome::TimedOut));
    assert!(registry.is_stuck(MOUNT));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // cycles 2 and 3: skipped without calling stat
    for _ in 0..2 {
        assert!(matches!(guard.stat(MOUNT).await, StatOutcome::Skipped));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // the abandoned call finally returns and clears the entry
    gate.open();
    wait_until(|| !registry.is_stuck(MOUNT)).await;

    // next cycle stats normally again
    match guard.stat(MOUNT).await {
        StatOutcome::Ok(usage) => assert_eq!(usage.size_bytes(), 40960.0),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(registry.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_other_mounts_unaffected() {
    let registry = Arc::new(StuckMountRegistry::new());
    let gate = Arc::new(Gate::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let slow = GuardedStat::new(
        registry.clone(),
        Duration::from_millis(50),
        gated_stat(gate.clone(), calls),
    );
    let fast = GuardedStat::new(
        registry.clone(),
        Duration::from_millis(50),
        Arc::new(|_: &Path| -> io::Result<FsUsage> { Ok(FsUsage::default()) }),
    );

    assert!(matches!(slow.stat("/mnt/slow").await, StatOutcome::TimedOut));
    assert!(matches!(fast.stat("/mnt/fast").await, StatOutcome::Ok(_)));
    assert_eq!(registry.snapshot(), vec!["/mnt/slow".to_string()]);

    gate.open();
    wait_until(|| registry.is_empty()).await;
}
