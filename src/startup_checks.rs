//! Runtime requirement checks for ondat-metrics-exporter.
//!
//! The same probes back the `check` subcommand and the start-up validation.
//! At start-up a failed probe is only logged: the node may simply not host
//! any volume yet, and the scrape reports the failure per collector.

use nix::unistd::geteuid;
use ondat_metrics_exporter::api::Credentials;
use ondat_metrics_exporter::procfs::{read_diskstats, read_mounts};
use ondat_metrics_exporter::scrape::ScrapeSettings;
use ondat_metrics_exporter::volumes::validate_dir;
use tracing::{info, warn};

/// Result of one requirement probe.
#[derive(Debug)]
pub struct Probe {
    pub name: &'static str,
    pub result: Result<String, String>,
}

impl Probe {
    fn new(name: &'static str, result: Result<String, String>) -> Self {
        Self { name, result }
    }

    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs the node probes, plus the credentials probe when asked for.
pub fn probe_requirements(settings: &ScrapeSettings, credentials: bool) -> Vec<Probe> {
    let mut probes = vec![
        check_user_privileges(),
        Probe::new(
            "volumes directory",
            validate_dir(&settings.volumes_dir)
                .map(|_| format!("{} is a directory", settings.volumes_dir.display()))
                .map_err(|e| e.to_string()),
        ),
        Probe::new(
            "volume state directory",
            validate_dir(&settings.state_dir)
                .map(|_| format!("{} is a directory", settings.state_dir.display()))
                .map_err(|e| e.to_string()),
        ),
        Probe::new(
            "disk statistics",
            read_diskstats(&settings.diskstats_path)
                .map(|records| {
                    format!(
                        "{} device(s) in {}",
                        records.len(),
                        settings.diskstats_path.display()
                    )
                })
                .map_err(|e| e.to_string()),
        ),
        Probe::new(
            "mount table",
            read_mounts(&settings.mounts_path, &settings.mounts_fallback_path)
                .map(|mounts| format!("{} mount(s)", mounts.len()))
                .map_err(|e| e.to_string()),
        ),
    ];

    if credentials {
        probes.push(Probe::new(
            "control plane credentials",
            Credentials::from_mounted_secret(&settings.api_secrets_path)
                .map(|_| format!("read from {}", settings.api_secrets_path.display()))
                .map_err(|e| e.to_string()),
        ));
    }

    probes
}

/// Logs the probes at start-up. Never fails.
pub fn validate_requirements(settings: &ScrapeSettings) {
    info!("Validating runtime requirements...");

    let mut failed = 0;
    for probe in probe_requirements(settings, true) {
        match &probe.result {
            Ok(detail) => info!("{}: {}", probe.name, detail),
            Err(e) => {
                failed += 1;
                warn!("{}: {}", probe.name, e);
            }
        }
    }

    if failed == 0 {
        info!("All runtime requirements validated");
    } else {
        warn!(
            "{} runtime requirement(s) not met, affected collectors will report failure",
            failed
        );
    }
}

/// Check if running with sufficient privileges
fn check_user_privileges() -> Probe {
    let result = if geteuid().is_root() {
        Ok("running as root (uid=0)".to_string())
    } else {
        // the host mount table and the volume devices are root-only
        Err("not running as root, /proc/1/mounts and the volume devices may be unreadable".to_string())
    };
    Probe::new("privileges", result)
}
