//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| PathBuf::from("ondat-metrics-exporter.yaml"));

    let mut content = render_config(&config, format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Ondat Metrics Exporter Configuration
# ====================================
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"              # Bind IP (0.0.0.0 = all interfaces)
# port: 9100                   # HTTP port
# timeout: 10                  # Seconds a /metrics request may take (503 after that)
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
#
# Control Plane
# -------------
# api_endpoint: "storageos"    # host[:port] or URL, port 5705 if omitted
# api_secrets_path: "/etc/storageos/secrets/api"  # holds 'username' and 'password'
#
# Node Paths
# ----------
# volumes_dir: "/var/lib/storageos/volumes"  # v.<uuid> block devices
# state_dir: "/var/lib/storageos/state"      # v.<uuid> volume state files
# diskstats_path: "/proc/diskstats"
# sys_block_path: "/sys/block"
# mounts_path: "/proc/1/mounts"              # host mount table
# mounts_fallback_path: "/proc/mounts"       # used when mounts_path is missing
#
# Collectors
# ----------
# stat_timeout_secs: 5         # statfs() deadline before a mount is marked stuck
# disabled_collectors: []      # any of: diskstats, filesystem
#
# TLS/SSL Configuration
# ---------------------
# enable_tls: false            # Enable HTTPS (default: false)
# tls_cert_path: null          # Path to TLS certificate (PEM format)
# tls_key_path: null           # Path to TLS private key (PEM format)
"#;

    format!("{comments}\n{yaml}")
}
