//! Configuration management for ondat-metrics-exporter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat, LogLevel};
use ondat_metrics_exporter::collectors::CollectorKind;
use ondat_metrics_exporter::scrape::ScrapeSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STAT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_API_SECRETS_PATH: &str = "/etc/storageos/secrets/api";
pub const DEFAULT_VOLUMES_DIR: &str = "/var/lib/storageos/volumes";
pub const DEFAULT_STATE_DIR: &str = "/var/lib/storageos/state";
pub const DEFAULT_DISKSTATS_PATH: &str = "/proc/diskstats";
pub const DEFAULT_SYS_BLOCK_PATH: &str = "/sys/block";
pub const DEFAULT_MOUNTS_PATH: &str = "/proc/1/mounts";
pub const DEFAULT_MOUNTS_FALLBACK_PATH: &str = "/proc/mounts";

/// Default config file locations, first existing one wins.
pub const DEFAULT_CONFIG_PATHS: [&str; 6] = [
    "/etc/ondat/metrics-exporter.yaml",
    "/etc/ondat/metrics-exporter.yml",
    "/etc/ondat/metrics-exporter.json",
    "./ondat-metrics-exporter.yaml",
    "./ondat-metrics-exporter.yml",
    "./ondat-metrics-exporter.json",
];

/// Exporter configuration. Fields missing from a config file keep their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Logging
    #[serde(alias = "log-level", alias = "logLevel")]
    pub log_level: Option<String>,

    /// Scrape timeout in seconds
    pub timeout: Option<u64>,

    // Control plane
    #[serde(alias = "api-endpoint")]
    pub api_endpoint: Option<String>,
    #[serde(alias = "api-secrets-path")]
    pub api_secrets_path: Option<PathBuf>,

    // Node paths
    #[serde(alias = "volumes-dir")]
    pub volumes_dir: Option<PathBuf>,
    #[serde(alias = "state-dir")]
    pub state_dir: Option<PathBuf>,
    #[serde(alias = "diskstats-path")]
    pub diskstats_path: Option<PathBuf>,
    #[serde(alias = "sys-block-path")]
    pub sys_block_path: Option<PathBuf>,
    #[serde(alias = "mounts-path")]
    pub mounts_path: Option<PathBuf>,
    #[serde(alias = "mounts-fallback-path")]
    pub mounts_fallback_path: Option<PathBuf>,

    /// Seconds a filesystem stat call may take before its mount is marked stuck
    #[serde(alias = "stat-timeout-secs")]
    pub stat_timeout_secs: Option<u64>,

    // Collectors
    #[serde(alias = "disabled-collectors")]
    pub disabled_collectors: Option<Vec<String>>,

    // TLS/SSL Configuration
    #[serde(alias = "enable-tls")]
    pub enable_tls: Option<bool>,
    #[serde(alias = "tls-cert-path")]
    pub tls_cert_path: Option<String>,
    #[serde(alias = "tls-key-path")]
    pub tls_key_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            log_level: Some("info".into()),
            timeout: Some(DEFAULT_TIMEOUT_SECS),
            api_endpoint: Some(ondat_metrics_exporter::api::DEFAULT_ENDPOINT.to_string()),
            api_secrets_path: Some(PathBuf::from(DEFAULT_API_SECRETS_PATH)),
            volumes_dir: Some(PathBuf::from(DEFAULT_VOLUMES_DIR)),
            state_dir: Some(PathBuf::from(DEFAULT_STATE_DIR)),
            diskstats_path: Some(PathBuf::from(DEFAULT_DISKSTATS_PATH)),
            sys_block_path: Some(PathBuf::from(DEFAULT_SYS_BLOCK_PATH)),
            mounts_path: Some(PathBuf::from(DEFAULT_MOUNTS_PATH)),
            mounts_fallback_path: Some(PathBuf::from(DEFAULT_MOUNTS_FALLBACK_PATH)),
            stat_timeout_secs: Some(DEFAULT_STAT_TIMEOUT_SECS),
            disabled_collectors: Some(Vec::new()),
            enable_tls: Some(false),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

fn path_or(value: &Option<PathBuf>, default: &str) -> PathBuf {
    value.clone().unwrap_or_else(|| PathBuf::from(default))
}

impl Config {
    /// Deadline for one `/metrics` scrape.
    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Effective log level, falling back to info on unknown values.
    pub fn log_level(&self) -> LogLevel {
        self.log_level
            .as_deref()
            .and_then(LogLevel::from_config)
            .unwrap_or(LogLevel::Info)
    }

    /// Library settings the collectors are built from.
    pub fn scrape_settings(&self) -> ScrapeSettings {
        ScrapeSettings {
            volumes_dir: path_or(&self.volumes_dir, DEFAULT_VOLUMES_DIR),
            state_dir: path_or(&self.state_dir, DEFAULT_STATE_DIR),
            diskstats_path: path_or(&self.diskstats_path, DEFAULT_DISKSTATS_PATH),
            sys_block_path: path_or(&self.sys_block_path, DEFAULT_SYS_BLOCK_PATH),
            mounts_path: path_or(&self.mounts_path, DEFAULT_MOUNTS_PATH),
            mounts_fallback_path: path_or(
                &self.mounts_fallback_path,
                DEFAULT_MOUNTS_FALLBACK_PATH,
            ),
            api_endpoint: self
                .api_endpoint
                .clone()
                .unwrap_or_else(|| ondat_metrics_exporter::api::DEFAULT_ENDPOINT.to_string()),
            api_secrets_path: path_or(&self.api_secrets_path, DEFAULT_API_SECRETS_PATH),
            stat_timeout: Duration::from_secs(
                self.stat_timeout_secs.unwrap_or(DEFAULT_STAT_TIMEOUT_SECS),
            ),
            disabled_collectors: self.disabled_collectors.clone().unwrap_or_default(),
        }
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if cfg.port == Some(0) {
        return Err("port must be between 1 and 65535".into());
    }

    if let Some(bind) = cfg.bind.as_deref() {
        if bind.parse::<std::net::IpAddr>().is_err() {
            return Err(format!("Invalid bind address '{}'", bind).into());
        }
    }

    if let Some(level) = cfg.log_level.as_deref() {
        if LogLevel::from_config(level).is_none() {
            return Err(format!(
                "Invalid log_level '{}', expected off, error, warn, info, debug or trace",
                level
            )
            .into());
        }
    }

    if cfg.timeout.is_some_and(|t| t < 1) {
        return Err("timeout must be at least 1 second".into());
    }
    if cfg.stat_timeout_secs.is_some_and(|t| t < 1) {
        return Err("stat_timeout_secs must be at least 1 second".into());
    }

    if let Some(endpoint) = cfg.api_endpoint.as_deref() {
        ondat_metrics_exporter::api::normalize_endpoint(endpoint)?;
    }

    for name in cfg.disabled_collectors.iter().flatten() {
        if CollectorKind::from_name(name).is_none() {
            warn!("Unknown collector '{}' in disabled_collectors", name);
        }
    }

    // TLS validation
    if cfg.enable_tls.unwrap_or(false) {
        let cert_path = cfg.tls_cert_path.as_deref();
        let key_path = cfg.tls_key_path.as_deref();

        match (cert_path, key_path) {
            (None, None) => {
                return Err(
                    "TLS is enabled but neither tls_cert_path nor tls_key_path are set".into(),
                );
            }
            (Some(_), None) => {
                return Err("TLS is enabled but tls_key_path is not set".into());
            }
            (None, Some(_)) => {
                return Err("TLS is enabled but tls_cert_path is not set".into());
            }
            (Some(cert), Some(key)) => {
                check_tls_file(cert, "certificate")?;
                check_tls_file(key, "private key")?;
            }
        }
    }

    Ok(())
}

/// Checks that a TLS file exists, is readable and is not empty.
fn check_tls_file(path: &str, what: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        return Err(format!("TLS {} file not found: {}", what, path).into());
    }

    match fs::metadata(path) {
        Ok(meta) if meta.len() == 0 => Err(format!("TLS {} file is empty: {}", what, path).into()),
        Err(e) => Err(format!("TLS {} file is not readable: {} ({})", what, path, e).into()),
        Ok(_) => Ok(()),
    }
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    // Override with CLI args
    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }
    if let Some(level) = args.log_level {
        config.log_level = Some(level.as_str().to_string());
    }
    if let Some(timeout) = args.timeout {
        config.timeout = Some(timeout);
    }
    if let Some(path) = &args.api_secrets_path {
        config.api_secrets_path = Some(path.clone());
    }

    // Collectors disabled on the CLI add to the ones from the file
    if !args.disable_collector.is_empty() {
        let disabled = config.disabled_collectors.get_or_insert_with(Vec::new);
        for name in &args.disable_collector {
            if !disabled.contains(name) {
                disabled.push(name.clone());
            }
        }
    }

    // TLS configuration: CLI wins if provided
    if args.enable_tls {
        config.enable_tls = Some(true);
    }
    if let Some(cert_path) = &args.tls_cert {
        config.tls_cert_path = Some(cert_path.to_string_lossy().to_string());
    }
    if let Some(key_path) = &args.tls_key {
        config.tls_key_path = Some(key_path.to_string_lossy().to_string());
    }

    Ok(config)
}

/// Configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(format!("Config file not found: {}", p.display()).into());
            }
            p.to_path_buf()
        }
        None => match DEFAULT_CONFIG_PATHS
            .iter()
            .map(Path::new)
            .find(|p| p.exists())
        {
            Some(p) => p.to_path_buf(),
            None => return Ok(Config::default()),
        },
    };

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Renders configuration in the requested format.
pub fn render_config(
    config: &Config,
    format: ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, format)?);
    Ok(())
}
