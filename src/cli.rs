//! CLI arguments and subcommands for ondat-metrics-exporter.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Parses a config file level, case-insensitively.
    pub fn from_config(value: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(value, true).ok()
    }
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "ondat-metrics-exporter",
    about = "Prometheus exporter for Ondat volume metrics",
    long_about = "Prometheus exporter for Ondat volume metrics.\n\n\
                  Runs on every storage node and reports disk I/O counters and filesystem \
                  usage for each Ondat volume attached to the node, labeled with the owning \
                  PersistentVolumeClaim.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level (overrides the config file)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Scrape timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Directory holding the control plane API username and password
    #[arg(long)]
    pub api_secrets_path: Option<PathBuf>,

    /// Disable a collector (diskstats, filesystem); may be repeated
    #[arg(long = "disable-collector", value_name = "NAME")]
    pub disable_collector: Vec<String>,

    /// Enable TLS/SSL for HTTPS
    #[arg(long)]
    pub enable_tls: bool,

    /// Path to TLS certificate file (PEM format)
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format)
    #[arg(long)]
    pub tls_key: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration and node requirements
    Check {
        /// Also check control plane credentials
        #[arg(long)]
        credentials: bool,

        /// Check all requirements
        #[arg(long)]
        all: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Test metrics collection
    Test {
        /// Number of test iterations
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: usize,

        /// Print the rendered metrics of each iteration
        #[arg(long)]
        verbose: bool,
    },
}
