//! CLI command implementations for ondat-metrics-exporter.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: Node requirement validation
//! - `config`: Configuration file generation
//! - `test`: Metrics collection testing

pub mod check;
pub mod config;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use test::command_test;
