//! Check command implementation.
//!
//! Validates node requirements and configuration.

use crate::config::{validate_effective_config, Config};
use crate::startup_checks::probe_requirements;

/// Validates node requirements and configuration.
pub fn command_check(
    credentials: bool,
    all: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Ondat Metrics Exporter - Node Check");
    println!("======================================");

    let mut all_ok = true;
    let settings = config.scrape_settings();

    println!("\n📁 Checking node requirements...");
    for probe in probe_requirements(&settings, credentials || all) {
        match &probe.result {
            Ok(detail) => println!("   ✅ {}: {}", probe.name, detail),
            Err(e) => {
                println!("   ❌ {}: {}", probe.name, e);
                all_ok = false;
            }
        }
    }

    // Check configuration
    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => {
            println!("   ✅ Configuration is valid");
        }
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - node is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}
