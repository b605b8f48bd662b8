//! ondat-metrics-exporter
//!
//! Prometheus exporter for Ondat volume metrics with tracing logging.
//! This is the main entry point that initializes the server and handles subcommands.

mod cli;
mod commands;
mod config;
mod handlers;
mod startup_checks;
mod state;

use axum::{routing::get, Router};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use ondat_metrics_exporter::{Scraper, StuckMountRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info};

use cli::{Args, Commands, LogLevel};
use commands::{command_check, command_config, command_test};
use config::{
    resolve_config, show_config, validate_effective_config, Config, DEFAULT_BIND_ADDR, DEFAULT_PORT,
};
use handlers::{healthz_handler, metrics_handler, readyz_handler, root_handler};
use state::AppState;

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(config: &Config) {
    let log_level = config.log_level();
    let filter = match log_level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    info!("Logging initialized with level: {}", log_level.as_str());
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Resolves once SIGINT or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        return match command {
            Commands::Config {
                output,
                format,
                commented,
            } => command_config(output.clone(), *format, *commented),

            Commands::Check { credentials, all } => {
                let config = load_validated_config(&args)?;
                command_check(*credentials, *all, &config)
            }

            Commands::Test {
                iterations,
                verbose,
            } => {
                let config = load_validated_config(&args)?;
                setup_logging(&config);
                command_test(*iterations, *verbose, &config)
                    .await
                    .map_err(Into::into)
            }
        };
    }

    // Load configuration for main server mode
    let config = load_validated_config(&args)?;
    setup_logging(&config);

    info!("Starting ondat-metrics-exporter");

    let settings = config.scrape_settings();
    startup_checks::validate_requirements(&settings);

    let bind_ip_str = config
        .bind
        .clone()
        .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
    let port = config.port.unwrap_or(DEFAULT_PORT);

    let stuck_mounts = Arc::new(StuckMountRegistry::new());
    let scraper = Scraper::from_settings(&settings, stuck_mounts.clone())?;
    info!(
        "Enabled collectors: [{}]",
        scraper.collector_names().join(", ")
    );

    let enable_tls = config.enable_tls.unwrap_or(false);
    let tls_paths = (config.tls_cert_path.clone(), config.tls_key_path.clone());

    let state = Arc::new(AppState::new(scraper, config, stuck_mounts));
    debug!("Scrape timeout: {:?}", state.scrape_timeout);

    // Configure HTTP server routes
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;

    let app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state);

    if enable_tls {
        // validate_effective_config() guarantees both paths when TLS is enabled
        let (Some(cert_path), Some(key_path)) = tls_paths else {
            return Err("TLS is enabled but certificate or key path is missing".into());
        };

        info!("Loading TLS certificate from: {}", cert_path);
        info!("Loading TLS private key from: {}", key_path);

        let tls_config = RustlsConfig::from_pem_file(&cert_path, &key_path)
            .await
            .map_err(|e| {
                error!("Failed to load TLS configuration: {}", e);
                e
            })?;

        info!(
            "ondat-metrics-exporter listening on https://{}:{}",
            bind_ip_str, port
        );

        let server = axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service());

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
            }
            _ = shutdown_signal() => {
                info!("Shutdown signal received, exiting...");
            }
        }
    } else {
        let listener = TcpListener::bind(addr).await?;
        info!(
            "ondat-metrics-exporter listening on http://{}:{}",
            bind_ip_str, port
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| {
                error!("Server error: {}", e);
                e
            })?;
    }

    info!("ondat-metrics-exporter stopped gracefully");
    Ok(())
}
