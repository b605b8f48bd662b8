//! Root endpoint handler for the landing page.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use tracing::{debug, instrument};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");

    let version = env!("CARGO_PKG_VERSION");

    // Calculate actual uptime from service start time
    let uptime_secs = state.start_time.elapsed().as_secs();
    let hours = uptime_secs / 3600;
    let minutes = (uptime_secs % 3600) / 60;
    let seconds = uptime_secs % 60;
    let uptime_str = format!("{}h {}m {}s", hours, minutes, seconds);

    let collectors = state.scraper.collector_names().join(", ");
    let stuck = state.stuck_mounts.len();

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Ondat Metrics Exporter</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 0; padding: 20px; background: #f5f5f5; }}
        .container {{ max-width: 900px; margin: 0 auto; background: white; padding: 40px; border-radius: 8px; }}
        h1 {{ color: #333; border-bottom: 3px solid #007bff; padding-bottom: 15px; }}
        .info-label {{ font-weight: 600; color: #555; }}
        .footer {{ margin-top: 40px; color: #666; font-size: 0.9em; text-align: center; }}
    </style>
</head>
<body>
<div class="container">
    <h1>Ondat Metrics Exporter</h1>
    <p><span class="info-label">Version:</span> {version}</p>
    <p><span class="info-label">Uptime:</span> {uptime}</p>
    <p><span class="info-label">Collectors:</span> {collectors}</p>
    <p><span class="info-label">Scrapes served:</span> {served} ({timed_out} timed out)</p>
    <p><span class="info-label">Stuck mounts:</span> {stuck}</p>
    <ul>
        <li><a href="/metrics">/metrics</a> Prometheus metrics</li>
        <li><a href="/healthz">/healthz</a> liveness probe</li>
        <li><a href="/readyz">/readyz</a> readiness probe</li>
    </ul>
    <div class="footer"><p>{footer}</p></div>
</div>
</body>
</html>"#,
        version = version,
        uptime = uptime_str,
        collectors = collectors,
        served = state.scrapes_served(),
        timed_out = state.scrapes_timed_out(),
        stuck = stuck,
        footer = FOOTER_TEXT
    );

    Html(html)
}
