//! Probe endpoint handlers.
//!
//! Both probes only report that the HTTP server is up. Scrape failures show
//! up in `ondat_scrape_collector_success`, not here, so a node with a broken
//! control plane connection is not restarted in a loop.

use axum::{http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str = "Ondat Metrics Exporter";

const PLAIN_TEXT: (&str, &str) = ("Content-Type", "text/plain; charset=utf-8");

/// Handler for the /healthz endpoint.
#[instrument]
pub async fn healthz_handler() -> impl IntoResponse {
    debug!("Processing /healthz request");
    (StatusCode::OK, [PLAIN_TEXT], "ok\n")
}

/// Handler for the /readyz endpoint.
#[instrument]
pub async fn readyz_handler() -> impl IntoResponse {
    debug!("Processing /readyz request");
    (StatusCode::OK, [PLAIN_TEXT], "ok\n")
}
