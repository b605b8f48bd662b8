//! Metrics endpoint handler for Prometheus scraping.
//!
//! Every request runs a fresh scrape. The scrape runs in its own task; when
//! it misses the deadline the request is answered with 503 and the scrape is
//! left to finish in the background.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use ondat_metrics_exporter::metrics::render;
use prometheus::TEXT_FORMAT;
use std::time::Instant;
use tracing::{debug, error, instrument, warn};

use crate::state::SharedState;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    Timeout,
    ScrapeFailed,
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> Response {
        match self {
            MetricsError::Timeout => {
                (StatusCode::SERVICE_UNAVAILABLE, "Scrape timed out\n").into_response()
            }
            MetricsError::ScrapeFailed => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Scrape failed\n").into_response()
            }
            MetricsError::EncodingFailed => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics\n").into_response()
            }
        }
    }
}

/// Handler for the /metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(State(state): State<SharedState>) -> Result<Response, MetricsError> {
    let start = Instant::now();
    debug!("Processing /metrics request");

    let scraper = state.scraper.clone();
    let scrape = tokio::spawn(async move { scraper.scrape().await });

    let output = match tokio::time::timeout(state.scrape_timeout, scrape).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            error!("Scrape task failed: {}", e);
            return Err(MetricsError::ScrapeFailed);
        }
        Err(_) => {
            state.record_timeout();
            warn!(
                "Scrape did not finish within {:?}, answering 503",
                state.scrape_timeout
            );
            return Err(MetricsError::Timeout);
        }
    };

    let body = render(&output.samples).map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        MetricsError::EncodingFailed
    })?;
    state.record_scrape();

    debug!(
        "Served {} samples from {} collector(s) in {:?}",
        output.samples.len(),
        output.reports.len(),
        start.elapsed()
    );
    Ok(([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response())
}
