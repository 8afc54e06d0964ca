//! Metrics collection and exposition.
//!
//! # Metrics
//! - `oyaki_requests_total` (counter): requests by status and outcome
//! - `oyaki_request_duration_seconds` (histogram): end-to-end latency
//! - `oyaki_conversions_total` (counter): conversions by output content type
//! - `oyaki_conversion_duration_seconds` (histogram): decode plus encode time
//! - `oyaki_webp_fallback_total` (counter): WebP failures answered with JPEG
//!
//! Recording is a no-op until `init_metrics` installs the Prometheus recorder.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and serve it on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(status: u16, outcome: &'static str, start: Instant) {
    counter!(
        "oyaki_requests_total",
        "status" => status.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("oyaki_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_conversion(content_type: &'static str, start: Instant) {
    counter!("oyaki_conversions_total", "content_type" => content_type).increment(1);
    histogram!("oyaki_conversion_duration_seconds", "content_type" => content_type)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_webp_fallback() {
    counter!("oyaki_webp_fallback_total").increment(1);
}
