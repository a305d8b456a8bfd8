//! Prometheus scrape endpoint.
//!
//! Exposes the counters recorded by the marketplace services, among them
//! `bid_acceptances_total`, `orders_created_total` and the
//! `saga_duration_seconds` histogram.

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// GET /metrics
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    ([(CONTENT_TYPE, PROMETHEUS_TEXT)], handle.render())
}
