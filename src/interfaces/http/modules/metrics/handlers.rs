//! Prometheus scrape endpoint

use axum::{extract::State, http::header, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct MetricsState {
    pub handle: PrometheusHandle,
}

/// Register help texts for the service's metric families.
pub fn describe_metrics() {
    metrics::describe_counter!("http_requests_total", "HTTP requests by method, route and status");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        metrics::Unit::Seconds,
        "HTTP request latency by method and route"
    );
    metrics::describe_gauge!("http_requests_in_flight", "HTTP requests currently being served");
    metrics::describe_counter!(
        "reservation_operations_total",
        "Reservation lifecycle operations by outcome"
    );
    metrics::describe_histogram!(
        "reservation_operation_duration_seconds",
        metrics::Unit::Seconds,
        "Reservation lifecycle operation latency, store round trips included"
    );
}

/// `GET /metrics` (no auth)
pub async fn prometheus_metrics(State(state): State<MetricsState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.handle.render(),
    )
}
