//! Prometheus metrics middleware.
//!
//! Provides HTTP request/response metrics collection, the realtime and ML
//! gateway business metrics, and the `/metrics` export.

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use domain::services::FanoutReport;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

/// Middleware to record HTTP request metrics.
///
/// Records the following metrics:
/// - `http_requests_total`: Counter with labels (method, path, status)
/// - `http_request_duration_seconds`: Histogram with labels (method, path)
pub async fn metrics_middleware(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();
    let method_str = method_to_str(&method);

    counter!(
        "http_requests_total",
        "method" => method_str,
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);

    histogram!(
        "http_request_duration_seconds",
        "method" => method_str,
        "path" => path
    )
    .record(duration);

    response
}

/// Convert HTTP method to string for metric labels.
fn method_to_str(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        Method::PATCH => "PATCH",
        Method::HEAD => "HEAD",
        Method::OPTIONS => "OPTIONS",
        _ => "OTHER",
    }
}

/// Sets the number of open realtime connections.
pub fn record_realtime_connections(active: usize) {
    gauge!("realtime_connections_active").set(active as f64);
}

/// Records one incident fan-out pass.
pub fn record_fanout(incident_type: &'static str, report: &FanoutReport) {
    counter!("incident_fanout_total", "type" => incident_type).increment(1);
    counter!("incident_deliveries_total", "path" => "room")
        .increment(report.room_deliveries as u64);
    counter!("incident_deliveries_total", "path" => "global")
        .increment(report.global_deliveries as u64);
    histogram!("incident_fanout_rooms_scanned").record(report.rooms_scanned as f64);
}

/// Counts realtime frames dropped because a connection's buffer was full or closed.
pub fn record_dropped_frame(event: &'static str) {
    counter!("realtime_frames_dropped_total", "event" => event).increment(1);
}

/// Records one call to the ML service.
pub fn record_ml_request(endpoint: &'static str, outcome: &'static str, duration_secs: f64) {
    counter!(
        "ml_requests_total",
        "endpoint" => endpoint,
        "outcome" => outcome
    )
    .increment(1);
    histogram!("ml_request_duration_seconds", "endpoint" => endpoint).record(duration_secs);
}

/// Handler for /metrics endpoint that returns Prometheus text format.
pub async fn metrics_handler() -> impl IntoResponse {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        let output = handle.render();
        (
            axum::http::StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            output,
        )
    } else {
        (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            [(axum::http::header::CONTENT_TYPE, "text/plain")],
            "Metrics not initialized".to_string(),
        )
    }
}

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Must be called once during application startup before any metrics are
/// recorded. Later calls are no-ops.
pub fn init_metrics() -> Result<(), BuildError> {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::warn!("Prometheus recorder already installed");
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets(&[0.001, 0.005, 0.01, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0])?
        // ML calls may run up to the two-minute gateway timeout
        .set_buckets_for_metric(
            Matcher::Full("ml_request_duration_seconds".to_string()),
            &[0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0],
        )?
        .install_recorder()?;

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Prometheus handle set concurrently");
    }
    Ok(())
}
