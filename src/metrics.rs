//! Prometheus metrics for fileherd.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides an axum middleware for HTTP RED
//! metrics, and exposes the `/metrics` endpoint handler.  Without an
//! installed recorder every macro is a no-op, which is what unit tests get.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "fileherd_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "fileherd_http_request_duration_seconds";

/// Controller operations (counter). Labels: operation, outcome.
pub const RPC_OPERATIONS_TOTAL: &str = "fileherd_rpc_operations_total";

/// Registered file servers (gauge).
pub const FILE_SERVERS: &str = "fileherd_file_servers";

/// Tracked file records (gauge).
pub const FILES_TOTAL: &str = "fileherd_files_total";

/// Registration attempts (counter). Labels: outcome.
pub const REGISTRATIONS_TOTAL: &str = "fileherd_registrations_total";

/// Removed memberships (counter). Labels: reason.
pub const DEREGISTRATIONS_TOTAL: &str = "fileherd_deregistrations_total";

/// File records dropped because their owner left (counter).
pub const ORPHANS_PURGED_TOTAL: &str = "fileherd_orphans_purged_total";

// -- Global recorder installation ---------------------------------------------

static PROMETHEUS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times (e.g. in tests).
///
/// Returns `None` when another recorder was already installed process-wide.
pub fn init_metrics() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!("Failed to install Prometheus recorder: {}", e);
                None
            }
        })
        .as_ref()
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(RPC_OPERATIONS_TOTAL, "Controller operations by type and outcome");
    describe_gauge!(FILE_SERVERS, "Registered file servers");
    describe_gauge!(FILES_TOTAL, "Tracked file records");
    describe_counter!(REGISTRATIONS_TOTAL, "File server registration attempts");
    describe_counter!(DEREGISTRATIONS_TOTAL, "File server departures by reason");
    describe_counter!(ORPHANS_PURGED_TOTAL, "File records purged with their owner");
}

/// Count one controller operation.
pub fn record_operation(operation: &'static str, outcome: &'static str) {
    counter!(RPC_OPERATIONS_TOTAL, "operation" => operation, "outcome" => outcome).increment(1);
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation to avoid feedback loops.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Normalize a request path to a route template for metric labels, so file
/// names never become label values.
///
/// Examples:
/// - `/fileservers` -> `/fileservers`
/// - `/files` -> `/files`
/// - `/files/report.txt` -> `/files/{name}`
/// - `/dir/make` -> `/dir/make`
fn normalize_path(path: &str) -> String {
    match path {
        "/" | "/health" | "/metrics" | "/openapi.json" | "/fileservers" | "/files" => {
            path.to_string()
        }
        p if p.starts_with("/files/") => "/files/{name}".to_string(),
        p if p.starts_with("/dir/") || p.starts_with("/file/") => p.to_string(),
        _ => "/{other}".to_string(),
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get().and_then(|h| h.as_ref()) {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_fixed_routes() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/fileservers"), "/fileservers");
        assert_eq!(normalize_path("/files"), "/files");
    }

    #[test]
    fn test_normalize_path_file_names() {
        assert_eq!(normalize_path("/files/testfile"), "/files/{name}");
        assert_eq!(normalize_path("/files/a/b/c.txt"), "/files/{name}");
    }

    #[test]
    fn test_normalize_path_fileserver_routes() {
        assert_eq!(normalize_path("/dir/make"), "/dir/make");
        assert_eq!(normalize_path("/file/write"), "/file/write");
        assert_eq!(normalize_path("/nope/at/all"), "/{other}");
    }
}
