//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder. Job metrics recorded by the worker
/// crate end up in the same registry.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "mstudio_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "mstudio_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "mstudio_http_requests_in_flight";
    pub const RATE_LIMIT_HITS_TOTAL: &str = "mstudio_rate_limit_hits_total";
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Collapse per-job and per-file segments so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    let mut out = Vec::new();
    let mut segments = path.split('/').peekable();
    while let Some(segment) = segments.next() {
        out.push(segment);
        match segment {
            "jobs" if segments.peek().is_some() => {
                segments.next();
                out.push(":job_id");
            }
            "videos" if segments.peek().is_some() => {
                segments.by_ref().for_each(drop);
                out.push(":file");
            }
            _ => {}
        }
    }
    out.join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/jobs/550e8400-e29b-41d4-a716-446655440000"),
            "/jobs/:job_id"
        );
        assert_eq!(sanitize_path("/videos/abc-captioned.mp4"), "/videos/:file");
        assert_eq!(sanitize_path("/generate"), "/generate");
        assert_eq!(sanitize_path("/jobs"), "/jobs");
    }
}
