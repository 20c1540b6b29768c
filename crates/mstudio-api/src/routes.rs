//! API routes.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;

use crate::handlers::{captions, generate, get_job, health, list_styles, ready};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let rate_limiter = Arc::new(RateLimiterCache::new(
        state.config.rate_limit_rps,
        state.config.rate_limit_burst,
    ));

    // Submissions are the expensive part; reads stay unthrottled.
    let submit_routes = Router::new()
        .route("/generate", post(generate))
        .route("/captions", post(captions))
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let job_routes = Router::new()
        .route("/jobs/:job_id", get(get_job))
        .route("/styles", get(list_styles));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_routes = match metrics_handle {
        Some(handle) => Router::new().route("/metrics", get(move || async move { handle.render() })),
        None => Router::new(),
    };

    Router::new()
        .merge(submit_routes)
        .merge(job_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .nest_service("/videos", ServeDir::new(&state.videos_dir))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(TimeoutLayer::new(state.config.request_timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use mstudio_media::StyleRegistry;
    use mstudio_queue::{task_queue, InMemoryJobStore, TaskReceiver};
    use mstudio_worker::{JobOrchestrator, JobTask};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        _tasks: TaskReceiver<JobTask>,
        _videos: TempDir,
    }

    fn app(queue_capacity: usize) -> TestApp {
        let videos = TempDir::new().unwrap();
        std::fs::write(videos.path().join("clip.mp4"), b"mp4-bytes").unwrap();

        let (tx, rx) = task_queue(queue_capacity);
        let orchestrator = JobOrchestrator::new(Arc::new(InMemoryJobStore::new()), tx);
        let config = ApiConfig {
            rate_limit_rps: 1000,
            rate_limit_burst: 1000,
            ..ApiConfig::default()
        };
        let state = AppState::new(
            config,
            orchestrator,
            Arc::new(StyleRegistry::with_builtin_styles()),
            videos.path().to_path_buf(),
        );

        TestApp {
            router: create_router(state, None),
            _tasks: rx,
            _videos: videos,
        }
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(1);
        let response = app.router.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_generate_then_poll() {
        let app = app(2);

        let response = app
            .router
            .clone()
            .oneshot(post_json("/generate", json!({ "prompt": "a sunrise" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["status"], "processing");
        let job_id = body["job_id"].as_str().unwrap().to_string();

        let response = app
            .router
            .oneshot(get(&format!("/jobs/{}", job_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let job = json_body(response).await;
        assert_eq!(job["id"], job_id.as_str());
        assert_eq!(job["status"], "processing");
        assert_eq!(job["kind"], "render");
    }

    #[tokio::test]
    async fn test_generate_rejects_blank_prompt() {
        let app = app(1);
        let response = app
            .router
            .oneshot(post_json("/generate", json!({ "prompt": "   " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["detail"],
            "Body must contain a non-empty \"prompt\" string."
        );
    }

    #[tokio::test]
    async fn test_generate_rejects_malformed_body() {
        let app = app(1);
        let response = app
            .router
            .oneshot(post_json("/generate", json!({ "text": "wrong field" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["detail"].is_string());
    }

    #[tokio::test]
    async fn test_full_queue_returns_503() {
        let app = app(1);
        let first = app
            .router
            .clone()
            .oneshot(post_json("/generate", json!({ "prompt": "one" })))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::ACCEPTED);

        let second = app
            .router
            .oneshot(post_json("/generate", json!({ "prompt": "two" })))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(second.headers().contains_key("retry-after"));
    }

    #[tokio::test]
    async fn test_captions_validation() {
        let app = app(2);

        let bad = app
            .router
            .clone()
            .oneshot(post_json("/captions", json!({ "video_url": "ftp://host/a.mp4" })))
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let good = app
            .router
            .oneshot(post_json(
                "/captions",
                json!({ "video_url": "https://cdn.example.com/a.mp4", "mode": "burn" }),
            ))
            .await
            .unwrap();
        assert_eq!(good.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_unknown_job_is_404() {
        let app = app(1);
        let response = app.router.oneshot(get("/jobs/does-not-exist")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(json_body(response).await["detail"].is_string());
    }

    #[tokio::test]
    async fn test_styles_listed() {
        let app = app(1);
        let response = app.router.oneshot(get("/styles")).await.unwrap();
        let styles = json_body(response).await["styles"].clone();
        let ids: Vec<&str> = styles
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(ids.contains(&"heat-glow"));
        assert!(ids.contains(&"heat"));
    }

    #[tokio::test]
    async fn test_videos_served_from_disk() {
        let app = app(1);
        let response = app
            .router
            .clone()
            .oneshot(get("/videos/clip.mp4"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"mp4-bytes");

        let missing = app.router.oneshot(get("/videos/nope.mp4")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
