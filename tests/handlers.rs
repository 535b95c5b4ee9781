//! Handler-level tests using tower::ServiceExt::oneshot.
//!
//! Tests the full Axum router (middleware + handlers) without binding a TCP
//! listener. Faster and more deterministic than E2E tests.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use moontv_proxy::config::{Config, DEFAULT_USER_AGENT};
use moontv_proxy::server::build_router;
use std::time::Duration;
use tower::ServiceExt;

/// Build a test config with sensible defaults.
fn test_config() -> Config {
    Config {
        port: 0,
        is_dev: true,
        upstream_timeout: Duration::from_secs(5),
        default_user_agent: DEFAULT_USER_AGENT.to_string(),
        sources_json: None,
    }
}

// ── Health endpoint ─────────────────────────────────────────────────────────

#[tokio::test]
async fn health_returns_200_with_json() {
    let app = build_router(test_config());

    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert!(json["uptime_seconds"].is_number());
    assert!(json["stats"]["requests"].is_number());
    assert!(json["stats"]["errors"].is_number());
    assert!(json["stats"]["avg_response_time_ms"].is_number());
    assert!(json["stats"]["total_bytes"].is_number());
}

// ── Version header ──────────────────────────────────────────────────────────

#[tokio::test]
async fn all_responses_include_version_header() {
    let app = build_router(test_config());

    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    let version = resp
        .headers()
        .get("x-proxy-version")
        .expect("missing x-proxy-version header");

    assert_eq!(version.to_str().unwrap(), env!("CARGO_PKG_VERSION"));
}

// ── 404 for unknown routes ──────────────────────────────────────────────────

#[tokio::test]
async fn unknown_route_returns_404() {
    let app = build_router(test_config());

    let req = Request::builder()
        .uri("/nonexistent")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ── Client input errors ─────────────────────────────────────────────────────

#[tokio::test]
async fn missing_url_param_returns_400_json() {
    let app = build_router(test_config());

    let req = Request::builder()
        .uri("/proxy/m3u8")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("url"));
}

#[tokio::test]
async fn empty_url_param_returns_400() {
    let app = build_router(test_config());

    let req = Request::builder()
        .uri("/proxy/m3u8?url=")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_source_returns_404() {
    let app = build_router(test_config());

    let req = Request::builder()
        .uri("/proxy/m3u8?url=https%3A%2F%2Fcdn.example.com%2Fx.m3u8&moontv-source=ghost")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn disabled_source_returns_404() {
    let mut config = test_config();
    config.sources_json = Some(r#"{"dead":{"user_agent":"UA","enabled":false}}"#.to_string());
    let app = build_router(config);

    let req = Request::builder()
        .uri("/proxy/m3u8?url=https%3A%2F%2Fcdn.example.com%2Fx.m3u8&moontv-source=dead")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn segment_endpoint_requires_url_param() {
    let app = build_router(test_config());

    let req = Request::builder()
        .uri("/proxy/segment")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ── SSRF guard (prod mode only) ─────────────────────────────────────────────

#[tokio::test]
async fn prod_mode_blocks_private_targets() {
    let mut config = test_config();
    config.is_dev = false;
    let app = build_router(config);

    let req = Request::builder()
        .uri("/proxy/m3u8?url=http%3A%2F%2F169.254.169.254%2Fmeta")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ── CORS ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn responses_carry_allow_origin() {
    let app = build_router(test_config());

    let req = Request::builder()
        .uri("/health")
        .header("origin", "https://app.example")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .expect("missing allow-origin"),
        "*"
    );
}

#[tokio::test]
async fn preflight_allows_get_and_range() {
    let app = build_router(test_config());

    let req = Request::builder()
        .method("OPTIONS")
        .uri("/proxy/segment")
        .header("origin", "https://app.example")
        .header("access-control-request-method", "GET")
        .header("access-control-request-headers", "range")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let methods = resp
        .headers()
        .get("access-control-allow-methods")
        .unwrap()
        .to_str()
        .unwrap()
        .to_ascii_uppercase();
    assert!(methods.contains("GET"));

    let headers = resp
        .headers()
        .get("access-control-allow-headers")
        .unwrap()
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(headers.contains("range"));
}

// ── Metrics endpoint ────────────────────────────────────────────────────────

#[tokio::test]
async fn metrics_endpoint_renders_prometheus_text() {
    let app = build_router(test_config());

    // Drive one request through a handler so at least one series exists.
    let req = Request::builder()
        .uri("/proxy/m3u8")
        .body(Body::empty())
        .unwrap();
    let _ = app.clone().oneshot(req).await.unwrap();

    let req = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("proxy_requests_total"));
}
