pub mod handlers;
pub mod state;
pub mod url_validation;

use crate::config::Config;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    response::Response,
    routing::get,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use state::AppState;
use std::sync::OnceLock;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// The Prometheus recorder is global to the process; install it once and
/// reuse the handle across routers (tests build several).
static PROMETHEUS: OnceLock<PrometheusHandle> = OnceLock::new();

fn prometheus_handle() -> PrometheusHandle {
    PROMETHEUS
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("Failed to install Prometheus recorder")
        })
        .clone()
}

/// Build the full router with middleware and shared state.
pub fn build_router(config: Config) -> Router {
    let state = AppState::new(config);
    let prometheus = prometheus_handle();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::HEAD])
        .allow_headers([
            header::CONTENT_TYPE,
            header::RANGE,
            header::ORIGIN,
            header::ACCEPT,
        ]);

    Router::new()
        .route("/", get(handlers::health::health_check))
        .route("/health", get(handlers::health::health_check))
        .route("/proxy/m3u8", get(handlers::m3u8::proxy_m3u8))
        .route("/proxy/segment", get(handlers::passthrough::proxy_segment))
        .route("/proxy/key", get(handlers::passthrough::proxy_key))
        .route("/metrics", get(move || async move { prometheus.render() }))
        .layer(cors)
        .layer(axum::middleware::map_response(version_header))
        .with_state(state)
}

/// Stamp every response with the running version.
async fn version_header(mut response: Response) -> Response {
    response.headers_mut().insert(
        "x-proxy-version",
        HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
    );
    response
}

/// Start the Axum HTTP server
pub async fn start(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("0.0.0.0:{}", config.port);
    let app = build_router(config);

    let listener = match tokio::net::TcpListener::bind(addr.as_str()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            return Err(e.into());
        }
    };

    info!("Proxy listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
