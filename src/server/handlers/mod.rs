pub mod health;
pub mod m3u8;
pub mod passthrough;

use crate::metrics::MetricsRegistry;
use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures_util::TryStreamExt;
use tracing::warn;

pub(crate) const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

/// Headers copied verbatim from upstream on a passthrough response.
const COPIED_HEADERS: [header::HeaderName; 3] = [
    header::CONTENT_LENGTH,
    header::CONTENT_RANGE,
    header::ACCEPT_RANGES,
];

/// Stream an upstream body through unmodified.
///
/// Forwards the upstream status (200/206), copies the payload-describing
/// headers, and hands the byte stream to the response body without buffering.
pub(crate) fn stream_passthrough(
    metrics: &MetricsRegistry,
    endpoint: &'static str,
    upstream: reqwest::Response,
    default_content_type: &'static str,
) -> Response {
    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut builder = Response::builder().status(status);

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(default_content_type));
    builder = builder.header(header::CONTENT_TYPE, content_type);

    for name in COPIED_HEADERS {
        if let Some(value) = upstream.headers().get(&name) {
            builder = builder.header(name, value.clone());
        }
    }
    builder = builder.header(header::CACHE_CONTROL, NO_CACHE);

    if let Some(len) = upstream.content_length() {
        metrics.record_bytes(endpoint, len);
    }

    let stream = upstream.bytes_stream().map_err(std::io::Error::other);
    match builder.body(Body::from_stream(stream)) {
        Ok(response) => response,
        Err(e) => {
            warn!("failed to build passthrough response: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "passthrough error").into_response()
        }
    }
}
