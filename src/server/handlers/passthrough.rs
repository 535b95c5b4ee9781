//! Byte-passthrough endpoints: `/proxy/segment` and `/proxy/key`.
//!
//! Link targets of the rewriter's output. No rewriting happens here; the
//! value added is per-source request headers and same-origin delivery. Bodies
//! stream through without buffering; corrupting a byte of segment data is
//! worse than failing the request.

use crate::{
    error::Result,
    fetch,
    server::{
        handlers::{self, m3u8::{source_param, target_param}},
        state::AppState,
        url_validation::validate_target_url,
    },
};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

pub async fn proxy_segment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    serve(state, headers, params, "segment", "video/MP2T").await
}

pub async fn proxy_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    serve(state, headers, params, "key", "application/octet-stream").await
}

async fn serve(
    state: AppState,
    headers: HeaderMap,
    params: HashMap<String, String>,
    endpoint: &'static str,
    default_content_type: &'static str,
) -> Response {
    let start = Instant::now();
    let response = match handle(&state, &headers, &params, endpoint, default_content_type).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };
    state
        .metrics
        .record_request(endpoint, response.status(), start.elapsed());
    response
}

async fn handle(
    state: &AppState,
    headers: &HeaderMap,
    params: &HashMap<String, String>,
    endpoint: &'static str,
    default_content_type: &'static str,
) -> Result<Response> {
    let target = target_param(params)?;
    let source_key = source_param(params);

    if !state.config.is_dev {
        validate_target_url(target)?;
    }
    let profile = state.resolve_source(source_key.as_deref()).await?;

    debug!("proxying {endpoint} {target} (source={:?})", source_key);

    let upstream = fetch::fetch_passthrough(
        &state.http_client,
        target,
        &profile,
        state.config.upstream_timeout,
        headers.get(header::RANGE),
    )
    .await?;

    if !upstream.status().is_success() {
        // Forward the exact upstream failure; drop cancels the transfer.
        let status = StatusCode::from_u16(upstream.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        let status_text = status.canonical_reason().unwrap_or("Upstream Error");
        drop(upstream);
        return Ok((
            status,
            [(header::CONTENT_TYPE, "text/plain")],
            status_text,
        )
            .into_response());
    }

    Ok(handlers::stream_passthrough(
        &state.metrics,
        endpoint,
        upstream,
        default_content_type,
    ))
}
