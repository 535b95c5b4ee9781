//! The manifest-rewriting endpoint: `GET /proxy/m3u8?url=...`.

use crate::{
    error::{ProxyError, Result},
    fetch::{self, Upstream},
    rewrite::{RewriteContext, rewrite_playlist},
    server::{handlers, state::AppState, url_validation::validate_target_url},
};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::time::Instant;
use tracing::info;

const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Extract the required `url` parameter.
pub(crate) fn target_param(params: &HashMap<String, String>) -> Result<&str> {
    params
        .get("url")
        .map(String::as_str)
        .filter(|u| !u.is_empty())
        .ok_or(ProxyError::MissingParam("url"))
}

/// Source key: `moontv-source` (what rewritten URLs carry) or `source`.
pub(crate) fn source_param(params: &HashMap<String, String>) -> Option<String> {
    params
        .get("moontv-source")
        .or_else(|| params.get("source"))
        .filter(|s| !s.is_empty())
        .cloned()
}

fn allow_cors_param(params: &HashMap<String, String>) -> bool {
    params
        .get("allowCORS")
        .is_some_and(|v| v == "true" || v == "1")
}

/// Scheme + host this proxy is reachable at, from the inbound request:
/// host from `Host`, scheme from `Referer` when present (the player page
/// knows whether it loaded over https), else http.
fn proxy_base(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .and_then(|r| r.split("://").next())
        .filter(|s| *s == "http" || *s == "https")
        .unwrap_or("http");
    format!("{scheme}://{host}")
}

/// Fetch a remote playlist (or raw payload) and rewrite every embedded URI
/// to route back through this origin.
pub async fn proxy_m3u8(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let start = Instant::now();
    let response = match handle(&state, &headers, &params).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };
    // Exactly one stats update per invocation, whichever branch ran.
    state
        .metrics
        .record_request("m3u8", response.status(), start.elapsed());
    response
}

async fn handle(
    state: &AppState,
    headers: &HeaderMap,
    params: &HashMap<String, String>,
) -> Result<Response> {
    let target = target_param(params)?;
    let allow_cors = allow_cors_param(params);
    let source_key = source_param(params);

    if !state.config.is_dev {
        validate_target_url(target)?;
    }
    let profile = state.resolve_source(source_key.as_deref()).await?;

    info!(
        "proxying m3u8 {target} (source={:?}, allowCORS={allow_cors})",
        source_key
    );

    let upstream = fetch::fetch_classified(
        &state.http_client,
        target,
        &profile,
        state.config.upstream_timeout,
    )
    .await?;

    match upstream {
        // The HLS client must see the real upstream failure: exact status,
        // plain text, never a JSON wrapper.
        Upstream::Error {
            status,
            status_text,
        } => {
            let status =
                StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            Ok((
                status,
                [(header::CONTENT_TYPE, "text/plain")],
                status_text,
            )
                .into_response())
        }

        Upstream::Playlist {
            body,
            content_type,
            final_url,
        } => {
            let ctx = RewriteContext {
                base_url: final_url,
                proxy_base: proxy_base(headers),
                source_key,
                allow_cors,
            };
            let rewritten = rewrite_playlist(&body, &ctx);
            state.metrics.record_bytes("m3u8", rewritten.len() as u64);

            let content_type = content_type.unwrap_or_else(|| HLS_CONTENT_TYPE.to_string());
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type.as_str()),
                    (header::CACHE_CONTROL, handlers::NO_CACHE),
                    (
                        header::ACCESS_CONTROL_ALLOW_METHODS,
                        "GET, POST, OPTIONS, HEAD",
                    ),
                    (
                        header::ACCESS_CONTROL_ALLOW_HEADERS,
                        "Content-Type, Range, Origin, Accept",
                    ),
                ],
                rewritten,
            )
                .into_response())
        }

        Upstream::Binary(upstream) => Ok(handlers::stream_passthrough(
            &state.metrics,
            "m3u8",
            upstream,
            HLS_CONTENT_TYPE,
        )),
    }
}
