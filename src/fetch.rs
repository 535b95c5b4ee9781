//! Outbound fetch orchestration.
//!
//! One fetch per inbound request, one deadline covering the whole exchange.
//! The shared `reqwest::Client` keeps pooled keep-alive connections so the
//! many small requests a playlist fans out into skip repeated TCP/TLS
//! handshakes. Responses are classified here: playlist bodies are read to
//! text under the same deadline, anything else is handed back still
//! streaming.

use crate::error::{ProxyError, Result};
use crate::sources::SourceProfile;
use reqwest::{
    Client, Response,
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, CACHE_CONTROL, RANGE, USER_AGENT},
};
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

/// Idle-pool sizing for the shared client (see `AppState::new`).
pub const POOL_MAX_IDLE_PER_HOST: usize = 10;
pub const POOL_IDLE_TIMEOUT_SECS: u64 = 90;
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Build the shared connection-pooled client.
pub fn build_client() -> Client {
    Client::builder()
        .pool_idle_timeout(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()
        .expect("Failed to create HTTP client")
}

/// Classified upstream result for the m3u8 endpoint.
#[derive(Debug)]
pub enum Upstream {
    /// Manifest text, fully read. `final_url` is the post-redirect URL and
    /// the only valid base for relative-URI resolution.
    Playlist {
        body: String,
        content_type: Option<String>,
        final_url: String,
    },
    /// Non-playlist payload, body not yet consumed. Stream it through.
    Binary(Response),
    /// Upstream answered with a non-2xx status. The response body has been
    /// dropped (cancelling the pooled transfer); forward status + text.
    Error {
        status: reqwest::StatusCode,
        status_text: String,
    },
}

fn outbound_headers(profile: &SourceProfile, range: Option<&HeaderValue>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(ua) = HeaderValue::from_str(&profile.user_agent) {
        headers.insert(USER_AGENT, ua);
    }
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/vnd.apple.mpegurl, application/x-mpegurl, */*"),
    );
    // Compression off: byte accounting and Range passthrough stay exact.
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    if let Some(range) = range {
        headers.insert(RANGE, range.clone());
    }
    headers
}

/// Fetch `url` and classify the response as playlist, binary, or error.
///
/// `timeout` is a single deadline spanning connect, headers, and (for
/// playlists only) the body read. Binary bodies are not read here; once
/// streaming starts the deadline no longer applies.
pub async fn fetch_classified(
    client: &Client,
    url: &str,
    profile: &SourceProfile,
    timeout: Duration,
) -> Result<Upstream> {
    let deadline = Instant::now() + timeout;

    debug!("fetching upstream {url} as {}", profile.user_agent);
    let response = timeout_at(
        deadline,
        client
            .get(url)
            .headers(outbound_headers(profile, None))
            .send(),
    )
    .await
    .map_err(|_| ProxyError::UpstreamTimeout)??;

    let status = response.status();
    if !status.is_success() {
        let status_text = status
            .canonical_reason()
            .unwrap_or("Upstream Error")
            .to_string();
        warn!("upstream {url} answered {status}");
        // Dropping the response aborts the in-flight body transfer.
        drop(response);
        return Ok(Upstream::Error {
            status,
            status_text,
        });
    }

    if !is_playlist(&response, url) {
        return Ok(Upstream::Binary(response));
    }

    // The post-redirect URL, never the one we requested.
    let final_url = response.url().to_string();
    let content_type = header_str(&response, reqwest::header::CONTENT_TYPE);

    let body = timeout_at(deadline, response.text())
        .await
        .map_err(|_| ProxyError::UpstreamTimeout)??;

    Ok(Upstream::Playlist {
        body,
        content_type,
        final_url,
    })
}

/// Fetch `url` for byte passthrough (segment/key endpoints). The deadline
/// covers connect + headers; the body streams unbounded afterwards.
pub async fn fetch_passthrough(
    client: &Client,
    url: &str,
    profile: &SourceProfile,
    timeout: Duration,
    range: Option<&HeaderValue>,
) -> Result<Response> {
    let deadline = Instant::now() + timeout;

    debug!("passthrough fetch {url}");
    let response = timeout_at(
        deadline,
        client
            .get(url)
            .headers(outbound_headers(profile, range))
            .send(),
    )
    .await
    .map_err(|_| ProxyError::UpstreamTimeout)??;

    Ok(response)
}

/// Playlist iff the content-type says so, or the requested path ends in
/// `.m3u8`. The path check compensates for origins that mislabel manifests
/// (`octet-stream` counts as a playlist hint for the same reason).
fn is_playlist(response: &Response, requested_url: &str) -> bool {
    if let Some(ct) = header_str(response, reqwest::header::CONTENT_TYPE) {
        let ct = ct.to_ascii_lowercase();
        if ct.contains("mpegurl") || ct.contains("octet-stream") {
            return true;
        }
    }
    requested_url
        .split(['?', '#'])
        .next()
        .is_some_and(|path| path.ends_with(".m3u8"))
}

fn header_str(response: &Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
