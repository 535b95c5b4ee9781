use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProxyError>;

/// Errors produced by the proxy itself (never upstream HTTP errors; those
/// are forwarded verbatim so the player sees the real status).
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Missing or unusable query parameter. Terminal, no retry.
    #[error("missing required parameter: {0}")]
    MissingParam(&'static str),

    /// Target URL rejected by validation (bad scheme, private address).
    #[error("invalid target URL: {0}")]
    InvalidTarget(String),

    /// Source key not configured or disabled.
    #[error("unknown source: {0}")]
    UnknownSource(String),

    /// Outbound fetch exceeded the request timeout.
    #[error("upstream request timed out")]
    UpstreamTimeout,

    /// DNS or connection failure reaching the origin.
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Anything else. Detail is only surfaced in debug builds.
    #[error("internal proxy error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingParam(_) | ProxyError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            ProxyError::UnknownSource(_) => StatusCode::NOT_FOUND,
            ProxyError::UpstreamTimeout => StatusCode::REQUEST_TIMEOUT,
            ProxyError::UpstreamUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Map a transport-level reqwest failure onto the error taxonomy.
impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProxyError::UpstreamTimeout
        } else if e.is_connect() {
            ProxyError::UpstreamUnreachable(e.to_string())
        } else {
            ProxyError::Internal(e.to_string())
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();

        match self {
            // Client input errors get a JSON body. These reach fetch() calls
            // made by our own frontend, not the HLS player.
            ProxyError::MissingParam(_)
            | ProxyError::InvalidTarget(_)
            | ProxyError::UnknownSource(_) => {
                (status, Json(json!({ "error": self.to_string() }))).into_response()
            }
            // Transport errors reach the HLS player, which cannot parse JSON
            // in place of media, so plain text only.
            ProxyError::UpstreamTimeout | ProxyError::UpstreamUnreachable(_) => (
                status,
                [(header::CONTENT_TYPE, "text/plain")],
                self.to_string(),
            )
                .into_response(),
            ProxyError::Internal(detail) => {
                let body = if cfg!(debug_assertions) {
                    format!("internal proxy error: {detail}")
                } else {
                    "internal proxy error".to_string()
                };
                (status, [(header::CONTENT_TYPE, "text/plain")], body).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert_eq!(
            ProxyError::MissingParam("url").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::UnknownSource("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ProxyError::UpstreamTimeout.status(),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            ProxyError::UpstreamUnreachable("refused".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ProxyError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn client_errors_render_json() {
        let resp = ProxyError::MissingParam("url").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let ct = resp.headers().get(header::CONTENT_TYPE).unwrap();
        assert!(ct.to_str().unwrap().contains("json"));
    }

    #[test]
    fn transport_errors_render_plain_text() {
        let resp = ProxyError::UpstreamTimeout.into_response();
        assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);
        let ct = resp.headers().get(header::CONTENT_TYPE).unwrap();
        assert_eq!(ct, "text/plain");
    }
}
