use std::env;
use std::time::Duration;

/// Default outbound User-Agent applied when a source does not override it.
pub const DEFAULT_USER_AGENT: &str = "AptvPlayer/1.4.10";

/// Default whole-request timeout for outbound fetches, in seconds.
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 15;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub is_dev: bool,
    /// Whole-request timeout for each outbound fetch.
    pub upstream_timeout: Duration,
    /// User-Agent used when no source key is given or the source omits one.
    pub default_user_agent: String,
    /// Raw JSON source map (`{"key": {"user_agent": "...", "enabled": true}}`).
    ///
    /// Taken from `SOURCES_JSON` directly, or read from the file named by
    /// `SOURCES_FILE`. `None` means no sources are configured and every
    /// request carrying a source key gets a 404.
    pub sources_json: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    /// In DEV mode, provides sensible defaults. In PROD mode, PORT is required.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let is_dev = env::var("DEV_MODE")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        // Port: required in prod, defaults to 3000 in dev
        let port = if is_dev {
            env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?
        } else {
            env::var("PORT")
                .map_err(|_| "PORT is required in production")?
                .parse()?
        };

        let upstream_timeout_secs: u64 = env::var("UPSTREAM_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_UPSTREAM_TIMEOUT_SECS.to_string())
            .parse()
            .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS);

        let default_user_agent =
            env::var("DEFAULT_USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string());

        // Inline JSON wins over a file path
        let sources_json = match env::var("SOURCES_JSON") {
            Ok(json) => Some(json),
            Err(_) => match env::var("SOURCES_FILE") {
                Ok(path) => Some(
                    std::fs::read_to_string(&path)
                        .map_err(|e| format!("failed to read SOURCES_FILE {path}: {e}"))?,
                ),
                Err(_) => None,
            },
        };

        Ok(Config {
            port,
            is_dev,
            upstream_timeout: Duration::from_secs(upstream_timeout_secs),
            default_user_agent,
            sources_json,
        })
    }
}
