use crate::{
    config::Config,
    error::{ProxyError, Result},
    fetch,
    metrics::MetricsRegistry,
    sources::{SourceLookup, SourceProfile, StaticSourceRegistry},
};
use reqwest::Client;
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Shared HTTP client for connection pooling
    pub http_client: Client,
    /// Source configuration lookup
    pub sources: Arc<dyn SourceLookup>,
    /// Process-lifetime request statistics
    pub metrics: Arc<MetricsRegistry>,
    /// Process start, for the health endpoint's uptime
    pub started: Instant,
}

impl AppState {
    /// Create a new AppState with the given configuration
    pub fn new(config: Config) -> Self {
        let registry = match &config.sources_json {
            Some(json) => {
                StaticSourceRegistry::from_json(json).expect("SOURCES_JSON is not valid JSON")
            }
            None => StaticSourceRegistry::empty(),
        };

        Self {
            config: Arc::new(config),
            http_client: fetch::build_client(),
            sources: Arc::new(registry),
            metrics: Arc::new(MetricsRegistry::new()),
            started: Instant::now(),
        }
    }

    /// Resolve the fetch profile for an optional source key.
    ///
    /// No key means the default profile. A key that is unknown or points at
    /// a disabled source is a hard 404, never a silent fallback.
    pub async fn resolve_source(&self, key: Option<&str>) -> Result<SourceProfile> {
        match key {
            None => Ok(SourceProfile::default_with_agent(
                &self.config.default_user_agent,
            )),
            Some(k) => match self.sources.lookup(k).await {
                Some(profile) if profile.enabled => Ok(profile),
                _ => Err(ProxyError::UnknownSource(k.to_string())),
            },
        }
    }
}
