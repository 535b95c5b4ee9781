//! Source configuration lookup.
//!
//! A "source" is an upstream media provider with its own fetch parameters
//! (today: the outbound User-Agent and an enabled flag). The proxy consults
//! the registry once per request; the rewriter then threads the source key
//! through every proxied URL it emits so recursive fetches resolve the same
//! profile.

use crate::config::DEFAULT_USER_AGENT;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

/// Per-source outbound fetch parameters.
#[derive(Debug, Clone)]
pub struct SourceProfile {
    pub key: Option<String>,
    pub user_agent: String,
    pub enabled: bool,
}

impl SourceProfile {
    /// Profile used for requests that carry no source key.
    pub fn default_with_agent(user_agent: &str) -> Self {
        Self {
            key: None,
            user_agent: user_agent.to_string(),
            enabled: true,
        }
    }
}

/// Lookup seam so handlers never depend on where source config lives.
#[async_trait]
pub trait SourceLookup: Send + Sync {
    /// Returns the profile for `key`, or `None` when the key is unknown.
    /// Disabled sources are returned as-is; callers decide how to fail.
    async fn lookup(&self, key: &str) -> Option<SourceProfile>;
}

/// Wire shape of one entry in the JSON source map.
#[derive(Debug, Deserialize)]
struct SourceEntry {
    #[serde(default)]
    user_agent: Option<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// In-memory registry parsed once from JSON at startup.
#[derive(Debug, Default)]
pub struct StaticSourceRegistry {
    sources: HashMap<String, SourceProfile>,
}

impl StaticSourceRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse `{"key": {"user_agent": "...", "enabled": true}}`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: HashMap<String, SourceEntry> = serde_json::from_str(json)?;
        let sources = raw
            .into_iter()
            .map(|(key, entry)| {
                let profile = SourceProfile {
                    key: Some(key.clone()),
                    user_agent: entry
                        .user_agent
                        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
                    enabled: entry.enabled,
                };
                (key, profile)
            })
            .collect();
        Ok(Self { sources })
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl SourceLookup for StaticSourceRegistry {
    async fn lookup(&self, key: &str) -> Option<SourceProfile> {
        self.sources.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_source_map() {
        let reg = StaticSourceRegistry::from_json(
            r#"{"alpha":{"user_agent":"CustomUA/2.0"},"beta":{"enabled":false}}"#,
        )
        .unwrap();
        assert_eq!(reg.len(), 2);

        let alpha = reg.lookup("alpha").await.unwrap();
        assert_eq!(alpha.user_agent, "CustomUA/2.0");
        assert!(alpha.enabled);
        assert_eq!(alpha.key.as_deref(), Some("alpha"));

        let beta = reg.lookup("beta").await.unwrap();
        assert!(!beta.enabled);
        assert_eq!(beta.user_agent, DEFAULT_USER_AGENT);
    }

    #[tokio::test]
    async fn unknown_key_is_none() {
        let reg = StaticSourceRegistry::empty();
        assert!(reg.lookup("nope").await.is_none());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(StaticSourceRegistry::from_json("{not json").is_err());
    }

    #[test]
    fn default_profile_uses_given_agent() {
        let p = SourceProfile::default_with_agent("UA/1");
        assert_eq!(p.user_agent, "UA/1");
        assert!(p.enabled);
        assert!(p.key.is_none());
    }
}
