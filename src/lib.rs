//! HLS (M3U8) manifest-rewriting reverse proxy.
//!
//! Fetches a remote HLS playlist (or raw media segment) on behalf of a
//! browser player and rewrites every embedded URI (segments, keys,
//! sub-manifests, alternate renditions) so all sub-requests route back
//! through this origin, carrying per-source credentials outbound.

pub mod config;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod rewrite;
pub mod server;
pub mod sources;
