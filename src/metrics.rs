//! Process-lifetime request statistics.
//!
//! A single [`MetricsRegistry`] is constructed in `AppState` at startup and
//! shared by every handler. Counters are best-effort diagnostics: updates use
//! relaxed atomics and the rolling mean tolerates races under concurrent
//! load. Each update is mirrored into the `metrics` facade so the Prometheus
//! exporter sees the same numbers.

use axum::http::StatusCode;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Snapshot of the counters, serialized into the health endpoint body.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub avg_response_time_ms: f64,
    pub total_bytes: u64,
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    requests: AtomicU64,
    errors: AtomicU64,
    total_bytes: AtomicU64,
    /// Incremental mean of response time in ms, stored as f64 bits.
    avg_ms_bits: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed request: exactly one call per handler invocation,
    /// whichever branch it took.
    pub fn record_request(&self, endpoint: &'static str, status: StatusCode, elapsed: Duration) {
        let n = self.requests.fetch_add(1, Ordering::Relaxed) + 1;
        if status.is_client_error() || status.is_server_error() {
            self.errors.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("proxy_errors_total", "endpoint" => endpoint).increment(1);
        }

        let sample = elapsed.as_secs_f64() * 1000.0;
        // Racy read-modify-write is fine here: the mean is observability-only.
        let old = f64::from_bits(self.avg_ms_bits.load(Ordering::Relaxed));
        let new = old + (sample - old) / n as f64;
        self.avg_ms_bits.store(new.to_bits(), Ordering::Relaxed);

        metrics::counter!(
            "proxy_requests_total",
            "endpoint" => endpoint,
            "status" => status.as_u16().to_string()
        )
        .increment(1);
        metrics::histogram!("proxy_request_duration_ms", "endpoint" => endpoint).record(sample);
    }

    /// Add bytes served to the running total (playlist bodies and passthrough
    /// payloads with a known length).
    pub fn record_bytes(&self, endpoint: &'static str, bytes: u64) {
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
        metrics::counter!("proxy_bytes_total", "endpoint" => endpoint).increment(bytes);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            avg_response_time_ms: f64::from_bits(self.avg_ms_bits.load(Ordering::Relaxed)),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_requests_and_errors() {
        let reg = MetricsRegistry::new();
        reg.record_request("m3u8", StatusCode::OK, Duration::from_millis(10));
        reg.record_request("m3u8", StatusCode::NOT_FOUND, Duration::from_millis(20));
        reg.record_request("segment", StatusCode::BAD_GATEWAY, Duration::from_millis(30));

        let snap = reg.snapshot();
        assert_eq!(snap.requests, 3);
        assert_eq!(snap.errors, 2);
    }

    #[test]
    fn incremental_mean_converges() {
        let reg = MetricsRegistry::new();
        reg.record_request("m3u8", StatusCode::OK, Duration::from_millis(10));
        reg.record_request("m3u8", StatusCode::OK, Duration::from_millis(30));

        let snap = reg.snapshot();
        assert!((snap.avg_response_time_ms - 20.0).abs() < 0.5);
    }

    #[test]
    fn byte_total_accumulates() {
        let reg = MetricsRegistry::new();
        reg.record_bytes("segment", 1024);
        reg.record_bytes("m3u8", 512);
        assert_eq!(reg.snapshot().total_bytes, 1536);
    }

    #[test]
    fn fresh_registry_is_zeroed() {
        let snap = MetricsRegistry::new().snapshot();
        assert_eq!(snap.requests, 0);
        assert_eq!(snap.errors, 0);
        assert_eq!(snap.total_bytes, 0);
        assert_eq!(snap.avg_response_time_ms, 0.0);
    }
}
