// Process-wide metrics counters (§4.11). Plain atomics behind a singleton —
// the engine never embeds an exporter; `odbc_get_metrics` is the only
// surface that reads these, and the 40-byte snapshot format is decoded by
// `protocol::metrics`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use once_cell::sync::Lazy;

pub struct Metrics {
    queries: AtomicU64,
    errors: AtomicU64,
    total_latency_ms: AtomicU64,
    start: Instant,
}

impl Metrics {
    fn new() -> Self {
        Self {
            queries: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            start: Instant::now(),
        }
    }

    pub fn record_query(&self, elapsed_ms: u64) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads each field independently; drift across fields under concurrent
    /// writers is possible but bounded, as documented in §5.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let queries = self.queries.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let total_latency_ms = self.total_latency_ms.load(Ordering::Relaxed);
        let uptime_seconds = self.start.elapsed().as_secs();
        let avg_latency_ms = if queries > 0 { total_latency_ms / queries } else { 0 };

        MetricsSnapshot {
            queries,
            errors,
            uptime_seconds,
            total_latency_ms,
            avg_latency_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub queries: u64,
    pub errors: u64,
    pub uptime_seconds: u64,
    pub total_latency_ms: u64,
    pub avg_latency_ms: u64,
}

static METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

pub fn global() -> &'static Metrics {
    &METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avg_latency_is_zero_before_any_query() {
        let m = Metrics::new();
        assert_eq!(m.snapshot().avg_latency_ms, 0);
    }

    #[test]
    fn avg_latency_divides_total_by_query_count() {
        let m = Metrics::new();
        m.record_query(100);
        m.record_query(300);
        let snap = m.snapshot();
        assert_eq!(snap.queries, 2);
        assert_eq!(snap.total_latency_ms, 400);
        assert_eq!(snap.avg_latency_ms, 200);
    }

    #[test]
    fn errors_do_not_affect_latency_average() {
        let m = Metrics::new();
        m.record_query(50);
        m.record_error();
        m.record_error();
        let snap = m.snapshot();
        assert_eq!(snap.errors, 2);
        assert_eq!(snap.avg_latency_ms, 50);
    }
}
