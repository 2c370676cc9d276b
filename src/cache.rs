// Prepared-statement cache (§4.7): one LRU per connection, keyed by exact
// SQL text, TTL-evicted, with hit/miss/prepare/execution counters.
//
// A `DriverStatement<'c>` borrows the `DriverConnection` it was prepared
// against. The cache lives alongside that connection for its whole
// lifetime, so the borrow is extended to `'static` with `unsafe` and paid
// back by construction: `Connection` (see `crate::pool`/entity layer)
// declares its cache field before its driver field, so cached statements
// are dropped before the connection they reference.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::driver::{DriverConnection, DriverStatement};
use crate::error::EngineError;
use crate::protocol::params::ParamValue;
use crate::protocol::Value;

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub max_size: usize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 64,
            ttl: Duration::from_secs(600),
        }
    }
}

impl CacheConfig {
    pub fn validated(mut self) -> Self {
        if self.max_size == 0 {
            self.max_size = 1;
        }
        self
    }
}

struct CachedStatement {
    statement: DriverStatement<'static>,
    prepared_at: Instant,
    last_used: Instant,
    execution_count: u64,
}

#[derive(Debug, Default)]
pub struct CacheCounters {
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub total_prepares: AtomicU64,
    pub total_executions: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_prepares: u64,
    pub total_executions: u64,
    pub entries: usize,
}

pub struct StatementCache {
    entries: Mutex<LruCache<String, CachedStatement>>,
    config: CacheConfig,
    counters: CacheCounters,
}

impl StatementCache {
    pub fn new(config: CacheConfig) -> Self {
        let config = config.validated();
        Self {
            entries: Mutex::new(LruCache::new(NonZeroUsize::new(config.max_size).unwrap())),
            config,
            counters: CacheCounters::default(),
        }
    }

    /// Cache activity side of `prepare(sql)` (§4.7): if present and not
    /// expired by TTL, promotes it to most-recent; else compiles against
    /// `conn`, inserts, evicting the least-recent if at capacity. Counts as
    /// one unit of "cache activity" regardless of outcome — `total_prepares`
    /// always equals `cache_hits + cache_misses`.
    pub fn ensure_prepared(&self, conn: &DriverConnection, sql: &str) -> Result<(), EngineError> {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        let expired = entries
            .peek(sql)
            .map(|cached| now.duration_since(cached.prepared_at) > self.config.ttl)
            .unwrap_or(false);
        if expired {
            entries.pop(sql);
        }

        self.counters.total_prepares.fetch_add(1, Ordering::Relaxed);
        if entries.get(sql).is_some() {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);
        let prepared = conn.prepare(sql)?;
        // SAFETY: extended to `'static` here, but never outlives `conn`
        // in practice — callers are required to drop the owning
        // `StatementCache` (and therefore every statement inside it)
        // before the `DriverConnection` it was prepared against.
        let prepared: DriverStatement<'static> = unsafe { std::mem::transmute(prepared) };
        if let Some((evicted_sql, _)) = entries.push(
            sql.to_string(),
            CachedStatement {
                statement: prepared,
                prepared_at: now,
                last_used: now,
                execution_count: 0,
            },
        ) {
            debug!(sql = %evicted_sql, "evicted prepared statement from cache");
        }
        Ok(())
    }

    /// Ensures `sql` is prepared (see `ensure_prepared`), then runs `f`
    /// against the resolved statement under the cache's lock, counting one
    /// execution. Mirrors the lifetime-erasure contract at module top.
    pub fn with_statement<R>(
        &self,
        conn: &DriverConnection,
        sql: &str,
        f: impl FnOnce(&mut DriverStatement<'_>) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        self.ensure_prepared(conn, sql)?;

        let mut entries = self.entries.lock();
        let now = Instant::now();
        let cached = entries
            .get_mut(sql)
            .expect("ensure_prepared just inserted or confirmed this entry");
        cached.last_used = now;
        cached.execution_count += 1;
        self.counters.total_executions.fetch_add(1, Ordering::Relaxed);
        f(&mut cached.statement)
    }

    pub fn close_statement(&self, sql: &str) {
        self.entries.lock().pop(sql);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
            total_prepares: self.counters.total_prepares.load(Ordering::Relaxed),
            total_executions: self.counters.total_executions.load(Ordering::Relaxed),
            entries: self.entries.lock().len(),
        }
    }
}

/// Convenience used by the execution engine: prepares (or reuses) `sql`
/// and runs it once, returning the first fetched batch only. Full
/// streaming goes through `crate::stream` instead.
pub fn execute_cached(
    cache: &StatementCache,
    conn: &DriverConnection,
    sql: &str,
    params: &[ParamValue],
) -> Result<Option<Vec<Vec<Value>>>, EngineError> {
    cache.with_statement(conn, sql, |stmt| match stmt.execute(params)? {
        Some(mut cursor) => Ok(cursor.fetch_batch()?),
        None => Ok(None),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_nonzero_capacity() {
        let cfg = CacheConfig { max_size: 0, ttl: Duration::from_secs(1) }.validated();
        assert_eq!(cfg.max_size, 1);
    }

    #[test]
    fn snapshot_starts_at_zero() {
        let cache = StatementCache::new(CacheConfig::default());
        let snap = cache.snapshot();
        assert_eq!(snap.cache_hits, 0);
        assert_eq!(snap.total_prepares, 0);
        assert_eq!(snap.entries, 0);
    }
}
