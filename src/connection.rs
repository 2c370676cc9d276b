// Connection entity (§3 DATA MODEL): a driver handle, its prepared-statement
// cache, and the bookkeeping the rest of the engine needs to enforce the
// one-active-transaction invariant.
//
// Field order matters: `cache` must drop before `driver` so every cached
// statement is released before the connection handle it was prepared
// against (see `crate::cache` module docs).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};

use crate::cache::{CacheConfig, StatementCache};
use crate::driver::DriverConnection;
use crate::error::EngineError;
use crate::registries;
use crate::transaction::Transaction;

pub struct Connection {
    pub id: u32,
    cache: StatementCache,
    driver: Mutex<DriverConnection>,
    txn_active: AtomicBool,
    created_at: Instant,
}

impl Connection {
    pub fn open(id: u32, connection_string: &str, cache_config: CacheConfig) -> Result<Self, EngineError> {
        let driver = DriverConnection::connect(connection_string)?;
        Ok(Self {
            id,
            cache: StatementCache::new(cache_config),
            driver: Mutex::new(driver),
            txn_active: AtomicBool::new(false),
            created_at: Instant::now(),
        })
    }

    /// Wraps an already-open `DriverConnection` (used by
    /// `odbc_connect_with_timeout`, which needs a non-default `connect`
    /// call before the rest of the entity can be assembled).
    pub fn from_driver(id: u32, driver: DriverConnection, cache_config: CacheConfig) -> Result<Self, EngineError> {
        Ok(Self {
            id,
            cache: StatementCache::new(cache_config),
            driver: Mutex::new(driver),
            txn_active: AtomicBool::new(false),
            created_at: Instant::now(),
        })
    }

    /// Runs `f` against the driver handle while holding this connection's
    /// internal lock (§5: "Each Connection serializes its own driver calls
    /// with an internal lock; concurrent requests against the same
    /// connection queue"). `f` must fully consume anything it borrows from
    /// the driver before returning — nothing tied to the driver's lifetime
    /// can escape, since the lock is released the moment `with_driver`
    /// returns.
    pub fn with_driver<R>(&self, f: impl FnOnce(&DriverConnection) -> R) -> R {
        f(&self.driver.lock())
    }

    /// Locks the connection without running a call through it directly —
    /// used by a long-lived streaming cursor (`crate::stream::Stream`) to
    /// serialize each individual `fetch` against other activity on the same
    /// connection without holding the lock for the stream's whole lifetime.
    pub(crate) fn lock_driver(&self) -> MutexGuard<'_, DriverConnection> {
        self.driver.lock()
    }

    pub fn cache(&self) -> &StatementCache {
        &self.cache
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    pub fn is_healthy(&self) -> bool {
        self.with_driver(|driver| driver.is_healthy())
    }

    /// Claims the one-active-transaction slot; fails if already claimed.
    pub fn begin_transaction(&self) -> Result<(), EngineError> {
        self.txn_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| EngineError::Validation("a transaction is already active on this connection".to_string()))
    }

    pub fn end_transaction(&self) {
        self.txn_active.store(false, Ordering::Release);
    }

    pub fn has_active_transaction(&self) -> bool {
        self.txn_active.load(Ordering::Acquire)
    }
}

/// Opens a standalone connection (not pool-managed) and registers it.
pub fn connect(connection_string: &str, cache_config: CacheConfig) -> Result<u32, EngineError> {
    tracing::info!(target: "odbc_engine_core::connection", "opening connection");
    registries::connections().insert_with(|id| Connection::open(id, connection_string, cache_config))
}

/// Closes a connection: auto-rolls-back any active transaction, drops its
/// statements, transactions, and streams, then drops the driver handle.
pub fn disconnect(id: u32) -> Result<(), EngineError> {
    let conn = registries::connections().remove(id)?;

    for txn in registries::transactions().remove_where(|t: &Transaction| t.connection_id == id) {
        txn.auto_rollback(&conn);
    }
    registries::statements().remove_where(|s| s.connection_id == id);
    registries::streams().remove_where(|s| s.connection_id() == id);

    tracing::info!(target: "odbc_engine_core::connection", id, "closed connection");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_begin_transaction_fails_while_one_is_active() {
        let txn_active = AtomicBool::new(false);
        assert!(txn_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok());
        assert!(txn_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err());
    }
}
