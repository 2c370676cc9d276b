// Connection pool (§4.8): fixed capacity, FIFO idle queue, checkout health
// check, and connection-string option parsing. Checkout blocks on a
// condition variable up to a bounded wait before failing with
// `PoolExhausted` (§9 open-question decision).

use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{info, warn};

use crate::cache::CacheConfig;
use crate::config::{extract_pool_options, PoolOptions};
use crate::connection::Connection;
use crate::error::EngineError;
use crate::registries;

struct PoolState {
    idle: VecDeque<u32>,
    in_use: HashSet<u32>,
    broken_count: u64,
    closed: bool,
}

pub struct Pool {
    pub id: u32,
    connection_string: String,
    max_size: usize,
    options: PoolOptions,
    state: Mutex<PoolState>,
    released: Condvar,
}

impl Pool {
    pub fn create(id: u32, connection_string: &str, max_size: usize) -> Result<Self, EngineError> {
        if max_size == 0 {
            return Err(EngineError::Validation("pool max_size must be greater than zero".to_string()));
        }
        let (options, sanitized) = extract_pool_options(connection_string);
        Ok(Self {
            id,
            connection_string: sanitized,
            max_size,
            options,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                in_use: HashSet::new(),
                broken_count: 0,
                closed: false,
            }),
            released: Condvar::new(),
        })
    }

    fn open_connection(&self) -> Result<u32, EngineError> {
        registries::connections().insert_with(|id| {
            Connection::open(id, &self.connection_string, CacheConfig::default())
        })
    }

    fn validate(&self, conn_id: u32) -> bool {
        if !self.options.test_on_checkout {
            return true;
        }
        match registries::connections().get(conn_id) {
            Ok(conn) => conn.is_healthy(),
            Err(_) => false,
        }
    }

    pub fn get_connection(&self) -> Result<u32, EngineError> {
        let deadline = Instant::now() + self.options.checkout_wait();
        let mut state = self.state.lock();

        loop {
            if state.closed {
                return Err(EngineError::InvalidHandle(self.id));
            }

            while let Some(candidate) = state.idle.pop_front() {
                if self.validate(candidate) {
                    state.in_use.insert(candidate);
                    return Ok(candidate);
                }
                warn!(pool = self.id, connection = candidate, "discarding broken idle connection");
                let _ = crate::connection::disconnect(candidate);
                state.broken_count += 1;
            }

            if state.idle.len() + state.in_use.len() < self.max_size {
                drop(state);
                let id = self.open_connection()?;
                let mut relocked = self.state.lock();
                relocked.in_use.insert(id);
                return Ok(id);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(EngineError::PoolExhausted(self.id));
            }
            let timeout = deadline - now;
            let result = self.released.wait_for(&mut state, timeout);
            if result.timed_out() {
                return Err(EngineError::PoolExhausted(self.id));
            }
        }
    }

    pub fn release_connection(&self, conn_id: u32) {
        let discard = match registries::connections().get(conn_id) {
            Ok(conn) => conn.has_active_transaction() || !conn.is_healthy(),
            Err(_) => true,
        };

        let mut state = self.state.lock();
        if !state.in_use.remove(&conn_id) {
            // Not one of ours; ignore rather than corrupting pool bookkeeping.
            return;
        }

        if discard {
            state.broken_count += 1;
            drop(state);
            let _ = crate::connection::disconnect(conn_id);
        } else {
            state.idle.push_back(conn_id);
        }
        self.released.notify_one();
    }

    pub fn health_check(&self) -> bool {
        let idle: Vec<u32> = self.state.lock().idle.iter().copied().collect();
        idle.iter().all(|id| self.validate(*id))
    }

    pub fn get_state(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.idle.len() + state.in_use.len(), state.idle.len())
    }

    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        let idle: Vec<u32> = state.idle.drain(..).collect();
        let in_use: Vec<u32> = state.in_use.drain().collect();
        drop(state);

        for id in idle.into_iter().chain(in_use) {
            let _ = crate::connection::disconnect(id);
        }
        info!(pool = self.id, "pool closed");
    }
}

pub fn pool_create(connection_string: &str, max_size: usize) -> Result<u32, EngineError> {
    registries::pools().insert_with(|id| Pool::create(id, connection_string, max_size))
}

pub fn pool_get_connection(pool_id: u32) -> Result<u32, EngineError> {
    registries::pools().get(pool_id)?.get_connection()
}

pub fn pool_release_connection(pool_id: u32, conn_id: u32) -> Result<(), EngineError> {
    registries::pools().get(pool_id)?.release_connection(conn_id);
    Ok(())
}

pub fn pool_health_check(pool_id: u32) -> Result<bool, EngineError> {
    Ok(registries::pools().get(pool_id)?.health_check())
}

pub fn pool_get_state(pool_id: u32) -> Result<(usize, usize), EngineError> {
    Ok(registries::pools().get(pool_id)?.get_state())
}

pub fn pool_close(pool_id: u32) -> Result<(), EngineError> {
    let pool = registries::pools().remove(pool_id)?;
    pool.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_rejects_zero_max_size() {
        assert!(Pool::create(1, "DSN=x", 0).is_err());
    }

    #[test]
    fn create_strips_pool_options_from_connection_string() {
        let pool = Pool::create(1, "DSN=x;POOL_TEST_ON_CHECKOUT=false", 4).unwrap();
        assert_eq!(pool.connection_string, "DSN=x");
        assert!(!pool.options.test_on_checkout);
    }
}
