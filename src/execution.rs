// Execution engine (§4.5): the query entry points the FFI layer calls
// directly, each producing a row-buffer (or multi-result payload) and
// recording latency/error counters on the process-wide metrics singleton.

use std::time::{Duration, Instant};

use crate::driver::cursor::DriverCursor;
use crate::error::EngineError;
use crate::metrics;
use crate::protocol::params::ParamValue;
use crate::protocol::{multi, row, Value};
use crate::registries;

/// Engine-wide cap on a single row-buffer result (§4.5 invariant).
/// Exceeding it fails with `BufferOverflow` so the caller can switch to
/// `stream_start`/`stream_start_batched` instead.
pub const MAX_RESULT_BUFFER_BYTES: usize = 16 * 1024 * 1024;

fn timed<T>(f: impl FnOnce() -> Result<T, EngineError>) -> Result<T, EngineError> {
    let start = Instant::now();
    let result = f();
    let elapsed_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => metrics::global().record_query(elapsed_ms),
        Err(_) => metrics::global().record_error(),
    }
    result
}

fn materialize(mut cursor: DriverCursor<'_>) -> Result<Vec<Vec<Value>>, EngineError> {
    let mut rows = Vec::new();
    while let Some(batch) = cursor.fetch_batch()? {
        rows.extend(batch);
    }
    Ok(rows)
}

fn encode_capped(columns: &[crate::protocol::ColumnMeta], rows: &[Vec<Value>]) -> Result<Vec<u8>, EngineError> {
    let encoded = row::encode(columns, rows)?;
    if encoded.len() > MAX_RESULT_BUFFER_BYTES {
        return Err(EngineError::BufferOverflow {
            actual: encoded.len(),
            cap: MAX_RESULT_BUFFER_BYTES,
        });
    }
    Ok(encoded)
}

/// One-shot query or DML with no parameters. DML results carry their
/// affected-row count as a row count against zero columns.
pub fn exec_query(connection_id: u32, sql: &str) -> Result<Vec<u8>, EngineError> {
    exec_query_params(connection_id, sql, &[])
}

pub fn exec_query_params(connection_id: u32, sql: &str, params: &[ParamValue]) -> Result<Vec<u8>, EngineError> {
    timed(|| {
        let conn = registries::connections().get(connection_id)?;
        conn.with_driver(|driver| {
            let (cursor, affected) = driver.execute_returning_affected(sql, params)?;
            match cursor {
                Some(mut cursor) => {
                    let columns = cursor.columns();
                    let rows = materialize(cursor)?;
                    encode_capped(&columns, &rows)
                }
                None => encode_capped(&[], &vec![Vec::new(); affected as usize]),
            }
        })
    })
}

pub fn exec_query_multi(connection_id: u32, sql: &str) -> Result<Vec<u8>, EngineError> {
    timed(|| {
        let conn = registries::connections().get(connection_id)?;
        let frames = conn.with_driver(|driver| driver.execute_multi(sql, &[]))?;
        let encoded = multi::encode(&frames)?;
        if encoded.len() > MAX_RESULT_BUFFER_BYTES {
            return Err(EngineError::BufferOverflow {
                actual: encoded.len(),
                cap: MAX_RESULT_BUFFER_BYTES,
            });
        }
        Ok(encoded)
    })
}

/// Runs a prepared statement. `timeout_override_ms = 0` inherits the
/// statement's own timeout and goes through the statement cache;
/// any other value bypasses the cache for a one-off timed execution,
/// since the cached path has no per-call timeout hook.
pub fn execute(stmt_id: u32, params: &[ParamValue], timeout_override_ms: u64, fetch_size: u32) -> Result<Vec<u8>, EngineError> {
    timed(|| {
        let stmt = registries::statements().get(stmt_id)?;
        let conn = registries::connections().get(stmt.connection_id)?;

        if timeout_override_ms == 0 {
            let rows = conn
                .with_driver(|driver| crate::cache::execute_cached(conn.cache(), driver, &stmt.sql, params))?
                .unwrap_or_default();
            return encode_capped(&[], &rows);
        }

        let timeout = Some(Duration::from_millis(timeout_override_ms));
        let fetch = if fetch_size == 0 { None } else { Some(fetch_size as usize) };
        conn.with_driver(|driver| {
            let cursor = driver.execute_with_timeout(&stmt.sql, params, timeout, fetch)?;
            match cursor {
                Some(mut cursor) => {
                    let columns = cursor.columns();
                    let rows = materialize(cursor)?;
                    encode_capped(&columns, &rows)
                }
                None => encode_capped(&[], &[]),
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_capped_rejects_oversized_payload() {
        let columns = vec![crate::protocol::ColumnMeta::new("c", 1)];
        let huge_row = vec![Value::String("x".repeat(MAX_RESULT_BUFFER_BYTES + 1))];
        let err = encode_capped(&columns, &[huge_row]).unwrap_err();
        assert!(matches!(err, EngineError::BufferOverflow { .. }));
    }

    #[test]
    fn encode_capped_accepts_small_payload() {
        let columns = vec![crate::protocol::ColumnMeta::new("c", 1)];
        let rows = vec![vec![Value::Int32(1)]];
        assert!(encode_capped(&columns, &rows).is_ok());
    }
}
