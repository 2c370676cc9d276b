// Streaming cursor entity (§4.6): holds a live cursor, a fetch/chunk
// policy, and an exhaustion flag. Rows are delivered in driver order and
// chunks are delivered in fetch order; no row is skipped or reordered.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::connection::Connection;
use crate::driver::cursor::DEFAULT_FETCH_BATCH_ROWS;
use crate::driver::DriverCursor;
use crate::error::EngineError;
use crate::protocol::{row, ColumnMeta, Value};
use crate::registries;

struct StreamState<'c> {
    cursor: DriverCursor<'c>,
    pending: Vec<Vec<Value>>,
    exhausted: bool,
}

pub struct Stream {
    pub id: u32,
    connection_id: u32,
    // Kept so `fetch` can take the owning connection's lock for each
    // individual driver call (§5), the same serialization every other
    // driver call on this connection goes through — without holding the
    // lock for the stream's whole (possibly very long) lifetime.
    conn: Arc<Connection>,
    chunk_size: usize,
    columns: Vec<ColumnMeta>,
    // SAFETY: erased to `'static`; paid back the same way as
    // `cache::StatementCache` — the owning registry entry is dropped (via
    // `stream_close` or connection teardown) before the connection's
    // driver handle it borrows from.
    state: Mutex<StreamState<'static>>,
}

impl Stream {
    pub(crate) fn new<'c>(id: u32, conn: Arc<Connection>, chunk_size: usize, mut cursor: DriverCursor<'c>) -> Self {
        let columns = cursor.columns();
        let cursor: DriverCursor<'static> = unsafe { std::mem::transmute(cursor) };
        Self {
            id,
            connection_id: conn.id,
            conn,
            chunk_size,
            columns,
            state: Mutex::new(StreamState {
                cursor,
                pending: Vec::new(),
                exhausted: false,
            }),
        }
    }

    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    /// Returns an encoded row-buffer chunk bounded by `chunk_size` bytes
    /// and whether more rows remain.
    pub fn fetch(&self) -> Result<(Vec<u8>, bool), EngineError> {
        let mut state = self.state.lock();

        let mut chunk_rows = Vec::new();
        let mut chunk_len = 0usize;

        loop {
            if state.pending.is_empty() && !state.exhausted {
                // Serializes this fetch against every other driver call on
                // the same connection; released again as soon as the batch
                // is in hand, not held for the stream's whole lifetime.
                let _conn_lock = self.conn.lock_driver();
                match state.cursor.fetch_batch()? {
                    Some(batch) if !batch.is_empty() => state.pending = batch,
                    _ => state.exhausted = true,
                }
            }

            if state.pending.is_empty() {
                break;
            }

            let candidate_len = estimate_row_len(&state.pending[0]);
            if !chunk_rows.is_empty() && chunk_len + candidate_len > self.chunk_size {
                break;
            }

            let row = state.pending.remove(0);
            chunk_len += candidate_len;
            chunk_rows.push(row);
        }

        let has_more = !state.pending.is_empty() || !state.exhausted;
        let encoded = row::encode(&self.columns, &chunk_rows)?;
        Ok((encoded, has_more))
    }
}

fn estimate_row_len(row: &[Value]) -> usize {
    row.iter()
        .map(|v| match v {
            Value::Null => 2,
            Value::String(s) => s.len() + 6,
            Value::Int32(_) => 6,
            Value::Int64(_) => 10,
            Value::NullableDouble(_) => 11,
            Value::Double(_) => 10,
            Value::NullableDateTime(_) => 11,
            Value::Binary(b) => b.len() + 6,
        })
        .sum()
}

fn open(connection_id: u32, sql: &str, fetch_size: usize, chunk_size: usize) -> Result<u32, EngineError> {
    if chunk_size == 0 {
        return Err(EngineError::Validation("chunk_size must be greater than zero".to_string()));
    }
    let conn = registries::connections().get(connection_id)?;
    let guard = conn.lock_driver();
    let cursor = guard
        .execute_streaming(sql, &[], fetch_size)?
        .ok_or_else(|| EngineError::Validation("statement produced no result set to stream".to_string()))?;
    registries::streams().insert_with(|id| Ok::<_, EngineError>(Stream::new(id, conn.clone(), chunk_size, cursor)))
}

pub fn stream_start(connection_id: u32, sql: &str, chunk_size: usize) -> Result<u32, EngineError> {
    open(connection_id, sql, DEFAULT_FETCH_BATCH_ROWS, chunk_size)
}

pub fn stream_start_batched(connection_id: u32, sql: &str, fetch_size: usize, chunk_size: usize) -> Result<u32, EngineError> {
    open(connection_id, sql, fetch_size, chunk_size)
}

pub fn stream_fetch(stream_id: u32) -> Result<(Vec<u8>, bool), EngineError> {
    registries::streams().get(stream_id)?.fetch()
}

/// Idempotent: closing an already-closed stream is a silent no-op success.
pub fn stream_close(stream_id: u32) {
    let _ = registries::streams().remove(stream_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_row_len_is_nonzero_for_nonempty_rows() {
        let row = vec![Value::Int32(1), Value::String("hi".to_string())];
        assert!(estimate_row_len(&row) > 0);
    }
}
