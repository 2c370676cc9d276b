// Streaming cursor wrapper (§4.12). Result sets are fetched through
// `odbc_api::buffers::TextRowSet`, the crate's schema-agnostic buffer type,
// since the engine has no compile-time knowledge of a query's column types.
// Column values are converted to typed protocol `Value`s using the type
// mapping resolved once at cursor construction.

use odbc_api::buffers::{BufferDesc, TextRowSet};
use odbc_api::Cursor as OdbcCursor;
use odbc_api::ResultSetMetadata;

use crate::driver::type_map::{self, TAG_INT32, TAG_INT64, TAG_NULLABLE_DATETIME, TAG_NULLABLE_DOUBLE};
use crate::error::EngineError;
use crate::protocol::{ColumnMeta, Value};

/// Default driver-side fetch batch size when a caller does not request a
/// specific one (one-shot `execute`, not `stream_start_batched`).
pub const DEFAULT_FETCH_BATCH_ROWS: usize = 256;
const TEXT_MAX_COLUMN_BYTES: usize = 8 * 1024;

trait TextFetch {
    fn fetch_next(&mut self) -> Result<Option<TextRowSet>, odbc_api::Error>;
}

impl<C: OdbcCursor> TextFetch for odbc_api::buffers::BlockCursor<C, TextRowSet> {
    fn fetch_next(&mut self) -> Result<Option<TextRowSet>, odbc_api::Error> {
        Ok(self.fetch()?.cloned())
    }
}

struct ColumnPlan {
    meta: ColumnMeta,
    tag: u8,
}

pub struct DriverCursor<'c> {
    inner: Box<dyn TextFetch + 'c>,
    plan: Vec<ColumnPlan>,
}

impl<'c> DriverCursor<'c> {
    pub(crate) fn new<C: OdbcCursor + 'c>(cursor: C) -> Result<Self, EngineError> {
        Self::with_batch_size(cursor, DEFAULT_FETCH_BATCH_ROWS)
    }

    pub(crate) fn with_batch_size<C: OdbcCursor + 'c>(mut cursor: C, batch_rows: usize) -> Result<Self, EngineError> {
        let plan = describe(&mut cursor)?;
        let descs: Vec<BufferDesc> = plan
            .iter()
            .map(|_| BufferDesc::Text {
                max_str_len: TEXT_MAX_COLUMN_BYTES,
            })
            .collect();
        let buffer = TextRowSet::from_descs(batch_rows.max(1), descs);
        let block_cursor = cursor
            .bind_buffer(buffer)
            .map_err(|e| EngineError::Query(format!("failed to bind result buffer: {e}")))?;
        Ok(Self {
            inner: Box::new(block_cursor),
            plan,
        })
    }

    pub fn columns(&self) -> Vec<ColumnMeta> {
        self.plan.iter().map(|p| p.meta.clone()).collect()
    }

    /// Pulls the next driver-side batch and converts it to protocol values.
    /// Returns `Ok(None)` once the result set is exhausted.
    pub fn fetch_batch(&mut self) -> Result<Option<Vec<Vec<Value>>>, EngineError> {
        let batch = self
            .inner
            .fetch_next()
            .map_err(|e| EngineError::Query(format!("fetch failed: {e}")))?;
        let Some(batch) = batch else { return Ok(None) };

        let mut rows = Vec::with_capacity(batch.num_rows());
        for row_idx in 0..batch.num_rows() {
            let mut row = Vec::with_capacity(self.plan.len());
            for (col_idx, plan) in self.plan.iter().enumerate() {
                row.push(convert_cell(batch.at(col_idx, row_idx), plan.tag)?);
            }
            rows.push(row);
        }
        Ok(Some(rows))
    }
}

// Holds a `Box<dyn TextFetch>` over an `odbc_api` cursor, itself a raw
// `SQLHSTMT`. `crate::stream::Stream` keeps one of these alive for a
// handle's whole lifetime inside a `parking_lot::Mutex`, so it must be
// `Send`; paired with `Sync` per the same ODBC-handle-wrapper convention as
// `DriverConnection`/`DriverStatement`. Every fetch on a live stream is
// additionally serialized against the owning connection's own lock (see
// `Stream::fetch`), so this is never accessed from two threads at once in
// practice.
unsafe impl Send for DriverCursor<'_> {}
unsafe impl Sync for DriverCursor<'_> {}

/// Fully drains one result set of a multi-result-set batch and hands the
/// underlying statement handle back via `unbind`, so the caller can advance
/// to the next result set with `more_results`. Unlike `DriverCursor`, which
/// streams lazily, this is only used by `exec_query_multi`, which must
/// materialize each result set before the driver lets it move on.
pub(crate) fn drain_and_unbind<C: OdbcCursor>(mut cursor: C) -> Result<(Vec<ColumnMeta>, Vec<Vec<Value>>, C), EngineError> {
    let plan = describe(&mut cursor)?;
    let descs: Vec<BufferDesc> = plan
        .iter()
        .map(|_| BufferDesc::Text {
            max_str_len: TEXT_MAX_COLUMN_BYTES,
        })
        .collect();
    let buffer = TextRowSet::from_descs(DEFAULT_FETCH_BATCH_ROWS, descs);
    let mut block_cursor = cursor
        .bind_buffer(buffer)
        .map_err(|e| EngineError::Query(format!("failed to bind result buffer: {e}")))?;

    let mut rows = Vec::new();
    while let Some(batch) = block_cursor
        .fetch()
        .map_err(|e| EngineError::Query(format!("fetch failed: {e}")))?
    {
        for row_idx in 0..batch.num_rows() {
            let mut row = Vec::with_capacity(plan.len());
            for (col_idx, p) in plan.iter().enumerate() {
                row.push(convert_cell(batch.at(col_idx, row_idx), p.tag)?);
            }
            rows.push(row);
        }
    }

    let columns = plan.iter().map(|p| p.meta.clone()).collect();
    let raw = block_cursor
        .unbind()
        .map_err(|e| EngineError::Query(format!("unbind failed: {e}")))?;
    Ok((columns, rows, raw))
}

fn describe(cursor: &mut impl OdbcCursor) -> Result<Vec<ColumnPlan>, EngineError> {
    let count = cursor
        .num_result_cols()
        .map_err(|e| EngineError::Query(format!("num_result_cols failed: {e}")))?;

    let mut plan = Vec::with_capacity(count.max(0) as usize);
    for col in 1..=count {
        let col = col as u16;
        let mut name_buf = Vec::new();
        cursor
            .col_name(col, &mut name_buf)
            .map_err(|e| EngineError::Query(format!("col_name failed: {e}")))?;
        let name = String::from_utf8_lossy(&name_buf).trim_end_matches('\0').to_string();
        let data_type = cursor
            .col_data_type(col)
            .map_err(|e| EngineError::Query(format!("col_data_type failed: {e}")))?;
        let (tag, odbc_type_code) = type_map::map(data_type);
        plan.push(ColumnPlan {
            meta: ColumnMeta::new(name, odbc_type_code),
            tag,
        });
    }
    Ok(plan)
}

fn convert_cell(text: Option<&[u8]>, tag: u8) -> Result<Value, EngineError> {
    let Some(bytes) = text else {
        return Ok(Value::Null);
    };
    let text = String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string();
    if text.is_empty() && tag != crate::driver::type_map::TAG_STRING {
        return Ok(Value::Null);
    }

    Ok(match tag {
        TAG_INT32 => Value::Int32(
            text.parse()
                .map_err(|e| EngineError::StreamingProtocol(format!("driver returned non-int32 text '{text}': {e}")))?,
        ),
        TAG_INT64 => Value::Int64(
            text.parse()
                .map_err(|e| EngineError::StreamingProtocol(format!("driver returned non-int64 text '{text}': {e}")))?,
        ),
        TAG_NULLABLE_DOUBLE => Value::NullableDouble(Some(text.parse().map_err(|e| {
            EngineError::StreamingProtocol(format!("driver returned non-numeric text '{text}': {e}"))
        })?)),
        TAG_NULLABLE_DATETIME => Value::NullableDateTime(Some(parse_epoch_millis(&text)?)),
        _ => Value::String(text),
    })
}

/// Parses the conventional ODBC timestamp text form `YYYY-MM-DD HH:MM:SS[.fraction]`.
fn parse_epoch_millis(text: &str) -> Result<u64, EngineError> {
    use chrono::NaiveDateTime;

    let parsed = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d"))
        .map_err(|e| EngineError::StreamingProtocol(format!("driver returned unparseable timestamp '{text}': {e}")))?;
    Ok(parsed.and_utc().timestamp_millis().max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_timestamp_with_fraction() {
        assert!(parse_epoch_millis("2026-08-01 12:30:00.500").is_ok());
    }

    #[test]
    fn parses_date_only() {
        assert!(parse_epoch_millis("2026-08-01").is_ok());
    }

    #[test]
    fn rejects_garbage_timestamp() {
        assert!(parse_epoch_millis("not-a-date").is_err());
    }
}
