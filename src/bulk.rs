// Bulk-insert pipeline (§4.10): decodes the column-major wire payload,
// binds one row at a time against a single prepared `INSERT`, and — for
// the parallel path — partitions rows across pool-checked-out connections
// on plain OS threads (§5: no async runtime backs any driver call here).

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::EngineError;
use crate::pool::Pool;
use crate::protocol::bulk::{self, BulkCell, BulkColumn, BulkPayload};
use crate::protocol::params::ParamValue;
use crate::registries;

fn build_insert_sql(table: &str, columns: &[BulkColumn]) -> String {
    let col_list = columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ");
    let placeholders = columns.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    format!("INSERT INTO {table} ({col_list}) VALUES ({placeholders})")
}

fn cell_to_param(cell: &BulkCell) -> ParamValue {
    match cell {
        BulkCell::Int32(v) => ParamValue::Int32(*v),
        BulkCell::Int64(v) => ParamValue::Int64(*v),
        BulkCell::Text(s) => ParamValue::String(s.clone()),
        BulkCell::Decimal(s) => ParamValue::Decimal(s.clone()),
        BulkCell::Binary(b) => ParamValue::Binary(b.clone()),
        BulkCell::Timestamp(ts) => ParamValue::String(format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:09}",
            ts.year, ts.month, ts.day, ts.hour, ts.minute, ts.second, ts.fraction_ns
        )),
    }
}

fn row_params(payload: &BulkPayload, row_idx: usize) -> Vec<ParamValue> {
    payload
        .cells
        .iter()
        .map(|column| match &column[row_idx] {
            Some(cell) => cell_to_param(cell),
            None => ParamValue::Null,
        })
        .collect()
}

fn insert_payload(conn: &crate::connection::Connection, payload: &BulkPayload) -> Result<u32, EngineError> {
    let row_count = payload.cells.first().map(|c| c.len()).unwrap_or(0);
    if row_count == 0 {
        return Ok(0);
    }
    let sql = build_insert_sql(&payload.table_name, &payload.columns);
    conn.with_driver(|driver| {
        let mut stmt = driver.prepare(&sql)?;
        for row_idx in 0..row_count {
            stmt.execute(&row_params(payload, row_idx))?;
        }
        Ok(row_count as u32)
    })
}

/// Decodes and inserts `payload_bytes` against a single connection. Row
/// validation (null-in-non-nullable, type mismatch) happens inside
/// `protocol::bulk::decode`, so a malformed payload fails with
/// `BulkValidation` before any row reaches the driver.
pub fn bulk_insert_array(connection_id: u32, payload_bytes: &[u8]) -> Result<u32, EngineError> {
    let payload = bulk::decode(payload_bytes)?;
    let conn = registries::connections().get(connection_id)?;
    insert_payload(&conn, &payload)
}

/// Outcome of `bulk_insert_parallel`: `rows_inserted` is meaningful even
/// when `result` is an error, since successful partitions are not rolled
/// back (§7, §9 — at-least-once semantics when `parallelism > 1`).
pub struct BulkInsertReport {
    pub rows_inserted: u32,
    pub result: Result<(), EngineError>,
}

fn partition_bounds(row_count: usize, parallelism: usize, partition: usize) -> (usize, usize) {
    let base = row_count / parallelism;
    let remainder = row_count % parallelism;
    let start = partition * base + partition.min(remainder);
    let extra = if partition < remainder { 1 } else { 0 };
    (start, start + base + extra)
}

fn slice_payload(payload: &BulkPayload, start: usize, end: usize) -> BulkPayload {
    BulkPayload {
        table_name: payload.table_name.clone(),
        columns: payload.columns.clone(),
        cells: payload.cells.iter().map(|col| col[start..end].to_vec()).collect(),
    }
}

/// Partitions `payload_bytes` across up to `parallelism` pool-checked-out
/// connections joined via a scoped-thread barrier. `parallelism <= 1`
/// behaves identically to `bulk_insert_array` against one pool connection.
pub fn bulk_insert_parallel(pool_id: u32, payload_bytes: &[u8], parallelism: usize) -> BulkInsertReport {
    let payload = match bulk::decode(payload_bytes) {
        Ok(p) => p,
        Err(e) => return BulkInsertReport { rows_inserted: 0, result: Err(e) },
    };
    let pool = match registries::pools().get(pool_id) {
        Ok(p) => p,
        Err(e) => return BulkInsertReport { rows_inserted: 0, result: Err(e) },
    };

    let row_count = payload.cells.first().map(|c| c.len()).unwrap_or(0);
    let parallelism = parallelism.max(1).min(row_count.max(1));

    if parallelism <= 1 {
        return match checkout_and_insert(&pool, &payload) {
            Ok(n) => BulkInsertReport { rows_inserted: n, result: Ok(()) },
            Err(e) => BulkInsertReport { rows_inserted: 0, result: Err(e) },
        };
    }

    let inserted = AtomicU32::new(0);
    let first_error: std::sync::Mutex<Option<EngineError>> = std::sync::Mutex::new(None);

    std::thread::scope(|scope| {
        for partition in 0..parallelism {
            let (start, end) = partition_bounds(row_count, parallelism, partition);
            if start == end {
                continue;
            }
            let slice = slice_payload(&payload, start, end);
            let pool = &pool;
            let inserted = &inserted;
            let first_error = &first_error;
            scope.spawn(move || match checkout_and_insert(pool, &slice) {
                Ok(n) => {
                    inserted.fetch_add(n, Ordering::Relaxed);
                }
                Err(e) => {
                    let mut slot = first_error.lock().unwrap();
                    if slot.is_none() {
                        *slot = Some(e);
                    }
                }
            });
        }
    });

    let result = match first_error.into_inner().unwrap() {
        Some(e) => Err(e),
        None => Ok(()),
    };
    BulkInsertReport {
        rows_inserted: inserted.load(Ordering::Relaxed),
        result,
    }
}

fn checkout_and_insert(pool: &Pool, payload: &BulkPayload) -> Result<u32, EngineError> {
    let conn_id = pool.get_connection()?;
    let conn = registries::connections().get(conn_id);
    let outcome = match conn {
        Ok(conn) => insert_payload(&conn, payload),
        Err(e) => Err(e),
    };
    pool.release_connection(conn_id);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_insert_sql_lists_columns_and_placeholders() {
        let columns = vec![
            BulkColumn {
                name: "id".to_string(),
                column_type: crate::protocol::bulk::BulkColumnType::Int64,
                nullable: false,
                max_len: 0,
            },
            BulkColumn {
                name: "name".to_string(),
                column_type: crate::protocol::bulk::BulkColumnType::Text,
                nullable: true,
                max_len: 64,
            },
        ];
        let sql = build_insert_sql("accounts", &columns);
        assert_eq!(sql, "INSERT INTO accounts (id, name) VALUES (?, ?)");
    }

    #[test]
    fn partition_bounds_cover_every_row_exactly_once() {
        let row_count = 10;
        let parallelism = 3;
        let mut covered = vec![false; row_count];
        for p in 0..parallelism {
            let (start, end) = partition_bounds(row_count, parallelism, p);
            for slot in covered.iter_mut().take(end).skip(start) {
                assert!(!*slot, "row covered twice");
                *slot = true;
            }
        }
        assert!(covered.iter().all(|&c| c));
    }
}
