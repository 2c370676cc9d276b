// Boundary behaviors from §8 that don't need a live data source: the
// metrics buffer-sizing retry sequence and the structured-error contract
// for an obviously-invalid handle.

use odbc_engine_core::error::{self, StructuredError};
use odbc_engine_core::ffi::types::{write_out_buffer, RC_BUFFER_TOO_SMALL, RC_OK};
use odbc_engine_core::protocol::metrics::METRICS_SNAPSHOT_LEN;
use odbc_engine_core::{connection, EngineError};

#[test]
fn get_metrics_buffer_too_small_then_retry_with_reported_size() {
    let snapshot = odbc_engine_core::metrics::global().snapshot();
    let encoded = odbc_engine_core::protocol::metrics::encode(&snapshot);

    let mut tiny = [0u8; 8];
    let mut written = 0u32;
    let rc = unsafe { write_out_buffer(&encoded, tiny.as_mut_ptr(), tiny.len() as u32, &mut written) };
    assert_eq!(rc, RC_BUFFER_TOO_SMALL);
    assert_eq!(written, METRICS_SNAPSHOT_LEN as u32);

    let mut full = [0u8; METRICS_SNAPSHOT_LEN];
    let mut written2 = 0u32;
    let rc2 = unsafe { write_out_buffer(&encoded, full.as_mut_ptr(), full.len() as u32, &mut written2) };
    assert_eq!(rc2, RC_OK);
    assert_eq!(written2, METRICS_SNAPSHOT_LEN as u32);
}

#[test]
fn failing_entry_point_leaves_a_nonempty_structured_error() {
    error::clear_last_error();
    let err = connection::disconnect(999_999).unwrap_err();
    assert!(matches!(err, EngineError::InvalidHandle(999_999)));

    error::set_last_error(StructuredError::from_engine_error(&err));
    let message = error::with_last_error(|e| e.map(|e| e.message.clone()));
    assert!(message.is_some());
    assert!(!message.unwrap().is_empty());
}

#[test]
fn stream_fetch_after_close_is_invalid_handle() {
    let id = odbc_engine_core::registries::streams().ids().iter().max().copied().unwrap_or(0) + 1;
    let err = odbc_engine_core::stream::stream_fetch(id).unwrap_err();
    assert!(matches!(err, EngineError::InvalidHandle(_)));
}

#[test]
fn bulk_validation_rejects_null_in_non_nullable_column_before_any_row_is_touched() {
    use odbc_engine_core::protocol::bulk::{self, BulkCell, BulkColumn, BulkColumnType, BulkPayload};

    let payload = BulkPayload {
        table_name: "t".to_string(),
        columns: vec![BulkColumn {
            name: "id".to_string(),
            column_type: BulkColumnType::Int32,
            nullable: false,
            max_len: 0,
        }],
        cells: vec![vec![None]],
    };
    let err = bulk::encode(&payload).unwrap_err();
    assert!(matches!(err, EngineError::BulkValidation { .. }));
}
