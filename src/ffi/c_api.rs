// C ABI surface (§6.1). Every entry point here is `#[no_mangle] extern
// "C"`, wrapped in `catch_unwind`, and lowers its `Result<_, EngineError>`
// onto the buffer-sizing protocol (`ffi::types`) plus the thread-local
// structured error store (`error::set_last_error`) — a host never sees a
// Rust panic cross this boundary.

use std::os::raw::c_char;
use std::panic::catch_unwind;

use bytes::{BufMut, BytesMut};

use crate::error::{self, EngineError, StructuredError};
use crate::ffi::types::{self, HandleId, ReturnCode, RC_OK};
use crate::protocol::params::ParamValue;
use crate::{bulk, catalog, connection, execution, metrics, pool, protocol, stream, transaction};

fn recover_handle(context: &str) -> HandleId {
    error::set_last_error(StructuredError::panic(context));
    0
}

fn recover_rc(context: &str) -> ReturnCode {
    error::set_last_error(StructuredError::panic(context));
    EngineError::InternalPoisoned(context.to_string()).kind_code()
}

fn handle_outcome(result: Result<u32, EngineError>) -> HandleId {
    match result {
        Ok(id) => id,
        Err(e) => {
            error::set_last_error(StructuredError::from_engine_error(&e));
            0
        }
    }
}

fn rc_outcome(result: Result<(), EngineError>) -> ReturnCode {
    match result {
        Ok(()) => RC_OK,
        Err(e) => {
            let code = e.kind_code();
            error::set_last_error(StructuredError::from_engine_error(&e));
            code
        }
    }
}

unsafe fn buffer_outcome(result: Result<Vec<u8>, EngineError>, out_buf: *mut u8, out_len: u32, out_written: *mut u32) -> ReturnCode {
    match result {
        Ok(bytes) => types::write_out_buffer(&bytes, out_buf, out_len, out_written),
        Err(e) => {
            if !out_written.is_null() {
                *out_written = 0;
            }
            let code = e.kind_code();
            error::set_last_error(StructuredError::from_engine_error(&e));
            code
        }
    }
}

unsafe fn required_str(ptr: *const c_char, what: &str) -> Result<String, EngineError> {
    types::c_str_to_string(ptr).ok_or_else(|| EngineError::Validation(format!("{what} must not be null")))
}

unsafe fn optional_str(ptr: *const c_char) -> String {
    types::c_str_to_string(ptr).unwrap_or_default()
}

unsafe fn params_from_buffer(params: *const u8, params_len: u32) -> Result<Vec<ParamValue>, EngineError> {
    if params.is_null() || params_len == 0 {
        return Ok(Vec::new());
    }
    let slice = std::slice::from_raw_parts(params, params_len as usize);
    crate::protocol::params::decode_params(slice)
}

/// Initializes process-wide state (the `odbc_api::Environment` singleton
/// and tracing). Safe to call more than once; later calls are no-ops.
///
/// # Safety
/// No preconditions beyond the standard C calling convention.
#[no_mangle]
pub unsafe extern "C" fn odbc_init() -> ReturnCode {
    match catch_unwind(crate::driver::environment::global) {
        Ok(Ok(_)) => RC_OK,
        Ok(Err(e)) => rc_outcome(Err(e)),
        Err(_) => recover_rc("odbc_init"),
    }
}

/// Opens a connection. Returns `0` on failure; call
/// `odbc_get_structured_error` for details.
///
/// # Safety
/// `connection_string` must be null or a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn odbc_connect(connection_string: *const c_char) -> HandleId {
    match catch_unwind(|| {
        let conn_str = required_str(connection_string, "connection_string")?;
        connection::connect(&conn_str, crate::cache::CacheConfig::default())
    }) {
        Ok(result) => handle_outcome(result),
        Err(_) => recover_handle("odbc_connect"),
    }
}

/// Like `odbc_connect`, but bounds the driver's login phase to
/// `timeout_ms` milliseconds.
///
/// # Safety
/// `connection_string` must be null or a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn odbc_connect_with_timeout(connection_string: *const c_char, timeout_ms: u64) -> HandleId {
    match catch_unwind(|| {
        let conn_str = required_str(connection_string, "connection_string")?;
        crate::driver::connection::DriverConnection::connect_with_timeout(&conn_str, timeout_ms)
            .and_then(|driver| crate::registries::connections().insert_with(|id| crate::connection::Connection::from_driver(id, driver, crate::cache::CacheConfig::default())))
    }) {
        Ok(result) => handle_outcome(result),
        Err(_) => recover_handle("odbc_connect_with_timeout"),
    }
}

/// Closes a connection, auto-rolling-back any active transaction first.
///
/// # Safety
/// No preconditions beyond the standard C calling convention.
#[no_mangle]
pub unsafe extern "C" fn odbc_disconnect(connection_id: HandleId) -> ReturnCode {
    match catch_unwind(|| connection::disconnect(connection_id)) {
        Ok(result) => rc_outcome(result),
        Err(_) => recover_rc("odbc_disconnect"),
    }
}

/// Probes `connection_string` with a transient connection and writes the
/// driver's reported DBMS name. The probe connection is never registered
/// under a handle; it is closed before this call returns.
///
/// # Safety
/// `connection_string` must be null or a valid null-terminated C string;
/// `out_buf`/`out_written` follow the buffer-sizing protocol (§4.4).
#[no_mangle]
pub unsafe extern "C" fn odbc_detect_driver(connection_string: *const c_char, out_buf: *mut u8, out_len: u32, out_written: *mut u32) -> ReturnCode {
    let result = catch_unwind(|| {
        let conn_str = required_str(connection_string, "connection_string")?;
        let driver = crate::driver::connection::DriverConnection::connect(&conn_str)?;
        driver.dbms_name()
    });
    match result {
        Ok(inner) => buffer_outcome(inner.map(|s| s.into_bytes()), out_buf, out_len, out_written),
        Err(_) => recover_rc("odbc_detect_driver"),
    }
}

/// Writes the plain-text message of the last error recorded on this
/// thread, if any.
///
/// # Safety
/// `out_buf`/`out_written` follow the buffer-sizing protocol (§4.4).
#[no_mangle]
pub unsafe extern "C" fn odbc_get_error(out_buf: *mut u8, out_len: u32, out_written: *mut u32) -> ReturnCode {
    let result: Result<Vec<u8>, EngineError> = catch_unwind(|| {
        Ok(error::with_last_error(|e| e.map(|e| e.message.clone()).unwrap_or_default().into_bytes()))
    })
    .unwrap_or_else(|_| Ok(b"odbc-engine-core: recovered panic reading last error".to_vec()));
    buffer_outcome(result, out_buf, out_len, out_written)
}

const STRUCTURED_ERROR_SQL_STATE_LEN: usize = 5;

fn encode_structured_error(err: Option<&StructuredError>) -> Vec<u8> {
    let mut out = BytesMut::new();
    match err {
        None => {
            out.put_u8(0);
            out.put_bytes(b' ', STRUCTURED_ERROR_SQL_STATE_LEN);
            out.put_i32_le(0);
            out.put_u32_le(0);
        }
        Some(err) => {
            match err.sql_state {
                Some(bytes) => {
                    out.put_u8(1);
                    out.put_slice(&bytes);
                }
                None => {
                    out.put_u8(0);
                    out.put_bytes(b' ', STRUCTURED_ERROR_SQL_STATE_LEN);
                }
            }
            out.put_i32_le(err.native_code.unwrap_or(0));
            let message = err.message.as_bytes();
            out.put_u32_le(message.len() as u32);
            out.put_slice(message);
        }
    }
    out.to_vec()
}

/// Writes a structured record for the last error recorded on this thread:
/// `{u8 has_sql_state, 5 bytes sql_state, i32 native_code, u32 message_len,
/// message bytes}`. Writes the "no error" record (all-zero/space fields)
/// when nothing is recorded.
///
/// # Safety
/// `out_buf`/`out_written` follow the buffer-sizing protocol (§4.4).
#[no_mangle]
pub unsafe extern "C" fn odbc_get_structured_error(out_buf: *mut u8, out_len: u32, out_written: *mut u32) -> ReturnCode {
    let result: Result<Vec<u8>, EngineError> =
        catch_unwind(|| Ok(error::with_last_error(encode_structured_error))).unwrap_or(Ok(encode_structured_error(None)));
    buffer_outcome(result, out_buf, out_len, out_written)
}

/// Runs `sql` with no parameters and writes the encoded row buffer (or,
/// for DML, a row-count-only buffer with zero columns).
///
/// # Safety
/// `sql` must be null or a valid null-terminated C string; `out_buf`/
/// `out_written` follow the buffer-sizing protocol (§4.4).
#[no_mangle]
pub unsafe extern "C" fn odbc_exec_query(connection_id: HandleId, sql: *const c_char, out_buf: *mut u8, out_len: u32, out_written: *mut u32) -> ReturnCode {
    let result = catch_unwind(|| {
        let sql = required_str(sql, "sql")?;
        execution::exec_query(connection_id, &sql)
    });
    match result {
        Ok(inner) => buffer_outcome(inner, out_buf, out_len, out_written),
        Err(_) => recover_rc("odbc_exec_query"),
    }
}

/// Like `odbc_exec_query`, but binds `params` (an encoded parameter
/// buffer, §4.3) against the statement.
///
/// # Safety
/// `sql` must be null or a valid null-terminated C string; `params` must
/// be valid for `params_len` bytes; `out_buf`/`out_written` follow the
/// buffer-sizing protocol.
#[no_mangle]
pub unsafe extern "C" fn odbc_exec_query_params(
    connection_id: HandleId,
    sql: *const c_char,
    params: *const u8,
    params_len: u32,
    out_buf: *mut u8,
    out_len: u32,
    out_written: *mut u32,
) -> ReturnCode {
    let result = catch_unwind(|| {
        let sql = required_str(sql, "sql")?;
        let params = params_from_buffer(params, params_len)?;
        execution::exec_query_params(connection_id, &sql, &params)
    });
    match result {
        Ok(inner) => buffer_outcome(inner, out_buf, out_len, out_written),
        Err(_) => recover_rc("odbc_exec_query_params"),
    }
}

/// Runs a (possibly multi-statement) batch and writes every chained
/// result set framed per `protocol::multi`.
///
/// # Safety
/// `sql` must be null or a valid null-terminated C string; `out_buf`/
/// `out_written` follow the buffer-sizing protocol.
#[no_mangle]
pub unsafe extern "C" fn odbc_exec_query_multi(connection_id: HandleId, sql: *const c_char, out_buf: *mut u8, out_len: u32, out_written: *mut u32) -> ReturnCode {
    let result = catch_unwind(|| {
        let sql = required_str(sql, "sql")?;
        execution::exec_query_multi(connection_id, &sql)
    });
    match result {
        Ok(inner) => buffer_outcome(inner, out_buf, out_len, out_written),
        Err(_) => recover_rc("odbc_exec_query_multi"),
    }
}

/// Opens a streaming cursor over `sql` using the default fetch batch
/// size, chunked into `chunk_size`-byte row-buffer pieces on fetch.
///
/// # Safety
/// `sql` must be null or a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn odbc_stream_start(connection_id: HandleId, sql: *const c_char, chunk_size: u32) -> HandleId {
    match catch_unwind(|| {
        let sql = required_str(sql, "sql")?;
        stream::stream_start(connection_id, &sql, chunk_size as usize)
    }) {
        Ok(result) => handle_outcome(result),
        Err(_) => recover_handle("odbc_stream_start"),
    }
}

/// Like `odbc_stream_start`, but fetches from the driver in batches of
/// `fetch_size` rows instead of the engine default.
///
/// # Safety
/// `sql` must be null or a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn odbc_stream_start_batched(connection_id: HandleId, sql: *const c_char, fetch_size: u32, chunk_size: u32) -> HandleId {
    match catch_unwind(|| {
        let sql = required_str(sql, "sql")?;
        stream::stream_start_batched(connection_id, &sql, fetch_size as usize, chunk_size as usize)
    }) {
        Ok(result) => handle_outcome(result),
        Err(_) => recover_handle("odbc_stream_start_batched"),
    }
}

/// Fetches the next chunk from a streaming cursor and reports whether
/// more rows remain via `*has_more`.
///
/// # Safety
/// `out_buf`/`out_written` follow the buffer-sizing protocol; `has_more`
/// must be valid for one `u8` write.
#[no_mangle]
pub unsafe extern "C" fn odbc_stream_fetch(stream_id: HandleId, out_buf: *mut u8, out_len: u32, out_written: *mut u32, has_more: *mut u8) -> ReturnCode {
    let result = catch_unwind(|| stream::stream_fetch(stream_id));
    match result {
        Ok(Ok((bytes, more))) => {
            if !has_more.is_null() {
                *has_more = more as u8;
            }
            types::write_out_buffer(&bytes, out_buf, out_len, out_written)
        }
        Ok(Err(e)) => {
            if !has_more.is_null() {
                *has_more = 0;
            }
            if !out_written.is_null() {
                *out_written = 0;
            }
            let code = e.kind_code();
            error::set_last_error(StructuredError::from_engine_error(&e));
            code
        }
        Err(_) => recover_rc("odbc_stream_fetch"),
    }
}

/// Closes a stream. Idempotent: closing an already-closed handle is a
/// silent success.
///
/// # Safety
/// No preconditions beyond the standard C calling convention.
#[no_mangle]
pub unsafe extern "C" fn odbc_stream_close(stream_id: HandleId) -> ReturnCode {
    match catch_unwind(|| stream::stream_close(stream_id)) {
        Ok(()) => RC_OK,
        Err(_) => recover_rc("odbc_stream_close"),
    }
}

/// Begins a transaction with the given isolation level (0=read
/// uncommitted, 1=read committed, 2=repeatable read, 3=serializable).
///
/// # Safety
/// No preconditions beyond the standard C calling convention.
#[no_mangle]
pub unsafe extern "C" fn odbc_transaction_begin(connection_id: HandleId, isolation: u8) -> HandleId {
    match catch_unwind(|| {
        let level = transaction::IsolationLevel::from_code(isolation)?;
        let conn = crate::registries::connections().get(connection_id)?;
        crate::registries::transactions().insert_with(|id| transaction::Transaction::begin(id, &conn, level))
    }) {
        Ok(result) => handle_outcome(result),
        Err(_) => recover_handle("odbc_transaction_begin"),
    }
}

fn with_transaction(txn_id: HandleId, f: impl FnOnce(&transaction::Transaction, &crate::connection::Connection) -> Result<(), EngineError>) -> Result<(), EngineError> {
    let txn = crate::registries::transactions().remove(txn_id)?;
    let conn = crate::registries::connections().get(txn.connection_id)?;
    f(&*txn, &*conn)
}

/// Commits a transaction and releases its handle.
///
/// # Safety
/// No preconditions beyond the standard C calling convention.
#[no_mangle]
pub unsafe extern "C" fn odbc_transaction_commit(txn_id: HandleId) -> ReturnCode {
    match catch_unwind(|| with_transaction(txn_id, |txn, conn| txn.commit(conn))) {
        Ok(result) => rc_outcome(result),
        Err(_) => recover_rc("odbc_transaction_commit"),
    }
}

/// Rolls back a transaction and releases its handle.
///
/// # Safety
/// No preconditions beyond the standard C calling convention.
#[no_mangle]
pub unsafe extern "C" fn odbc_transaction_rollback(txn_id: HandleId) -> ReturnCode {
    match catch_unwind(|| with_transaction(txn_id, |txn, conn| txn.rollback(conn))) {
        Ok(result) => rc_outcome(result),
        Err(_) => recover_rc("odbc_transaction_rollback"),
    }
}

fn with_active_transaction(txn_id: HandleId, f: impl FnOnce(&transaction::Transaction, &crate::connection::Connection) -> Result<(), EngineError>) -> Result<(), EngineError> {
    let txn = crate::registries::transactions().get(txn_id)?;
    let conn = crate::registries::connections().get(txn.connection_id)?;
    f(&txn, &conn)
}

/// Issues `SAVEPOINT <name>` against the transaction's connection.
///
/// # Safety
/// `name` must be null or a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn odbc_savepoint_create(txn_id: HandleId, name: *const c_char) -> ReturnCode {
    match catch_unwind(|| {
        let name = required_str(name, "savepoint name")?;
        with_active_transaction(txn_id, |txn, conn| txn.savepoint_create(conn, &name))
    }) {
        Ok(result) => rc_outcome(result),
        Err(_) => recover_rc("odbc_savepoint_create"),
    }
}

/// Issues `ROLLBACK TO SAVEPOINT <name>`.
///
/// # Safety
/// `name` must be null or a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn odbc_savepoint_rollback(txn_id: HandleId, name: *const c_char) -> ReturnCode {
    match catch_unwind(|| {
        let name = required_str(name, "savepoint name")?;
        with_active_transaction(txn_id, |txn, conn| txn.savepoint_rollback(conn, &name))
    }) {
        Ok(result) => rc_outcome(result),
        Err(_) => recover_rc("odbc_savepoint_rollback"),
    }
}

/// Issues `RELEASE SAVEPOINT <name>`.
///
/// # Safety
/// `name` must be null or a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn odbc_savepoint_release(txn_id: HandleId, name: *const c_char) -> ReturnCode {
    match catch_unwind(|| {
        let name = required_str(name, "savepoint name")?;
        with_active_transaction(txn_id, |txn, conn| txn.savepoint_release(conn, &name))
    }) {
        Ok(result) => rc_outcome(result),
        Err(_) => recover_rc("odbc_savepoint_release"),
    }
}

/// Registers a statement descriptor for `sql`, priming the connection's
/// statement cache. `timeout_ms = 0` means no explicit timeout.
///
/// # Safety
/// `sql` must be null or a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn odbc_prepare(connection_id: HandleId, sql: *const c_char, timeout_ms: u64) -> HandleId {
    match catch_unwind(|| {
        let sql = required_str(sql, "sql")?;
        let conn = crate::registries::connections().get(connection_id)?;
        let timeout = if timeout_ms == 0 { None } else { Some(timeout_ms) };
        crate::statement::prepare(&conn, &sql, timeout, 0)
    }) {
        Ok(result) => handle_outcome(result),
        Err(_) => recover_handle("odbc_prepare"),
    }
}

/// Executes a prepared statement. `timeout_override_ms = 0` goes through
/// the statement cache (inheriting the statement's own timeout);
/// any other value bypasses the cache for a one-off timed execution.
/// `fetch_size = 0` uses the engine default.
///
/// # Safety
/// `params` must be valid for `params_len` bytes; `out_buf`/`out_written`
/// follow the buffer-sizing protocol.
#[no_mangle]
pub unsafe extern "C" fn odbc_execute(
    stmt_id: HandleId,
    params: *const u8,
    params_len: u32,
    timeout_override_ms: u64,
    fetch_size: u32,
    out_buf: *mut u8,
    out_len: u32,
    out_written: *mut u32,
) -> ReturnCode {
    let result = catch_unwind(|| {
        let params = params_from_buffer(params, params_len)?;
        execution::execute(stmt_id, &params, timeout_override_ms, fetch_size)
    });
    match result {
        Ok(inner) => buffer_outcome(inner, out_buf, out_len, out_written),
        Err(_) => recover_rc("odbc_execute"),
    }
}

/// Statement cancellation has no backing driver call in the safe
/// `odbc_api` surface this engine builds on; always returns `Unsupported`.
///
/// # Safety
/// No preconditions beyond the standard C calling convention.
#[no_mangle]
pub unsafe extern "C" fn odbc_cancel(_stmt_id: HandleId) -> ReturnCode {
    rc_outcome(Err(EngineError::Unsupported("statement cancellation is not supported".to_string())))
}

/// Evicts a statement from its connection's cache and releases its
/// descriptor handle.
///
/// # Safety
/// No preconditions beyond the standard C calling convention.
#[no_mangle]
pub unsafe extern "C" fn odbc_close_statement(stmt_id: HandleId) -> ReturnCode {
    match catch_unwind(|| crate::statement::close(stmt_id)) {
        Ok(result) => rc_outcome(result),
        Err(_) => recover_rc("odbc_close_statement"),
    }
}

/// Drops every cached prepared statement across every connection. Live
/// statement descriptor handles are unaffected; their next `execute`
/// simply re-primes the cache.
///
/// # Safety
/// No preconditions beyond the standard C calling convention.
#[no_mangle]
pub unsafe extern "C" fn odbc_clear_all_statements() -> ReturnCode {
    match catch_unwind(crate::statement::clear_all_statements) {
        Ok(()) => RC_OK,
        Err(_) => recover_rc("odbc_clear_all_statements"),
    }
}

/// Clears one connection's statement cache.
///
/// # Safety
/// No preconditions beyond the standard C calling convention.
#[no_mangle]
pub unsafe extern "C" fn odbc_clear_statement_cache(connection_id: HandleId) -> ReturnCode {
    match catch_unwind(|| {
        let conn = crate::registries::connections().get(connection_id)?;
        conn.cache().clear();
        Ok::<_, EngineError>(())
    }) {
        Ok(result) => rc_outcome(result),
        Err(_) => recover_rc("odbc_clear_statement_cache"),
    }
}

const CACHE_METRICS_LEN: usize = 40;

fn encode_cache_snapshot(snap: crate::cache::CacheSnapshot) -> [u8; CACHE_METRICS_LEN] {
    let mut buf = BytesMut::with_capacity(CACHE_METRICS_LEN);
    buf.put_u64_le(snap.cache_hits);
    buf.put_u64_le(snap.cache_misses);
    buf.put_u64_le(snap.total_prepares);
    buf.put_u64_le(snap.total_executions);
    buf.put_u64_le(snap.entries as u64);
    let mut out = [0u8; CACHE_METRICS_LEN];
    out.copy_from_slice(&buf);
    out
}

/// Writes a connection's statement-cache counters as 5 little-endian u64
/// fields (hits, misses, prepares, executions, live entries) — the same
/// fixed-width convention as `odbc_get_metrics`.
///
/// # Safety
/// `out_buf`/`out_written` follow the buffer-sizing protocol.
#[no_mangle]
pub unsafe extern "C" fn odbc_get_cache_metrics(connection_id: HandleId, out_buf: *mut u8, out_len: u32, out_written: *mut u32) -> ReturnCode {
    let result = catch_unwind(|| {
        let conn = crate::registries::connections().get(connection_id)?;
        Ok::<_, EngineError>(encode_cache_snapshot(conn.cache().snapshot()).to_vec())
    });
    match result {
        Ok(inner) => buffer_outcome(inner, out_buf, out_len, out_written),
        Err(_) => recover_rc("odbc_get_cache_metrics"),
    }
}

/// Creates a fixed-capacity connection pool.
///
/// # Safety
/// `connection_string` must be null or a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn odbc_pool_create(connection_string: *const c_char, max_size: u32) -> HandleId {
    match catch_unwind(|| {
        let conn_str = required_str(connection_string, "connection_string")?;
        pool::pool_create(&conn_str, max_size as usize)
    }) {
        Ok(result) => handle_outcome(result),
        Err(_) => recover_handle("odbc_pool_create"),
    }
}

/// Checks out a connection from the pool, blocking up to the pool's
/// configured checkout wait before failing with `PoolExhausted`.
///
/// # Safety
/// No preconditions beyond the standard C calling convention.
#[no_mangle]
pub unsafe extern "C" fn odbc_pool_get_connection(pool_id: HandleId) -> HandleId {
    match catch_unwind(|| pool::pool_get_connection(pool_id)) {
        Ok(result) => handle_outcome(result),
        Err(_) => recover_handle("odbc_pool_get_connection"),
    }
}

/// Returns a checked-out connection to the pool, discarding it instead of
/// recycling it if it has an active transaction or fails a health check.
///
/// # Safety
/// No preconditions beyond the standard C calling convention.
#[no_mangle]
pub unsafe extern "C" fn odbc_pool_release_connection(pool_id: HandleId, connection_id: HandleId) -> ReturnCode {
    match catch_unwind(|| pool::pool_release_connection(pool_id, connection_id)) {
        Ok(result) => rc_outcome(result),
        Err(_) => recover_rc("odbc_pool_release_connection"),
    }
}

/// Returns `0` if every idle connection passed its health check, `1`
/// otherwise. This is a boolean report, not a failure code — a negative
/// return still means the pool handle itself was invalid.
///
/// # Safety
/// No preconditions beyond the standard C calling convention.
#[no_mangle]
pub unsafe extern "C" fn odbc_pool_health_check(pool_id: HandleId) -> ReturnCode {
    match catch_unwind(|| pool::pool_health_check(pool_id)) {
        Ok(Ok(true)) => RC_OK,
        Ok(Ok(false)) => 1,
        Ok(Err(e)) => rc_outcome(Err(e)),
        Err(_) => recover_rc("odbc_pool_health_check"),
    }
}

/// Writes the pool's current size and idle-connection count.
///
/// # Safety
/// `size` and `idle` must each be valid for one `u32` write.
#[no_mangle]
pub unsafe extern "C" fn odbc_pool_get_state(pool_id: HandleId, size: *mut u32, idle: *mut u32) -> ReturnCode {
    let result = catch_unwind(|| pool::pool_get_state(pool_id));
    match result {
        Ok(Ok((total, idle_count))) => {
            if !size.is_null() {
                *size = total as u32;
            }
            if !idle.is_null() {
                *idle = idle_count as u32;
            }
            RC_OK
        }
        Ok(Err(e)) => rc_outcome(Err(e)),
        Err(_) => recover_rc("odbc_pool_get_state"),
    }
}

/// Closes a pool, disconnecting every idle and in-use connection it
/// holds.
///
/// # Safety
/// No preconditions beyond the standard C calling convention.
#[no_mangle]
pub unsafe extern "C" fn odbc_pool_close(pool_id: HandleId) -> ReturnCode {
    match catch_unwind(|| pool::pool_close(pool_id)) {
        Ok(result) => rc_outcome(result),
        Err(_) => recover_rc("odbc_pool_close"),
    }
}

/// `SQLTables` catalog introspection. Empty strings match "all" per the
/// ODBC catalog function convention.
///
/// # Safety
/// `catalog`/`schema`/`table` must each be null or a valid
/// null-terminated C string; `out_buf`/`out_written` follow the
/// buffer-sizing protocol.
#[no_mangle]
pub unsafe extern "C" fn odbc_catalog_tables(
    connection_id: HandleId,
    catalog_name: *const c_char,
    schema: *const c_char,
    table: *const c_char,
    out_buf: *mut u8,
    out_len: u32,
    out_written: *mut u32,
) -> ReturnCode {
    let result = catch_unwind(|| {
        catalog::catalog_tables(connection_id, &optional_str(catalog_name), &optional_str(schema), &optional_str(table))
    });
    match result {
        Ok(inner) => buffer_outcome(inner, out_buf, out_len, out_written),
        Err(_) => recover_rc("odbc_catalog_tables"),
    }
}

/// `SQLColumns` catalog introspection.
///
/// # Safety
/// `catalog`/`schema`/`table`/`column` must each be null or a valid
/// null-terminated C string; `out_buf`/`out_written` follow the
/// buffer-sizing protocol.
#[no_mangle]
pub unsafe extern "C" fn odbc_catalog_columns(
    connection_id: HandleId,
    catalog_name: *const c_char,
    schema: *const c_char,
    table: *const c_char,
    column: *const c_char,
    out_buf: *mut u8,
    out_len: u32,
    out_written: *mut u32,
) -> ReturnCode {
    let result = catch_unwind(|| {
        catalog::catalog_columns(
            connection_id,
            &optional_str(catalog_name),
            &optional_str(schema),
            &optional_str(table),
            &optional_str(column),
        )
    });
    match result {
        Ok(inner) => buffer_outcome(inner, out_buf, out_len, out_written),
        Err(_) => recover_rc("odbc_catalog_columns"),
    }
}

/// `SQLGetTypeInfo`. `sql_data_type = 0` requests every type the driver
/// supports.
///
/// # Safety
/// `out_buf`/`out_written` follow the buffer-sizing protocol.
#[no_mangle]
pub unsafe extern "C" fn odbc_catalog_type_info(connection_id: HandleId, sql_data_type: i16, out_buf: *mut u8, out_len: u32, out_written: *mut u32) -> ReturnCode {
    let result = catch_unwind(|| {
        let filter = if sql_data_type == 0 { None } else { Some(sql_data_type) };
        catalog::catalog_type_info(connection_id, filter)
    });
    match result {
        Ok(inner) => buffer_outcome(inner, out_buf, out_len, out_written),
        Err(_) => recover_rc("odbc_catalog_type_info"),
    }
}

/// Decodes and inserts a column-major bulk payload (§4.3, §4.10) against
/// a single connection, writing the inserted row count to `*inserted`.
/// The payload is self-describing (table name and column list are
/// embedded in `data`), so there is no separate table/column-list
/// parameter here.
///
/// # Safety
/// `data` must be valid for `data_len` bytes; `inserted` must be valid
/// for one `u32` write.
#[no_mangle]
pub unsafe extern "C" fn odbc_bulk_insert_array(connection_id: HandleId, data: *const u8, data_len: u32, inserted: *mut u32) -> ReturnCode {
    let result = catch_unwind(|| {
        if data.is_null() {
            return Err(EngineError::Validation("data must not be null".to_string()));
        }
        let slice = std::slice::from_raw_parts(data, data_len as usize);
        bulk::bulk_insert_array(connection_id, slice)
    });
    match result {
        Ok(Ok(count)) => {
            if !inserted.is_null() {
                *inserted = count;
            }
            RC_OK
        }
        Ok(Err(e)) => {
            if !inserted.is_null() {
                *inserted = 0;
            }
            rc_outcome(Err(e))
        }
        Err(_) => {
            if !inserted.is_null() {
                *inserted = 0;
            }
            recover_rc("odbc_bulk_insert_array")
        }
    }
}

/// Partitions a bulk payload across up to `parallelism` pool-checked-out
/// connections, writing the total inserted row count to `*inserted` even
/// when the overall call fails (§7, §9: at-least-once semantics).
///
/// # Safety
/// `data` must be valid for `data_len` bytes; `inserted` must be valid
/// for one `u32` write.
#[no_mangle]
pub unsafe extern "C" fn odbc_bulk_insert_parallel(pool_id: HandleId, data: *const u8, data_len: u32, parallelism: u32, inserted: *mut u32) -> ReturnCode {
    let result = catch_unwind(|| {
        if data.is_null() {
            return bulk::BulkInsertReport {
                rows_inserted: 0,
                result: Err(EngineError::Validation("data must not be null".to_string())),
            };
        }
        let slice = std::slice::from_raw_parts(data, data_len as usize);
        bulk::bulk_insert_parallel(pool_id, slice, parallelism as usize)
    });
    match result {
        Ok(report) => {
            if !inserted.is_null() {
                *inserted = report.rows_inserted;
            }
            rc_outcome(report.result)
        }
        Err(_) => {
            if !inserted.is_null() {
                *inserted = 0;
            }
            recover_rc("odbc_bulk_insert_parallel")
        }
    }
}

/// Writes the process-wide metrics snapshot (§4.11) in the fixed 40-byte
/// format decoded by `protocol::metrics`.
///
/// # Safety
/// `out_buf`/`out_written` follow the buffer-sizing protocol.
#[no_mangle]
pub unsafe extern "C" fn odbc_get_metrics(out_buf: *mut u8, out_len: u32, out_written: *mut u32) -> ReturnCode {
    let result: Result<Vec<u8>, EngineError> =
        catch_unwind(|| Ok(protocol::metrics::encode(&metrics::global().snapshot()).to_vec())).unwrap_or_else(|_| {
            error::set_last_error(StructuredError::panic("odbc_get_metrics"));
            Ok(protocol::metrics::encode(&Default::default()).to_vec())
        });
    buffer_outcome(result, out_buf, out_len, out_written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_structured_error_none_has_zeroed_native_code() {
        let encoded = encode_structured_error(None);
        assert_eq!(encoded[0], 0);
        assert_eq!(&encoded[1..6], b"     ");
        assert_eq!(i32::from_le_bytes(encoded[6..10].try_into().unwrap()), 0);
        assert_eq!(u32::from_le_bytes(encoded[10..14].try_into().unwrap()), 0);
    }

    #[test]
    fn encode_structured_error_some_carries_message_and_sql_state() {
        let err = StructuredError::from_driver("bad".into(), Some("08001".into()), Some(7));
        let encoded = encode_structured_error(Some(&err));
        assert_eq!(encoded[0], 1);
        assert_eq!(&encoded[1..6], b"08001");
        assert_eq!(i32::from_le_bytes(encoded[6..10].try_into().unwrap()), 7);
        let msg_len = u32::from_le_bytes(encoded[10..14].try_into().unwrap()) as usize;
        assert_eq!(&encoded[14..14 + msg_len], b"bad");
    }

    #[test]
    fn encode_cache_snapshot_is_forty_bytes() {
        let snap = crate::cache::CacheSnapshot {
            cache_hits: 1,
            cache_misses: 2,
            total_prepares: 3,
            total_executions: 4,
            entries: 5,
        };
        let encoded = encode_cache_snapshot(snap);
        assert_eq!(encoded.len(), CACHE_METRICS_LEN);
        assert_eq!(u64::from_le_bytes(encoded[32..40].try_into().unwrap()), 5);
    }
}
