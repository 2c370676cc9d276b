// Exercises the `#[no_mangle]` C ABI surface directly, the way a host
// binding would — raw pointers, the buffer-sizing protocol, and the
// structured-error store rather than the crate's safe Rust API.

use std::ffi::CString;

use odbc_engine_core::ffi::c_api::{odbc_connect, odbc_disconnect, odbc_get_metrics, odbc_get_structured_error, odbc_pool_get_state};
use odbc_engine_core::protocol::metrics::METRICS_SNAPSHOT_LEN;

fn dsn_cstring() -> Option<CString> {
    std::env::var("ODBC_ENGINE_TEST_DSN").ok().map(|s| CString::new(s).unwrap())
}

#[test]
fn odbc_get_metrics_round_trips_through_the_buffer_sizing_protocol() {
    let mut tiny = [0u8; 4];
    let mut written = 0u32;
    let rc = unsafe { odbc_get_metrics(tiny.as_mut_ptr(), tiny.len() as u32, &mut written) };
    assert_eq!(rc, -2);
    assert_eq!(written, METRICS_SNAPSHOT_LEN as u32);

    let mut full = [0u8; METRICS_SNAPSHOT_LEN];
    let mut written2 = 0u32;
    let rc2 = unsafe { odbc_get_metrics(full.as_mut_ptr(), full.len() as u32, &mut written2) };
    assert_eq!(rc2, 0);
    assert_eq!(written2, METRICS_SNAPSHOT_LEN as u32);
}

#[test]
fn odbc_connect_with_null_connection_string_fails_with_structured_error() {
    let id = unsafe { odbc_connect(std::ptr::null()) };
    assert_eq!(id, 0);

    let mut buf = [0u8; 256];
    let mut written = 0u32;
    let rc = unsafe { odbc_get_structured_error(buf.as_mut_ptr(), buf.len() as u32, &mut written) };
    assert_eq!(rc, 0);
    assert!(written > 0);
}

#[test]
fn odbc_disconnect_on_an_unknown_handle_returns_a_negative_code() {
    let rc = unsafe { odbc_disconnect(0xFFFF_FFFE) };
    assert!(rc < 0);
}

#[test]
fn odbc_pool_get_state_on_an_unknown_handle_does_not_write_outputs() {
    let mut size = 42u32;
    let mut idle = 7u32;
    let rc = unsafe { odbc_pool_get_state(0xFFFF_FFFE, &mut size, &mut idle) };
    assert!(rc < 0);
    // Outputs are only written on success; a failing call must leave them
    // untouched so a caller can distinguish "state unknown" from "state
    // is legitimately zero".
    assert_eq!(size, 42);
    assert_eq!(idle, 7);
}

#[test]
fn odbc_connect_against_a_live_dsn_round_trips_through_disconnect() {
    let Some(dsn) = dsn_cstring() else {
        eprintln!("skipping: ODBC_ENGINE_TEST_DSN not set");
        return;
    };
    let id = unsafe { odbc_connect(dsn.as_ptr()) };
    assert_ne!(id, 0);
    let rc = unsafe { odbc_disconnect(id) };
    assert_eq!(rc, 0);
}
