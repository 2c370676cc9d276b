// Engine-wide error type and the thread-local structured error store.
//
// `EngineError` is the in-process representation raised by every component.
// `ffi::c_api` is the single place that lowers an `EngineError` onto a
// numeric return code and the structured error slot a host reads back via
// `odbc_get_structured_error`.

use std::cell::RefCell;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine-wide error kinds, one per §7 of the specification.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid handle: {0}")]
    InvalidHandle(u32),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("result buffer overflow: result is {actual} bytes, cap is {cap} bytes")]
    BufferOverflow { actual: usize, cap: usize },

    #[error("streaming protocol violation: {0}")]
    StreamingProtocol(String),

    #[error("transaction {0} is already closed")]
    TransactionClosed(u32),

    #[error("bulk validation failed at row {row}, column '{column}': {reason}")]
    BulkValidation {
        row: u32,
        column: String,
        reason: String,
    },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("internal error (recovered): {0}")]
    InternalPoisoned(String),

    #[error("pool {0} exhausted: no connection became available within the checkout wait")]
    PoolExhausted(u32),
}

impl EngineError {
    /// Stable numeric code surfaced to C callers through `native_code`-adjacent
    /// diagnostics. Not part of the ABI's primary return code (which is a
    /// plain success/too-small/failure tri-state) but useful for logging and
    /// for the `sql_state`-less kinds that have no driver-provided code.
    pub fn kind_code(&self) -> i32 {
        match self {
            EngineError::Validation(_) => -100,
            EngineError::InvalidHandle(_) => -101,
            EngineError::Connection(_) => -102,
            EngineError::Query(_) => -103,
            EngineError::Timeout(_) => -104,
            EngineError::BufferOverflow { .. } => -105,
            EngineError::StreamingProtocol(_) => -106,
            EngineError::TransactionClosed(_) => -107,
            EngineError::BulkValidation { .. } => -108,
            EngineError::Unsupported(_) => -109,
            EngineError::InternalPoisoned(_) => -110,
            EngineError::PoolExhausted(_) => -111,
        }
    }

    /// SQLSTATE class associated with this error, when one is meaningful
    /// independent of a specific driver response (driver-sourced errors
    /// carry their own SQLSTATE via `StructuredError::from_driver`).
    pub fn sql_state(&self) -> Option<&'static str> {
        match self {
            EngineError::Connection(_) => Some("08000"),
            EngineError::Timeout(_) => Some("HYT00"),
            EngineError::TransactionClosed(_) => Some("25000"),
            EngineError::PoolExhausted(_) => Some("08004"),
            _ => None,
        }
    }
}

/// Structured error record returned by `odbc_get_structured_error`.
#[derive(Debug, Clone, Default)]
pub struct StructuredError {
    pub message: String,
    pub sql_state: Option<[u8; 5]>,
    pub native_code: Option<i32>,
}

impl StructuredError {
    pub fn from_engine_error(err: &EngineError) -> Self {
        Self {
            message: err.to_string(),
            sql_state: err.sql_state().map(sql_state_bytes),
            native_code: Some(err.kind_code()),
        }
    }

    pub fn from_driver(message: String, sql_state: Option<String>, native_code: Option<i32>) -> Self {
        Self {
            message,
            sql_state: sql_state.as_deref().map(sql_state_bytes),
            native_code,
        }
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Self {
            message: format!("odbc-engine-core: recovered panic: {}", message.into()),
            sql_state: None,
            native_code: None,
        }
    }
}

fn sql_state_bytes(s: &str) -> [u8; 5] {
    let mut out = [b' '; 5];
    for (dst, src) in out.iter_mut().zip(s.as_bytes().iter().take(5)) {
        *dst = *src;
    }
    out
}

thread_local! {
    static LAST_ERROR: RefCell<Option<StructuredError>> = RefCell::new(None);
}

/// Populates the thread-local last-error slot. Called by every fallible
/// C ABI entry point immediately before it returns a failure code.
pub fn set_last_error(error: StructuredError) {
    tracing::warn!(message = %error.message, "engine error");
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(error));
}

/// Non-destructive read of the thread-local last-error slot.
pub fn with_last_error<R>(f: impl FnOnce(Option<&StructuredError>) -> R) -> R {
    LAST_ERROR.with(|slot| f(slot.borrow().as_ref()))
}

pub fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_error_is_thread_local_and_non_destructive() {
        clear_last_error();
        assert!(with_last_error(|e| e.is_none()));

        set_last_error(StructuredError::from_engine_error(&EngineError::InvalidHandle(7)));
        let read_once = with_last_error(|e| e.map(|e| e.message.clone()));
        let read_twice = with_last_error(|e| e.map(|e| e.message.clone()));
        assert_eq!(read_once, read_twice);
        assert!(read_once.unwrap().contains("invalid handle"));
    }

    #[test]
    fn sql_state_is_padded_to_five_bytes() {
        let err = StructuredError::from_driver("bad".into(), Some("08".into()), Some(1));
        assert_eq!(err.sql_state.unwrap(), [b'0', b'8', b' ', b' ', b' ']);
    }

    #[test]
    fn bulk_validation_message_names_row_and_column() {
        let err = EngineError::BulkValidation {
            row: 3,
            column: "age".to_string(),
            reason: "null in non-nullable column".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("row 3"));
        assert!(msg.contains("'age'"));
    }
}
