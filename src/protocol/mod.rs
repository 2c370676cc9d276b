// Binary Protocol Codec (§4.3, §4.4, §4.10). Every sub-module hand-rolls a
// fixed, versioned wire layout with `bytes::BytesMut` on the way out and a
// checked `bytes::Buf` cursor on the way in — there is no serde-derived
// format here, the layout is a contract, not a type.

pub mod bulk;
pub mod metrics;
pub mod multi;
pub mod params;
pub mod row;

use crate::error::EngineError;

pub const ROW_BUFFER_MAGIC: u32 = 0x4F44_4243; // "ODBC" read big-endian by a human, little-endian on the wire
pub const ROW_BUFFER_VERSION: u16 = 1;

/// Shared helper: fail decoding with a `Validation` error carrying context,
/// rather than letting an undersized buffer panic a `bytes::Buf` read.
pub(crate) fn need(buf_remaining: usize, needed: usize, what: &str) -> Result<(), EngineError> {
    if buf_remaining < needed {
        Err(EngineError::Validation(format!(
            "truncated buffer while decoding {what}: need {needed} bytes, have {buf_remaining}"
        )))
    } else {
        Ok(())
    }
}

/// A single decoded/encodable column value. Variant order matches the
/// protocol type tags in §4.3: Null=0, String=1, Int32=2, Int64=3,
/// NullableDouble=4, Double=5, NullableDateTime=6, Binary=7.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Int32(i32),
    Int64(i64),
    NullableDouble(Option<f64>),
    Double(f64),
    /// Epoch-millis UTC, when present.
    NullableDateTime(Option<u64>),
    Binary(Vec<u8>),
}

impl Value {
    pub fn type_tag(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::String(_) => 1,
            Value::Int32(_) => 2,
            Value::Int64(_) => 3,
            Value::NullableDouble(_) => 4,
            Value::Double(_) => 5,
            Value::NullableDateTime(_) => 6,
            Value::Binary(_) => 7,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(
            self,
            Value::Null | Value::NullableDouble(None) | Value::NullableDateTime(None)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    pub name: String,
    pub odbc_type_code: u16,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, odbc_type_code: u16) -> Self {
        Self {
            name: name.into(),
            odbc_type_code,
        }
    }
}
