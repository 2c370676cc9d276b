// ODBC column type -> protocol type mapping (§4.12). Anything unrecognized
// degrades to the string tag rather than failing; an unusual driver type
// must never block decoding.

use odbc_api::DataType;

pub const SQL_CHAR: u16 = 1;
pub const SQL_NUMERIC: u16 = 2;
pub const SQL_DECIMAL: u16 = 3;
pub const SQL_INTEGER: u16 = 4;
pub const SQL_SMALLINT: u16 = 5;
pub const SQL_FLOAT: u16 = 6;
pub const SQL_REAL: u16 = 7;
pub const SQL_DOUBLE: u16 = 8;
pub const SQL_VARCHAR: u16 = 12;
pub const SQL_TYPE_DATE: u16 = 91;
pub const SQL_TYPE_TIMESTAMP: u16 = 93;
pub const SQL_BIGINT: u16 = (-5i16) as u16;
pub const SQL_TINYINT: u16 = (-6i16) as u16;
pub const SQL_BINARY: u16 = (-2i16) as u16;
pub const SQL_VARBINARY: u16 = (-3i16) as u16;
pub const SQL_LONGVARBINARY: u16 = (-4i16) as u16;
pub const SQL_WCHAR: u16 = (-8i16) as u16;
pub const SQL_WVARCHAR: u16 = (-9i16) as u16;
pub const SQL_LONGVARCHAR: u16 = (-1i16) as u16;

/// Protocol value-type tags (`crate::protocol::Value::type_tag`), restricted
/// to the subset a column's *declared* type can resolve to.
pub const TAG_STRING: u8 = 1;
pub const TAG_INT32: u8 = 2;
pub const TAG_INT64: u8 = 3;
pub const TAG_NULLABLE_DOUBLE: u8 = 4;
pub const TAG_NULLABLE_DATETIME: u8 = 6;
pub const TAG_BINARY: u8 = 7;

/// Maps a driver-reported column type to `(protocol type tag, ODBC SQL type
/// code)`. The ODBC type code is carried in `ColumnMeta` purely for client
/// diagnostics; encoding/decoding only ever dispatches on the tag.
pub fn map(data_type: DataType) -> (u8, u16) {
    match data_type {
        DataType::Char { .. } => (TAG_STRING, SQL_CHAR),
        DataType::Varchar { .. } => (TAG_STRING, SQL_VARCHAR),
        DataType::LongVarchar { .. } => (TAG_STRING, SQL_LONGVARCHAR),
        DataType::WChar { .. } => (TAG_STRING, SQL_WCHAR),
        DataType::WVarchar { .. } => (TAG_STRING, SQL_WVARCHAR),
        DataType::Integer => (TAG_INT32, SQL_INTEGER),
        DataType::SmallInt => (TAG_INT32, SQL_SMALLINT),
        DataType::TinyInt => (TAG_INT32, SQL_TINYINT),
        DataType::BigInt => (TAG_INT64, SQL_BIGINT),
        DataType::Double => (TAG_NULLABLE_DOUBLE, SQL_DOUBLE),
        DataType::Float { .. } => (TAG_NULLABLE_DOUBLE, SQL_FLOAT),
        DataType::Real => (TAG_NULLABLE_DOUBLE, SQL_REAL),
        DataType::Decimal { .. } => (TAG_NULLABLE_DOUBLE, SQL_DECIMAL),
        DataType::Numeric { .. } => (TAG_NULLABLE_DOUBLE, SQL_NUMERIC),
        DataType::Timestamp { .. } => (TAG_NULLABLE_DATETIME, SQL_TYPE_TIMESTAMP),
        DataType::Date => (TAG_NULLABLE_DATETIME, SQL_TYPE_DATE),
        DataType::Binary { .. } => (TAG_BINARY, SQL_BINARY),
        DataType::Varbinary { .. } => (TAG_BINARY, SQL_VARBINARY),
        DataType::LongVarbinary { .. } => (TAG_BINARY, SQL_LONGVARBINARY),
        _ => (TAG_STRING, SQL_CHAR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_family_maps_to_int32() {
        assert_eq!(map(DataType::Integer).0, TAG_INT32);
        assert_eq!(map(DataType::SmallInt).0, TAG_INT32);
        assert_eq!(map(DataType::TinyInt).0, TAG_INT32);
    }

    #[test]
    fn unknown_type_degrades_to_string() {
        assert_eq!(map(DataType::Unknown).0, TAG_STRING);
    }

    #[test]
    fn binary_family_maps_to_binary_tag() {
        assert_eq!(map(DataType::Varbinary { length: 16 }).0, TAG_BINARY);
    }
}
