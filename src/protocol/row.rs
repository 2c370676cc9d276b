// Row buffer format, version 1 (§4.3).
//
// Header (16 bytes): magic u32, version u16, column count u16, row count u32,
// payload size u32 (excluding this header).
// Column metadata: u8 name length, name bytes, u16 ODBC type code.
// Row records: per column, u8 is_null, u8 type_tag, type-specific payload.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::EngineError;
use crate::protocol::{need, ColumnMeta, Value, ROW_BUFFER_MAGIC, ROW_BUFFER_VERSION};

const HEADER_LEN: usize = 16;

pub fn encode(columns: &[ColumnMeta], rows: &[Vec<Value>]) -> Result<Vec<u8>, EngineError> {
    if columns.len() > u16::MAX as usize {
        return Err(EngineError::Validation(format!(
            "column count {} exceeds protocol limit of {}",
            columns.len(),
            u16::MAX
        )));
    }

    let mut payload = BytesMut::new();
    for col in columns {
        let name_bytes = col.name.as_bytes();
        if name_bytes.len() > u8::MAX as usize {
            return Err(EngineError::Validation(format!(
                "column name '{}' exceeds 255 bytes",
                col.name
            )));
        }
        payload.put_u8(name_bytes.len() as u8);
        payload.put_slice(name_bytes);
        payload.put_u16_le(col.odbc_type_code);
    }

    for row in rows {
        if row.len() != columns.len() {
            return Err(EngineError::Validation(format!(
                "row has {} values but header declares {} columns",
                row.len(),
                columns.len()
            )));
        }
        for value in row {
            encode_value(&mut payload, value);
        }
    }

    let mut out = BytesMut::with_capacity(HEADER_LEN + payload.len());
    out.put_u32_le(ROW_BUFFER_MAGIC);
    out.put_u16_le(ROW_BUFFER_VERSION);
    out.put_u16_le(columns.len() as u16);
    out.put_u32_le(rows.len() as u32);
    out.put_u32_le(payload.len() as u32);
    out.put_slice(&payload);
    Ok(out.to_vec())
}

fn encode_value(out: &mut BytesMut, value: &Value) {
    out.put_u8(value.is_null() as u8);
    out.put_u8(value.type_tag());
    match value {
        Value::Null => {}
        Value::String(s) => {
            out.put_u32_le(s.len() as u32);
            out.put_slice(s.as_bytes());
        }
        Value::Int32(v) => {
            out.put_u32_le(4);
            out.put_i32_le(*v);
        }
        Value::Int64(v) => {
            out.put_u32_le(8);
            out.put_i64_le(*v);
        }
        Value::NullableDouble(v) => {
            out.put_u32_le(9);
            match v {
                Some(d) => {
                    out.put_u8(1);
                    out.put_f64_le(*d);
                }
                None => {
                    out.put_u8(0);
                    out.put_f64_le(0.0);
                }
            }
        }
        Value::Double(v) => {
            out.put_u32_le(8);
            out.put_f64_le(*v);
        }
        Value::NullableDateTime(v) => {
            out.put_u32_le(9);
            match v {
                Some(ms) => {
                    out.put_u8(1);
                    out.put_u64_le(*ms);
                }
                None => {
                    out.put_u8(0);
                    out.put_u64_le(0);
                }
            }
        }
        Value::Binary(b) => {
            out.put_u32_le(b.len() as u32);
            out.put_slice(b);
        }
    }
}

pub struct DecodedRowBuffer {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<Value>>,
}

pub fn decode(data: &[u8]) -> Result<DecodedRowBuffer, EngineError> {
    need(data.len(), HEADER_LEN, "row buffer header")?;
    let mut buf = data;

    let magic = buf.get_u32_le();
    if magic != ROW_BUFFER_MAGIC {
        return Err(EngineError::Validation(format!(
            "bad row buffer magic: expected {ROW_BUFFER_MAGIC:#x}, got {magic:#x}"
        )));
    }
    let version = buf.get_u16_le();
    if version != ROW_BUFFER_VERSION {
        return Err(EngineError::Validation(format!(
            "unsupported row buffer version {version}, expected {ROW_BUFFER_VERSION}"
        )));
    }
    let column_count = buf.get_u16_le() as usize;
    let row_count = buf.get_u32_le() as usize;
    let payload_size = buf.get_u32_le() as usize;

    need(buf.remaining(), payload_size, "row buffer payload")?;
    if buf.remaining() != payload_size {
        return Err(EngineError::Validation(format!(
            "row buffer declares payload size {payload_size} but {} bytes follow the header",
            buf.remaining()
        )));
    }

    let mut columns = Vec::with_capacity(column_count);
    for _ in 0..column_count {
        need(buf.remaining(), 1, "column name length")?;
        let name_len = buf.get_u8() as usize;
        need(buf.remaining(), name_len + 2, "column metadata")?;
        let name_bytes = buf.copy_to_bytes(name_len);
        let name = String::from_utf8(name_bytes.to_vec())
            .map_err(|e| EngineError::Validation(format!("column name is not valid UTF-8: {e}")))?;
        let odbc_type_code = buf.get_u16_le();
        columns.push(ColumnMeta::new(name, odbc_type_code));
    }

    let mut rows = Vec::with_capacity(row_count);
    for _ in 0..row_count {
        let mut row = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            row.push(decode_value(&mut buf)?);
        }
        rows.push(row);
    }

    if buf.remaining() != 0 {
        return Err(EngineError::Validation(format!(
            "row buffer has {} trailing bytes after decoding {row_count} declared rows",
            buf.remaining()
        )));
    }

    Ok(DecodedRowBuffer { columns, rows })
}

fn decode_value(buf: &mut &[u8]) -> Result<Value, EngineError> {
    need(buf.remaining(), 2, "row value header")?;
    let is_null = buf.get_u8();
    let type_tag = buf.get_u8();

    match type_tag {
        0 => {
            if is_null != 1 {
                return Err(EngineError::Validation(
                    "type tag 0 (null) requires is_null = 1".to_string(),
                ));
            }
            Ok(Value::Null)
        }
        1 => {
            need(buf.remaining(), 4, "string length")?;
            let len = buf.get_u32_le() as usize;
            need(buf.remaining(), len, "string payload")?;
            let bytes = buf.copy_to_bytes(len);
            let s = String::from_utf8(bytes.to_vec())
                .map_err(|e| EngineError::Validation(format!("string value is not valid UTF-8: {e}")))?;
            Ok(Value::String(s))
        }
        2 => {
            need(buf.remaining(), 8, "int32 value")?;
            let len = buf.get_u32_le();
            if len != 4 {
                return Err(EngineError::Validation(format!("int32 length must be 4, got {len}")));
            }
            Ok(Value::Int32(buf.get_i32_le()))
        }
        3 => {
            need(buf.remaining(), 12, "int64 value")?;
            let len = buf.get_u32_le();
            if len != 8 {
                return Err(EngineError::Validation(format!("int64 length must be 8, got {len}")));
            }
            Ok(Value::Int64(buf.get_i64_le()))
        }
        4 => {
            need(buf.remaining(), 13, "nullable-double value")?;
            let len = buf.get_u32_le();
            if len != 9 {
                return Err(EngineError::Validation(format!(
                    "nullable-double length must be 9, got {len}"
                )));
            }
            let presence = buf.get_u8();
            let raw = buf.get_f64_le();
            Ok(Value::NullableDouble(if presence == 1 { Some(raw) } else { None }))
        }
        5 => {
            need(buf.remaining(), 12, "double value")?;
            let len = buf.get_u32_le();
            if len != 8 {
                return Err(EngineError::Validation(format!("double length must be 8, got {len}")));
            }
            Ok(Value::Double(buf.get_f64_le()))
        }
        6 => {
            need(buf.remaining(), 13, "nullable-datetime value")?;
            let len = buf.get_u32_le();
            if len != 9 {
                return Err(EngineError::Validation(format!(
                    "nullable-datetime length must be 9, got {len}"
                )));
            }
            let presence = buf.get_u8();
            let raw = buf.get_u64_le();
            Ok(Value::NullableDateTime(if presence == 1 { Some(raw) } else { None }))
        }
        7 => {
            need(buf.remaining(), 4, "binary length")?;
            let len = buf.get_u32_le() as usize;
            need(buf.remaining(), len, "binary payload")?;
            let bytes = buf.copy_to_bytes(len);
            Ok(Value::Binary(bytes.to_vec()))
        }
        other => Err(EngineError::Validation(format!("unknown row value type tag {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Vec<ColumnMeta>, Vec<Vec<Value>>) {
        let columns = vec![ColumnMeta::new("id", 4), ColumnMeta::new("msg", 12)];
        let rows = vec![
            vec![Value::Int32(1), Value::String("hi".to_string())],
            vec![Value::Int32(2), Value::Null],
        ];
        (columns, rows)
    }

    #[test]
    fn round_trips_basic_rows() {
        let (columns, rows) = sample();
        let encoded = encode(&columns, &rows).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.columns, columns);
        assert_eq!(decoded.rows, rows);
    }

    #[test]
    fn dml_result_carries_row_count_with_zero_columns() {
        let encoded = encode(&[], &vec![vec![]; 7]).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.columns.len(), 0);
        assert_eq!(decoded.rows.len(), 7);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut encoded = encode(&[], &[]).unwrap();
        encoded[0] ^= 0xFF;
        assert!(decode(&encoded).is_err());
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut encoded = encode(&[], &[]).unwrap();
        encoded[4] = 2; // version low byte, little-endian
        encoded[5] = 0;
        assert!(decode(&encoded).is_err());
    }

    #[test]
    fn rejects_truncated_payload() {
        let encoded = encode(&sample().0, &sample().1).unwrap();
        let truncated = &encoded[..encoded.len() - 3];
        assert!(decode(truncated).is_err());
    }

    #[test]
    fn round_trips_all_value_kinds() {
        let columns = vec![
            ColumnMeta::new("a", 1),
            ColumnMeta::new("b", 1),
            ColumnMeta::new("c", 1),
            ColumnMeta::new("d", 1),
            ColumnMeta::new("e", 1),
            ColumnMeta::new("f", 1),
        ];
        let rows = vec![vec![
            Value::Int64(42),
            Value::NullableDouble(Some(1.5)),
            Value::NullableDouble(None),
            Value::Double(2.25),
            Value::NullableDateTime(Some(1_700_000_000_000)),
            Value::Binary(vec![1, 2, 3]),
        ]];
        let encoded = encode(&columns, &rows).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.rows, rows);
    }

    #[test]
    fn empty_result_decodes_to_zero_rows_and_columns() {
        let encoded = encode(&[], &[]).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert!(decoded.columns.is_empty());
        assert!(decoded.rows.is_empty());
    }
}
