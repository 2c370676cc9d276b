// Bulk-insert payload (§4.3, §4.10): a column-major layout so a single
// partition of rows can be sliced out without touching unrelated columns.
//
// Layout: `{u32 table name length, name bytes}`, `{u32 column count}`, then
// per column `{u32 name length, name bytes, u8 type tag, u8 nullable, u32
// max_len}`, then `{u32 row count}`, then one block per column. A nullable
// column's block opens with a null bitmap of `ceil(row_count / 8)` bytes,
// bit-per-row, LSB-first within each byte (bit set = null, value omitted
// from the block); a non-nullable column's block has no bitmap and every
// row's value is present.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::EngineError;
use crate::protocol::need;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkColumnType {
    Int32,
    Int64,
    Text,
    Decimal,
    Binary,
    Timestamp,
}

impl BulkColumnType {
    fn tag(self) -> u8 {
        match self {
            BulkColumnType::Int32 => 0,
            BulkColumnType::Int64 => 1,
            BulkColumnType::Text => 2,
            BulkColumnType::Decimal => 3,
            BulkColumnType::Binary => 4,
            BulkColumnType::Timestamp => 5,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, EngineError> {
        match tag {
            0 => Ok(BulkColumnType::Int32),
            1 => Ok(BulkColumnType::Int64),
            2 => Ok(BulkColumnType::Text),
            3 => Ok(BulkColumnType::Decimal),
            4 => Ok(BulkColumnType::Binary),
            5 => Ok(BulkColumnType::Timestamp),
            other => Err(EngineError::Validation(format!("unknown bulk column type tag {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkColumn {
    pub name: String,
    pub column_type: BulkColumnType,
    pub nullable: bool,
    pub max_len: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timestamp {
    pub year: i16,
    pub month: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub fraction_ns: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BulkCell {
    Int32(i32),
    Int64(i64),
    Text(String),
    Decimal(String),
    Binary(Vec<u8>),
    Timestamp(Timestamp),
}

impl BulkCell {
    fn matches(&self, column_type: BulkColumnType) -> bool {
        matches!(
            (self, column_type),
            (BulkCell::Int32(_), BulkColumnType::Int32)
                | (BulkCell::Int64(_), BulkColumnType::Int64)
                | (BulkCell::Text(_), BulkColumnType::Text)
                | (BulkCell::Decimal(_), BulkColumnType::Decimal)
                | (BulkCell::Binary(_), BulkColumnType::Binary)
                | (BulkCell::Timestamp(_), BulkColumnType::Timestamp)
        )
    }
}

pub struct BulkPayload {
    pub table_name: String,
    pub columns: Vec<BulkColumn>,
    /// Column-major: `cells[column_index][row_index]`, `None` for a null entry.
    pub cells: Vec<Vec<Option<BulkCell>>>,
}

fn bitmap_len(row_count: usize) -> usize {
    row_count.div_ceil(8)
}

pub fn encode(payload: &BulkPayload) -> Result<Vec<u8>, EngineError> {
    let row_count = payload.cells.first().map(|col| col.len()).unwrap_or(0);

    if payload.cells.len() != payload.columns.len() {
        return Err(EngineError::BulkValidation {
            row: 0,
            column: payload.table_name.clone(),
            reason: format!(
                "{} columns declared but {} value columns supplied",
                payload.columns.len(),
                payload.cells.len()
            ),
        });
    }

    let mut out = BytesMut::new();
    out.put_u32_le(payload.table_name.len() as u32);
    out.put_slice(payload.table_name.as_bytes());

    out.put_u32_le(payload.columns.len() as u32);
    for col in &payload.columns {
        out.put_u32_le(col.name.len() as u32);
        out.put_slice(col.name.as_bytes());
        out.put_u8(col.column_type.tag());
        out.put_u8(col.nullable as u8);
        out.put_u32_le(col.max_len);
    }

    out.put_u32_le(row_count as u32);

    for (col_idx, column) in payload.columns.iter().enumerate() {
        let values = &payload.cells[col_idx];
        if values.len() != row_count {
            return Err(EngineError::BulkValidation {
                row: 0,
                column: column.name.clone(),
                reason: format!("column has {} rows, expected {row_count}", values.len()),
            });
        }

        if column.nullable {
            let mut bitmap = vec![0u8; bitmap_len(row_count)];
            for (row_idx, cell) in values.iter().enumerate() {
                if cell.is_none() {
                    bitmap[row_idx / 8] |= 1 << (row_idx % 8);
                }
            }
            out.put_slice(&bitmap);
        }

        for (row_idx, cell) in values.iter().enumerate() {
            match cell {
                None => {
                    if !column.nullable {
                        return Err(EngineError::BulkValidation {
                            row: row_idx as u32,
                            column: column.name.clone(),
                            reason: "null value in non-nullable column".to_string(),
                        });
                    }
                }
                Some(value) => {
                    if !value.matches(column.column_type) {
                        return Err(EngineError::BulkValidation {
                            row: row_idx as u32,
                            column: column.name.clone(),
                            reason: "value type does not match declared column type".to_string(),
                        });
                    }
                    encode_cell(&mut out, value);
                }
            }
        }
    }

    Ok(out.to_vec())
}

fn encode_cell(out: &mut BytesMut, cell: &BulkCell) {
    match cell {
        BulkCell::Int32(v) => out.put_i32_le(*v),
        BulkCell::Int64(v) => out.put_i64_le(*v),
        BulkCell::Text(s) => {
            out.put_u32_le(s.len() as u32);
            out.put_slice(s.as_bytes());
        }
        BulkCell::Decimal(s) => {
            out.put_u32_le(s.len() as u32);
            out.put_slice(s.as_bytes());
        }
        BulkCell::Binary(b) => {
            out.put_u32_le(b.len() as u32);
            out.put_slice(b);
        }
        BulkCell::Timestamp(ts) => {
            out.put_i16_le(ts.year);
            out.put_u16_le(ts.month);
            out.put_u16_le(ts.day);
            out.put_u16_le(ts.hour);
            out.put_u16_le(ts.minute);
            out.put_u16_le(ts.second);
            out.put_u32_le(ts.fraction_ns);
        }
    }
}

fn decode_cell(buf: &mut &[u8], column_type: BulkColumnType) -> Result<BulkCell, EngineError> {
    Ok(match column_type {
        BulkColumnType::Int32 => {
            need(buf.remaining(), 4, "bulk int32 cell")?;
            BulkCell::Int32(buf.get_i32_le())
        }
        BulkColumnType::Int64 => {
            need(buf.remaining(), 8, "bulk int64 cell")?;
            BulkCell::Int64(buf.get_i64_le())
        }
        BulkColumnType::Text => {
            need(buf.remaining(), 4, "bulk text cell length")?;
            let len = buf.get_u32_le() as usize;
            need(buf.remaining(), len, "bulk text cell payload")?;
            let bytes = buf.copy_to_bytes(len);
            BulkCell::Text(
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| EngineError::Validation(format!("bulk text cell is not valid UTF-8: {e}")))?,
            )
        }
        BulkColumnType::Decimal => {
            need(buf.remaining(), 4, "bulk decimal cell length")?;
            let len = buf.get_u32_le() as usize;
            need(buf.remaining(), len, "bulk decimal cell payload")?;
            let bytes = buf.copy_to_bytes(len);
            BulkCell::Decimal(
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| EngineError::Validation(format!("bulk decimal cell is not valid UTF-8: {e}")))?,
            )
        }
        BulkColumnType::Binary => {
            need(buf.remaining(), 4, "bulk binary cell length")?;
            let len = buf.get_u32_le() as usize;
            need(buf.remaining(), len, "bulk binary cell payload")?;
            BulkCell::Binary(buf.copy_to_bytes(len).to_vec())
        }
        BulkColumnType::Timestamp => {
            need(buf.remaining(), 14, "bulk timestamp cell")?;
            BulkCell::Timestamp(Timestamp {
                year: buf.get_i16_le(),
                month: buf.get_u16_le(),
                day: buf.get_u16_le(),
                hour: buf.get_u16_le(),
                minute: buf.get_u16_le(),
                second: buf.get_u16_le(),
                fraction_ns: buf.get_u32_le(),
            })
        }
    })
}

pub fn decode(data: &[u8]) -> Result<BulkPayload, EngineError> {
    let mut buf = data;

    need(buf.remaining(), 4, "bulk table name length")?;
    let name_len = buf.get_u32_le() as usize;
    need(buf.remaining(), name_len, "bulk table name")?;
    let table_name = String::from_utf8(buf.copy_to_bytes(name_len).to_vec())
        .map_err(|e| EngineError::Validation(format!("bulk table name is not valid UTF-8: {e}")))?;

    need(buf.remaining(), 4, "bulk column count")?;
    let column_count = buf.get_u32_le() as usize;
    let mut columns = Vec::with_capacity(column_count);
    for _ in 0..column_count {
        need(buf.remaining(), 4, "bulk column name length")?;
        let col_name_len = buf.get_u32_le() as usize;
        need(buf.remaining(), col_name_len + 6, "bulk column metadata")?;
        let name = String::from_utf8(buf.copy_to_bytes(col_name_len).to_vec())
            .map_err(|e| EngineError::Validation(format!("bulk column name is not valid UTF-8: {e}")))?;
        let column_type = BulkColumnType::from_tag(buf.get_u8())?;
        let nullable = buf.get_u8() != 0;
        let max_len = buf.get_u32_le();
        columns.push(BulkColumn {
            name,
            column_type,
            nullable,
            max_len,
        });
    }

    need(buf.remaining(), 4, "bulk row count")?;
    let row_count = buf.get_u32_le() as usize;

    let mut cells = Vec::with_capacity(columns.len());
    for column in &columns {
        let mut bitmap = vec![0u8; bitmap_len(row_count)];
        if column.nullable {
            need(buf.remaining(), bitmap.len(), "bulk null bitmap")?;
            bitmap.copy_from_slice(&buf.copy_to_bytes(bitmap.len()));
        }

        let mut column_values = Vec::with_capacity(row_count);
        for row_idx in 0..row_count {
            let is_null = column.nullable && (bitmap[row_idx / 8] & (1 << (row_idx % 8))) != 0;
            if is_null {
                column_values.push(None);
            } else {
                column_values.push(Some(decode_cell(&mut buf, column.column_type)?));
            }
        }
        cells.push(column_values);
    }

    if buf.remaining() != 0 {
        return Err(EngineError::Validation(format!(
            "bulk payload has {} trailing bytes after decoding {row_count} rows",
            buf.remaining()
        )));
    }

    Ok(BulkPayload {
        table_name,
        columns,
        cells,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BulkPayload {
        BulkPayload {
            table_name: "accounts".to_string(),
            columns: vec![
                BulkColumn {
                    name: "id".to_string(),
                    column_type: BulkColumnType::Int64,
                    nullable: false,
                    max_len: 0,
                },
                BulkColumn {
                    name: "nickname".to_string(),
                    column_type: BulkColumnType::Text,
                    nullable: true,
                    max_len: 64,
                },
            ],
            cells: vec![
                vec![Some(BulkCell::Int64(1)), Some(BulkCell::Int64(2)), Some(BulkCell::Int64(3))],
                vec![Some(BulkCell::Text("ann".to_string())), None, Some(BulkCell::Text("cy".to_string()))],
            ],
        }
    }

    #[test]
    fn round_trips_with_null_bitmap() {
        let payload = sample();
        let encoded = encode(&payload).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.table_name, payload.table_name);
        assert_eq!(decoded.cells, payload.cells);
    }

    #[test]
    fn non_nullable_column_skips_bitmap() {
        let payload = sample();
        let encoded = encode(&payload).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert!(decoded.cells[0].iter().all(Option::is_some));
    }

    #[test]
    fn rejects_null_in_non_nullable_column() {
        let mut payload = sample();
        payload.cells[0][1] = None;
        assert!(encode(&payload).is_err());
    }

    #[test]
    fn rejects_type_mismatch() {
        let mut payload = sample();
        payload.cells[0][0] = Some(BulkCell::Text("oops".to_string()));
        assert!(encode(&payload).is_err());
    }

    #[test]
    fn rejects_truncated_payload() {
        let encoded = encode(&sample()).unwrap();
        assert!(decode(&encoded[..encoded.len() - 2]).is_err());
    }

    #[test]
    fn round_trips_timestamp_column() {
        let payload = BulkPayload {
            table_name: "events".to_string(),
            columns: vec![BulkColumn {
                name: "occurred_at".to_string(),
                column_type: BulkColumnType::Timestamp,
                nullable: false,
                max_len: 0,
            }],
            cells: vec![vec![Some(BulkCell::Timestamp(Timestamp {
                year: 2026,
                month: 8,
                day: 1,
                hour: 12,
                minute: 30,
                second: 0,
                fraction_ns: 0,
            }))]],
        };
        let encoded = encode(&payload).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.cells, payload.cells);
    }
}
