// Multi-result payload (§4.3): a framed concatenation of row-buffer frames
// and affected-rows frames, order preserved. Each frame is
// `{u8 frame_type, u32 frame_length, frame_body}`; frame_type 0 carries a
// nested row buffer (§ `protocol::row`), frame_type 1 carries a bare u32
// affected-rows count.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::EngineError;
use crate::protocol::row;
use crate::protocol::{need, ColumnMeta, Value};

const FRAME_TYPE_ROWS: u8 = 0;
const FRAME_TYPE_AFFECTED: u8 = 1;

#[derive(Debug, Clone, PartialEq)]
pub enum MultiFrame {
    RowSet {
        columns: Vec<ColumnMeta>,
        rows: Vec<Vec<Value>>,
    },
    Affected(u32),
}

pub fn encode(frames: &[MultiFrame]) -> Result<Vec<u8>, EngineError> {
    let mut out = BytesMut::new();
    for frame in frames {
        match frame {
            MultiFrame::RowSet { columns, rows } => {
                let body = row::encode(columns, rows)?;
                out.put_u8(FRAME_TYPE_ROWS);
                out.put_u32_le(body.len() as u32);
                out.put_slice(&body);
            }
            MultiFrame::Affected(count) => {
                out.put_u8(FRAME_TYPE_AFFECTED);
                out.put_u32_le(4);
                out.put_u32_le(*count);
            }
        }
    }
    Ok(out.to_vec())
}

pub fn decode(data: &[u8]) -> Result<Vec<MultiFrame>, EngineError> {
    let mut buf = data;
    let mut frames = Vec::new();

    while buf.remaining() > 0 {
        need(buf.remaining(), 5, "multi-result frame header")?;
        let frame_type = buf.get_u8();
        let frame_len = buf.get_u32_le() as usize;
        need(buf.remaining(), frame_len, "multi-result frame body")?;
        let body = buf.copy_to_bytes(frame_len);

        let frame = match frame_type {
            FRAME_TYPE_ROWS => {
                let decoded = row::decode(&body)?;
                MultiFrame::RowSet {
                    columns: decoded.columns,
                    rows: decoded.rows,
                }
            }
            FRAME_TYPE_AFFECTED => {
                if frame_len != 4 {
                    return Err(EngineError::Validation(format!(
                        "affected-rows frame must be 4 bytes, got {frame_len}"
                    )));
                }
                let mut body_buf: &[u8] = &body;
                MultiFrame::Affected(body_buf.get_u32_le())
            }
            other => return Err(EngineError::Validation(format!("unknown multi-result frame type {other}"))),
        };
        frames.push(frame);
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_mixed_frames_in_order() {
        let frames = vec![
            MultiFrame::RowSet {
                columns: vec![ColumnMeta::new("id", 4)],
                rows: vec![vec![Value::Int32(1)]],
            },
            MultiFrame::Affected(3),
            MultiFrame::RowSet {
                columns: vec![],
                rows: vec![],
            },
        ];
        let encoded = encode(&frames).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, frames);
    }

    #[test]
    fn empty_multi_result_decodes_to_no_frames() {
        assert!(decode(&encode(&[]).unwrap()).unwrap().is_empty());
    }
}
