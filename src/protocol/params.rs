// Parameter buffer format (input only, §4.3): a concatenation of
// `{u8 tag, u32 length, bytes}` records.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::EngineError;
use crate::protocol::need;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    String(String),
    Int32(i32),
    Int64(i64),
    /// Carried as text; the driver binds it against the target column's
    /// native decimal type.
    Decimal(String),
    Binary(Vec<u8>),
}

impl ParamValue {
    fn tag(&self) -> u8 {
        match self {
            ParamValue::Null => 0,
            ParamValue::String(_) => 1,
            ParamValue::Int32(_) => 2,
            ParamValue::Int64(_) => 3,
            ParamValue::Decimal(_) => 4,
            ParamValue::Binary(_) => 5,
        }
    }
}

pub fn encode_params(params: &[ParamValue]) -> Vec<u8> {
    let mut out = BytesMut::new();
    for param in params {
        out.put_u8(param.tag());
        match param {
            ParamValue::Null => out.put_u32_le(0),
            ParamValue::String(s) => {
                out.put_u32_le(s.len() as u32);
                out.put_slice(s.as_bytes());
            }
            ParamValue::Int32(v) => {
                out.put_u32_le(4);
                out.put_i32_le(*v);
            }
            ParamValue::Int64(v) => {
                out.put_u32_le(8);
                out.put_i64_le(*v);
            }
            ParamValue::Decimal(s) => {
                out.put_u32_le(s.len() as u32);
                out.put_slice(s.as_bytes());
            }
            ParamValue::Binary(b) => {
                out.put_u32_le(b.len() as u32);
                out.put_slice(b);
            }
        }
    }
    out.to_vec()
}

pub fn decode_params(data: &[u8]) -> Result<Vec<ParamValue>, EngineError> {
    let mut buf = data;
    let mut out = Vec::new();

    while buf.remaining() > 0 {
        need(buf.remaining(), 5, "parameter record header")?;
        let tag = buf.get_u8();
        let len = buf.get_u32_le() as usize;
        need(buf.remaining(), len, "parameter record payload")?;
        let bytes = buf.copy_to_bytes(len);

        let value = match tag {
            0 => ParamValue::Null,
            1 => ParamValue::String(utf8(&bytes)?),
            2 => {
                if len != 4 {
                    return Err(EngineError::Validation(format!("int32 parameter length must be 4, got {len}")));
                }
                ParamValue::Int32(i32::from_le_bytes(bytes.as_ref().try_into().unwrap()))
            }
            3 => {
                if len != 8 {
                    return Err(EngineError::Validation(format!("int64 parameter length must be 8, got {len}")));
                }
                ParamValue::Int64(i64::from_le_bytes(bytes.as_ref().try_into().unwrap()))
            }
            4 => ParamValue::Decimal(utf8(&bytes)?),
            5 => ParamValue::Binary(bytes.to_vec()),
            other => return Err(EngineError::Validation(format!("unknown parameter tag {other}"))),
        };
        out.push(value);
    }

    Ok(out)
}

fn utf8(bytes: &[u8]) -> Result<String, EngineError> {
    String::from_utf8(bytes.to_vec()).map_err(|e| EngineError::Validation(format!("parameter is not valid UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_tag() {
        let params = vec![
            ParamValue::Null,
            ParamValue::String("a".to_string()),
            ParamValue::Int32(1),
            ParamValue::Int64(2),
            ParamValue::Decimal("3.14".to_string()),
            ParamValue::Binary(vec![9, 8, 7]),
        ];
        let encoded = encode_params(&params);
        let decoded = decode_params(&encoded).unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn empty_list_round_trips_to_empty() {
        assert_eq!(decode_params(&encode_params(&[])).unwrap(), vec![]);
    }

    #[test]
    fn rejects_bad_int32_length() {
        let mut encoded = encode_params(&[ParamValue::Int32(5)]);
        encoded[1] = 3; // claim length 3 instead of 4
        assert!(decode_params(&encoded).is_err());
    }

    #[test]
    fn rejects_truncated_record() {
        let encoded = encode_params(&[ParamValue::String("hello".to_string())]);
        assert!(decode_params(&encoded[..encoded.len() - 2]).is_err());
    }
}
