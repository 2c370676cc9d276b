// Metrics snapshot wire format (§4.3): exactly 40 bytes, 5 little-endian
// u64 fields.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::EngineError;
use crate::metrics::MetricsSnapshot;
use crate::protocol::need;

pub const METRICS_SNAPSHOT_LEN: usize = 40;

pub fn encode(snapshot: &MetricsSnapshot) -> [u8; METRICS_SNAPSHOT_LEN] {
    let mut buf = BytesMut::with_capacity(METRICS_SNAPSHOT_LEN);
    buf.put_u64_le(snapshot.queries);
    buf.put_u64_le(snapshot.errors);
    buf.put_u64_le(snapshot.uptime_seconds);
    buf.put_u64_le(snapshot.total_latency_ms);
    buf.put_u64_le(snapshot.avg_latency_ms);
    let mut out = [0u8; METRICS_SNAPSHOT_LEN];
    out.copy_from_slice(&buf);
    out
}

pub fn decode(data: &[u8]) -> Result<MetricsSnapshot, EngineError> {
    need(data.len(), METRICS_SNAPSHOT_LEN, "metrics snapshot")?;
    let mut buf = data;
    Ok(MetricsSnapshot {
        queries: buf.get_u64_le(),
        errors: buf.get_u64_le(),
        uptime_seconds: buf.get_u64_le(),
        total_latency_ms: buf.get_u64_le(),
        avg_latency_ms: buf.get_u64_le(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let snap = MetricsSnapshot {
            queries: 10,
            errors: 1,
            uptime_seconds: 3600,
            total_latency_ms: 5000,
            avg_latency_ms: 500,
        };
        let encoded = encode(&snap);
        assert_eq!(encoded.len(), METRICS_SNAPSHOT_LEN);
        assert_eq!(decode(&encoded).unwrap(), snap);
    }

    #[test]
    fn rejects_short_buffer() {
        assert!(decode(&[0u8; 8]).is_err());
    }
}
