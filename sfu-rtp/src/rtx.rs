//! RTX wrap/repair (RFC 4588): the OSN-prefixed retransmission payload
//! format used by [`crate::codec`]'s keyframe detection callers and by
//! `sfu-core`'s `SubscribeTrack`/`PublishTrack` RTX paths.

use bytes::{BufMut, Bytes, BytesMut};

use crate::header::Header;
use crate::packet::Packet;

/// Wraps `original` into an RTX packet: the original sequence number (big
/// endian) prepended to the payload, then sent under the RTX SSRC/payload
/// type/sequence space. Mirrors the construction in
/// `rtc-interceptor::nack::responder::NackResponderInterceptor::handle_nack`.
pub fn wrap(
    original: &Packet,
    rtx_ssrc: u32,
    rtx_payload_type: u8,
    rtx_sequence_number: u16,
) -> Packet {
    let mut payload = BytesMut::with_capacity(2 + original.payload.len());
    payload.put_u16(original.header.sequence_number);
    payload.extend_from_slice(&original.payload);

    let header = Header {
        payload_type: rtx_payload_type,
        sequence_number: rtx_sequence_number,
        ssrc: rtx_ssrc,
        marker: original.header.marker,
        timestamp: original.header.timestamp,
        ..Default::default()
    };

    Packet::new(header, payload.freeze())
}

/// Recovers the original sequence number and payload from an RTX packet,
/// without reallocating the payload bytes. Returns `None` if the RTX
/// payload is too short to contain the two-byte OSN prefix.
pub fn unwrap(rtx: &Packet) -> Option<(u16, Bytes)> {
    if rtx.payload.len() < 2 {
        return None;
    }
    let original_seq = u16::from_be_bytes([rtx.payload[0], rtx.payload[1]]);
    Some((original_seq, rtx.payload.slice(2..)))
}

/// Rewrites an RTX packet's header in place back to the original media
/// stream's SSRC/payload type/sequence number, consuming the OSN prefix.
/// Used when repairing an inbound RTX retransmission on the publish side.
pub fn repair(mut rtx: Packet, original_ssrc: u32, original_payload_type: u8) -> Option<Packet> {
    let (original_seq, payload) = unwrap(&rtx)?;
    rtx.header.ssrc = original_ssrc;
    rtx.header.payload_type = original_payload_type;
    rtx.header.sequence_number = original_seq;
    rtx.payload = payload;
    Some(rtx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn wrap_then_repair_recovers_original() {
        let header = Header {
            payload_type: 96,
            sequence_number: 50,
            ssrc: 0x1111,
            ..Default::default()
        };
        let original = Packet::new(header, Bytes::from_static(b"payload"));

        let rtx = wrap(&original, 0x2222, 97, 0);
        assert_eq!(rtx.header.ssrc, 0x2222);
        assert_eq!(rtx.header.payload_type, 97);
        assert_eq!(rtx.header.sequence_number, 0);
        assert_eq!(&rtx.payload[..2], &50u16.to_be_bytes());
        assert_eq!(&rtx.payload[2..], b"payload");

        let repaired = repair(rtx, 0x1111, 96).unwrap();
        assert_eq!(repaired.header.ssrc, 0x1111);
        assert_eq!(repaired.header.payload_type, 96);
        assert_eq!(repaired.header.sequence_number, 50);
        assert_eq!(repaired.payload, Bytes::from_static(b"payload"));
    }

    #[test]
    fn unwrap_rejects_short_payload() {
        let header = Header::default();
        let short = Packet::new(header, Bytes::from_static(b"x"));
        assert!(unwrap(&short).is_none());
    }
}
