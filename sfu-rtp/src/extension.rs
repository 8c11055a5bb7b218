//! Registry mapping negotiated extension-id numbers to the well-known URIs
//! a publisher/subscriber pair agreed on in SDP, plus a decoder for the
//! transport-wide sequence number extension this core reads off every
//! arriving packet to drive receive-side TWCC (spec.md §4.8). The
//! abs-send-time and RID/repaired-RID decoders are kept alongside it as the
//! same kind of small fixed-width extension reader, for a caller that binds
//! those extension ids once per-packet routing by RID header (rather than
//! SDP-level simulcast grouping) is needed.

/// Well-known one-byte header extension URIs this core understands.
pub mod uri {
    pub const TRANSPORT_CC: &str =
        "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01";
    pub const ABS_SEND_TIME: &str = "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time";
    pub const SDES_RTP_STREAM_ID: &str = "urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id";
    pub const SDES_REPAIRED_RTP_STREAM_ID: &str =
        "urn:ietf:params:rtp-hdrext:sdes:repaired-rtp-stream-id";
}

/// A negotiated id ↔ URI pair, built once per `PublishTrack` from the SDP
/// extmap lines and consulted by its owning `PublishStream` to decode the
/// transport-wide sequence number extension off each arriving packet.
#[derive(Debug, Clone, Default)]
pub struct ExtensionMap {
    transport_cc_id: Option<u8>,
    abs_send_time_id: Option<u8>,
    rid_id: Option<u8>,
    repaired_rid_id: Option<u8>,
}

impl ExtensionMap {
    pub fn register(&mut self, uri: &str, id: u8) {
        match uri {
            uri::TRANSPORT_CC => self.transport_cc_id = Some(id),
            uri::ABS_SEND_TIME => self.abs_send_time_id = Some(id),
            uri::SDES_RTP_STREAM_ID => self.rid_id = Some(id),
            uri::SDES_REPAIRED_RTP_STREAM_ID => self.repaired_rid_id = Some(id),
            _ => {}
        }
    }

    pub fn transport_cc_id(&self) -> Option<u8> {
        self.transport_cc_id
    }

    pub fn abs_send_time_id(&self) -> Option<u8> {
        self.abs_send_time_id
    }

    pub fn rid_id(&self) -> Option<u8> {
        self.rid_id
    }

    pub fn repaired_rid_id(&self) -> Option<u8> {
        self.repaired_rid_id
    }
}

/// Decodes a 2-byte big-endian transport-wide sequence number extension
/// value.
pub fn decode_transport_cc(bytes: &[u8]) -> Option<u16> {
    if bytes.len() < 2 {
        return None;
    }
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Decodes a 3-byte abs-send-time value (6.18 fixed point seconds).
pub fn decode_abs_send_time(bytes: &[u8]) -> Option<u32> {
    if bytes.len() < 3 {
        return None;
    }
    Some(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
}

/// Decodes an RID/repaired-RID SDES string extension value.
pub fn decode_rid(bytes: &[u8]) -> Option<&str> {
    std::str::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_looks_up_known_uris() {
        let mut map = ExtensionMap::default();
        map.register(uri::TRANSPORT_CC, 3);
        map.register(uri::SDES_RTP_STREAM_ID, 8);
        assert_eq!(map.transport_cc_id(), Some(3));
        assert_eq!(map.rid_id(), Some(8));
        assert_eq!(map.abs_send_time_id(), None);
    }

    #[test]
    fn unknown_uri_is_ignored() {
        let mut map = ExtensionMap::default();
        map.register("urn:example:unknown", 5);
        assert_eq!(map.transport_cc_id(), None);
    }

    #[test]
    fn decodes_transport_cc_value() {
        assert_eq!(decode_transport_cc(&[0x01, 0x02]), Some(0x0102));
        assert_eq!(decode_transport_cc(&[0x01]), None);
    }
}
