//! H.264 payload descriptor, RFC 6184: single NAL unit, STAP-A aggregation,
//! and FU-A fragmentation packetization modes.

use super::PayloadDescriptor;

const NAL_TYPE_IDR_SLICE: u8 = 5;
const NAL_TYPE_STAP_A: u8 = 24;
const NAL_TYPE_FU_A: u8 = 28;

fn nal_type(b: u8) -> u8 {
    b & 0x1F
}

/// A keyframe is any packet that carries (or starts, for FU-A) an IDR slice
/// NAL unit. There is no separate "description size" concept distinct from
/// the NAL header itself for this codec, so `description_size` is always 1.
pub fn describe(payload: &[u8]) -> PayloadDescriptor {
    if payload.is_empty() {
        return PayloadDescriptor::UNKNOWN;
    }

    let header = payload[0];
    let nt = nal_type(header);

    let is_keyframe = match nt {
        NAL_TYPE_IDR_SLICE => true,
        NAL_TYPE_STAP_A => describe_stap_a(&payload[1..]),
        NAL_TYPE_FU_A => describe_fu_a(payload),
        _ => false,
    };

    PayloadDescriptor {
        is_keyframe,
        description_size: 1,
    }
}

fn describe_stap_a(mut rest: &[u8]) -> bool {
    while rest.len() >= 3 {
        let len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        if rest.len() < 2 + len || len == 0 {
            break;
        }
        if nal_type(rest[2]) == NAL_TYPE_IDR_SLICE {
            return true;
        }
        rest = &rest[2 + len..];
    }
    false
}

fn describe_fu_a(payload: &[u8]) -> bool {
    if payload.len() < 2 {
        return false;
    }
    let fu_header = payload[1];
    let start_bit = fu_header & 0x80 != 0;
    let original_type = fu_header & 0x1F;
    start_bit && original_type == NAL_TYPE_IDR_SLICE
}
