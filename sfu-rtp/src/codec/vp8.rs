//! VP8 payload descriptor, RFC 7741 §4.2.

use super::PayloadDescriptor;

/// Parses the VP8 payload descriptor and, when it marks the start of the
/// first partition, inspects the VP8 uncompressed data chunk's frame-type
/// bit to decide whether this is a keyframe.
pub fn describe(payload: &[u8]) -> PayloadDescriptor {
    if payload.is_empty() {
        return PayloadDescriptor::UNKNOWN;
    }

    let b0 = payload[0];
    let extended = b0 & 0x80 != 0; // X
    let start_of_partition = b0 & 0x10 != 0; // S
    let partition_id = b0 & 0x0F; // PID

    let mut size = 1;
    if extended {
        if payload.len() < 2 {
            return PayloadDescriptor::UNKNOWN;
        }
        let ext = payload[1];
        size += 1;
        if ext & 0x80 != 0 {
            size += 2; // I: picture id, possibly 2 bytes (M bit)
            if payload.len() > size - 1 && payload[size - 1] & 0x80 == 0 {
                size -= 1; // 7-bit picture id only
            }
        }
        if ext & 0x40 != 0 {
            size += 1; // L: TL0PICIDX
        }
        if ext & 0x20 != 0 || ext & 0x10 != 0 {
            size += 1; // T and/or K share one byte
        }
    }

    if payload.len() <= size {
        return PayloadDescriptor {
            is_keyframe: false,
            description_size: size,
        };
    }

    let is_keyframe =
        start_of_partition && partition_id == 0 && (payload[size] & 0x01) == 0;

    PayloadDescriptor {
        is_keyframe,
        description_size: size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_descriptor_keyframe() {
        // S=1, PID=0, no extension; VP8 payload byte with P bit clear (key frame)
        let payload = [0b0001_0000u8, 0x00, 0xAA, 0xBB];
        let d = describe(&payload);
        assert!(d.is_keyframe);
        assert_eq!(d.description_size, 1);
    }

    #[test]
    fn non_start_partition_is_not_a_keyframe() {
        let payload = [0b0000_0000u8, 0x00];
        let d = describe(&payload);
        assert!(!d.is_keyframe);
    }

    #[test]
    fn inter_frame_bit_set_is_not_a_keyframe() {
        let payload = [0b0001_0000u8, 0x01];
        let d = describe(&payload);
        assert!(!d.is_keyframe);
    }

    #[test]
    fn empty_payload_is_unknown() {
        assert_eq!(describe(&[]), PayloadDescriptor::UNKNOWN);
    }
}
