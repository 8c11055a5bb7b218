//! VP9 payload descriptor (draft-ietf-payload-vp9, §4.2 flag layout).

use super::PayloadDescriptor;

/// A key frame is a frame that both starts a VP9 frame (`B` bit) and is not
/// inter-picture predicted (`P` bit clear).
pub fn describe(payload: &[u8]) -> PayloadDescriptor {
    if payload.is_empty() {
        return PayloadDescriptor::UNKNOWN;
    }

    let b0 = payload[0];
    let picture_id_present = b0 & 0x80 != 0; // I
    let inter_predicted = b0 & 0x40 != 0; // P
    let layer_indices_present = b0 & 0x20 != 0; // L
    let flexible_mode = b0 & 0x10 != 0; // F
    let start_of_frame = b0 & 0x08 != 0; // B
    let scalability_structure_present = b0 & 0x02 != 0; // V

    let mut size = 1;
    if picture_id_present {
        if payload.len() <= size {
            return PayloadDescriptor {
                is_keyframe: false,
                description_size: size,
            };
        }
        size += if payload[size] & 0x80 != 0 { 2 } else { 1 };
    }
    if layer_indices_present {
        size += 1;
        if !flexible_mode {
            size += 1;
        }
    }
    if flexible_mode && picture_id_present {
        // reference indices: one byte per reference, terminated by cleared N bit;
        // bounded scan to stay within the payload.
        while payload.len() > size && payload[size - 1] & 0x01 != 0 {
            size += 1;
        }
    }
    if scalability_structure_present {
        size += 1;
    }

    PayloadDescriptor {
        is_keyframe: start_of_frame && !inter_predicted,
        description_size: size,
    }
}
