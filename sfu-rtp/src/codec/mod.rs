//! Per-codec RTP payload descriptor parsing, used only to answer "is this
//! packet the start of a keyframe".
//!
//! spec.md §4.2: "the payload parser yields a small record (`{is_keyframe,
//! description_size}`) attached to the packet; an unsupported codec yields
//! 'unknown, not a keyframe'."

pub mod av1;
pub mod h264;
pub mod vp8;
pub mod vp9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadDescriptor {
    pub is_keyframe: bool,
    pub description_size: usize,
}

impl PayloadDescriptor {
    pub const UNKNOWN: PayloadDescriptor = PayloadDescriptor {
        is_keyframe: false,
        description_size: 0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Vp8,
    Vp9,
    H264,
    Av1,
    Other,
}

impl Codec {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "VP8" => Codec::Vp8,
            "VP9" => Codec::Vp9,
            "H264" => Codec::H264,
            "AV1" => Codec::Av1,
            _ => Codec::Other,
        }
    }

    pub fn describe(self, payload: &[u8]) -> PayloadDescriptor {
        match self {
            Codec::Vp8 => vp8::describe(payload),
            Codec::Vp9 => vp9::describe(payload),
            Codec::H264 => h264::describe(payload),
            Codec::Av1 => av1::describe(payload),
            Codec::Other => PayloadDescriptor::UNKNOWN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codec_never_reports_keyframe() {
        assert_eq!(Codec::Other.describe(&[0xFF; 4]), PayloadDescriptor::UNKNOWN);
    }

    #[test]
    fn codec_name_matching_is_case_insensitive() {
        assert_eq!(Codec::from_name("vp8"), Codec::Vp8);
        assert_eq!(Codec::from_name("H264"), Codec::H264);
        assert_eq!(Codec::from_name("opus"), Codec::Other);
    }
}
