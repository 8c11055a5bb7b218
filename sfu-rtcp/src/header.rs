//! RTCP common header, RFC 3550 §6.4.1.

use bytes::BytesMut;
use sfu_shared::error::{Error, Result};
use sfu_shared::marshal::{Marshal, MarshalSize, Unmarshal};
use sfu_shared::{ByteReader, ByteWriter};

pub const HEADER_LENGTH: usize = 4;
pub const VERSION: u8 = 2;

pub const PT_SR: u8 = 200;
pub const PT_RR: u8 = 201;
pub const PT_SDES: u8 = 202;
pub const PT_BYE: u8 = 203;
pub const PT_APP: u8 = 204;
pub const PT_RTPFB: u8 = 205;
pub const PT_PSFB: u8 = 206;
pub const PT_XR: u8 = 207;

pub const FMT_NACK: u8 = 1;
pub const FMT_TWCC: u8 = 15;
pub const FMT_PLI: u8 = 1;
pub const FMT_FIR: u8 = 4;

/// The 4-byte header shared by every RTCP packet type. `count` is overloaded
/// per-type: reception report count for SR/RR, source count for SDES/BYE,
/// feedback message type (FMT) for RTPFB/PSFB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub padding: bool,
    pub count: u8,
    pub packet_type: u8,
    /// Length of the packet in 32-bit words minus one, *not including* this
    /// header word. Recomputed at marshal time; callers don't set it.
    pub length: u16,
}

impl MarshalSize for Header {
    fn marshal_size(&self) -> usize {
        HEADER_LENGTH
    }
}

impl Marshal for Header {
    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        let mut w = ByteWriter::with_capacity(HEADER_LENGTH);
        let mut b0 = (VERSION & 0x3) << 6;
        if self.padding {
            b0 |= 1 << 5;
        }
        b0 |= self.count & 0x1F;
        w.write_u8(b0);
        w.write_u8(self.packet_type);
        w.write_u16(self.length);
        buf.extend_from_slice(w.as_slice());
        Ok(HEADER_LENGTH)
    }
}

impl Unmarshal for Header {
    fn unmarshal(buf: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(buf);
        let b0 = r.read_u8()?;
        let version = (b0 >> 6) & 0x3;
        if version != VERSION {
            return Err(Error::ErrInvalidRtcpVersion);
        }
        let padding = (b0 >> 5) & 0x1 == 1;
        let count = b0 & 0x1F;
        let packet_type = r.read_u8()?;
        let length = r.read_u16()?;
        Ok(Header {
            padding,
            count,
            packet_type,
            length,
        })
    }
}

/// Given a body length in bytes (not including the 4-byte header), computes
/// the `length` field value: `(header+body)/4 - 1`.
pub fn length_field_for(body_len: usize) -> u16 {
    (((HEADER_LENGTH + body_len) / 4) - 1) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let h = Header {
            padding: false,
            count: 3,
            packet_type: PT_SR,
            length: 7,
        };
        let bytes = h.marshal().unwrap();
        let parsed = Header::unmarshal(&bytes).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn length_field_matches_rfc_formula() {
        // one SSRC (4 bytes) body after the header => total 8 bytes => (8/4)-1=1
        assert_eq!(length_field_for(4), 1);
    }
}
