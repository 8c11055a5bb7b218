//! PLI: picture loss indication, RFC 4585 §6.3.1.

use bytes::BytesMut;
use sfu_shared::error::{Error, Result};
use sfu_shared::marshal::{Marshal, MarshalSize, Unmarshal};
use sfu_shared::ByteReader;

use crate::header::{self, Header, FMT_PLI, PT_PSFB};

const BODY_LENGTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PictureLossIndication {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
}

impl MarshalSize for PictureLossIndication {
    fn marshal_size(&self) -> usize {
        header::HEADER_LENGTH + BODY_LENGTH
    }
}

impl Marshal for PictureLossIndication {
    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        let start = buf.len();
        let header = Header {
            padding: false,
            count: FMT_PLI,
            packet_type: PT_PSFB,
            length: header::length_field_for(BODY_LENGTH),
        };
        header.marshal_to(buf)?;
        buf.extend_from_slice(&self.sender_ssrc.to_be_bytes());
        buf.extend_from_slice(&self.media_ssrc.to_be_bytes());
        Ok(buf.len() - start)
    }
}

impl Unmarshal for PictureLossIndication {
    fn unmarshal(buf: &[u8]) -> Result<Self> {
        let header = Header::unmarshal(buf)?;
        if header.packet_type != PT_PSFB || header.count != FMT_PLI {
            return Err(Error::ErrUnknownRtcpType(header.packet_type));
        }
        let mut r = ByteReader::new(&buf[header::HEADER_LENGTH..]);
        Ok(PictureLossIndication {
            sender_ssrc: r.read_u32()?,
            media_ssrc: r.read_u32()?,
        })
    }
}
