//! FIR: full intra request, RFC 5104 §4.3.1.

use bytes::BytesMut;
use sfu_shared::error::{Error, Result};
use sfu_shared::marshal::{Marshal, MarshalSize, Unmarshal};
use sfu_shared::ByteReader;

use crate::header::{self, Header, FMT_FIR, PT_PSFB};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirEntry {
    pub ssrc: u32,
    /// Monotonically increasing per-SSRC sequence number, bumped by the
    /// requester on every new FIR command (RFC 5104 §4.3.1.1).
    pub seq_number: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FullIntraRequest {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    pub fir: Vec<FirEntry>,
}

impl MarshalSize for FullIntraRequest {
    fn marshal_size(&self) -> usize {
        header::HEADER_LENGTH + 8 + self.fir.len() * 8
    }
}

impl Marshal for FullIntraRequest {
    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        let start = buf.len();
        let body_len = 8 + self.fir.len() * 8;
        let header = Header {
            padding: false,
            count: FMT_FIR,
            packet_type: PT_PSFB,
            length: header::length_field_for(body_len),
        };
        header.marshal_to(buf)?;
        buf.extend_from_slice(&self.sender_ssrc.to_be_bytes());
        buf.extend_from_slice(&self.media_ssrc.to_be_bytes());
        for entry in &self.fir {
            buf.extend_from_slice(&entry.ssrc.to_be_bytes());
            buf.extend_from_slice(&[entry.seq_number, 0, 0, 0]);
        }
        Ok(buf.len() - start)
    }
}

impl Unmarshal for FullIntraRequest {
    fn unmarshal(buf: &[u8]) -> Result<Self> {
        let header = Header::unmarshal(buf)?;
        if header.packet_type != PT_PSFB || header.count != FMT_FIR {
            return Err(Error::ErrUnknownRtcpType(header.packet_type));
        }
        let total_len = (header.length as usize + 1) * 4;
        let mut r = ByteReader::new(&buf[header::HEADER_LENGTH..total_len]);
        let sender_ssrc = r.read_u32()?;
        let media_ssrc = r.read_u32()?;

        let mut fir = Vec::new();
        while !r.is_empty() {
            let ssrc = r.read_u32()?;
            let seq_number = r.read_u8()?;
            r.skip(3)?;
            fir.push(FirEntry { ssrc, seq_number });
        }

        Ok(FullIntraRequest {
            sender_ssrc,
            media_ssrc,
            fir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_multiple_entries() {
        let fir = FullIntraRequest {
            sender_ssrc: 1,
            media_ssrc: 2,
            fir: vec![
                FirEntry {
                    ssrc: 2,
                    seq_number: 0,
                },
                FirEntry {
                    ssrc: 2,
                    seq_number: 1,
                },
            ],
        };
        let bytes = fir.marshal().unwrap();
        let parsed = FullIntraRequest::unmarshal(&bytes).unwrap();
        assert_eq!(fir, parsed);
    }
}
