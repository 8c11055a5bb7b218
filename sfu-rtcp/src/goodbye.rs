//! BYE: goodbye, RFC 3550 §6.6.

use bytes::{Bytes, BytesMut};
use sfu_shared::error::{Error, Result};
use sfu_shared::marshal::{Marshal, MarshalSize, Unmarshal};
use sfu_shared::ByteReader;

use crate::header::{self, Header, PT_BYE};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Goodbye {
    pub sources: Vec<u32>,
    pub reason: Bytes,
}

impl MarshalSize for Goodbye {
    fn marshal_size(&self) -> usize {
        let mut size = header::HEADER_LENGTH + self.sources.len() * 4;
        if !self.reason.is_empty() {
            size += 1 + self.reason.len();
        }
        size.div_ceil(4) * 4
    }
}

impl Marshal for Goodbye {
    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        let start = buf.len();
        if self.sources.len() > 31 {
            return Err(Error::ErrValueOutOfRange("Goodbye.sources"));
        }
        let mut body_len = self.sources.len() * 4;
        if !self.reason.is_empty() {
            body_len += 1 + self.reason.len();
        }
        let padded_body_len = (header::HEADER_LENGTH + body_len).div_ceil(4) * 4 - header::HEADER_LENGTH;
        let header = Header {
            padding: padded_body_len != body_len,
            count: self.sources.len() as u8,
            packet_type: PT_BYE,
            length: header::length_field_for(padded_body_len),
        };
        header.marshal_to(buf)?;
        for source in &self.sources {
            buf.extend_from_slice(&source.to_be_bytes());
        }
        if !self.reason.is_empty() {
            buf.extend_from_slice(&[self.reason.len() as u8]);
            buf.extend_from_slice(&self.reason);
        }
        while buf.len() - start < header::HEADER_LENGTH + padded_body_len {
            buf.extend_from_slice(&[0]);
        }
        Ok(buf.len() - start)
    }
}

impl Unmarshal for Goodbye {
    fn unmarshal(buf: &[u8]) -> Result<Self> {
        let header = Header::unmarshal(buf)?;
        if header.packet_type != PT_BYE {
            return Err(Error::ErrUnknownRtcpType(header.packet_type));
        }
        let total_len = (header.length as usize + 1) * 4;
        let mut r = ByteReader::new(&buf[header::HEADER_LENGTH..total_len]);

        let mut sources = Vec::with_capacity(header.count as usize);
        for _ in 0..header.count {
            sources.push(r.read_u32()?);
        }

        let reason = if !r.is_empty() {
            let len = r.read_u8()? as usize;
            Bytes::copy_from_slice(r.read_bytes(len.min(r.remaining()))?)
        } else {
            Bytes::new()
        };

        Ok(Goodbye { sources, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_reason() {
        let bye = Goodbye {
            sources: vec![1, 2, 3],
            reason: Bytes::from_static(b"camera switched off"),
        };
        let bytes = bye.marshal().unwrap();
        let parsed = Goodbye::unmarshal(&bytes).unwrap();
        assert_eq!(bye, parsed);
    }

    #[test]
    fn round_trips_without_reason() {
        let bye = Goodbye {
            sources: vec![42],
            reason: Bytes::new(),
        };
        let bytes = bye.marshal().unwrap();
        assert_eq!(bytes.len() % 4, 0);
        let parsed = Goodbye::unmarshal(&bytes).unwrap();
        assert_eq!(bye, parsed);
    }
}
