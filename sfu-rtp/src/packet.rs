//! A full RTP packet: header, payload, and any RFC 3550 §5.1 padding.

use bytes::{Bytes, BytesMut};
use sfu_shared::error::Result;
use sfu_shared::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::header::Header;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Bytes,
    /// Number of padding bytes, not including the count byte itself, that
    /// the header's padding bit declares. 0 when `header.padding` is false.
    pub padding_len: u8,
}

impl Packet {
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self {
            header,
            payload,
            padding_len: 0,
        }
    }
}

impl MarshalSize for Packet {
    fn marshal_size(&self) -> usize {
        self.header.marshal_size() + self.payload.len() + self.padding_len as usize
    }
}

impl Marshal for Packet {
    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        let start = buf.len();
        self.header.marshal_to(buf)?;
        buf.extend_from_slice(&self.payload);
        if self.header.padding && self.padding_len > 0 {
            for _ in 0..self.padding_len.saturating_sub(1) {
                buf.extend_from_slice(&[0]);
            }
            buf.extend_from_slice(&[self.padding_len]);
        }
        Ok(buf.len() - start)
    }
}

impl Unmarshal for Packet {
    fn unmarshal(buf: &[u8]) -> Result<Self> {
        let header = Header::unmarshal(buf)?;
        let header_len = header.marshal_size();
        let body = &buf[header_len..];

        let (payload, padding_len) = if header.padding && !body.is_empty() {
            let padding_len = body[body.len() - 1];
            let split = body.len().saturating_sub(padding_len as usize);
            (&body[..split], padding_len)
        } else {
            (body, 0)
        };

        Ok(Packet {
            header,
            payload: Bytes::copy_from_slice(payload),
            padding_len,
        })
    }
}
