//! SDES: source description, RFC 3550 §6.5.

use bytes::{Bytes, BytesMut};
use sfu_shared::error::{Error, Result};
use sfu_shared::marshal::{Marshal, MarshalSize, Unmarshal};
use sfu_shared::ByteReader;

use crate::header::{self, Header, PT_SDES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdesType {
    SdesEnd,
    SdesCname,
    SdesName,
    SdesEmail,
    SdesPhone,
    SdesLoc,
    SdesTool,
    SdesNote,
    SdesPriv,
    Unknown(u8),
}

impl SdesType {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SdesType::SdesEnd,
            1 => SdesType::SdesCname,
            2 => SdesType::SdesName,
            3 => SdesType::SdesEmail,
            4 => SdesType::SdesPhone,
            5 => SdesType::SdesLoc,
            6 => SdesType::SdesTool,
            7 => SdesType::SdesNote,
            8 => SdesType::SdesPriv,
            other => SdesType::Unknown(other),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            SdesType::SdesEnd => 0,
            SdesType::SdesCname => 1,
            SdesType::SdesName => 2,
            SdesType::SdesEmail => 3,
            SdesType::SdesPhone => 4,
            SdesType::SdesLoc => 5,
            SdesType::SdesTool => 6,
            SdesType::SdesNote => 7,
            SdesType::SdesPriv => 8,
            SdesType::Unknown(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptionItem {
    pub sdes_type: SdesType,
    pub text: Bytes,
}

impl SourceDescriptionItem {
    fn marshal_size(&self) -> usize {
        2 + self.text.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptionChunk {
    pub source: u32,
    pub items: Vec<SourceDescriptionItem>,
}

impl SourceDescriptionChunk {
    fn marshal_size(&self) -> usize {
        let items_len: usize = self.items.iter().map(SourceDescriptionItem::marshal_size).sum();
        let raw = 4 + items_len + 1; // +1 for the terminating null item
        raw.div_ceil(4) * 4
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceDescription {
    pub chunks: Vec<SourceDescriptionChunk>,
}

impl MarshalSize for SourceDescription {
    fn marshal_size(&self) -> usize {
        header::HEADER_LENGTH
            + self
                .chunks
                .iter()
                .map(SourceDescriptionChunk::marshal_size)
                .sum::<usize>()
    }
}

impl Marshal for SourceDescription {
    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        let start = buf.len();
        if self.chunks.len() > 31 {
            return Err(Error::ErrValueOutOfRange("SourceDescription.chunks"));
        }
        let body_len = self.marshal_size() - header::HEADER_LENGTH;
        let header = Header {
            padding: false,
            count: self.chunks.len() as u8,
            packet_type: PT_SDES,
            length: header::length_field_for(body_len),
        };
        header.marshal_to(buf)?;

        for chunk in &self.chunks {
            let chunk_start = buf.len();
            buf.extend_from_slice(&chunk.source.to_be_bytes());
            for item in &chunk.items {
                buf.extend_from_slice(&[item.sdes_type.to_u8(), item.text.len() as u8]);
                buf.extend_from_slice(&item.text);
            }
            buf.extend_from_slice(&[0]); // END item
            let written = buf.len() - chunk_start;
            let padded = written.div_ceil(4) * 4;
            buf.resize(chunk_start + padded, 0);
        }
        Ok(buf.len() - start)
    }
}

impl Unmarshal for SourceDescription {
    fn unmarshal(buf: &[u8]) -> Result<Self> {
        let header = Header::unmarshal(buf)?;
        if header.packet_type != PT_SDES {
            return Err(Error::ErrUnknownRtcpType(header.packet_type));
        }
        let total_len = (header.length as usize + 1) * 4;
        let mut r = ByteReader::new(&buf[header::HEADER_LENGTH..total_len]);

        let mut chunks = Vec::with_capacity(header.count as usize);
        for _ in 0..header.count {
            let chunk_start = r.position();
            let source = r.read_u32()?;
            let mut items = Vec::new();
            loop {
                let sdes_type = r.read_u8()?;
                if sdes_type == 0 {
                    break;
                }
                let len = r.read_u8()? as usize;
                let text = Bytes::copy_from_slice(r.read_bytes(len)?);
                items.push(SourceDescriptionItem {
                    sdes_type: SdesType::from_u8(sdes_type),
                    text,
                });
            }
            let consumed = r.position() - chunk_start;
            let pad = consumed.div_ceil(4) * 4 - consumed;
            r.skip(pad)?;
            chunks.push(SourceDescriptionChunk { source, items });
        }

        Ok(SourceDescription { chunks })
    }
}
