//! DTLS record layer header (RFC 6347 §4.1). We only ever need to frame
//! handshake and ChangeCipherSpec content in plaintext; application-data
//! records (the DTLS bulk cipher) are out of scope for this driver.

use sfu_shared::cursor::{ByteReader, ByteWriter};
use sfu_shared::error::Result;

pub const DTLS_1_2_VERSION: u16 = 0xFEFD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
}

impl ContentType {
    fn from_u8(b: u8) -> Option<Self> {
        match b {
            20 => Some(Self::ChangeCipherSpec),
            21 => Some(Self::Alert),
            22 => Some(Self::Handshake),
            23 => Some(Self::ApplicationData),
            _ => None,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::ChangeCipherSpec => 20,
            Self::Alert => 21,
            Self::Handshake => 22,
            Self::ApplicationData => 23,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordHeader {
    pub content_type: ContentType,
    pub version: u16,
    pub epoch: u16,
    pub sequence_number: u64, // 48-bit
    pub length: u16,
}

pub const RECORD_HEADER_LEN: usize = 13;

impl RecordHeader {
    pub fn parse(r: &mut ByteReader<'_>) -> Result<Self> {
        use sfu_shared::error::Error;

        let content_type = ContentType::from_u8(r.read_u8()?)
            .ok_or_else(|| Error::ErrOther("unknown DTLS record content type".into()))?;
        let version = r.read_u16()?;
        let epoch = r.read_u16()?;
        let hi = r.read_u16()? as u64;
        let lo = r.read_u32()? as u64;
        let sequence_number = (hi << 32) | lo;
        let length = r.read_u16()?;
        Ok(Self {
            content_type,
            version,
            epoch,
            sequence_number,
            length,
        })
    }

    pub fn write(&self, w: &mut ByteWriter) {
        w.write_u8(self.content_type.to_u8());
        w.write_u16(self.version);
        w.write_u16(self.epoch);
        w.write_u16((self.sequence_number >> 32) as u16);
        w.write_u32((self.sequence_number & 0xFFFF_FFFF) as u32);
        w.write_u16(self.length);
    }
}

/// Splits a flight buffer into `(header, body)` records, since a single
/// UDP datagram may coalesce several DTLS records back to back.
pub fn split_records(buf: &[u8]) -> Result<Vec<(RecordHeader, Vec<u8>)>> {
    let mut out = Vec::new();
    let mut r = ByteReader::new(buf);
    while !r.is_empty() {
        let header = RecordHeader::parse(&mut r)?;
        let body = r.read_bytes(header.length as usize)?.to_vec();
        out.push((header, body));
    }
    Ok(out)
}

pub fn write_record(w: &mut ByteWriter, content_type: ContentType, epoch: u16, seq: u64, body: &[u8]) {
    let header = RecordHeader {
        content_type,
        version: DTLS_1_2_VERSION,
        epoch,
        sequence_number: seq,
        length: body.len() as u16,
    };
    header.write(w);
    w.write_bytes(body);
}
