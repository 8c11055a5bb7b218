//! STUN message framing, RFC 5389 §6.

use bytes::{Bytes, BytesMut};
use sfu_shared::error::{Error, Result};
use sfu_shared::{ByteReader, ByteWriter};

pub const MAGIC_COOKIE: u32 = 0x2112_A442;
const HEADER_LENGTH: usize = 20;
const TRANSACTION_ID_LENGTH: usize = 12;

pub const METHOD_BINDING: u16 = 0x0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Request,
    Indication,
    SuccessResponse,
    ErrorResponse,
}

impl Class {
    fn bits(self) -> u16 {
        match self {
            Class::Request => 0b00,
            Class::Indication => 0b01,
            Class::SuccessResponse => 0b10,
            Class::ErrorResponse => 0b11,
        }
    }

    fn from_bits(bits: u16) -> Self {
        match bits {
            0b00 => Class::Request,
            0b01 => Class::Indication,
            0b10 => Class::SuccessResponse,
            _ => Class::ErrorResponse,
        }
    }
}

/// The 14-bit method and 2-bit class are interleaved across the encoded
/// type's bits (RFC 5389 §6, figure 3); `encode`/`decode` hide the bit
/// shuffling everywhere else a [`Message`] is built or parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageType {
    pub method: u16,
    pub class: Class,
}

impl MessageType {
    pub fn new(method: u16, class: Class) -> Self {
        Self { method, class }
    }

    // RFC 5389 §6: the 12-bit method and 2-bit class are interleaved as
    // `M11..M7 C1 M6..M4 C0 M3..M0`, MSB to LSB, with the top two bits of
    // the 16-bit type always zero.
    fn encode(self) -> u16 {
        let c = self.class.bits();
        let low4 = self.method & 0xF;
        let mid3 = (self.method >> 4) & 0x7;
        let high5 = (self.method >> 7) & 0x1F;
        let c0 = c & 0x1;
        let c1 = (c >> 1) & 0x1;
        (high5 << 9) | (c1 << 8) | (mid3 << 5) | (c0 << 4) | low4
    }

    fn decode(v: u16) -> Self {
        let low4 = v & 0xF;
        let c0 = (v >> 4) & 0x1;
        let mid3 = (v >> 5) & 0x7;
        let c1 = (v >> 8) & 0x1;
        let high5 = (v >> 9) & 0x1F;
        let method = (high5 << 7) | (mid3 << 4) | low4;
        let class = Class::from_bits((c1 << 1) | c0);
        MessageType { method, class }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct TransactionId(pub [u8; TRANSACTION_ID_LENGTH]);

impl TransactionId {
    pub fn new(bytes: [u8; TRANSACTION_ID_LENGTH]) -> Self {
        Self(bytes)
    }
}

/// A single, un-interpreted attribute as it appears on the wire: a 16-bit
/// type, a 16-bit length, and the (unpadded) value. Callers interpret the
/// handful of attribute types this core cares about via
/// [`super::attributes`]; everything else is round-tripped opaquely since
/// an ICE-lite responder must tolerate attributes it doesn't understand
/// (RFC 5389 §6, "Unknown comprehension-optional attributes MUST be
/// ignored").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    pub typ: u16,
    pub value: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub typ: MessageType,
    pub transaction_id: TransactionId,
    pub attributes: Vec<RawAttribute>,
}

impl Message {
    pub fn new(typ: MessageType, transaction_id: TransactionId) -> Self {
        Self {
            typ,
            transaction_id,
            attributes: Vec::new(),
        }
    }

    pub fn get(&self, typ: u16) -> Option<&RawAttribute> {
        self.attributes.iter().find(|a| a.typ == typ)
    }

    pub fn contains(&self, typ: u16) -> bool {
        self.get(typ).is_some()
    }

    pub fn add(&mut self, typ: u16, value: Bytes) {
        self.attributes.push(RawAttribute { typ, value });
    }

    /// Encodes the message, attributes in insertion order, each padded to a
    /// 4-byte boundary per RFC 5389 §15.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LENGTH + self.attributes_len());
        self.encode_header_and_attrs(&mut buf);
        buf.freeze()
    }

    fn attributes_len(&self) -> usize {
        self.attributes
            .iter()
            .map(|a| 4 + padded(a.value.len()))
            .sum()
    }

    fn encode_header_and_attrs(&self, buf: &mut BytesMut) {
        let mut w = ByteWriter::with_capacity(HEADER_LENGTH);
        w.write_u16(self.typ.encode());
        w.write_u16(self.attributes_len() as u16);
        w.write_u32(MAGIC_COOKIE);
        w.write_bytes(&self.transaction_id.0);
        buf.extend_from_slice(w.as_slice());
        for attr in &self.attributes {
            let mut aw = ByteWriter::with_capacity(4 + padded(attr.value.len()));
            aw.write_u16(attr.typ);
            aw.write_u16(attr.value.len() as u16);
            aw.write_bytes(&attr.value);
            for _ in attr.value.len()..padded(attr.value.len()) {
                aw.write_u8(0);
            }
            buf.extend_from_slice(aw.as_slice());
        }
    }

    /// Encodes the attributes preceding `trailer_typ` (or all attributes,
    /// if `trailer_typ` isn't present yet), with the header's length field
    /// set as though a `trailer_total_len`-byte attribute followed
    /// immediately — but without writing that attribute's bytes.
    ///
    /// Used for both MESSAGE-INTEGRITY (`trailer_total_len = 24`: a 4-byte
    /// attribute header plus a 20-byte HMAC-SHA1 digest) and FINGERPRINT
    /// (`trailer_total_len = 8`: a 4-byte header plus a 4-byte CRC), since
    /// both sign/checksum "the message as it will look once I'm appended"
    /// rather than the message's current on-wire length.
    pub fn encode_for_trailer(&self, trailer_typ: u16, trailer_total_len: usize) -> Bytes {
        let idx = self
            .attributes
            .iter()
            .position(|a| a.typ == trailer_typ)
            .unwrap_or(self.attributes.len());
        let body_len: usize = self.attributes[..idx]
            .iter()
            .map(|a| 4 + padded(a.value.len()))
            .sum::<usize>()
            + trailer_total_len;
        let mut buf = BytesMut::with_capacity(HEADER_LENGTH + body_len);
        let mut w = ByteWriter::with_capacity(HEADER_LENGTH);
        w.write_u16(self.typ.encode());
        w.write_u16(body_len as u16);
        w.write_u32(MAGIC_COOKIE);
        w.write_bytes(&self.transaction_id.0);
        buf.extend_from_slice(w.as_slice());
        for attr in &self.attributes[..idx] {
            let mut aw = ByteWriter::with_capacity(4 + padded(attr.value.len()));
            aw.write_u16(attr.typ);
            aw.write_u16(attr.value.len() as u16);
            aw.write_bytes(&attr.value);
            for _ in attr.value.len()..padded(attr.value.len()) {
                aw.write_u8(0);
            }
            buf.extend_from_slice(aw.as_slice());
        }
        buf.freeze()
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LENGTH {
            return Err(Error::ErrMalformedStunMessage);
        }
        let mut r = ByteReader::new(buf);
        let typ = MessageType::decode(r.read_u16()?);
        let length = r.read_u16()? as usize;
        let cookie = r.read_u32()?;
        if cookie != MAGIC_COOKIE {
            return Err(Error::ErrMalformedStunMessage);
        }
        let tid_bytes = r.read_bytes(TRANSACTION_ID_LENGTH)?;
        let mut tid = [0u8; TRANSACTION_ID_LENGTH];
        tid.copy_from_slice(tid_bytes);

        if r.remaining() < length {
            return Err(Error::ErrMalformedStunMessage);
        }
        let mut attributes = Vec::new();
        let mut consumed = 0;
        while consumed < length {
            let attr_typ = r.read_u16()?;
            let attr_len = r.read_u16()? as usize;
            let value = r.read_bytes(attr_len)?;
            let pad = padded(attr_len) - attr_len;
            if pad > 0 {
                r.skip(pad)?;
            }
            attributes.push(RawAttribute {
                typ: attr_typ,
                value: Bytes::copy_from_slice(value),
            });
            consumed += 4 + padded(attr_len);
        }

        Ok(Message {
            typ,
            transaction_id: TransactionId(tid),
            attributes,
        })
    }

    /// Returns whether this message is likely STUN, by magic cookie
    /// position, without fully decoding it. Used by the datagram demux to
    /// tell a STUN binding request apart from a DTLS record on the same
    /// socket (spec.md §9's first-byte demux).
    pub fn looks_like_stun(buf: &[u8]) -> bool {
        buf.len() >= HEADER_LENGTH
            && buf[0] & 0xC0 == 0
            && u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) == MAGIC_COOKIE
    }
}

fn padded(len: usize) -> usize {
    len.div_ceil(4) * 4
}
