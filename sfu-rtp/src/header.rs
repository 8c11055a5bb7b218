//! RTP fixed header plus CSRC list and header-extension block (RFC 3550 §5.1).

use bytes::{Bytes, BytesMut};
use sfu_shared::error::{Error, Result};
use sfu_shared::marshal::{Marshal, MarshalSize, Unmarshal};
use sfu_shared::{ByteReader, ByteWriter};

/// One-byte header extension profile (RFC 8285 §4.2).
pub const EXTENSION_PROFILE_ONE_BYTE: u16 = 0xBEDE;
/// Two-byte header extension profile (RFC 8285 §4.3).
pub const EXTENSION_PROFILE_TWO_BYTE: u16 = 0x1000;

const FIXED_HEADER_SIZE: usize = 12;
const VERSION: u8 = 2;

/// A single header extension element: its id and the byte range it occupies
/// within the packet's extension payload, not a copy. The extension block
/// itself is retained so readers/writers can mutate element bytes in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionElement {
    pub id: u8,
    pub offset: usize,
    pub len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    /// Raw extension profile id, 0 if no extension is present.
    pub extension_profile: u16,
    /// Raw extension payload (the bytes following the profile+length
    /// fields), shared so [`ExtensionElement`] offsets index into it.
    pub extension_payload: Bytes,
    pub extensions: Vec<ExtensionElement>,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            version: VERSION,
            padding: false,
            extension: false,
            marker: false,
            payload_type: 0,
            sequence_number: 0,
            timestamp: 0,
            ssrc: 0,
            csrc: Vec::new(),
            extension_profile: 0,
            extension_payload: Bytes::new(),
            extensions: Vec::new(),
        }
    }
}

impl Header {
    /// Looks up a single one/two-byte extension's bytes by id.
    pub fn extension(&self, id: u8) -> Option<&[u8]> {
        self.extensions
            .iter()
            .find(|e| e.id == id)
            .map(|e| &self.extension_payload[e.offset..e.offset + e.len])
    }

    fn extension_words_len(&self) -> usize {
        self.extension_payload.len().div_ceil(4)
    }
}

impl MarshalSize for Header {
    fn marshal_size(&self) -> usize {
        let mut size = FIXED_HEADER_SIZE + self.csrc.len() * 4;
        if self.extension {
            size += 4 + self.extension_words_len() * 4;
        }
        size
    }
}

impl Marshal for Header {
    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        let start = buf.len();
        let mut w = ByteWriter::with_capacity(self.marshal_size());

        let mut b0 = (self.version & 0x3) << 6;
        if self.padding {
            b0 |= 1 << 5;
        }
        if self.extension {
            b0 |= 1 << 4;
        }
        b0 |= (self.csrc.len() as u8) & 0x0F;
        w.write_u8(b0);

        let mut b1 = (self.payload_type) & 0x7F;
        if self.marker {
            b1 |= 1 << 7;
        }
        w.write_u8(b1);

        w.write_u16(self.sequence_number);
        w.write_u32(self.timestamp);
        w.write_u32(self.ssrc);
        for csrc in &self.csrc {
            w.write_u32(*csrc);
        }

        if self.extension {
            w.write_u16(self.extension_profile);
            let words = self.extension_words_len();
            w.write_u16(words as u16);
            w.write_bytes(&self.extension_payload);
            // pad the extension payload out to a 4-byte boundary
            for _ in 0..(words * 4 - self.extension_payload.len()) {
                w.write_u8(0);
            }
        }

        buf.extend_from_slice(w.as_slice());
        Ok(buf.len() - start)
    }
}

impl Unmarshal for Header {
    fn unmarshal(buf: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(buf);
        let b0 = r.read_u8()?;
        let version = (b0 >> 6) & 0x3;
        if version != VERSION {
            return Err(Error::ErrInvalidRtpVersion);
        }
        let padding = (b0 >> 5) & 0x1 == 1;
        let extension = (b0 >> 4) & 0x1 == 1;
        let cc = (b0 & 0x0F) as usize;

        let b1 = r.read_u8()?;
        let marker = (b1 >> 7) == 1;
        let payload_type = b1 & 0x7F;

        let sequence_number = r.read_u16()?;
        let timestamp = r.read_u32()?;
        let ssrc = r.read_u32()?;

        let mut csrc = Vec::with_capacity(cc);
        for _ in 0..cc {
            csrc.push(r.read_u32()?);
        }

        let mut extension_profile = 0u16;
        let mut extension_payload = Bytes::new();
        let mut extensions = Vec::new();
        if extension {
            extension_profile = r.read_u16()?;
            let words = r.read_u16()? as usize;
            let payload = r.read_bytes(words * 4)?;
            extension_payload = Bytes::copy_from_slice(payload);
            extensions = parse_extensions(extension_profile, &extension_payload)?;
        }

        Ok(Header {
            version,
            padding,
            extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            extension_profile,
            extension_payload,
            extensions,
        })
    }
}

/// Parses the one-byte (RFC 8285 §4.2) or two-byte (§4.3) extension element
/// list out of an already-length-delimited extension payload.
fn parse_extensions(profile: u16, payload: &Bytes) -> Result<Vec<ExtensionElement>> {
    let mut out = Vec::new();
    match profile {
        EXTENSION_PROFILE_ONE_BYTE => {
            let mut i = 0;
            while i < payload.len() {
                let b = payload[i];
                if b == 0 {
                    // padding byte
                    i += 1;
                    continue;
                }
                let id = b >> 4;
                if id == 15 {
                    break;
                }
                let len = ((b & 0x0F) as usize) + 1;
                i += 1;
                if i + len > payload.len() {
                    return Err(Error::ErrShortBuffer {
                        need: i + len,
                        have: payload.len(),
                    });
                }
                out.push(ExtensionElement {
                    id,
                    offset: i,
                    len,
                });
                i += len;
            }
        }
        EXTENSION_PROFILE_TWO_BYTE => {
            let mut i = 0;
            while i + 1 < payload.len() {
                let id = payload[i];
                if id == 0 {
                    i += 1;
                    continue;
                }
                let len = payload[i + 1] as usize;
                i += 2;
                if i + len > payload.len() {
                    return Err(Error::ErrShortBuffer {
                        need: i + len,
                        have: payload.len(),
                    });
                }
                out.push(ExtensionElement {
                    id,
                    offset: i,
                    len,
                });
                i += len;
            }
        }
        _ => {
            // unknown extension profile: treat the whole block as opaque,
            // matching spec.md's "unrecognized profile" guidance in §4.2
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header {
            version: 2,
            padding: false,
            extension: false,
            marker: true,
            payload_type: 96,
            sequence_number: 1000,
            timestamp: 3_000_000,
            ssrc: 0xCAFEBABE,
            csrc: vec![1, 2],
            ..Default::default()
        }
    }

    #[test]
    fn round_trips_without_extension() {
        let h = sample_header();
        let bytes = h.marshal().unwrap();
        let parsed = Header::unmarshal(&bytes).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn round_trips_one_byte_extension() {
        let mut h = sample_header();
        h.extension = true;
        h.extension_profile = EXTENSION_PROFILE_ONE_BYTE;
        // id=1 len=3 "abc", id=2 len=1 "z"
        h.extension_payload = Bytes::from_static(&[0x12, b'a', b'b', b'c', 0x20, b'z']);
        h.extensions = parse_extensions(h.extension_profile, &h.extension_payload).unwrap();

        let bytes = h.marshal().unwrap();
        let parsed = Header::unmarshal(&bytes).unwrap();
        assert_eq!(parsed.extension(1), Some(&b"abc"[..]));
        assert_eq!(parsed.extension(2), Some(&b"z"[..]));
    }

    #[test]
    fn rejects_wrong_version() {
        let buf = [0b0001_0000u8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            Header::unmarshal(&buf),
            Err(Error::ErrInvalidRtpVersion)
        ));
    }

    #[test]
    fn short_buffer_is_an_error() {
        let buf = [0x80u8, 96, 0, 0];
        assert!(Header::unmarshal(&buf).is_err());
    }
}
