//! Receiver Reference Time Report block, RFC 3611 §4.4.

use bytes::BytesMut;
use sfu_shared::error::Result;
use sfu_shared::marshal::{Marshal, MarshalSize, Unmarshal};
use sfu_shared::{ByteReader, ByteWriter};

pub const BLOCK_TYPE: u8 = 4;
const BODY_LENGTH: usize = 8;

/// Carries the reporter's NTP send time, later echoed back via a [`super::dlrr::Dlrr`]
/// block from the peer so the reporter can compute round-trip time from its own
/// clock (spec.md §4.3's "RTT across the reverse direction").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rrtr {
    pub ntp_timestamp: u64,
}

impl MarshalSize for Rrtr {
    fn marshal_size(&self) -> usize {
        4 + BODY_LENGTH
    }
}

impl Marshal for Rrtr {
    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        let start = buf.len();
        let mut w = ByteWriter::with_capacity(self.marshal_size());
        w.write_u8(BLOCK_TYPE);
        w.write_u8(0);
        w.write_u16(2); // block length in words, not counting the header word
        w.write_u64(self.ntp_timestamp);
        buf.extend_from_slice(w.as_slice());
        Ok(buf.len() - start)
    }
}

impl Unmarshal for Rrtr {
    fn unmarshal(buf: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(buf);
        r.skip(4)?;
        Ok(Rrtr {
            ntp_timestamp: r.read_u64()?,
        })
    }
}
