//! DLRR Report block, RFC 3611 §4.5: one sub-block per remote SSRC we are
//! reporting a round-trip delay against.

use bytes::BytesMut;
use sfu_shared::error::Result;
use sfu_shared::marshal::{Marshal, MarshalSize, Unmarshal};
use sfu_shared::{ByteReader, ByteWriter};

pub const BLOCK_TYPE: u8 = 5;
const SUB_BLOCK_LENGTH: usize = 12;

/// One `(ssrc, last RRTR mid-NTP, delay since receiving it)` sub-block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DlrrReport {
    pub ssrc: u32,
    /// Middle 32 bits of the NTP timestamp from the last [`super::rrtr::Rrtr`]
    /// we received from `ssrc`, 0 if none has been received yet.
    pub last_rr: u32,
    /// Delay since receiving that RRTR, in units of 1/65536 s.
    pub delay_since_last_rr: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dlrr {
    pub reports: Vec<DlrrReport>,
}

impl MarshalSize for Dlrr {
    fn marshal_size(&self) -> usize {
        4 + self.reports.len() * SUB_BLOCK_LENGTH
    }
}

impl Marshal for Dlrr {
    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        let start = buf.len();
        let mut w = ByteWriter::with_capacity(self.marshal_size());
        w.write_u8(BLOCK_TYPE);
        w.write_u8(0);
        w.write_u16((self.reports.len() * 3) as u16);
        for report in &self.reports {
            w.write_u32(report.ssrc);
            w.write_u32(report.last_rr);
            w.write_u32(report.delay_since_last_rr);
        }
        buf.extend_from_slice(w.as_slice());
        Ok(buf.len() - start)
    }
}

impl Unmarshal for Dlrr {
    fn unmarshal(buf: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(buf);
        r.skip(2)?;
        let block_length_words = r.read_u16()? as usize;
        let mut reports = Vec::with_capacity(block_length_words / 3);
        for _ in 0..(block_length_words / 3) {
            reports.push(DlrrReport {
                ssrc: r.read_u32()?,
                last_rr: r.read_u32()?,
                delay_since_last_rr: r.read_u32()?,
            });
        }
        Ok(Dlrr { reports })
    }
}
