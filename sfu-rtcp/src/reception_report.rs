//! One reception-report block as carried inside SR/RR, RFC 3550 §6.4.1/6.4.2.

use bytes::BytesMut;
use sfu_shared::error::Result;
use sfu_shared::marshal::{Marshal, MarshalSize, Unmarshal};
use sfu_shared::{ByteReader, ByteWriter};

pub const RECEPTION_REPORT_LENGTH: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceptionReport {
    pub ssrc: u32,
    pub fraction_lost: u8,
    pub total_lost: u32,
    pub last_sequence_number: u32,
    pub jitter: u32,
    pub last_sender_report: u32,
    pub delay: u32,
}

impl MarshalSize for ReceptionReport {
    fn marshal_size(&self) -> usize {
        RECEPTION_REPORT_LENGTH
    }
}

impl Marshal for ReceptionReport {
    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        let mut w = ByteWriter::with_capacity(RECEPTION_REPORT_LENGTH);
        w.write_u32(self.ssrc);
        w.write_u8(self.fraction_lost);
        w.write_u24(self.total_lost & 0x00FF_FFFF);
        w.write_u32(self.last_sequence_number);
        w.write_u32(self.jitter);
        w.write_u32(self.last_sender_report);
        w.write_u32(self.delay);
        buf.extend_from_slice(w.as_slice());
        Ok(RECEPTION_REPORT_LENGTH)
    }
}

impl Unmarshal for ReceptionReport {
    fn unmarshal(buf: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(buf);
        let ssrc = r.read_u32()?;
        let fraction_lost = r.read_u8()?;
        let total_lost = r.read_u24()?;
        let last_sequence_number = r.read_u32()?;
        let jitter = r.read_u32()?;
        let last_sender_report = r.read_u32()?;
        let delay = r.read_u32()?;
        Ok(ReceptionReport {
            ssrc,
            fraction_lost,
            total_lost,
            last_sequence_number,
            jitter,
            last_sender_report,
            delay,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let r = ReceptionReport {
            ssrc: 0x1234_5678,
            fraction_lost: 12,
            total_lost: 345,
            last_sequence_number: 0x0001_0064,
            jitter: 77,
            last_sender_report: 0xAABB_CCDD,
            delay: 9999,
        };
        let bytes = r.marshal().unwrap();
        assert_eq!(bytes.len(), RECEPTION_REPORT_LENGTH);
        let parsed = ReceptionReport::unmarshal(&bytes).unwrap();
        assert_eq!(r, parsed);
    }
}
