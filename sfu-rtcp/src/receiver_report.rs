//! RR: receiver report, RFC 3550 §6.4.2.

use bytes::BytesMut;
use sfu_shared::error::{Error, Result};
use sfu_shared::marshal::{Marshal, MarshalSize, Unmarshal};
use sfu_shared::ByteReader;

use crate::header::{self, Header, PT_RR};
use crate::reception_report::{ReceptionReport, RECEPTION_REPORT_LENGTH};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReceiverReport {
    pub ssrc: u32,
    pub reports: Vec<ReceptionReport>,
}

impl MarshalSize for ReceiverReport {
    fn marshal_size(&self) -> usize {
        header::HEADER_LENGTH + 4 + self.reports.len() * RECEPTION_REPORT_LENGTH
    }
}

impl Marshal for ReceiverReport {
    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        let start = buf.len();
        if self.reports.len() > 31 {
            return Err(Error::ErrValueOutOfRange("ReceiverReport.reports"));
        }
        let body_len = 4 + self.reports.len() * RECEPTION_REPORT_LENGTH;
        let header = Header {
            padding: false,
            count: self.reports.len() as u8,
            packet_type: PT_RR,
            length: header::length_field_for(body_len),
        };
        header.marshal_to(buf)?;
        buf.extend_from_slice(&self.ssrc.to_be_bytes());
        for report in &self.reports {
            report.marshal_to(buf)?;
        }
        Ok(buf.len() - start)
    }
}

impl Unmarshal for ReceiverReport {
    fn unmarshal(buf: &[u8]) -> Result<Self> {
        let header = Header::unmarshal(buf)?;
        if header.packet_type != PT_RR {
            return Err(Error::ErrUnknownRtcpType(header.packet_type));
        }
        let mut r = ByteReader::new(&buf[header::HEADER_LENGTH..]);
        let ssrc = r.read_u32()?;
        let mut reports = Vec::with_capacity(header.count as usize);
        for _ in 0..header.count {
            let chunk = r.read_bytes(RECEPTION_REPORT_LENGTH)?;
            reports.push(ReceptionReport::unmarshal(chunk)?);
        }
        Ok(ReceiverReport { ssrc, reports })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let rr = ReceiverReport {
            ssrc: 42,
            reports: vec![
                ReceptionReport {
                    ssrc: 1,
                    ..Default::default()
                },
                ReceptionReport {
                    ssrc: 2,
                    fraction_lost: 255,
                    total_lost: 0x00FF_FFFF,
                    ..Default::default()
                },
            ],
        };
        let bytes = rr.marshal().unwrap();
        let parsed = ReceiverReport::unmarshal(&bytes).unwrap();
        assert_eq!(rr, parsed);
    }
}
