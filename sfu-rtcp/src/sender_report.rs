//! SR: sender report, RFC 3550 §6.4.1.

use bytes::BytesMut;
use sfu_shared::error::{Error, Result};
use sfu_shared::marshal::{Marshal, MarshalSize, Unmarshal};
use sfu_shared::{ByteReader, ByteWriter};

use crate::header::{self, Header, PT_SR};
use crate::reception_report::{ReceptionReport, RECEPTION_REPORT_LENGTH};

const SENDER_INFO_LENGTH: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SenderReport {
    pub ssrc: u32,
    pub ntp_time: u64,
    pub rtp_time: u32,
    pub packet_count: u32,
    pub octet_count: u32,
    pub reports: Vec<ReceptionReport>,
}

impl MarshalSize for SenderReport {
    fn marshal_size(&self) -> usize {
        header::HEADER_LENGTH + SENDER_INFO_LENGTH + self.reports.len() * RECEPTION_REPORT_LENGTH
    }
}

impl Marshal for SenderReport {
    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        let start = buf.len();
        if self.reports.len() > 31 {
            return Err(Error::ErrValueOutOfRange("SenderReport.reports"));
        }
        let body_len = SENDER_INFO_LENGTH + self.reports.len() * RECEPTION_REPORT_LENGTH;
        let header = Header {
            padding: false,
            count: self.reports.len() as u8,
            packet_type: PT_SR,
            length: header::length_field_for(body_len),
        };
        header.marshal_to(buf)?;

        let mut w = ByteWriter::with_capacity(SENDER_INFO_LENGTH);
        w.write_u32(self.ssrc);
        w.write_u64(self.ntp_time);
        w.write_u32(self.rtp_time);
        w.write_u32(self.packet_count);
        w.write_u32(self.octet_count);
        buf.extend_from_slice(w.as_slice());

        for report in &self.reports {
            report.marshal_to(buf)?;
        }
        Ok(buf.len() - start)
    }
}

impl Unmarshal for SenderReport {
    fn unmarshal(buf: &[u8]) -> Result<Self> {
        let header = Header::unmarshal(buf)?;
        if header.packet_type != PT_SR {
            return Err(Error::ErrUnknownRtcpType(header.packet_type));
        }
        let mut r = ByteReader::new(&buf[header::HEADER_LENGTH..]);
        let ssrc = r.read_u32()?;
        let ntp_time = r.read_u64()?;
        let rtp_time = r.read_u32()?;
        let packet_count = r.read_u32()?;
        let octet_count = r.read_u32()?;

        let mut reports = Vec::with_capacity(header.count as usize);
        for _ in 0..header.count {
            let chunk = r.read_bytes(RECEPTION_REPORT_LENGTH)?;
            reports.push(ReceptionReport::unmarshal(chunk)?);
        }

        Ok(SenderReport {
            ssrc,
            ntp_time,
            rtp_time,
            packet_count,
            octet_count,
            reports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_reports() {
        let sr = SenderReport {
            ssrc: 1,
            ntp_time: 0x1122_3344_5566_7788,
            rtp_time: 90000,
            packet_count: 10,
            octet_count: 1200,
            reports: vec![ReceptionReport {
                ssrc: 2,
                fraction_lost: 1,
                ..Default::default()
            }],
        };
        let bytes = sr.marshal().unwrap();
        let parsed = SenderReport::unmarshal(&bytes).unwrap();
        assert_eq!(sr, parsed);
        assert_eq!(bytes.len(), sr.marshal_size());
    }

    #[test]
    fn round_trips_with_no_reports() {
        let sr = SenderReport {
            ssrc: 9,
            ..Default::default()
        };
        let bytes = sr.marshal().unwrap();
        let parsed = SenderReport::unmarshal(&bytes).unwrap();
        assert_eq!(sr, parsed);
    }
}
