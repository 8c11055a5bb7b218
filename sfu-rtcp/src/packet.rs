//! A compound RTCP datagram: one or more individual packets back to back,
//! RFC 3550 §6.1. A single UDP datagram on the RTCP port almost always
//! carries several of these (e.g. an SR followed by an SDES), so the core
//! never deals with a lone packet off the wire — it deals with a `Vec` of
//! [`RtcpPacket`] produced by [`unmarshal_compound`].

use bytes::{Bytes, BytesMut};
use sfu_shared::error::{Error, Result};
use sfu_shared::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::extended_report::ExtendedReport;
use crate::goodbye::Goodbye;
use crate::header::{self, Header, FMT_FIR, FMT_NACK, FMT_PLI, FMT_TWCC, PT_BYE, PT_PSFB, PT_RR,
    PT_RTPFB, PT_SDES, PT_SR, PT_XR};
use crate::payload_feedbacks::full_intra_request::FullIntraRequest;
use crate::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use crate::receiver_report::ReceiverReport;
use crate::sender_report::SenderReport;
use crate::source_description::SourceDescription;
use crate::transport_feedbacks::transport_layer_cc::TransportLayerCc;
use crate::transport_feedbacks::transport_layer_nack::TransportLayerNack;

/// Any RTCP packet this core understands. Packet types it doesn't (an
/// unrecognized PSFB/RTPFB subtype, APP, or anything else) are carried as
/// [`RtcpPacket::Unknown`] so a compound datagram round-trips even when it
/// contains a feedback type this core has no use for, rather than failing
/// the whole datagram over one unrecognized packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpPacket {
    SenderReport(SenderReport),
    ReceiverReport(ReceiverReport),
    SourceDescription(SourceDescription),
    Goodbye(Goodbye),
    PictureLossIndication(PictureLossIndication),
    FullIntraRequest(FullIntraRequest),
    TransportLayerNack(TransportLayerNack),
    TransportLayerCc(TransportLayerCc),
    ExtendedReport(ExtendedReport),
    Unknown {
        packet_type: u8,
        fmt: u8,
        raw: Bytes,
    },
}

impl RtcpPacket {
    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        match self {
            RtcpPacket::SenderReport(p) => p.marshal_to(buf),
            RtcpPacket::ReceiverReport(p) => p.marshal_to(buf),
            RtcpPacket::SourceDescription(p) => p.marshal_to(buf),
            RtcpPacket::Goodbye(p) => p.marshal_to(buf),
            RtcpPacket::PictureLossIndication(p) => p.marshal_to(buf),
            RtcpPacket::FullIntraRequest(p) => p.marshal_to(buf),
            RtcpPacket::TransportLayerNack(p) => p.marshal_to(buf),
            RtcpPacket::TransportLayerCc(p) => p.marshal_to(buf),
            RtcpPacket::ExtendedReport(p) => p.marshal_to(buf),
            RtcpPacket::Unknown { raw, .. } => {
                buf.extend_from_slice(raw);
                Ok(raw.len())
            }
        }
    }
}

/// Serializes a sequence of packets into one compound datagram, in the
/// order given. RFC 3550 §6.1 asks the first packet of a compound datagram
/// to be a report (SR/RR); callers building outbound RTCP are expected to
/// order `packets` accordingly, this function does not enforce it.
pub fn marshal_compound(packets: &[RtcpPacket]) -> Result<Bytes> {
    let size: usize = packets
        .iter()
        .map(|p| match p {
            RtcpPacket::SenderReport(p) => p.marshal_size(),
            RtcpPacket::ReceiverReport(p) => p.marshal_size(),
            RtcpPacket::SourceDescription(p) => p.marshal_size(),
            RtcpPacket::Goodbye(p) => p.marshal_size(),
            RtcpPacket::PictureLossIndication(p) => p.marshal_size(),
            RtcpPacket::FullIntraRequest(p) => p.marshal_size(),
            RtcpPacket::TransportLayerNack(p) => p.marshal_size(),
            RtcpPacket::TransportLayerCc(p) => p.marshal_size(),
            RtcpPacket::ExtendedReport(p) => p.marshal_size(),
            RtcpPacket::Unknown { raw, .. } => raw.len(),
        })
        .sum();
    let mut buf = BytesMut::with_capacity(size);
    for packet in packets {
        packet.marshal_to(&mut buf)?;
    }
    Ok(buf.freeze())
}

/// Parses a compound RTCP datagram into its constituent packets.
///
/// Each packet's own `length` field, not the outer datagram length, bounds
/// where the next packet starts; a malformed or truncated tail fails the
/// whole datagram (spec.md §4.3) rather than returning the packets
/// successfully parsed so far, since a truncated compound datagram usually
/// means the transport lost bytes and any partial read is unreliable.
pub fn unmarshal_compound(buf: &[u8]) -> Result<Vec<RtcpPacket>> {
    let mut packets = Vec::new();
    let mut offset = 0;
    while offset < buf.len() {
        if buf.len() - offset < header::HEADER_LENGTH {
            return Err(Error::ErrRtcpTrailingData);
        }
        let header = Header::unmarshal(&buf[offset..])?;
        let packet_len = (header.length as usize + 1) * 4;
        if offset + packet_len > buf.len() {
            return Err(Error::ErrRtcpLengthMismatch);
        }
        let raw = &buf[offset..offset + packet_len];
        let packet = match (header.packet_type, header.count) {
            (PT_SR, _) => RtcpPacket::SenderReport(SenderReport::unmarshal(raw)?),
            (PT_RR, _) => RtcpPacket::ReceiverReport(ReceiverReport::unmarshal(raw)?),
            (PT_SDES, _) => RtcpPacket::SourceDescription(SourceDescription::unmarshal(raw)?),
            (PT_BYE, _) => RtcpPacket::Goodbye(Goodbye::unmarshal(raw)?),
            (PT_XR, _) => RtcpPacket::ExtendedReport(ExtendedReport::unmarshal(raw)?),
            (PT_PSFB, FMT_PLI) => {
                RtcpPacket::PictureLossIndication(PictureLossIndication::unmarshal(raw)?)
            }
            (PT_PSFB, FMT_FIR) => RtcpPacket::FullIntraRequest(FullIntraRequest::unmarshal(raw)?),
            (PT_RTPFB, FMT_NACK) => {
                RtcpPacket::TransportLayerNack(TransportLayerNack::unmarshal(raw)?)
            }
            (PT_RTPFB, FMT_TWCC) => {
                RtcpPacket::TransportLayerCc(TransportLayerCc::unmarshal(raw)?)
            }
            (packet_type, fmt) => RtcpPacket::Unknown {
                packet_type,
                fmt,
                raw: Bytes::copy_from_slice(raw),
            },
        };
        packets.push(packet);
        offset += packet_len;
    }
    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reception_report::ReceptionReport;

    #[test]
    fn round_trips_sr_followed_by_sdes() {
        use crate::source_description::{SdesType, SourceDescriptionChunk, SourceDescriptionItem};

        let packets = vec![
            RtcpPacket::SenderReport(SenderReport {
                ssrc: 1,
                ntp_time: 0x1122_3344_5566_7788,
                rtp_time: 90000,
                packet_count: 5,
                octet_count: 500,
                reports: vec![ReceptionReport {
                    ssrc: 2,
                    ..Default::default()
                }],
            }),
            RtcpPacket::SourceDescription(SourceDescription {
                chunks: vec![SourceDescriptionChunk {
                    source: 1,
                    items: vec![SourceDescriptionItem {
                        sdes_type: SdesType::SdesCname,
                        text: Bytes::from_static(b"alice@example.com"),
                    }],
                }],
            }),
        ];
        let compound = marshal_compound(&packets).unwrap();
        let parsed = unmarshal_compound(&compound).unwrap();
        assert_eq!(parsed, packets);
    }

    #[test]
    fn unknown_packet_type_round_trips_opaquely() {
        let header = Header {
            padding: false,
            count: 0,
            packet_type: 204, // APP
            length: header::length_field_for(4),
        };
        let mut buf = BytesMut::new();
        header.marshal_to(&mut buf).unwrap();
        buf.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let parsed = unmarshal_compound(&buf).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(matches!(parsed[0], RtcpPacket::Unknown { packet_type: 204, .. }));
        let rebuilt = marshal_compound(&parsed).unwrap();
        assert_eq!(&rebuilt[..], &buf[..]);
    }

    #[test]
    fn truncated_tail_fails_the_whole_datagram() {
        let pli = RtcpPacket::PictureLossIndication(PictureLossIndication {
            sender_ssrc: 1,
            media_ssrc: 2,
        });
        let mut compound = marshal_compound(&[pli]).unwrap().to_vec();
        compound.truncate(compound.len() - 2);
        assert!(unmarshal_compound(&compound).is_err());
    }

    #[test]
    fn scenario_nack_and_pli_compound_matches_spec_example() {
        // spec.md §8 scenario 2: a compound datagram carrying a generic NACK
        // immediately followed by a PLI for the same media SSRC.
        let nack = RtcpPacket::TransportLayerNack(
            TransportLayerNack::from_missing_sequence_numbers(1, 42, &[100, 101]),
        );
        let pli = RtcpPacket::PictureLossIndication(PictureLossIndication {
            sender_ssrc: 1,
            media_ssrc: 42,
        });
        let compound = marshal_compound(&[nack, pli]).unwrap();
        let parsed = unmarshal_compound(&compound).unwrap();
        assert_eq!(parsed.len(), 2);
        match &parsed[0] {
            RtcpPacket::TransportLayerNack(n) => {
                assert_eq!(n.media_ssrc, 42);
                assert_eq!(n.nacks[0].seq_numbers(), vec![100, 101]);
            }
            _ => panic!("expected NACK first"),
        }
        assert!(matches!(parsed[1], RtcpPacket::PictureLossIndication(_)));
    }
}
