//! One inbound media stream: its simulcast layers (one [`PublishTrack`] per
//! SSRC/RID), inbound RTP/RTCP demux, and receive-side TWCC (spec.md §4.9).
//! Grounded on the interceptor chain's per-connection demux
//! (`rtc-interceptor::report`/`nack` process one SSRC at a time; this
//! widens that to "one stream, many SSRCs" the way a simulcast publisher
//! actually arrives on the wire).

use std::collections::HashMap;
use std::time::Instant;

use sfu_rtcp::packet::RtcpPacket;
use sfu_rtcp::receiver_report::ReceiverReport;
use sfu_rtp::extension::decode_transport_cc;
use sfu_rtp::packet::Packet;
use sfu_rtp::rtx;

use crate::pub_track::{PublishTrack, PublishTrackConfig};
use crate::twcc::ReceiveSideTwcc;

pub struct PublishStreamConfig {
    pub sender_ssrc: u32,
    /// One-byte header-extension id carrying the transport-wide sequence
    /// number, if the offer negotiated transport-cc.
    pub transport_cc_ext_id: Option<u8>,
}

pub struct PublishStream {
    config: PublishStreamConfig,
    tracks: HashMap<u32, PublishTrack>,
    rtx_to_media: HashMap<u32, u32>,
    /// RID to media SSRC, ordered by RID descending (spec.md §9 decision:
    /// higher RID is higher quality, so index 0 is the best layer).
    rid_order: Vec<(u32, u32)>,
    twcc: ReceiveSideTwcc,
    muted: bool,
}

impl PublishStream {
    pub fn new(config: PublishStreamConfig, now: Instant) -> Self {
        let twcc = ReceiveSideTwcc::new(0, now);
        Self { config, tracks: HashMap::new(), rtx_to_media: HashMap::new(), rid_order: Vec::new(), twcc, muted: false }
    }

    pub fn add_track(&mut self, config: PublishTrackConfig) {
        let ssrc = config.ssrc;
        if let Some(rtx_ssrc) = config.rtx_ssrc {
            self.rtx_to_media.insert(rtx_ssrc, ssrc);
        }
        if let Some(rid) = config.rid {
            self.rid_order.push((rid, ssrc));
            self.rid_order.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        }
        if self.config.transport_cc_ext_id.is_none() {
            self.config.transport_cc_ext_id = config.extensions.transport_cc_id();
        }
        self.tracks.insert(ssrc, PublishTrack::new(config));
    }

    /// RIDs ordered best (highest) to worst quality, each paired with its
    /// media SSRC. Used by a [`crate::sub_stream::SubscribeStream`] binding
    /// to this publisher to pick a default layer.
    pub fn rid_order(&self) -> &[(u32, u32)] {
        &self.rid_order
    }

    pub fn track(&self, ssrc: u32) -> Option<&PublishTrack> {
        self.tracks.get(&ssrc)
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Demuxes one inbound RTP packet: repairs it first if its SSRC names
    /// an RTX stream, folds it into the owning track's receive stats and
    /// TWCC arrival log, and returns the (possibly repaired) packet for the
    /// caller to fan out to subscribers. `None` means the SSRC is unknown
    /// to this stream and the packet was dropped.
    pub fn handle_rtp(&mut self, packet: Packet, now: Instant) -> Option<Packet> {
        let repaired = if let Some(&media_ssrc) = self.rtx_to_media.get(&packet.header.ssrc) {
            let track = self.tracks.get(&media_ssrc)?;
            rtx::repair(packet, media_ssrc, track.config.payload_type)?
        } else {
            packet
        };

        let track = self.tracks.get_mut(&repaired.header.ssrc)?;
        track.on_rtp_arrival(repaired.header.sequence_number, repaired.header.timestamp, now);

        if let Some(ext_id) = self.config.transport_cc_ext_id {
            if let Some(bytes) = repaired.header.extension(ext_id) {
                if let Some(transport_seq) = decode_transport_cc(bytes) {
                    self.twcc.record_arrival(transport_seq, now);
                }
            }
        }

        Some(repaired)
    }

    pub fn handle_rtcp(&mut self, packet: &RtcpPacket, now: Instant) {
        if let RtcpPacket::SenderReport(sr) = packet {
            if let Some(track) = self.tracks.get_mut(&sr.ssrc) {
                track.on_sender_report(sr.ntp_time, now);
            }
        }
    }

    pub fn request_keyframe(&mut self, ssrc: u32) {
        if let Some(track) = self.tracks.get_mut(&ssrc) {
            track.request_keyframe();
        }
    }

    /// Collects the receiver report, any due NACKs, keyframe demands, and a
    /// TWCC feedback packet for this tick, ready to fold into a subscriber
    /// connection's outbound compound RTCP datagram.
    pub fn tick(&mut self, now: Instant) -> Vec<RtcpPacket> {
        let mut out = Vec::new();
        let mut reports = Vec::new();

        for track in self.tracks.values_mut() {
            let tick = track.tick(now, self.config.sender_ssrc);
            reports.push(tick.report);
            if let Some(nack) = tick.nack {
                out.push(RtcpPacket::TransportLayerNack(nack));
            }
            if let Some((pli, fir)) = tick.keyframe_request {
                out.push(RtcpPacket::PictureLossIndication(pli));
                out.push(RtcpPacket::FullIntraRequest(fir));
            }
        }

        if !reports.is_empty() {
            out.insert(0, RtcpPacket::ReceiverReport(ReceiverReport { ssrc: self.config.sender_ssrc, reports }));
        }

        if let Some(twcc) = self.twcc.tick(now, self.config.sender_ssrc) {
            out.push(RtcpPacket::TransportLayerCc(twcc));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track_config(ssrc: u32, rid: Option<u32>) -> PublishTrackConfig {
        PublishTrackConfig {
            ssrc,
            payload_type: 96,
            rtx_ssrc: None,
            rtx_payload_type: None,
            codec_name: "VP8".into(),
            clock_rate: 90000,
            nack_enabled: true,
            audio: false,
            rid,
            extensions: sfu_rtp::extension::ExtensionMap::default(),
        }
    }

    fn packet(ssrc: u32, seq: u16) -> Packet {
        let mut header = sfu_rtp::header::Header::default();
        header.ssrc = ssrc;
        header.sequence_number = seq;
        Packet::new(header, bytes::Bytes::from_static(b"x"))
    }

    #[test]
    fn rid_order_is_highest_first() {
        let now = Instant::now();
        let mut stream = PublishStream::new(PublishStreamConfig { sender_ssrc: 1, transport_cc_ext_id: None }, now);
        stream.add_track(track_config(10, Some(0)));
        stream.add_track(track_config(11, Some(2)));
        stream.add_track(track_config(12, Some(1)));
        assert_eq!(stream.rid_order(), &[(2, 11), (1, 12), (0, 10)]);
    }

    #[test]
    fn unknown_ssrc_is_dropped() {
        let now = Instant::now();
        let mut stream = PublishStream::new(PublishStreamConfig { sender_ssrc: 1, transport_cc_ext_id: None }, now);
        stream.add_track(track_config(10, None));
        assert!(stream.handle_rtp(packet(999, 1), now).is_none());
    }

    #[test]
    fn tick_reports_all_tracks_in_one_receiver_report() {
        let now = Instant::now();
        let mut stream = PublishStream::new(PublishStreamConfig { sender_ssrc: 1, transport_cc_ext_id: None }, now);
        stream.add_track(track_config(10, None));
        stream.add_track(track_config(11, None));
        stream.handle_rtp(packet(10, 1), now);
        stream.handle_rtp(packet(11, 1), now);
        let out = stream.tick(now);
        match &out[0] {
            RtcpPacket::ReceiverReport(rr) => assert_eq!(rr.reports.len(), 2),
            _ => panic!("expected a receiver report first"),
        }
    }
}
