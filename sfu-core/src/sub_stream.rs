//! One outbound media stream, bound to a single [`PublishStream`] and
//! forwarding one of its simulcast layers to a subscriber (spec.md §4.10).
//! The binding is a weak upward handle (spec.md §9's parent-owns-child
//! design note): the [`crate::room::Room`] owns publish streams strongly,
//! subscribe streams only borrow them for the duration of a forward.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Instant;

use sfu_rtp::codec::Codec;
use sfu_rtp::packet::Packet;

use crate::pub_stream::PublishStream;
use crate::sub_track::{SubscribeTrack, SubscribeTrackConfig};

pub struct SubscribeStreamConfig {
    pub codec: Codec,
}

pub struct SubscribeStream {
    publisher: Weak<RefCell<PublishStream>>,
    codec: Codec,
    active_ssrc: Option<u32>,
    pending_ssrc: Option<u32>,
    track: SubscribeTrack,
}

impl SubscribeStream {
    pub fn new(
        publisher: Weak<RefCell<PublishStream>>,
        config: SubscribeStreamConfig,
        track_config: SubscribeTrackConfig,
        now: Instant,
    ) -> Self {
        let active_ssrc = publisher
            .upgrade()
            .and_then(|p| p.borrow().rid_order().first().map(|(_, ssrc)| *ssrc));
        Self {
            publisher,
            codec: config.codec,
            active_ssrc,
            pending_ssrc: None,
            track: SubscribeTrack::new(track_config, now),
        }
    }

    pub fn active_ssrc(&self) -> Option<u32> {
        self.active_ssrc
    }

    /// The publisher this stream is bound to, if it still exists. Used by
    /// room teardown to find every subscriber fed by a departing publisher.
    pub fn publisher_strong(&self) -> Option<Rc<RefCell<PublishStream>>> {
        self.publisher.upgrade()
    }

    /// Requests a switch to the simulcast layer named by `rid`. The cut-over
    /// itself waits for a keyframe on that layer (via [`Self::on_publisher_rtp`])
    /// so decode never resumes mid-GOP.
    pub fn switch_layer(&mut self, rid: u32) {
        let Some(publisher) = self.publisher.upgrade() else {
            return;
        };
        let target = publisher
            .borrow()
            .rid_order()
            .iter()
            .find(|(r, _)| *r == rid)
            .map(|(_, ssrc)| *ssrc);
        if let Some(ssrc) = target {
            if Some(ssrc) != self.active_ssrc {
                publisher.borrow_mut().request_keyframe(ssrc);
                self.pending_ssrc = Some(ssrc);
            }
        }
    }

    /// Feeds one already-demuxed inbound packet from the bound publisher
    /// through layer-switch gating and sequence remap. Returns `None` when
    /// the packet belongs to a layer this stream isn't (yet) forwarding.
    pub fn on_publisher_rtp(&mut self, packet: &Packet, now: Instant) -> Option<Packet> {
        if let Some(pending) = self.pending_ssrc {
            if packet.header.ssrc == pending && self.codec.describe(&packet.payload).is_keyframe {
                self.track.resync(packet.header.sequence_number);
                self.active_ssrc = Some(pending);
                self.pending_ssrc = None;
            }
        }

        if Some(packet.header.ssrc) != self.active_ssrc {
            return None;
        }

        Some(self.track.prepare_send(packet, now))
    }

    pub fn track(&self) -> &SubscribeTrack {
        &self.track
    }

    pub fn track_mut(&mut self) -> &mut SubscribeTrack {
        &mut self.track
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pub_stream::PublishStreamConfig;
    use crate::pub_track::PublishTrackConfig;
    use sfu_rtp::extension::ExtensionMap;
    use std::rc::Rc;

    fn publisher_with_two_layers(now: Instant) -> Rc<RefCell<PublishStream>> {
        let mut p = PublishStream::new(PublishStreamConfig { sender_ssrc: 1, transport_cc_ext_id: None }, now);
        p.add_track(PublishTrackConfig {
            ssrc: 10,
            payload_type: 96,
            rtx_ssrc: None,
            rtx_payload_type: None,
            codec_name: "VP8".into(),
            clock_rate: 90000,
            nack_enabled: true,
            audio: false,
            rid: Some(0),
            extensions: ExtensionMap::default(),
        });
        p.add_track(PublishTrackConfig {
            ssrc: 11,
            payload_type: 96,
            rtx_ssrc: None,
            rtx_payload_type: None,
            codec_name: "VP8".into(),
            clock_rate: 90000,
            nack_enabled: true,
            audio: false,
            rid: Some(1),
            extensions: ExtensionMap::default(),
        });
        Rc::new(RefCell::new(p))
    }

    fn keyframe_packet(ssrc: u32, seq: u16) -> Packet {
        let mut header = sfu_rtp::header::Header::default();
        header.ssrc = ssrc;
        header.sequence_number = seq;
        // S=1, PID=0, no extension (byte 0); VP8 frame-type bit clear (byte 1): keyframe.
        Packet::new(header, bytes::Bytes::from_static(&[0x10, 0x00, 0xAA]))
    }

    #[test]
    fn defaults_to_the_highest_rid() {
        let now = Instant::now();
        let publisher = publisher_with_two_layers(now);
        let sub = SubscribeStream::new(
            Rc::downgrade(&publisher),
            SubscribeStreamConfig { codec: Codec::Vp8 },
            SubscribeTrackConfig { ssrc: 99, rtx_ssrc: None, rtx_payload_type: None, payload_type: 96, clock_rate: 90000, audio: false },
            now,
        );
        assert_eq!(sub.active_ssrc(), Some(11));
    }

    #[test]
    fn layer_switch_waits_for_a_keyframe_before_cutting_over() {
        let now = Instant::now();
        let publisher = publisher_with_two_layers(now);
        let mut sub = SubscribeStream::new(
            Rc::downgrade(&publisher),
            SubscribeStreamConfig { codec: Codec::Vp8 },
            SubscribeTrackConfig { ssrc: 99, rtx_ssrc: None, rtx_payload_type: None, payload_type: 96, clock_rate: 90000, audio: false },
            now,
        );
        sub.switch_layer(0);
        assert_eq!(sub.active_ssrc(), Some(11)); // still on the old layer

        // a non-keyframe packet on the new layer doesn't cut over
        let mut non_kf = keyframe_packet(10, 1);
        non_kf.payload = bytes::Bytes::from_static(&[0x10, 0x01, 0xAA]);
        assert!(sub.on_publisher_rtp(&non_kf, now).is_none());
        assert_eq!(sub.active_ssrc(), Some(11));

        // a keyframe on the new layer does
        assert!(sub.on_publisher_rtp(&keyframe_packet(10, 1), now).is_some());
        assert_eq!(sub.active_ssrc(), Some(10));
    }
}
