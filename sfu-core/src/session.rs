//! Assembles the per-peer pipeline spec.md §2's "Data flow per peer"
//! describes end to end: a `PeerEvent::Rtp` drained off one participant's
//! [`WebrtcPeer`] is handed to that participant's [`PublishStream`],
//! [`Room::forward_rtp`] fans the repaired packet out to every bound
//! [`SubscribeStream`], and each re-numbered packet is protected and
//! queued for transmit on its own subscriber's `WebrtcPeer`.
//!
//! [`Room`]'s graph is `Rc`/`RefCell` — single-threaded by design, per
//! spec.md §9's "room directory... mutated only on the control worker" —
//! so a [`PeerSet`] (the registry tying participant ids to their
//! `WebrtcPeer` and `PublishStream`) is built to live entirely on that one
//! worker too, alongside the `Room` it's paired with. [`crate::worker::WorkerPool`]
//! still pins the cooperative, lock-free per-peer loops spec.md §5
//! describes for everything that doesn't need the room graph (socket I/O,
//! DTLS/ICE bring-up); bridging a `PeerSet`'s output onto those workers
//! would mean posting only `Send` data (protected `Bytes`, not `Rc`
//! handles) across the channel, which is a caller concern one layer up
//! from this crate (see DESIGN.md).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use crate::peer::{PeerEvent, WebrtcPeer};
use crate::pub_stream::PublishStream;
use crate::room::Room;

/// Ties participant ids to the `WebrtcPeer` terminating their transport and
/// the `PublishStream` receiving their published media, so one worker can
/// drive a room's full receive → fan-out → send pipeline.
#[derive(Default)]
pub struct PeerSet {
    peers: HashMap<String, Rc<RefCell<WebrtcPeer>>>,
    publishers: HashMap<String, Rc<RefCell<PublishStream>>>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self { peers: HashMap::new(), publishers: HashMap::new() }
    }

    pub fn register_peer(&mut self, participant_id: impl Into<String>, peer: Rc<RefCell<WebrtcPeer>>) {
        self.peers.insert(participant_id.into(), peer);
    }

    pub fn register_publisher(&mut self, participant_id: impl Into<String>, publisher: Rc<RefCell<PublishStream>>) {
        self.publishers.insert(participant_id.into(), publisher);
    }

    pub fn peer(&self, participant_id: &str) -> Option<Rc<RefCell<WebrtcPeer>>> {
        self.peers.get(participant_id).cloned()
    }

    /// Drains every `PeerEvent::Rtp` already queued on `participant_id`'s
    /// peer, dispatches each through its `PublishStream` and the room's
    /// fan-out graph, and protects + queues the result on every bound
    /// subscriber's own peer. Returns the number of packets successfully
    /// forwarded (a subscriber whose peer isn't SRTP-ready yet is skipped,
    /// not retried: spec.md §7 treats per-packet send failure as a drop).
    pub fn pump_published_rtp(&self, room: &Room, participant_id: &str, now: Instant) -> usize {
        let Some(peer) = self.peers.get(participant_id) else { return 0 };
        let Some(publisher) = self.publishers.get(participant_id) else { return 0 };

        let mut events = Vec::new();
        while let Some(event) = peer.borrow_mut().poll_event() {
            events.push(event);
        }

        let mut forwarded = 0;
        for event in events {
            let PeerEvent::Rtp(packet) = event else { continue };
            for (subscriber, out_packet) in room.forward_rtp(publisher, packet, now) {
                let Some(owner_id) = room.subscriber_participant(&subscriber) else { continue };
                let Some(owner_peer) = self.peers.get(&owner_id) else { continue };
                if owner_peer.borrow_mut().send_rtp(&out_packet).is_ok() {
                    forwarded += 1;
                }
            }
        }
        forwarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pub_stream::PublishStreamConfig;
    use crate::pub_track::PublishTrackConfig;
    use crate::sub_stream::{SubscribeStream, SubscribeStreamConfig};
    use crate::sub_track::SubscribeTrackConfig;
    use sfu_dtls::Certificate;
    use sfu_rtp::codec::Codec;
    use sfu_rtp::extension::ExtensionMap;
    use std::sync::Arc;

    fn cert() -> Arc<Certificate> {
        Arc::new(Certificate::generate_self_signed().expect("self-signed cert"))
    }

    fn publisher(now: Instant) -> Rc<RefCell<PublishStream>> {
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
        Rc::new(RefCell::new(p))
    }

    fn rtp(ssrc: u32, seq: u16) -> sfu_rtp::packet::Packet {
        let mut header = sfu_rtp::header::Header::default();
        header.ssrc = ssrc;
        header.sequence_number = seq;
        sfu_rtp::packet::Packet::new(header, bytes::Bytes::from_static(b"abc"))
    }

    #[test]
    fn published_rtp_reaches_a_bound_subscribers_peer() {
        let now = Instant::now();
        let mut room = Room::new("r1");
        room.join("alice").unwrap();
        room.join("bob").unwrap();

        let alice_pub = publisher(now);
        room.add_publisher("alice", alice_pub.clone()).unwrap();

        let bob_sub = Rc::new(RefCell::new(SubscribeStream::new(
            Rc::downgrade(&alice_pub),
            SubscribeStreamConfig { codec: Codec::Vp8 },
            SubscribeTrackConfig { ssrc: 99, rtx_ssrc: None, rtx_payload_type: None, payload_type: 96, clock_rate: 90000, audio: false },
            now,
        )));
        room.add_subscriber("bob", bob_sub).unwrap();

        let mut set = PeerSet::new();
        let alice_peer = Rc::new(RefCell::new(WebrtcPeer::new("a".into(), "pw".into(), "ra".into(), cert())));
        let bob_peer = Rc::new(RefCell::new(WebrtcPeer::new("b".into(), "pw".into(), "rb".into(), cert())));
        bob_peer.borrow_mut().force_ready_for_test("127.0.0.1:5000".parse().unwrap());
        set.register_peer("alice", alice_peer.clone());
        set.register_peer("bob", bob_peer.clone());
        set.register_publisher("alice", alice_pub);

        alice_peer.borrow_mut().queue_rtp_for_test(rtp(10, 1));

        let forwarded = set.pump_published_rtp(&room, "alice", now);
        assert_eq!(forwarded, 1);
        assert!(bob_peer.borrow_mut().poll_transmit().is_some());
    }

    #[test]
    fn a_subscriber_whose_peer_is_not_srtp_ready_is_skipped_not_retried() {
        let now = Instant::now();
        let mut room = Room::new("r1");
        room.join("alice").unwrap();
        room.join("bob").unwrap();

        let alice_pub = publisher(now);
        room.add_publisher("alice", alice_pub.clone()).unwrap();

        let bob_sub = Rc::new(RefCell::new(SubscribeStream::new(
            Rc::downgrade(&alice_pub),
            SubscribeStreamConfig { codec: Codec::Vp8 },
            SubscribeTrackConfig { ssrc: 99, rtx_ssrc: None, rtx_payload_type: None, payload_type: 96, clock_rate: 90000, audio: false },
            now,
        )));
        room.add_subscriber("bob", bob_sub).unwrap();

        let mut set = PeerSet::new();
        let alice_peer = Rc::new(RefCell::new(WebrtcPeer::new("a".into(), "pw".into(), "ra".into(), cert())));
        let bob_peer = Rc::new(RefCell::new(WebrtcPeer::new("b".into(), "pw".into(), "rb".into(), cert())));
        set.register_peer("alice", alice_peer.clone());
        set.register_peer("bob", bob_peer);
        set.register_publisher("alice", alice_pub);

        alice_peer.borrow_mut().queue_rtp_for_test(rtp(10, 1));

        assert_eq!(set.pump_published_rtp(&room, "alice", now), 0);
    }

    #[test]
    fn pump_with_no_registered_publisher_is_a_no_op() {
        let now = Instant::now();
        let room = Room::new("r1");
        let set = PeerSet::new();
        assert_eq!(set.pump_published_rtp(&room, "nobody", now), 0);
    }
}
