//! The room-level fan-out graph: which participants are in a room, which
//! publish streams each contributes, and which subscribe streams (of other
//! participants' publishers) each is fed by (spec.md §4.11).
//!
//! Ownership follows spec.md §9's parent-owns-child design note:
//! the room holds every stream by strong `Rc`; a subscribe stream only
//! holds a [`std::rc::Weak`] back to the publisher feeding it
//! ([`crate::sub_stream::SubscribeStream`]), so dropping a publisher never
//! leaves a dangling strong reference for teardown to chase.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use sfu_rtp::packet::Packet;
use sfu_shared::error::{Error, Result};

use crate::pub_stream::PublishStream;
use crate::sub_stream::SubscribeStream;

struct Participant {
    publishers: Vec<Rc<RefCell<PublishStream>>>,
    subscribers: Vec<Rc<RefCell<SubscribeStream>>>,
}

pub struct Room {
    id: String,
    participants: HashMap<String, Participant>,
}

impl Room {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), participants: HashMap::new() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn join(&mut self, participant_id: &str) -> Result<()> {
        if self.participants.contains_key(participant_id) {
            return Err(Error::ErrParticipantAlreadyJoined(participant_id.to_string()));
        }
        self.participants.insert(participant_id.to_string(), Participant { publishers: Vec::new(), subscribers: Vec::new() });
        Ok(())
    }

    pub fn add_publisher(&mut self, participant_id: &str, publisher: Rc<RefCell<PublishStream>>) -> Result<()> {
        let participant = self.participants.get_mut(participant_id).ok_or_else(|| Error::ErrUnknownParticipant(participant_id.to_string()))?;
        participant.publishers.push(publisher);
        Ok(())
    }

    pub fn add_subscriber(&mut self, participant_id: &str, subscriber: Rc<RefCell<SubscribeStream>>) -> Result<()> {
        let participant = self.participants.get_mut(participant_id).ok_or_else(|| Error::ErrUnknownParticipant(participant_id.to_string()))?;
        participant.subscribers.push(subscriber);
        Ok(())
    }

    /// Fans one inbound RTP packet from `publisher` out to every
    /// subscribe stream bound to it anywhere in the room — spec.md §2's
    /// "Data flow per peer": dispatch into the publisher's own receive
    /// bookkeeping first (`PublishStream::handle_rtp`, which also repairs
    /// an RTX packet back to its media SSRC), then into each bound
    /// subscriber's sequence remap (`SubscribeStream::on_publisher_rtp`).
    /// The caller protects and transmits each returned packet on its
    /// paired subscriber's own connection.
    pub fn forward_rtp(
        &self,
        publisher: &Rc<RefCell<PublishStream>>,
        packet: Packet,
        now: Instant,
    ) -> Vec<(Rc<RefCell<SubscribeStream>>, Packet)> {
        let Some(repaired) = publisher.borrow_mut().handle_rtp(packet, now) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for participant in self.participants.values() {
            for sub in &participant.subscribers {
                if feeds_from(sub, publisher) {
                    if let Some(sent) = sub.borrow_mut().on_publisher_rtp(&repaired, now) {
                        out.push((sub.clone(), sent));
                    }
                }
            }
        }
        out
    }

    /// The participant id owning `subscriber`, if it is still registered in
    /// this room. Lets a caller holding only the `(subscriber, packet)`
    /// pairs [`Self::forward_rtp`] returns find the `WebrtcPeer` to send
    /// each packet out on.
    pub fn subscriber_participant(&self, subscriber: &Rc<RefCell<SubscribeStream>>) -> Option<String> {
        self.participants.iter().find_map(|(id, participant)| {
            participant
                .subscribers
                .iter()
                .any(|s| Rc::ptr_eq(s, subscriber))
                .then(|| id.clone())
        })
    }

    pub fn participant_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.participants.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Removes a participant and everything it owns, in the order spec.md
    /// §4.11 requires: other participants' subscribers fed by this
    /// participant's publishers first (so nothing forwards from a stream
    /// about to disappear), then this participant's own publishers, then
    /// its own subscribers, then the participant entry itself. A repeat
    /// call for an already-departed id is a no-op, matching spec.md §5's
    /// idempotent-teardown requirement.
    pub fn leave(&mut self, participant_id: &str) {
        let Some(departing) = self.participants.get(participant_id) else {
            return;
        };
        let departing_publishers: Vec<Rc<RefCell<PublishStream>>> = departing.publishers.clone();

        for (id, participant) in self.participants.iter_mut() {
            if id == participant_id {
                continue;
            }
            participant.subscribers.retain(|sub| !feeds_from_any(sub, &departing_publishers));
        }

        if let Some(participant) = self.participants.get_mut(participant_id) {
            participant.publishers.clear();
            participant.subscribers.clear();
        }
        self.participants.remove(participant_id);
    }
}

fn feeds_from(sub: &Rc<RefCell<SubscribeStream>>, publisher: &Rc<RefCell<PublishStream>>) -> bool {
    sub.borrow().publisher_strong().is_some_and(|bound| Rc::ptr_eq(&bound, publisher))
}

fn feeds_from_any(sub: &Rc<RefCell<SubscribeStream>>, publishers: &[Rc<RefCell<PublishStream>>]) -> bool {
    publishers.iter().any(|p| feeds_from(sub, p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pub_stream::PublishStreamConfig;
    use crate::pub_track::PublishTrackConfig;
    use crate::sub_stream::SubscribeStreamConfig;
    use crate::sub_track::SubscribeTrackConfig;
    use sfu_rtp::codec::Codec;
    use sfu_rtp::extension::ExtensionMap;
    use std::time::Instant;

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

    #[test]
    fn duplicate_join_is_an_error() {
        let mut room = Room::new("r1");
        room.join("alice").unwrap();
        assert!(room.join("alice").is_err());
    }

    #[test]
    fn leave_is_idempotent() {
        let mut room = Room::new("r1");
        room.join("alice").unwrap();
        room.leave("alice");
        room.leave("alice"); // no panic, no error surface
        assert!(room.participant_ids().is_empty());
    }

    #[test]
    fn leaving_a_publisher_drops_other_participants_subscribers_to_it() {
        let now = Instant::now();
        let mut room = Room::new("r1");
        room.join("alice").unwrap();
        room.join("bob").unwrap();

        let pub_stream = publisher(now);
        room.add_publisher("alice", pub_stream.clone()).unwrap();

        let sub = Rc::new(RefCell::new(SubscribeStream::new(
            Rc::downgrade(&pub_stream),
            SubscribeStreamConfig { codec: Codec::Vp8 },
            SubscribeTrackConfig { ssrc: 99, rtx_ssrc: None, rtx_payload_type: None, payload_type: 96, clock_rate: 90000, audio: false },
            now,
        )));
        room.add_subscriber("bob", sub).unwrap();

        room.leave("alice");
        assert_eq!(room.participants.get("bob").unwrap().subscribers.len(), 0);
    }

    fn rtp(ssrc: u32, seq: u16) -> Packet {
        let mut header = sfu_rtp::header::Header::default();
        header.ssrc = ssrc;
        header.sequence_number = seq;
        Packet::new(header, bytes::Bytes::from_static(b"x"))
    }

    #[test]
    fn forward_rtp_reaches_every_subscriber_bound_to_the_publisher_and_only_those() {
        let now = Instant::now();
        let mut room = Room::new("r1");
        room.join("alice").unwrap();
        room.join("bob").unwrap();
        room.join("carol").unwrap();

        let alice_pub = publisher(now);
        room.add_publisher("alice", alice_pub.clone()).unwrap();
        let carol_pub = publisher(now);
        room.add_publisher("carol", carol_pub.clone()).unwrap();

        let bob_sub = Rc::new(RefCell::new(SubscribeStream::new(
            Rc::downgrade(&alice_pub),
            SubscribeStreamConfig { codec: Codec::Vp8 },
            SubscribeTrackConfig { ssrc: 99, rtx_ssrc: None, rtx_payload_type: None, payload_type: 96, clock_rate: 90000, audio: false },
            now,
        )));
        room.add_subscriber("bob", bob_sub.clone()).unwrap();

        // carol subscribes to her own publisher, not alice's.
        let carol_sub = Rc::new(RefCell::new(SubscribeStream::new(
            Rc::downgrade(&carol_pub),
            SubscribeStreamConfig { codec: Codec::Vp8 },
            SubscribeTrackConfig { ssrc: 100, rtx_ssrc: None, rtx_payload_type: None, payload_type: 96, clock_rate: 90000, audio: false },
            now,
        )));
        room.add_subscriber("carol", carol_sub).unwrap();

        let forwarded = room.forward_rtp(&alice_pub, rtp(10, 1), now);
        assert_eq!(forwarded.len(), 1);
        assert!(Rc::ptr_eq(&forwarded[0].0, &bob_sub));
        assert_eq!(forwarded[0].1.header.ssrc, 99);

        assert_eq!(room.subscriber_participant(&bob_sub).as_deref(), Some("bob"));
    }
}
