//! Glue for one peer connection: demuxes inbound UDP datagrams across
//! ICE, DTLS and SRTP into RTP/RTCP, and re-protects outbound RTP/RTCP the
//! same way in reverse (spec.md §4.1, §4.5). Follows the sans-IO shape
//! `sfu_ice::IceLiteResponder`/`sfu_dtls::DtlsEndpoint` already establish:
//! datagrams go in through `handle_read`, everything that needs to leave
//! comes out through `poll_transmit`/`poll_event`.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;

use sfu_dtls::{Certificate, DtlsEndpoint, DtlsEvent};
use sfu_ice::{IceEvent, IceLiteResponder, Message as StunMessage};
use sfu_rtcp::packet::{self as rtcp_packet, RtcpPacket};
use sfu_rtp::packet::Packet;
use sfu_shared::error::{Error, Result};
use sfu_shared::marshal::{Marshal, Unmarshal};
use sfu_srtp::{Direction, MasterKey, SrtpContext};

/// A packet-range byte is classified by RFC 7983 §7's demultiplexing
/// table: the first byte of a DTLS record falls in [20, 63]; RTP/RTCP
/// share [128, 191], disambiguated below by their second byte.
const DTLS_FIRST_BYTE_RANGE: std::ops::RangeInclusive<u8> = 20..=63;
const RTP_RTCP_FIRST_BYTE_RANGE: std::ops::RangeInclusive<u8> = 128..=191;
const RTCP_PACKET_TYPE_RANGE: std::ops::RangeInclusive<u8> = 192..=223;

pub enum PeerEvent {
    Connected,
    Rtp(Packet),
    Rtcp(Vec<RtcpPacket>),
    Disconnected { reason: String },
}

/// One browser-facing peer connection: ICE-lite responder, DTLS-SRTP
/// handshake driver and the pair of SRTP contexts it yields, all gated
/// behind one `handle_read`/`poll_transmit`/`poll_event` surface so the
/// owning worker never has to touch ICE, DTLS or SRTP directly.
pub struct WebrtcPeer {
    ice: IceLiteResponder,
    dtls: DtlsEndpoint,
    /// Encrypts what we send: our server-write key/salt half of the
    /// exported keying material (RFC 5764).
    srtp_encrypt: Option<SrtpContext>,
    /// Decrypts what we receive: the client-write half.
    srtp_decrypt: Option<SrtpContext>,
    remote: Option<SocketAddr>,
    transmits: VecDeque<(Bytes, SocketAddr)>,
    events: VecDeque<PeerEvent>,
}

impl WebrtcPeer {
    pub fn new(local_ufrag: String, local_pwd: String, remote_ufrag: String, certificate: Arc<Certificate>) -> Self {
        Self {
            ice: IceLiteResponder::new(local_ufrag, local_pwd, remote_ufrag),
            dtls: DtlsEndpoint::new(certificate),
            srtp_encrypt: None,
            srtp_decrypt: None,
            remote: None,
            transmits: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    pub fn local_ufrag(&self) -> &str {
        self.ice.local_ufrag()
    }

    pub fn local_pwd(&self) -> &str {
        self.ice.local_pwd()
    }

    pub fn selected_remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    pub fn is_srtp_ready(&self) -> bool {
        self.srtp_encrypt.is_some() && self.srtp_decrypt.is_some()
    }

    /// Classifies and routes one inbound UDP datagram. `source` is the
    /// datagram's origin, used both for ICE's connectivity check and to
    /// key the DTLS connection table.
    pub fn handle_read(&mut self, buf: &[u8], source: SocketAddr, now: Instant) {
        let Some(&first) = buf.first() else { return };

        if StunMessage::looks_like_stun(buf) {
            self.ice.handle_read(buf, source);
            self.drain_ice();
        } else if DTLS_FIRST_BYTE_RANGE.contains(&first) {
            self.dtls.handle_read(source, buf);
            self.drain_dtls();
        } else if RTP_RTCP_FIRST_BYTE_RANGE.contains(&first) {
            let is_rtcp = buf.len() > 1 && RTCP_PACKET_TYPE_RANGE.contains(&buf[1]);
            if is_rtcp {
                self.handle_srtcp(buf);
            } else {
                self.handle_srtp(buf, now);
            }
        }
    }

    fn drain_ice(&mut self) {
        while let Some((payload, dest)) = self.ice.poll_transmit() {
            self.transmits.push_back((payload, dest));
        }
        while let Some(event) = self.ice.poll_event() {
            match event {
                IceEvent::ConnectionCompleted { remote } => {
                    self.remote = Some(remote);
                    self.events.push_back(PeerEvent::Connected);
                }
                IceEvent::ConnectionError => {
                    self.events.push_back(PeerEvent::Disconnected { reason: "ice connection error".into() });
                }
            }
        }
    }

    fn drain_dtls(&mut self) {
        while let Some(transmit) = self.dtls.poll_transmit() {
            self.transmits.push_back((transmit.payload, transmit.remote));
        }
        while let Some(event) = self.dtls.poll_event() {
            match event {
                DtlsEvent::HandshakeComplete { keying_material, .. } => {
                    self.srtp_decrypt = Some(SrtpContext::new(
                        &MasterKey {
                            key: to_key(&keying_material.client_key),
                            salt: to_salt(&keying_material.client_salt),
                        },
                        Direction::Unprotect,
                    ));
                    self.srtp_encrypt = Some(SrtpContext::new(
                        &MasterKey {
                            key: to_key(&keying_material.server_key),
                            salt: to_salt(&keying_material.server_salt),
                        },
                        Direction::Protect,
                    ));
                }
                DtlsEvent::HandshakeFailed { reason, .. } => {
                    self.events.push_back(PeerEvent::Disconnected { reason });
                }
            }
        }
    }

    fn handle_srtp(&mut self, buf: &[u8], _now: Instant) {
        let Some(srtp) = self.srtp_decrypt.as_mut() else { return };
        let Ok(plaintext) = srtp.decrypt_rtp(buf) else { return };
        let Ok(packet) = Packet::unmarshal(&plaintext) else { return };
        self.events.push_back(PeerEvent::Rtp(packet));
    }

    fn handle_srtcp(&mut self, buf: &[u8]) {
        let Some(srtp) = self.srtp_decrypt.as_mut() else { return };
        let Ok(plaintext) = srtp.decrypt_rtcp(buf) else { return };
        let Ok(packets) = rtcp_packet::unmarshal_compound(&plaintext) else { return };
        self.events.push_back(PeerEvent::Rtcp(packets));
    }

    /// Protects and queues one outbound RTP packet for the selected
    /// remote. A no-op before the DTLS handshake completes or before ICE
    /// has selected a remote.
    pub fn send_rtp(&mut self, packet: &Packet) -> Result<()> {
        let remote = self.remote.ok_or(Error::ErrSrtpNotReady)?;
        let srtp = self.srtp_encrypt.as_mut().ok_or(Error::ErrSrtpNotReady)?;
        let plaintext = packet.marshal()?;
        let protected = srtp.encrypt_rtp(&plaintext)?;
        self.transmits.push_back((protected, remote));
        Ok(())
    }

    pub fn send_rtcp(&mut self, packets: &[RtcpPacket]) -> Result<()> {
        let remote = self.remote.ok_or(Error::ErrSrtpNotReady)?;
        let srtp = self.srtp_encrypt.as_mut().ok_or(Error::ErrSrtpNotReady)?;
        let plaintext = rtcp_packet::marshal_compound(packets)?;
        let protected = srtp.encrypt_rtcp(&plaintext)?;
        self.transmits.push_back((protected, remote));
        Ok(())
    }

    pub fn poll_transmit(&mut self) -> Option<(Bytes, SocketAddr)> {
        self.transmits.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<PeerEvent> {
        self.events.pop_front()
    }

    /// Queues a `PeerEvent::Rtp` as if it had just been unprotected off the
    /// wire, without driving a real ICE/DTLS handshake. Used by
    /// `session`'s tests to exercise the fan-out pipeline in isolation from
    /// SRTP/DTLS bring-up.
    #[cfg(test)]
    pub(crate) fn queue_rtp_for_test(&mut self, packet: Packet) {
        self.events.push_back(PeerEvent::Rtp(packet));
    }

    /// Fabricates a selected remote and a pair of SRTP contexts from a
    /// fixed key, skipping ICE/DTLS bring-up entirely. Used by `session`'s
    /// tests, which only need `send_rtp` to succeed, not to exercise the
    /// handshake itself.
    #[cfg(test)]
    pub(crate) fn force_ready_for_test(&mut self, remote: SocketAddr) {
        let key = MasterKey { key: [0u8; 16], salt: [0u8; 14] };
        self.remote = Some(remote);
        self.srtp_encrypt = Some(SrtpContext::new(&key, Direction::Protect));
        self.srtp_decrypt = Some(SrtpContext::new(&key, Direction::Unprotect));
    }

    /// Idempotent teardown (spec.md §5): drops SRTP state and forgets the
    /// selected remote so any further `send_*` call is a no-op.
    pub fn close(&mut self) {
        if let Some(remote) = self.remote.take() {
            self.dtls.close(remote);
        }
        self.srtp_encrypt = None;
        self.srtp_decrypt = None;
    }
}

fn to_key(v: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    let n = v.len().min(16);
    out[..n].copy_from_slice(&v[..n]);
    out
}

fn to_salt(v: &[u8]) -> [u8; 14] {
    let mut out = [0u8; 14];
    let n = v.len().min(14);
    out[..n].copy_from_slice(&v[..n]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_fresh_peer_has_no_selected_remote_and_is_not_srtp_ready() {
        let cert = Arc::new(Certificate::generate_self_signed().expect("self-signed cert"));
        let peer = WebrtcPeer::new("lufrag".into(), "lpwd".into(), "rufrag".into(), cert);
        assert!(peer.selected_remote().is_none());
        assert!(!peer.is_srtp_ready());
    }

    #[test]
    fn an_empty_datagram_is_ignored() {
        let cert = Arc::new(Certificate::generate_self_signed().expect("self-signed cert"));
        let mut peer = WebrtcPeer::new("lufrag".into(), "lpwd".into(), "rufrag".into(), cert);
        let source: SocketAddr = "127.0.0.1:9".parse().unwrap();
        peer.handle_read(&[], source, Instant::now());
        assert!(peer.poll_transmit().is_none());
        assert!(peer.poll_event().is_none());
    }

    #[test]
    fn rtp_arriving_before_the_handshake_completes_is_dropped() {
        let cert = Arc::new(Certificate::generate_self_signed().expect("self-signed cert"));
        let mut peer = WebrtcPeer::new("lufrag".into(), "lpwd".into(), "rufrag".into(), cert);
        let source: SocketAddr = "127.0.0.1:9".parse().unwrap();
        // first byte 0x80 (version 2, no padding/extension) lands in the
        // RTP/RTCP demux range; second byte is an ordinary payload type.
        peer.handle_read(&[0x80, 96, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0], source, Instant::now());
        assert!(peer.poll_event().is_none());
    }

    #[test]
    fn send_before_ice_and_dtls_complete_errors_instead_of_queuing() {
        let cert = Arc::new(Certificate::generate_self_signed().expect("self-signed cert"));
        let mut peer = WebrtcPeer::new("lufrag".into(), "lpwd".into(), "rufrag".into(), cert);
        let mut header = sfu_rtp::header::Header::default();
        header.ssrc = 1;
        let packet = Packet::new(header, bytes::Bytes::from_static(b"x"));
        assert!(peer.send_rtp(&packet).is_err());
    }
}
