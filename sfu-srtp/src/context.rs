//! Per-direction SRTP/SRTCP protect and unprotect. One `SrtpContext`
//! encrypts everything a peer sends (its subscribe tracks' RTP, its own
//! RTCP); a second, independent `SrtpContext` decrypts everything it
//! receives. Grounded on `srtp/src/srtp_handler.rs`'s
//! `Context::new(...)` / `encrypt_rtp`/`decrypt_rtp`/`encrypt_rtcp`/
//! `decrypt_rtcp` API shape.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;

use sfu_shared::error::{Error, Result};
use sfu_shared::seq::SequenceUnwrapper;

use crate::cipher::{apply_keystream, rtcp_iv, rtp_iv};
use crate::key_derivation::{derive_session_keys, SessionKeys};
use crate::replay::{ReplayWindow, DEFAULT_REPLAY_WINDOW};

const AUTH_TAG_LEN: usize = 10; // HMAC-SHA1-80
const RTP_HEADER_MIN_LEN: usize = 12;
const RTCP_HEADER_LEN: usize = 8;

/// 16-byte master key and 14-byte master salt, as exported by the DTLS
/// keying-material extractor.
pub struct MasterKey {
    pub key: [u8; 16],
    pub salt: [u8; 14],
}

#[derive(Default)]
struct RtpSsrcState {
    rollover: SequenceUnwrapper,
    replay: Option<ReplayWindow>,
}

#[derive(Default)]
struct RtcpSsrcState {
    next_index: u32,
    replay: Option<ReplayWindow>,
}

/// Direction this context runs in: `Protect` derives packet indices from
/// our own monotonically increasing counters (we chose the sequence
/// numbers), `Unprotect` must recover the index from the wire and guard
/// against replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Protect,
    Unprotect,
}

pub struct SrtpContext {
    direction: Direction,
    session_keys: SessionKeys,
    rtp_state: HashMap<u32, RtpSsrcState>,
    rtcp_state: HashMap<u32, RtcpSsrcState>,
    replay_window_size: u64,
}

impl SrtpContext {
    pub fn new(master: &MasterKey, direction: Direction) -> Self {
        Self {
            direction,
            session_keys: derive_session_keys(&master.key, &master.salt),
            rtp_state: HashMap::new(),
            rtcp_state: HashMap::new(),
            replay_window_size: DEFAULT_REPLAY_WINDOW,
        }
    }

    fn rtp_state_mut(&mut self, ssrc: u32) -> &mut RtpSsrcState {
        self.rtp_state.entry(ssrc).or_default()
    }

    fn rtcp_state_mut(&mut self, ssrc: u32) -> &mut RtcpSsrcState {
        self.rtcp_state.entry(ssrc).or_default()
    }

    /// Encrypts an unprotected RTP packet and appends the HMAC-SHA1-80
    /// authentication tag.
    pub fn encrypt_rtp(&mut self, packet: &[u8]) -> Result<Bytes> {
        if packet.len() < RTP_HEADER_MIN_LEN {
            return Err(Error::ErrShortBuffer {
                need: RTP_HEADER_MIN_LEN,
                have: packet.len(),
            });
        }
        let ssrc = u32::from_be_bytes(packet[8..12].try_into().unwrap());
        let seq = u16::from_be_bytes(packet[2..4].try_into().unwrap());

        let roc = {
            let state = self.rtp_state_mut(ssrc);
            let unwrapped = state.rollover.unwrap(seq);
            (unwrapped >> 16) as u32
        };

        let mut buf = BytesMut::from(packet);
        let header_len = rtp_header_len(&buf)?;
        let iv = rtp_iv(&self.session_keys.rtp_salt, ssrc, roc, seq);
        apply_keystream(&self.session_keys.rtp_encryption, &iv, &mut buf[header_len..]);

        let tag = rtp_auth_tag(&self.session_keys.rtp_authentication, &buf, roc);
        buf.extend_from_slice(&tag);
        Ok(buf.freeze())
    }

    /// Verifies the tag, recovers the rollover counter, replay-checks and
    /// decrypts. Returns the plaintext RTP packet with the tag stripped.
    pub fn decrypt_rtp(&mut self, packet: &[u8]) -> Result<Bytes> {
        if packet.len() < RTP_HEADER_MIN_LEN + AUTH_TAG_LEN {
            return Err(Error::ErrShortBuffer {
                need: RTP_HEADER_MIN_LEN + AUTH_TAG_LEN,
                have: packet.len(),
            });
        }
        let ssrc = u32::from_be_bytes(packet[8..12].try_into().unwrap());
        let seq = u16::from_be_bytes(packet[2..4].try_into().unwrap());
        let (body, received_tag) = packet.split_at(packet.len() - AUTH_TAG_LEN);

        let roc = {
            let state = self.rtp_state_mut(ssrc);
            (state.rollover.peek(seq) >> 16) as u32
        };

        let expected_tag = rtp_auth_tag(&self.session_keys.rtp_authentication, body, roc);
        if expected_tag[..].ct_eq(received_tag).unwrap_u8() != 1 {
            return Err(Error::ErrSrtpAuthFailed);
        }

        {
            let state = self.rtp_state_mut(ssrc);
            let index = state.rollover.unwrap(seq);
            let window = state
                .replay
                .get_or_insert_with(|| ReplayWindow::new(self.replay_window_size));
            window
                .check_and_mark(index as u64)
                .map_err(|_| Error::ErrSrtpReplay(index as u64))?;
        }

        let mut buf = BytesMut::from(body);
        let header_len = rtp_header_len(&buf)?;
        let iv = rtp_iv(&self.session_keys.rtp_salt, ssrc, roc, seq);
        apply_keystream(&self.session_keys.rtp_encryption, &iv, &mut buf[header_len..]);
        Ok(buf.freeze())
    }

    /// Encrypts an RTCP compound packet and appends the SRTCP index
    /// (with the encrypted bit set) plus the authentication tag (RFC
    /// 3711 §3.4).
    pub fn encrypt_rtcp(&mut self, packet: &[u8]) -> Result<Bytes> {
        if packet.len() < RTCP_HEADER_LEN {
            return Err(Error::ErrShortBuffer {
                need: RTCP_HEADER_LEN,
                have: packet.len(),
            });
        }
        let ssrc = u32::from_be_bytes(packet[4..8].try_into().unwrap());
        let index = {
            let state = self.rtcp_state_mut(ssrc);
            let index = state.next_index;
            state.next_index = state.next_index.wrapping_add(1) & 0x7FFF_FFFF;
            index
        };

        let mut buf = BytesMut::from(packet);
        let iv = rtcp_iv(&self.session_keys.rtcp_salt, ssrc, index);
        apply_keystream(&self.session_keys.rtcp_encryption, &iv, &mut buf[RTCP_HEADER_LEN..]);

        let index_with_e_bit = index | 0x8000_0000;
        buf.extend_from_slice(&index_with_e_bit.to_be_bytes());
        let tag = rtcp_auth_tag(&self.session_keys.rtcp_authentication, &buf);
        buf.extend_from_slice(&tag);
        Ok(buf.freeze())
    }

    pub fn decrypt_rtcp(&mut self, packet: &[u8]) -> Result<Bytes> {
        if packet.len() < RTCP_HEADER_LEN + 4 + AUTH_TAG_LEN {
            return Err(Error::ErrShortBuffer {
                need: RTCP_HEADER_LEN + 4 + AUTH_TAG_LEN,
                have: packet.len(),
            });
        }
        let ssrc = u32::from_be_bytes(packet[4..8].try_into().unwrap());
        let (signed, received_tag) = packet.split_at(packet.len() - AUTH_TAG_LEN);
        let expected_tag = rtcp_auth_tag(&self.session_keys.rtcp_authentication, signed);
        if expected_tag[..].ct_eq(received_tag).unwrap_u8() != 1 {
            return Err(Error::ErrSrtpAuthFailed);
        }

        let (body, index_field) = signed.split_at(signed.len() - 4);
        let raw_index = u32::from_be_bytes(index_field.try_into().unwrap());
        let encrypted = raw_index & 0x8000_0000 != 0;
        let index = raw_index & 0x7FFF_FFFF;

        {
            let state = self.rtcp_state_mut(ssrc);
            let window = state
                .replay
                .get_or_insert_with(|| ReplayWindow::new(self.replay_window_size));
            window
                .check_and_mark(index as u64)
                .map_err(|_| Error::ErrSrtpReplay(index as u64))?;
        }

        let mut buf = BytesMut::from(body);
        if encrypted {
            let iv = rtcp_iv(&self.session_keys.rtcp_salt, ssrc, index);
            apply_keystream(&self.session_keys.rtcp_encryption, &iv, &mut buf[RTCP_HEADER_LEN..]);
        }
        Ok(buf.freeze())
    }
}

fn rtp_header_len(buf: &[u8]) -> Result<usize> {
    if buf.len() < RTP_HEADER_MIN_LEN {
        return Err(Error::ErrShortBuffer {
            need: RTP_HEADER_MIN_LEN,
            have: buf.len(),
        });
    }
    let csrc_count = (buf[0] & 0x0F) as usize;
    let mut len = RTP_HEADER_MIN_LEN + csrc_count * 4;
    let has_extension = buf[0] & 0x10 != 0;
    if has_extension {
        if buf.len() < len + 4 {
            return Err(Error::ErrShortBuffer { need: len + 4, have: buf.len() });
        }
        let ext_len_words = u16::from_be_bytes([buf[len + 2], buf[len + 3]]) as usize;
        len += 4 + ext_len_words * 4;
    }
    if buf.len() < len {
        return Err(Error::ErrShortBuffer { need: len, have: buf.len() });
    }
    Ok(len)
}

type HmacSha1 = Hmac<Sha1>;

fn rtp_auth_tag(auth_key: &[u8; 20], packet_with_header_and_ciphertext: &[u8], roc: u32) -> [u8; AUTH_TAG_LEN] {
    let mut mac = HmacSha1::new_from_slice(auth_key).expect("HMAC accepts any key length");
    mac.update(packet_with_header_and_ciphertext);
    mac.update(&roc.to_be_bytes());
    let full = mac.finalize().into_bytes();
    let mut tag = [0u8; AUTH_TAG_LEN];
    tag.copy_from_slice(&full[..AUTH_TAG_LEN]);
    tag
}

fn rtcp_auth_tag(auth_key: &[u8; 20], packet_with_index: &[u8]) -> [u8; AUTH_TAG_LEN] {
    let mut mac = HmacSha1::new_from_slice(auth_key).expect("HMAC accepts any key length");
    mac.update(packet_with_index);
    let full = mac.finalize().into_bytes();
    let mut tag = [0u8; AUTH_TAG_LEN];
    tag.copy_from_slice(&full[..AUTH_TAG_LEN]);
    tag
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rtp_packet(ssrc: u32, seq: u16) -> Vec<u8> {
        let mut p = vec![0x80, 111, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0];
        p[2..4].copy_from_slice(&seq.to_be_bytes());
        p[8..12].copy_from_slice(&ssrc.to_be_bytes());
        p.extend_from_slice(b"payload-bytes");
        p
    }

    #[test]
    fn encrypt_then_decrypt_round_trips_rtp() {
        let master = MasterKey { key: [9u8; 16], salt: [1u8; 14] };
        let mut tx = SrtpContext::new(&master, Direction::Protect);
        let mut rx = SrtpContext::new(&master, Direction::Unprotect);

        let plain = rtp_packet(0xAABB_CCDD, 10);
        let protected = tx.encrypt_rtp(&plain).unwrap();
        assert_ne!(&protected[12..protected.len() - AUTH_TAG_LEN], &plain[12..]);

        let unprotected = rx.decrypt_rtp(&protected).unwrap();
        assert_eq!(unprotected, Bytes::from(plain));
    }

    #[test]
    fn replayed_rtp_packet_is_rejected() {
        let master = MasterKey { key: [9u8; 16], salt: [1u8; 14] };
        let mut tx = SrtpContext::new(&master, Direction::Protect);
        let mut rx = SrtpContext::new(&master, Direction::Unprotect);

        let protected = tx.encrypt_rtp(&rtp_packet(1, 1)).unwrap();
        rx.decrypt_rtp(&protected).unwrap();
        assert!(rx.decrypt_rtp(&protected).is_err());
    }

    #[test]
    fn tampered_rtp_packet_fails_authentication() {
        let master = MasterKey { key: [9u8; 16], salt: [1u8; 14] };
        let mut tx = SrtpContext::new(&master, Direction::Protect);
        let mut rx = SrtpContext::new(&master, Direction::Unprotect);

        let mut protected = tx.encrypt_rtp(&rtp_packet(1, 1)).unwrap().to_vec();
        protected[20] ^= 0xFF;
        assert!(rx.decrypt_rtp(&protected).is_err());
    }

    #[test]
    fn encrypt_then_decrypt_round_trips_rtcp() {
        let master = MasterKey { key: [4u8; 16], salt: [2u8; 14] };
        let mut tx = SrtpContext::new(&master, Direction::Protect);
        let mut rx = SrtpContext::new(&master, Direction::Unprotect);

        let mut packet = vec![0x80, 200, 0, 1, 0, 0, 0, 7];
        packet.extend_from_slice(&0u32.to_be_bytes());
        let protected = tx.encrypt_rtcp(&packet).unwrap();
        let unprotected = rx.decrypt_rtcp(&protected).unwrap();
        assert_eq!(unprotected, Bytes::from(packet));
    }
}
