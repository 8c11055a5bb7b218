//! AES-128 counter-mode keystream application for SRTP/SRTCP payloads
//! (RFC 3711 §4.1.1). Counter-mode is symmetric: the same keystream both
//! encrypts and decrypts.

use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes128;
use ctr::Ctr128BE;

type AesCtr = Ctr128BE<Aes128>;

/// `IV = (salt || 0x0000) XOR (0^32 || SSRC || ROC || SEQ || 0^16)`
/// (RFC 3711 §4.1.1), laid out exactly as the common reference
/// implementations place it: SSRC at byte offset 4, ROC at offset 8, the
/// 16-bit sequence number at offset 12.
pub fn rtp_iv(salt: &[u8; 14], ssrc: u32, roc: u32, seq: u16) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[4..8].copy_from_slice(&ssrc.to_be_bytes());
    iv[8..12].copy_from_slice(&roc.to_be_bytes());
    iv[12..14].copy_from_slice(&seq.to_be_bytes());
    for i in 0..14 {
        iv[i] ^= salt[i];
    }
    iv
}

/// `IV` for SRTCP: the 31-bit SRTCP index takes the place RTP's ROC
/// occupies, and there is no per-packet sequence field (RFC 3711 §4.1.1).
pub fn rtcp_iv(salt: &[u8; 14], ssrc: u32, srtcp_index: u32) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[4..8].copy_from_slice(&ssrc.to_be_bytes());
    iv[8..12].copy_from_slice(&srtcp_index.to_be_bytes());
    for i in 0..14 {
        iv[i] ^= salt[i];
    }
    iv
}

/// XORs `buf` in place with the AES-CM keystream for `iv`.
pub fn apply_keystream(key: &[u8; 16], iv: &[u8; 16], buf: &mut [u8]) {
    let mut cipher = AesCtr::new(key.into(), iv.into());
    cipher.apply_keystream(buf);
}
