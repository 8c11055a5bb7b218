//! SRTP key derivation (RFC 3711 §4.3): expands a 16-byte master key and
//! 14-byte master salt into the six session keys/salts, via AES-CM used
//! as a pseudo-random function with the key-derivation rate fixed at 0
//! (every packet derives from the same session keys — no re-keying
//! mid-session).

use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes128;
use ctr::Ctr128BE;

pub const LABEL_RTP_ENCRYPTION: u8 = 0x00;
pub const LABEL_RTP_AUTHENTICATION: u8 = 0x01;
pub const LABEL_RTP_SALT: u8 = 0x02;
pub const LABEL_RTCP_ENCRYPTION: u8 = 0x03;
pub const LABEL_RTCP_AUTHENTICATION: u8 = 0x04;
pub const LABEL_RTCP_SALT: u8 = 0x05;

type AesCtr = Ctr128BE<Aes128>;

/// `out_len` bytes of AES-CM keystream, keyed by `master_key`, with the
/// counter block formed by XOR-ing `label` into the master salt at the
/// position the 48-bit key-derivation-rate index would otherwise occupy
/// (zero here, since this core fixes `kdr = 0`), then zero-padding the
/// 14-byte salt out to a 16-byte block.
fn aes_cm_key_derivation(label: u8, master_key: &[u8; 16], master_salt: &[u8; 14], out_len: usize) -> Vec<u8> {
    let mut x = [0u8; 16];
    x[..14].copy_from_slice(master_salt);
    x[9] ^= label;

    let mut cipher = AesCtr::new(master_key.into(), &x.into());
    let mut out = vec![0u8; out_len];
    cipher.apply_keystream(&mut out);
    out
}

#[derive(Debug, Clone)]
pub struct SessionKeys {
    pub rtp_encryption: [u8; 16],
    pub rtp_authentication: [u8; 20],
    pub rtp_salt: [u8; 14],
    pub rtcp_encryption: [u8; 16],
    pub rtcp_authentication: [u8; 20],
    pub rtcp_salt: [u8; 14],
}

pub fn derive_session_keys(master_key: &[u8; 16], master_salt: &[u8; 14]) -> SessionKeys {
    let mut rtp_encryption = [0u8; 16];
    rtp_encryption.copy_from_slice(&aes_cm_key_derivation(LABEL_RTP_ENCRYPTION, master_key, master_salt, 16));
    let mut rtp_authentication = [0u8; 20];
    rtp_authentication.copy_from_slice(&aes_cm_key_derivation(LABEL_RTP_AUTHENTICATION, master_key, master_salt, 20));
    let mut rtp_salt = [0u8; 14];
    rtp_salt.copy_from_slice(&aes_cm_key_derivation(LABEL_RTP_SALT, master_key, master_salt, 14));

    let mut rtcp_encryption = [0u8; 16];
    rtcp_encryption.copy_from_slice(&aes_cm_key_derivation(LABEL_RTCP_ENCRYPTION, master_key, master_salt, 16));
    let mut rtcp_authentication = [0u8; 20];
    rtcp_authentication.copy_from_slice(&aes_cm_key_derivation(LABEL_RTCP_AUTHENTICATION, master_key, master_salt, 20));
    let mut rtcp_salt = [0u8; 14];
    rtcp_salt.copy_from_slice(&aes_cm_key_derivation(LABEL_RTCP_SALT, master_key, master_salt, 14));

    SessionKeys {
        rtp_encryption,
        rtp_authentication,
        rtp_salt,
        rtcp_encryption,
        rtcp_authentication,
        rtcp_salt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic_and_label_dependent() {
        let key = [1u8; 16];
        let salt = [2u8; 14];
        let keys = derive_session_keys(&key, &salt);
        let keys2 = derive_session_keys(&key, &salt);
        assert_eq!(keys.rtp_encryption, keys2.rtp_encryption);
        assert_ne!(keys.rtp_encryption, keys.rtcp_encryption);
        assert_ne!(&keys.rtp_authentication[..16], &keys.rtp_encryption[..]);
    }
}
