//! TLS 1.2 PRF (RFC 5246 §5) and the DTLS-SRTP keying-material export it
//! feeds (RFC 5764 §4.2). The baseline cipher suite negotiated here is the
//! PRF's `CipherSuite` choice — `ECDHE_ECDSA_WITH_AES_128_GCM_SHA256` — so
//! `P_hash` always runs over HMAC-SHA256.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// `P_hash(secret, seed)` truncated to `len` bytes (RFC 5246 §5).
fn p_hash(secret: &[u8], seed: &[u8], len: usize) -> Vec<u8> {
    let mut result = Vec::with_capacity(len + 32);
    let mut a = seed.to_vec();
    while result.len() < len {
        let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
        mac.update(&a);
        a = mac.finalize().into_bytes().to_vec();

        let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
        mac.update(&a);
        mac.update(seed);
        result.extend_from_slice(&mac.finalize().into_bytes());
    }
    result.truncate(len);
    result
}

fn prf(secret: &[u8], label: &str, seed: &[u8], len: usize) -> Vec<u8> {
    let mut labeled_seed = Vec::with_capacity(label.len() + seed.len());
    labeled_seed.extend_from_slice(label.as_bytes());
    labeled_seed.extend_from_slice(seed);
    p_hash(secret, &labeled_seed, len)
}

/// `master_secret = PRF(pre_master_secret, "master secret", client_random + server_random)[0..48]`.
pub fn derive_master_secret(pre_master_secret: &[u8], client_random: &[u8; 32], server_random: &[u8; 32]) -> [u8; 48] {
    let mut seed = Vec::with_capacity(64);
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);
    let bytes = prf(pre_master_secret, "master secret", &seed, 48);
    let mut out = [0u8; 48];
    out.copy_from_slice(&bytes);
    out
}

/// One SRTP protection profile's worth of keying material, split by
/// direction (RFC 5764 §4.2): each side gets a master key and a master
/// salt, derived from a single exported block ordered
/// `client_key | server_key | client_salt | server_salt`.
#[derive(Debug, Clone)]
pub struct SrtpKeyingMaterial {
    pub client_key: Vec<u8>,
    pub server_key: Vec<u8>,
    pub client_salt: Vec<u8>,
    pub server_salt: Vec<u8>,
}

/// Exports SRTP keying material for the `SRTP_AES128_CM_HMAC_SHA1_80`
/// profile: 16-byte keys, 14-byte salts (RFC 5764 §4.1.2 table).
pub fn export_srtp_keying_material(
    master_secret: &[u8; 48],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> SrtpKeyingMaterial {
    const KEY_LEN: usize = 16;
    const SALT_LEN: usize = 14;

    let mut seed = Vec::with_capacity(64);
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);

    let block = prf(
        master_secret,
        "EXTRACTOR-dtls_srtp",
        &seed,
        2 * (KEY_LEN + SALT_LEN),
    );

    let client_key = block[0..KEY_LEN].to_vec();
    let server_key = block[KEY_LEN..2 * KEY_LEN].to_vec();
    let client_salt = block[2 * KEY_LEN..2 * KEY_LEN + SALT_LEN].to_vec();
    let server_salt = block[2 * KEY_LEN + SALT_LEN..2 * KEY_LEN + 2 * SALT_LEN].to_vec();

    SrtpKeyingMaterial {
        client_key,
        server_key,
        client_salt,
        server_salt,
    }
}

/// `verify_data = PRF(master_secret, label, Hash(handshake_messages))[0..12]`
/// (RFC 5246 §7.4.9). `label` is `"client finished"` or `"server finished"`.
pub fn verify_data(master_secret: &[u8; 48], label: &str, handshake_hash: &[u8]) -> [u8; 12] {
    let bytes = prf(master_secret, label, handshake_hash, 12);
    let mut out = [0u8; 12];
    out.copy_from_slice(&bytes);
    out
}
