//! Per-remote DTLS connection state: flight position, handshake
//! transcript hash, and the ECDHE/PRF material once derived.

use rand_core::OsRng as DalekOsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey};

/// SRTP protection profile ids (RFC 5764 §4.1.2). This core only ever
/// negotiates the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrtpProtectionProfile {
    Aes128CmHmacSha1_80,
}

impl SrtpProtectionProfile {
    pub fn to_u16(self) -> u16 {
        match self {
            Self::Aes128CmHmacSha1_80 => 0x0001,
        }
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x0001 => Some(Self::Aes128CmHmacSha1_80),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flight {
    /// Waiting for the first `ClientHello` (no cookie yet).
    WaitingClientHello,
    /// `HelloVerifyRequest` sent; waiting for the cookie-bearing retry.
    WaitingClientHelloWithCookie,
    /// Server flight sent; waiting for `ClientKeyExchange` +
    /// `ChangeCipherSpec` + `Finished`.
    WaitingClientFinished,
    Established,
    Failed,
}

/// Accumulates the raw bytes of every handshake message exchanged, in
/// order, so `Finished` verify-data can be checked against
/// `Hash(handshake_messages)` (RFC 5246 §7.4.9).
#[derive(Default)]
pub struct Transcript {
    hasher: Sha256,
}

impl Transcript {
    pub fn update(&mut self, handshake_message: &[u8]) {
        self.hasher.update(handshake_message);
    }

    /// Snapshots the running hash without consuming it — both the
    /// server's own Finished and the client's Finished are checked
    /// against transcript prefixes that differ only by whether the
    /// peer's Finished itself is included.
    pub fn snapshot(&self) -> [u8; 32] {
        self.hasher.clone().finalize().into()
    }
}

pub struct ConnectionState {
    pub flight: Flight,
    pub cookie: Vec<u8>,
    pub server_random: [u8; 32],
    pub client_random: Option<[u8; 32]>,
    pub selected_profile: SrtpProtectionProfile,
    pub ephemeral_secret: Option<EphemeralSecret>,
    pub ephemeral_public: PublicKey,
    pub master_secret: Option<[u8; 48]>,
    pub message_seq: u16,
    pub transcript: Transcript,
}

impl ConnectionState {
    pub fn new(server_random: [u8; 32]) -> Self {
        let secret = EphemeralSecret::random_from_rng(DalekOsRng);
        let public = PublicKey::from(&secret);
        Self {
            flight: Flight::WaitingClientHello,
            cookie: Vec::new(),
            server_random,
            client_random: None,
            selected_profile: SrtpProtectionProfile::Aes128CmHmacSha1_80,
            ephemeral_secret: Some(secret),
            ephemeral_public: public,
            master_secret: None,
            message_seq: 0,
            transcript: Transcript::default(),
        }
    }

    pub fn next_message_seq(&mut self) -> u16 {
        let seq = self.message_seq;
        self.message_seq += 1;
        seq
    }
}
