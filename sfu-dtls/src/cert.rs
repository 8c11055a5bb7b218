//! Long-lived self-signed certificate, generated once at process start and
//! shared read-only by every peer (spec.md §5: "process-global read-only
//! state initialized at startup").

use rcgen::{CertificateParams, DistinguishedName, KeyPair};
use ring::digest;
use sfu_shared::error::{Error, Result};

/// A self-signed certificate plus its SHA-256 fingerprint, formatted the
/// way SDP carries it (RFC 4572 §5: uppercase hex, colon-separated).
pub struct Certificate {
    pub der: Vec<u8>,
    pub key_pair: KeyPair,
    pub fingerprint: String,
}

impl Certificate {
    /// Generates a fresh self-signed certificate. Called once at startup;
    /// the result is shared (`Arc`) by every `DtlsEndpoint`.
    pub fn generate_self_signed() -> Result<Self> {
        let key_pair = KeyPair::generate().map_err(|e| Error::ErrOther(e.to_string()))?;
        let mut params = CertificateParams::new(Vec::<String>::new())
            .map_err(|e| Error::ErrOther(e.to_string()))?;
        params.distinguished_name = DistinguishedName::new();
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| Error::ErrOther(e.to_string()))?;
        let der = cert.der().to_vec();
        let fingerprint = fingerprint_sha256(&der);
        Ok(Self {
            der,
            key_pair,
            fingerprint,
        })
    }
}

fn fingerprint_sha256(der: &[u8]) -> String {
    let digest = digest::digest(&digest::SHA256, der);
    digest
        .as_ref()
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}
