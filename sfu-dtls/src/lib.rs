#![warn(rust_2018_idioms)]
#![allow(dead_code)]

//! Passive-mode DTLS-SRTP handshake driver (RFC 5764).
//!
//! This crate drives only the flight shape and the SRTP keying-material
//! export of a DTLS 1.2 handshake against a long-lived self-signed
//! certificate; it does not implement the DTLS bulk record cipher. Per the
//! core's scope, the DTLS cryptographic library (certificate-path
//! validation, the TLS record cipher) is an external collaborator — this
//! driver only needs to reach `Finished` and export SRTP key material, not
//! carry application data over the DTLS channel itself.

pub mod cert;
pub mod endpoint;
pub mod handshake;
pub mod prf;
pub mod record;
pub mod state;

pub use cert::Certificate;
pub use endpoint::{DtlsEndpoint, DtlsEvent, Transmit};
pub use prf::SrtpKeyingMaterial;
pub use state::SrtpProtectionProfile;
