#![warn(rust_2018_idioms)]
#![allow(dead_code)]

//! Per-direction SRTP/SRTCP protect and unprotect boundary (RFC 3711),
//! AES-128-CM / HMAC-SHA1-80 baseline. A peer holds two independent
//! contexts: one encrypting everything it sends, one decrypting
//! everything it receives — both derived from the same DTLS keying
//! material but from opposite halves of it.

pub mod cipher;
pub mod context;
pub mod key_derivation;
pub mod replay;

pub use context::{Direction, MasterKey, SrtpContext};
