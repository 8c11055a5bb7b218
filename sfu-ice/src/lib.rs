#![warn(rust_2018_idioms)]

//! ICE-lite: a STUN message codec (RFC 5389) plus a responder that answers
//! binding requests from the one remote endpoint named at signaling time
//! and never originates connectivity checks of its own.

pub mod responder;
pub mod stun;

pub use responder::{generate_local_password, IceEvent, IceLiteResponder, DEFAULT_PASSWORD_LENGTH};
pub use stun::message::Message;
