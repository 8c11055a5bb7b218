#![warn(rust_2018_idioms)]

//! RTP wire codec: fixed header, one/two-byte extension parsing, the
//! per-codec keyframe payload descriptors, and RTX wrap/repair.

pub mod codec;
pub mod extension;
pub mod header;
pub mod packet;
pub mod rtx;

pub use header::Header;
pub use packet::Packet;
