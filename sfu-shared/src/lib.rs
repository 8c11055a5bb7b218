#![warn(rust_2018_idioms)]
#![allow(dead_code)]

//! Primitives shared by every layer of the SFU core: bounded byte cursors,
//! modulo sequence-number arithmetic, NTP time conversions, the wire-codec
//! traits (`Marshal`/`Unmarshal`), a per-worker buffer pool, and the common
//! error taxonomy.

pub mod cursor;
pub mod error;
pub mod marshal;
pub mod pool;
pub mod seq;
pub mod time;

pub use cursor::{ByteReader, ByteWriter};
pub use error::{Error, Result};
