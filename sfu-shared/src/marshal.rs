//! Wire-codec traits implemented by every RTP/RTCP/STUN packet type.
//!
//! Three small traits rather than one big one, so a type that only needs to
//! report its size (for pre-allocating a compound RTCP buffer) doesn't have
//! to pull in the marshal/unmarshal machinery too.

use bytes::{Bytes, BytesMut};

use crate::error::Result;

/// The number of bytes `marshal` will write for the current value of `self`.
pub trait MarshalSize {
    fn marshal_size(&self) -> usize;
}

/// Serializes `self` into a byte buffer.
pub trait Marshal: MarshalSize {
    /// Encodes into a freshly allocated buffer sized via [`MarshalSize`].
    fn marshal(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.marshal_to(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Encodes by appending onto an existing buffer, returning the number
    /// of bytes written. Used when packing several packets into one
    /// compound RTCP datagram without an intermediate allocation per
    /// packet.
    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize>;
}

/// Parses `Self` from a byte slice, returning the value and consuming
/// exactly the bytes it occupies.
pub trait Unmarshal: Sized {
    fn unmarshal(buf: &[u8]) -> Result<Self>;
}
