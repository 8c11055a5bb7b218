#![warn(rust_2018_idioms)]

//! RTCP wire codec: the common header, the report/description packet
//! family, payload- and transport-level feedback, and extended reports,
//! plus compound-datagram packing/parsing.

pub mod extended_report;
pub mod goodbye;
pub mod header;
pub mod packet;
pub mod payload_feedbacks;
pub mod receiver_report;
pub mod reception_report;
pub mod sender_report;
pub mod source_description;
pub mod transport_feedbacks;

pub use header::Header;
pub use packet::{marshal_compound, unmarshal_compound, RtcpPacket};
