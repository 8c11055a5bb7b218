#![warn(rust_2018_idioms)]

//! The per-peer media transport pipeline: publish/subscribe track
//! bookkeeping, the publish/subscribe stream pair, the room fan-out graph,
//! the worker pool peers are pinned to, and the glue that demuxes one UDP
//! socket across ICE, DTLS and SRTP into RTP/RTCP.

pub mod config;
pub mod peer;
pub mod pub_stream;
pub mod pub_track;
pub mod room;
pub mod session;
pub mod sub_stream;
pub mod sub_track;
pub mod twcc;
pub mod worker;

pub use config::Config;
pub use peer::WebrtcPeer;
pub use room::Room;
pub use session::PeerSet;
