use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by every crate in the workspace.
///
/// Variants are grouped to match the error-kind policy in the design
/// document: parse errors are per-packet and never tear down a peer; auth
/// and crypto errors may; config errors only ever happen at construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // -- Parse: malformed wire data. Caller drops the packet and continues. --
    #[error("buffer too short: need {need} bytes, have {have}")]
    ErrShortBuffer { need: usize, have: usize },
    #[error("invalid RTP version")]
    ErrInvalidRtpVersion,
    #[error("invalid RTCP version")]
    ErrInvalidRtcpVersion,
    #[error("RTCP packet length field disagrees with buffer length")]
    ErrRtcpLengthMismatch,
    #[error("RTCP compound packet has trailing garbage")]
    ErrRtcpTrailingData,
    #[error("unknown RTCP packet type {0}")]
    ErrUnknownRtcpType(u8),
    #[error("header extension profile not recognized")]
    ErrUnknownExtensionProfile,
    #[error("STUN message too short or malformed")]
    ErrMalformedStunMessage,
    #[error("value out of range for wire field: {0}")]
    ErrValueOutOfRange(&'static str),

    // -- Auth: STUN integrity/fingerprint or DTLS handshake failure. --
    #[error("STUN message-integrity check failed")]
    ErrStunIntegrityMismatch,
    #[error("STUN fingerprint check failed")]
    ErrStunFingerprintMismatch,
    #[error("STUN username did not match the expected ICE ufrag pair")]
    ErrStunUsernameMismatch,
    #[error("DTLS handshake failed: {0}")]
    ErrDtlsHandshakeFailed(String),

    // -- Crypto: SRTP protect/unprotect failure. --
    #[error("SRTP authentication tag mismatch")]
    ErrSrtpAuthFailed,
    #[error("SRTP replay detected for sequence {0}")]
    ErrSrtpReplay(u64),
    #[error("SRTP context has no keys installed yet")]
    ErrSrtpNotReady,

    // -- Config/Setup: invalid SDP, missing certificate, bind failure. --
    #[error("missing required configuration key: {0}")]
    ErrConfigMissingKey(&'static str),
    #[error("invalid configuration value for {key}: {reason}")]
    ErrConfigInvalidValue { key: &'static str, reason: String },
    #[error("SDP is missing a required media section or attribute: {0}")]
    ErrSdpIncomplete(String),

    // -- Resource exhaustion: internal bookkeeping is full or stale. --
    #[error("requested sequence {0} is no longer retained")]
    ErrPacketNotRetained(u16),

    #[error("operation invalid after shutdown")]
    ErrAlreadyShutdown,

    // -- Room graph: participant/stream bookkeeping violations. --
    #[error("participant {0} has already joined this room")]
    ErrParticipantAlreadyJoined(String),
    #[error("unknown participant {0}")]
    ErrUnknownParticipant(String),

    #[error("{0}")]
    ErrOther(String),
}
