//! Error types for the RTMP session engine.

use thiserror::Error;

/// Primary error type for all RTMP operations.
#[derive(Error, Debug)]
pub enum RtmpError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Invalid RTMP URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("{command} rejected by server: {code} ({description})")]
    CommandRejected {
        command: String,
        code: String,
        description: String,
    },

    #[error("Stream closed")]
    StreamClosed,

    #[error("Fatal stream error: {0}")]
    FatalStream(String),

    #[error("AMF error: {0}")]
    Amf(#[from] AmfError),

    #[error("Operation timed out")]
    Timeout,

    #[error("Operation not available in {0} mode")]
    WrongMode(&'static str),

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),
}

/// Errors during the C0/C1/C2 handshake exchange.
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("Unsupported RTMP version: {0}")]
    VersionMismatch(u8),

    #[error("S2 does not echo C1")]
    SignatureMismatch,

    #[error("Handshake timed out")]
    Timeout,

    #[error("Peer closed connection during handshake")]
    PeerClosed,
}

/// AMF0/AMF3 encoding and decoding errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmfError {
    #[error("Unexpected end of data while reading {0}")]
    Truncated(&'static str),

    #[error("Unknown AMF0 marker: 0x{0:02x}")]
    UnknownMarker(u8),

    #[error("Unknown AMF3 marker: 0x{0:02x}")]
    UnknownAmf3Marker(u8),

    #[error("Invalid UTF-8 in string")]
    InvalidUtf8,

    #[error("Nesting exceeds {0} levels")]
    TooDeep(usize),

    #[error("Invalid reference index: {0}")]
    BadReference(usize),

    #[error("String too long: {0} bytes")]
    StringTooLong(usize),
}

/// Convenience Result type.
pub type Result<T> = std::result::Result<T, RtmpError>;

impl RtmpError {
    /// Whether the error leaves the session unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RtmpError::FatalStream(_) | RtmpError::Connection(_) | RtmpError::Amf(_)
        )
    }
}
