//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Corrupt or truncated tagged-value bytes
    #[error("malformed value")]
    MalformedValue,

    /// Value the wire format cannot carry (e.g. oversized string)
    #[error("unsupported value type: {0}")]
    UnsupportedValueType(&'static str),

    /// Message kind with no registry entry
    #[error("unsupported message kind: {0}")]
    UnsupportedMessageKind(String),

    /// Datagram too short or ill-formed
    #[error("malformed datagram")]
    MalformedDatagram,

    /// Frame body larger than the configured cap
    #[error("frame too large: {0}")]
    FrameTooLarge(usize),
}
