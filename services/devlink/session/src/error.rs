//! Session-layer error types.

use devlink_wire::WireError;
use thiserror::Error;

/// Errors surfaced by channel handling
#[derive(Error, Debug)]
pub enum SessionError {
    /// Wire-level encode/decode failure
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Frame arrived on a channel whose handshake already failed
    #[error("handshake rejected")]
    HandshakeRejected,

    /// Transport I/O failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
