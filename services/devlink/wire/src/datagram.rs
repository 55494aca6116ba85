//! One-message-per-datagram codec for connectionless transports.
//!
//! ```text
//! +----------------------+----------------------------+
//! | u8  auth type        | 0 = token                  |
//! +----------------------+----------------------------+
//! | token                | u16-length-prefixed UTF-8  |
//! +----------------------+----------------------------+
//! | envelope             | unframed, rest of datagram |
//! +----------------------+----------------------------+
//! ```
//!
//! There is no stream to resynchronize, so anything short or ill-formed is
//! reported as [`WireError::MalformedDatagram`] and the datagram dropped.

use crate::envelope;
use crate::error::WireError;
use crate::message::DeviceMessage;
use crate::value;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Token-based authentication scheme selector
pub const AUTH_TYPE_TOKEN: u8 = 0;

/// One decoded datagram
#[derive(Debug)]
pub struct Datagram {
    /// Authentication scheme selector
    pub auth_type: u8,
    /// Credential presented with this datagram
    pub token: String,
    /// Carried message
    pub message: DeviceMessage,
    /// Correlation sequence from the envelope
    pub sequence: u16,
}

/// Encode `message` as a token-authenticated datagram
pub fn encode_datagram(
    token: &str,
    message: &DeviceMessage,
    sequence: u16,
) -> Result<Bytes, WireError> {
    let mut buf = BytesMut::new();
    buf.put_u8(AUTH_TYPE_TOKEN);
    value::put_str(&mut buf, token)?;
    envelope::write_message(message, sequence, &mut buf)?;
    Ok(buf.freeze())
}

/// Decode one datagram. Keepalive envelopes decode to `None`.
pub fn decode_datagram(mut buf: Bytes) -> Result<Option<Datagram>, WireError> {
    parse(&mut buf).map_err(|_| WireError::MalformedDatagram)
}

fn parse(buf: &mut Bytes) -> Result<Option<Datagram>, WireError> {
    value::ensure(buf, 1)?;
    let auth_type = buf.get_u8();
    let token = value::get_str(buf)?;
    match envelope::read_message(buf, None)? {
        Some((message, sequence)) => Ok(Some(Datagram {
            auth_type,
            token,
            message,
            sequence,
        })),
        None => Ok(None),
    }
}
