//! Connectionless message handling: every datagram authenticates itself.
//!
//! Unlike a stream channel there is no handshake state to keep — each
//! datagram carries the login token inline and is verified independently.
//! Rejections are acknowledged with `noAuth`; there is no connection to
//! tear down.

use crate::channel::attach_request_id;
use crate::correlation::CorrelationCache;
use crate::error::SessionError;
use crate::handshake::ack_for;
use crate::secret::SecretStore;
use bytes::Bytes;
use devlink_wire::datagram::{self, Datagram};
use devlink_wire::message::{AckCode, DeviceMessage};

/// What the transport must do with one received datagram
#[derive(Debug)]
pub enum DatagramEvent {
    /// Token verified: send `reply`, surface the message
    Accepted {
        /// The decoded message, request id already resolved
        message: DeviceMessage,
        /// Encoded `ok` acknowledgement datagram
        reply: Bytes,
    },
    /// Token mismatch or unknown device: send `reply`, drop the message
    Rejected {
        /// Encoded `noAuth` acknowledgement datagram
        reply: Bytes,
    },
    /// Keepalive; nothing to do
    Ignored,
}

/// Authenticate and decode one inbound datagram.
pub async fn handle_datagram<S>(
    payload: Bytes,
    secrets: &S,
    cache: &CorrelationCache,
) -> Result<DatagramEvent, SessionError>
where
    S: SecretStore + ?Sized,
{
    let Some(decoded) = datagram::decode_datagram(payload)? else {
        return Ok(DatagramEvent::Ignored);
    };
    let Datagram {
        token,
        mut message,
        sequence,
        ..
    } = decoded;

    let authorized = matches!(
        secrets.lookup_secret(message.device_id()).await,
        Some(secret) if secret == token
    );

    let code = if authorized { AckCode::Ok } else { AckCode::NoAuth };
    let ack = DeviceMessage::Acknowledge(ack_for(&message, code));
    // acks carry no credential of their own
    let reply = datagram::encode_datagram("", &ack, sequence)?;

    if authorized {
        attach_request_id(&mut message, sequence, cache);
        Ok(DatagramEvent::Accepted { message, reply })
    } else {
        Ok(DatagramEvent::Rejected { reply })
    }
}

/// Encode an outbound message as a token-authenticated datagram, allocating
/// a correlation sequence when the message carries a request id.
pub fn encode_outbound_datagram(
    message: &DeviceMessage,
    token: &str,
    cache: &CorrelationCache,
) -> Result<Bytes, SessionError> {
    let sequence = cache.allocate(message.device_id(), message.message_id());
    Ok(datagram::encode_datagram(token, message, sequence)?)
}
