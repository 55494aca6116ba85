//! Fixed message envelope: type code, timestamp, sequence, device id and
//! the kind-specific payload.
//!
//! ```text
//! +----------------------+----------------------------+
//! | u8  type code        | registry wire code         |
//! +----------------------+----------------------------+
//! | i64 timestamp        | ms since epoch, big-endian |
//! +----------------------+----------------------------+
//! | u16 sequence         | correlation sequence       |
//! +----------------------+----------------------------+
//! | device id            | u16-length-prefixed UTF-8  |
//! +----------------------+----------------------------+
//! | payload              | per-kind tagged values     |
//! +----------------------+----------------------------+
//! ```
//!
//! This codec is a pure transformation over in-memory buffers; it never
//! touches the correlation cache or any channel state.

use crate::error::WireError;
use crate::message::{now_millis, DeviceMessage};
use crate::registry::{self, MessageKind};
use crate::value;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Serialize `message` under `sequence`. The sequence is written as-is;
/// uniqueness within the correlation TTL window is the caller's business.
pub fn write_message(
    message: &DeviceMessage,
    sequence: u16,
    buf: &mut BytesMut,
) -> Result<(), WireError> {
    let kind = MessageKind::of(message);
    buf.put_u8(kind as u8);
    buf.put_i64(message.timestamp());
    buf.put_u16(sequence);
    value::put_str(buf, message.device_id())?;
    registry::write_payload(message, buf)
}

/// Serialize a keepalive envelope: type code and timestamp only.
pub fn write_keepalive(buf: &mut BytesMut) {
    buf.put_u8(MessageKind::Keepalive as u8);
    buf.put_i64(now_millis());
}

/// Deserialize one envelope. Returns `None` for keepalive. An empty device
/// id falls back to `fallback_device_id` — typically the id an already
/// authenticated channel remembered from its handshake.
pub fn read_message(
    buf: &mut Bytes,
    fallback_device_id: Option<&str>,
) -> Result<Option<(DeviceMessage, u16)>, WireError> {
    value::ensure(buf, 1)?;
    let kind = MessageKind::try_from(buf.get_u8())?;
    if kind == MessageKind::Keepalive {
        return Ok(None);
    }

    value::ensure(buf, 10)?;
    let timestamp = buf.get_i64();
    let sequence = buf.get_u16();
    let device_id = value::get_str(buf)?;

    let Some(mut message) = registry::read_payload(kind, buf)? else {
        return Ok(None);
    };

    if device_id.is_empty() {
        if let Some(fallback) = fallback_device_id {
            message.set_device_id(fallback);
        }
    } else {
        message.set_device_id(&device_id);
    }
    if timestamp > 0 {
        message.set_timestamp(timestamp);
    }
    Ok(Some((message, sequence)))
}
