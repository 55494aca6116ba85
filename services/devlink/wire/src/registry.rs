//! Message type registry: stable one-byte wire codes and per-kind payload
//! codecs.
//!
//! Codes are append-only and never reassigned. The zero-valued keepalive
//! code has no payload and decodes to no message at all; higher layers skip
//! it silently.

use crate::error::WireError;
use crate::message::{
    AckCode, AcknowledgeMessage, DeviceMessage, EventMessage, FunctionInvokeMessage,
    FunctionInvokeReply, FunctionOutput, OnlineMessage, ReadPropertyMessage, ReadPropertyReply,
    ReplyOutcome, ReportPropertyMessage, WritePropertyMessage, WritePropertyReply,
};
use crate::value::{self, Value, ValueTag};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Wire type codes (stable numbering, append-only)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Zero-payload liveness probe; decodes to no message
    Keepalive = 0x00,
    /// Device online with login token
    Online = 0x01,
    /// Acknowledgement
    Acknowledge = 0x02,
    /// Property report
    ReportProperty = 0x03,
    /// Property read request
    ReadProperty = 0x04,
    /// Property read reply
    ReadPropertyReply = 0x05,
    /// Property write request
    WriteProperty = 0x06,
    /// Property write reply
    WritePropertyReply = 0x07,
    /// Function invocation request
    FunctionInvoke = 0x08,
    /// Function invocation reply
    FunctionInvokeReply = 0x09,
    /// Device event
    Event = 0x0A,
}

impl TryFrom<u8> for MessageKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(MessageKind::Keepalive),
            0x01 => Ok(MessageKind::Online),
            0x02 => Ok(MessageKind::Acknowledge),
            0x03 => Ok(MessageKind::ReportProperty),
            0x04 => Ok(MessageKind::ReadProperty),
            0x05 => Ok(MessageKind::ReadPropertyReply),
            0x06 => Ok(MessageKind::WriteProperty),
            0x07 => Ok(MessageKind::WritePropertyReply),
            0x08 => Ok(MessageKind::FunctionInvoke),
            0x09 => Ok(MessageKind::FunctionInvokeReply),
            0x0A => Ok(MessageKind::Event),
            _ => Err(WireError::UnsupportedMessageKind(format!("0x{value:02X}"))),
        }
    }
}

impl MessageKind {
    /// Wire code for a message
    pub fn of(message: &DeviceMessage) -> MessageKind {
        match message {
            DeviceMessage::Online(_) => MessageKind::Online,
            DeviceMessage::Acknowledge(_) => MessageKind::Acknowledge,
            DeviceMessage::ReportProperty(_) => MessageKind::ReportProperty,
            DeviceMessage::ReadProperty(_) => MessageKind::ReadProperty,
            DeviceMessage::ReadPropertyReply(_) => MessageKind::ReadPropertyReply,
            DeviceMessage::WriteProperty(_) => MessageKind::WriteProperty,
            DeviceMessage::WritePropertyReply(_) => MessageKind::WritePropertyReply,
            DeviceMessage::FunctionInvoke(_) => MessageKind::FunctionInvoke,
            DeviceMessage::FunctionInvokeReply(_) => MessageKind::FunctionInvokeReply,
            DeviceMessage::Event(_) => MessageKind::Event,
        }
    }
}

/// Write the kind-specific payload of `message`
pub fn write_payload(message: &DeviceMessage, buf: &mut BytesMut) -> Result<(), WireError> {
    match message {
        DeviceMessage::Online(m) => value::put_str(buf, &m.token),
        DeviceMessage::Acknowledge(m) => {
            buf.put_u8(m.code as u8);
            Ok(())
        }
        DeviceMessage::ReportProperty(m) => value::put_object(buf, &m.properties),
        DeviceMessage::ReadProperty(m) => write_string_array(buf, &m.properties),
        DeviceMessage::ReadPropertyReply(m) => {
            write_reply(&m.outcome, buf, |properties, buf| {
                value::put_object(buf, properties)
            })
        }
        DeviceMessage::WriteProperty(m) => value::put_object(buf, &m.properties),
        DeviceMessage::WritePropertyReply(m) => {
            write_reply(&m.outcome, buf, |properties, buf| {
                value::put_object(buf, properties)
            })
        }
        DeviceMessage::FunctionInvoke(m) => {
            value::put_str(buf, &m.function_id)?;
            value::put_object(buf, &m.inputs)
        }
        DeviceMessage::FunctionInvokeReply(m) => write_reply(&m.outcome, buf, |output, buf| {
            Value::String(output.function_id.clone()).encode(buf)?;
            output.output.encode(buf)
        }),
        DeviceMessage::Event(m) => {
            value::put_str(buf, &m.event)?;
            value::put_object(buf, &m.data)
        }
    }
}

/// Read the kind-specific payload for `kind`. Header fields are left blank
/// for the envelope codec to fill in. Keepalive reads to `None`.
pub fn read_payload(kind: MessageKind, buf: &mut Bytes) -> Result<Option<DeviceMessage>, WireError> {
    let message = match kind {
        MessageKind::Keepalive => return Ok(None),
        MessageKind::Online => DeviceMessage::Online(OnlineMessage {
            device_id: String::new(),
            message_id: None,
            timestamp: 0,
            token: value::get_str(buf)?,
        }),
        MessageKind::Acknowledge => {
            value::ensure(buf, 1)?;
            DeviceMessage::Acknowledge(AcknowledgeMessage {
                device_id: String::new(),
                message_id: None,
                timestamp: 0,
                code: AckCode::try_from(buf.get_u8())?,
            })
        }
        MessageKind::ReportProperty => DeviceMessage::ReportProperty(ReportPropertyMessage {
            device_id: String::new(),
            message_id: None,
            timestamp: 0,
            properties: value::get_object(buf)?,
        }),
        MessageKind::ReadProperty => DeviceMessage::ReadProperty(ReadPropertyMessage {
            device_id: String::new(),
            message_id: None,
            timestamp: 0,
            properties: read_string_array(buf)?,
        }),
        MessageKind::ReadPropertyReply => DeviceMessage::ReadPropertyReply(ReadPropertyReply {
            device_id: String::new(),
            message_id: None,
            timestamp: 0,
            outcome: read_reply(buf, value::get_object)?,
        }),
        MessageKind::WriteProperty => DeviceMessage::WriteProperty(WritePropertyMessage {
            device_id: String::new(),
            message_id: None,
            timestamp: 0,
            properties: value::get_object(buf)?,
        }),
        MessageKind::WritePropertyReply => DeviceMessage::WritePropertyReply(WritePropertyReply {
            device_id: String::new(),
            message_id: None,
            timestamp: 0,
            outcome: read_reply(buf, value::get_object)?,
        }),
        MessageKind::FunctionInvoke => DeviceMessage::FunctionInvoke(FunctionInvokeMessage {
            device_id: String::new(),
            message_id: None,
            timestamp: 0,
            function_id: value::get_str(buf)?,
            inputs: value::get_object(buf)?,
        }),
        MessageKind::FunctionInvokeReply => {
            DeviceMessage::FunctionInvokeReply(FunctionInvokeReply {
                device_id: String::new(),
                message_id: None,
                timestamp: 0,
                outcome: read_reply(buf, |buf| {
                    let function_id = match Value::decode(buf)? {
                        Value::String(s) => s,
                        _ => return Err(WireError::MalformedValue),
                    };
                    Ok(FunctionOutput {
                        function_id,
                        output: Value::decode(buf)?,
                    })
                })?,
            })
        }
        MessageKind::Event => DeviceMessage::Event(EventMessage {
            device_id: String::new(),
            message_id: None,
            timestamp: 0,
            event: value::get_str(buf)?,
            data: value::get_object(buf)?,
        }),
    };
    Ok(Some(message))
}

// Read-property names travel as an untagged array of tagged strings.
fn write_string_array(buf: &mut BytesMut, items: &[String]) -> Result<(), WireError> {
    if items.len() > u16::MAX as usize {
        return Err(WireError::UnsupportedValueType("array longer than 65535 elements"));
    }
    buf.put_u16(items.len() as u16);
    for item in items {
        buf.put_u8(ValueTag::String as u8);
        value::put_str(buf, item)?;
    }
    Ok(())
}

fn read_string_array(buf: &mut Bytes) -> Result<Vec<String>, WireError> {
    let items = value::get_array(buf)?;
    let mut strings = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) => strings.push(s),
            _ => return Err(WireError::MalformedValue),
        }
    }
    Ok(strings)
}

// Replies lead with a success byte; failures carry tagged code and
// description values instead of the payload.
fn write_reply<T>(
    outcome: &ReplyOutcome<T>,
    buf: &mut BytesMut,
    write_success: impl FnOnce(&T, &mut BytesMut) -> Result<(), WireError>,
) -> Result<(), WireError> {
    match outcome {
        ReplyOutcome::Success(payload) => {
            buf.put_u8(1);
            write_success(payload, buf)
        }
        ReplyOutcome::Failure { code, message } => {
            buf.put_u8(0);
            Value::String(code.clone()).encode(buf)?;
            Value::String(message.clone()).encode(buf)
        }
    }
}

fn read_reply<T>(
    buf: &mut Bytes,
    read_success: impl FnOnce(&mut Bytes) -> Result<T, WireError>,
) -> Result<ReplyOutcome<T>, WireError> {
    value::ensure(buf, 1)?;
    if buf.get_u8() != 0 {
        Ok(ReplyOutcome::Success(read_success(buf)?))
    } else {
        let code = stringify(Value::decode(buf)?);
        let message = stringify(Value::decode(buf)?);
        Ok(ReplyOutcome::Failure { code, message })
    }
}

fn stringify(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_json().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(MessageKind::Keepalive as u8, 0x00);
        assert_eq!(MessageKind::Online as u8, 0x01);
        assert_eq!(MessageKind::Acknowledge as u8, 0x02);
        assert_eq!(MessageKind::ReportProperty as u8, 0x03);
        assert_eq!(MessageKind::ReadProperty as u8, 0x04);
        assert_eq!(MessageKind::ReadPropertyReply as u8, 0x05);
        assert_eq!(MessageKind::WriteProperty as u8, 0x06);
        assert_eq!(MessageKind::WritePropertyReply as u8, 0x07);
        assert_eq!(MessageKind::FunctionInvoke as u8, 0x08);
        assert_eq!(MessageKind::FunctionInvokeReply as u8, 0x09);
        assert_eq!(MessageKind::Event as u8, 0x0A);
    }

    #[test]
    fn test_unknown_code_is_rejected() {
        assert!(matches!(
            MessageKind::try_from(0x0B),
            Err(WireError::UnsupportedMessageKind(_))
        ));
    }

    #[test]
    fn test_failure_reply_roundtrip() {
        let reply = DeviceMessage::ReadPropertyReply(ReadPropertyReply {
            device_id: String::new(),
            message_id: None,
            timestamp: 0,
            outcome: ReplyOutcome::Failure {
                code: "TIMEOUT".to_string(),
                message: "device did not answer".to_string(),
            },
        });

        let mut buf = BytesMut::new();
        write_payload(&reply, &mut buf).unwrap();
        let mut bytes = buf.freeze();
        let decoded = read_payload(MessageKind::ReadPropertyReply, &mut bytes)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, reply);
    }

    #[test]
    fn test_keepalive_reads_to_no_message() {
        let mut empty = Bytes::new();
        assert!(read_payload(MessageKind::Keepalive, &mut empty)
            .unwrap()
            .is_none());
    }
}
