//! Canonical device message model carried by the wire envelope.
//!
//! The adapter converts between these messages and the binary envelope; what
//! a message means is decided by the platform, not here. Every message
//! carries the common header trio: device id, optional platform request id
//! and a millisecond timestamp.

use crate::error::WireError;
use crate::value::{ObjectFields, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Acknowledgement codes (stable ordinals, append-only)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckCode {
    /// Accepted
    Ok = 0,
    /// Bad or missing login token
    NoAuth = 1,
    /// Message kind the peer does not handle
    Unsupported = 2,
}

impl AckCode {
    /// Stable textual form of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            AckCode::Ok => "ok",
            AckCode::NoAuth => "noAuth",
            AckCode::Unsupported => "unsupported",
        }
    }
}

impl TryFrom<u8> for AckCode {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AckCode::Ok),
            1 => Ok(AckCode::NoAuth),
            2 => Ok(AckCode::Unsupported),
            _ => Err(WireError::MalformedValue),
        }
    }
}

/// Success or failure of a reply message. Failures carry the device-reported
/// code and description instead of the payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutcome<T> {
    /// Operation succeeded, payload follows
    Success(T),
    /// Operation failed on the device
    Failure {
        /// Device-reported error code
        code: String,
        /// Human-readable description
        message: String,
    },
}

impl<T> ReplyOutcome<T> {
    /// Whether this outcome is the success arm
    pub fn is_success(&self) -> bool {
        matches!(self, ReplyOutcome::Success(_))
    }
}

/// Device came online; first message on a stream channel
#[derive(Debug, Clone, PartialEq)]
pub struct OnlineMessage {
    /// Device identifier
    pub device_id: String,
    /// Platform request id, if any
    pub message_id: Option<String>,
    /// Milliseconds since epoch
    pub timestamp: i64,
    /// Login token presented during the transport handshake
    pub token: String,
}

impl OnlineMessage {
    /// Online message for `device_id` carrying `token`, stamped now
    pub fn new(device_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            message_id: None,
            timestamp: now_millis(),
            token: token.into(),
        }
    }
}

/// Acknowledgement for a previously received message
#[derive(Debug, Clone, PartialEq)]
pub struct AcknowledgeMessage {
    /// Device identifier
    pub device_id: String,
    /// Platform request id, if any
    pub message_id: Option<String>,
    /// Milliseconds since epoch
    pub timestamp: i64,
    /// Result code
    pub code: AckCode,
}

/// Device-initiated property report
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPropertyMessage {
    /// Device identifier
    pub device_id: String,
    /// Platform request id, if any
    pub message_id: Option<String>,
    /// Milliseconds since epoch
    pub timestamp: i64,
    /// Reported property values
    pub properties: ObjectFields,
}

impl ReportPropertyMessage {
    /// Property report for `device_id`, stamped now
    pub fn new(device_id: impl Into<String>, properties: ObjectFields) -> Self {
        Self {
            device_id: device_id.into(),
            message_id: None,
            timestamp: now_millis(),
            properties,
        }
    }
}

/// Platform request to read named properties
#[derive(Debug, Clone, PartialEq)]
pub struct ReadPropertyMessage {
    /// Device identifier
    pub device_id: String,
    /// Platform request id, if any
    pub message_id: Option<String>,
    /// Milliseconds since epoch
    pub timestamp: i64,
    /// Names of the properties to read
    pub properties: Vec<String>,
}

impl ReadPropertyMessage {
    /// Read request for `device_id`, stamped now
    pub fn new(device_id: impl Into<String>, properties: Vec<String>) -> Self {
        Self {
            device_id: device_id.into(),
            message_id: None,
            timestamp: now_millis(),
            properties,
        }
    }
}

/// Device reply to a property read
#[derive(Debug, Clone, PartialEq)]
pub struct ReadPropertyReply {
    /// Device identifier
    pub device_id: String,
    /// Platform request id, if any
    pub message_id: Option<String>,
    /// Milliseconds since epoch
    pub timestamp: i64,
    /// Read property values, or the failure
    pub outcome: ReplyOutcome<ObjectFields>,
}

/// Platform request to write property values
#[derive(Debug, Clone, PartialEq)]
pub struct WritePropertyMessage {
    /// Device identifier
    pub device_id: String,
    /// Platform request id, if any
    pub message_id: Option<String>,
    /// Milliseconds since epoch
    pub timestamp: i64,
    /// Property values to write
    pub properties: ObjectFields,
}

/// Device reply to a property write
#[derive(Debug, Clone, PartialEq)]
pub struct WritePropertyReply {
    /// Device identifier
    pub device_id: String,
    /// Platform request id, if any
    pub message_id: Option<String>,
    /// Milliseconds since epoch
    pub timestamp: i64,
    /// Written property values, or the failure
    pub outcome: ReplyOutcome<ObjectFields>,
}

/// Platform request to invoke a device function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInvokeMessage {
    /// Device identifier
    pub device_id: String,
    /// Platform request id, if any
    pub message_id: Option<String>,
    /// Milliseconds since epoch
    pub timestamp: i64,
    /// Function to invoke
    pub function_id: String,
    /// Named invocation arguments
    pub inputs: ObjectFields,
}

/// Successful function invocation result
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionOutput {
    /// Function that produced the output
    pub function_id: String,
    /// Returned value
    pub output: Value,
}

/// Device reply to a function invocation
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInvokeReply {
    /// Device identifier
    pub device_id: String,
    /// Platform request id, if any
    pub message_id: Option<String>,
    /// Milliseconds since epoch
    pub timestamp: i64,
    /// Invocation output, or the failure
    pub outcome: ReplyOutcome<FunctionOutput>,
}

/// Device-initiated event
#[derive(Debug, Clone, PartialEq)]
pub struct EventMessage {
    /// Device identifier
    pub device_id: String,
    /// Platform request id, if any
    pub message_id: Option<String>,
    /// Milliseconds since epoch
    pub timestamp: i64,
    /// Event identifier
    pub event: String,
    /// Event payload
    pub data: ObjectFields,
}

impl EventMessage {
    /// Event for `device_id`, stamped now
    pub fn new(device_id: impl Into<String>, event: impl Into<String>, data: ObjectFields) -> Self {
        Self {
            device_id: device_id.into(),
            message_id: None,
            timestamp: now_millis(),
            event: event.into(),
            data,
        }
    }
}

macro_rules! each_message {
    ($value:expr, $m:ident => $body:expr) => {
        match $value {
            DeviceMessage::Online($m) => $body,
            DeviceMessage::Acknowledge($m) => $body,
            DeviceMessage::ReportProperty($m) => $body,
            DeviceMessage::ReadProperty($m) => $body,
            DeviceMessage::ReadPropertyReply($m) => $body,
            DeviceMessage::WriteProperty($m) => $body,
            DeviceMessage::WritePropertyReply($m) => $body,
            DeviceMessage::FunctionInvoke($m) => $body,
            DeviceMessage::FunctionInvokeReply($m) => $body,
            DeviceMessage::Event($m) => $body,
        }
    };
}

/// Any message the binary protocol can carry
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceMessage {
    /// Device came online
    Online(OnlineMessage),
    /// Acknowledgement
    Acknowledge(AcknowledgeMessage),
    /// Property report
    ReportProperty(ReportPropertyMessage),
    /// Property read request
    ReadProperty(ReadPropertyMessage),
    /// Property read reply
    ReadPropertyReply(ReadPropertyReply),
    /// Property write request
    WriteProperty(WritePropertyMessage),
    /// Property write reply
    WritePropertyReply(WritePropertyReply),
    /// Function invocation request
    FunctionInvoke(FunctionInvokeMessage),
    /// Function invocation reply
    FunctionInvokeReply(FunctionInvokeReply),
    /// Device event
    Event(EventMessage),
}

impl DeviceMessage {
    /// Device identifier
    pub fn device_id(&self) -> &str {
        each_message!(self, m => &m.device_id)
    }

    /// Replace the device identifier
    pub fn set_device_id(&mut self, device_id: &str) {
        each_message!(self, m => m.device_id = device_id.to_string())
    }

    /// Platform request id, if any
    pub fn message_id(&self) -> Option<&str> {
        each_message!(self, m => m.message_id.as_deref())
    }

    /// Replace the platform request id
    pub fn set_message_id(&mut self, message_id: Option<String>) {
        each_message!(self, m => m.message_id = message_id)
    }

    /// Milliseconds since epoch
    pub fn timestamp(&self) -> i64 {
        each_message!(self, m => m.timestamp)
    }

    /// Replace the timestamp
    pub fn set_timestamp(&mut self, timestamp: i64) {
        each_message!(self, m => m.timestamp = timestamp)
    }
}
