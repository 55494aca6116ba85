//! Binary wire protocol for the device-link adapter: tagged values, the
//! message envelope, stream framing and the datagram codec.
//!
//! This crate is the synchronous core of the adapter. Everything here is a
//! pure transformation over in-memory buffers — no sockets, no clocks
//! beyond stamping outbound timestamps, no shared state.
//!
//! ## Wire Format
//!
//! ```text
//! TCP frame:
//! +----------------------+----------------------------+
//! | u32 frame_len        | length of bytes that follow|
//! +----------------------+----------------------------+
//! | envelope             | one message                |
//! +----------------------+----------------------------+
//!
//! Envelope:
//! +----------------------+----------------------------+
//! | u8  type code        | message kind (0x00 = keep- |
//! |                      | alive, no further fields)  |
//! +----------------------+----------------------------+
//! | i64 timestamp        | ms since epoch             |
//! +----------------------+----------------------------+
//! | u16 sequence         | correlation sequence       |
//! +----------------------+----------------------------+
//! | device id            | u16-length-prefixed UTF-8  |
//! +----------------------+----------------------------+
//! | payload              | per-kind tagged values     |
//! +----------------------+----------------------------+
//! ```
//!
//! All integers are big-endian. Tagged values carry a one-byte type tag
//! (0x00–0x0E); see [`value::ValueTag`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod datagram;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod message;
pub mod registry;
pub mod value;

// Re-export main types
pub use datagram::{decode_datagram, encode_datagram, Datagram, AUTH_TYPE_TOKEN};
pub use envelope::{read_message, write_keepalive, write_message};
pub use error::WireError;
pub use frame::{encode_frame, FrameDecoder};
pub use message::{
    now_millis, AckCode, AcknowledgeMessage, DeviceMessage, EventMessage, FunctionInvokeMessage,
    FunctionInvokeReply, FunctionOutput, OnlineMessage, ReadPropertyMessage, ReadPropertyReply,
    ReplyOutcome, ReportPropertyMessage, WritePropertyMessage, WritePropertyReply,
};
pub use registry::MessageKind;
pub use value::{ObjectFields, Value, ValueTag};
