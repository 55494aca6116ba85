//! Length-prefixed (re)framing for byte-stream transports.
//!
//! A frame is `[u32 big-endian length][envelope bytes]`. The decoder keeps
//! no buffer of its own: callers append received chunks to one rolling
//! `BytesMut` and drain complete bodies, so partial and coalesced reads
//! both fall out of the same loop.

use crate::error::WireError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

/// Reassembles length-prefixed frames from a byte stream.
///
/// Without a cap the length field is trusted from the remote peer; the
/// surrounding transport layer should install one with
/// [`FrameDecoder::with_max_frame_size`].
#[derive(Debug, Default)]
pub struct FrameDecoder {
    max_frame_size: Option<usize>,
}

impl FrameDecoder {
    /// Decoder with no frame size cap
    pub fn new() -> Self {
        Self {
            max_frame_size: None,
        }
    }

    /// Decoder rejecting frame bodies larger than `max`
    pub fn with_max_frame_size(max: usize) -> Self {
        Self {
            max_frame_size: Some(max),
        }
    }

    /// Extract one complete frame body from `buf`, or `None` until enough
    /// bytes have arrived. Consumes exactly the prefix and body it yields,
    /// leaving any following bytes untouched.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, WireError> {
        if buf.len() < 4 {
            return Ok(None);
        }

        let frame_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if let Some(max) = self.max_frame_size {
            if frame_len > max {
                return Err(WireError::FrameTooLarge(frame_len));
            }
        }

        if buf.len() < 4 + frame_len {
            return Ok(None);
        }

        buf.advance(4);
        trace!(len = frame_len, "frame complete");
        Ok(Some(buf.split_to(frame_len).freeze()))
    }
}

/// Wrap one envelope as a length-prefixed frame
pub fn encode_frame(envelope: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + envelope.len());
    buf.put_u32(envelope.len() as u32);
    buf.put_slice(envelope);
    buf.freeze()
}
