//! Per-channel decode pipeline: framing, handshake gating and correlation.
//!
//! A [`DeviceChannel`] owns everything one TCP connection needs to turn raw
//! bytes into device messages: the frame decoder, the handshake state and
//! the device id learned during login. Frames from one channel are handled
//! strictly in arrival order.

use crate::correlation::CorrelationCache;
use crate::error::SessionError;
use crate::handshake::{authenticate, HandshakeState};
use crate::secret::SecretStore;
use bytes::{Bytes, BytesMut};
use devlink_wire::envelope;
use devlink_wire::frame::{encode_frame, FrameDecoder};
use devlink_wire::message::{AcknowledgeMessage, DeviceMessage};
use tracing::{debug, warn};

/// What the transport must do after a frame has been handled
#[derive(Debug)]
pub enum ChannelEvent {
    /// Handshake passed: send `reply`, then surface the online message
    Accepted {
        /// The accepted online message
        message: DeviceMessage,
        /// Framed `ok` acknowledgement for the peer
        reply: Bytes,
    },
    /// Handshake failed: send `reply`, flush, close the channel
    Rejected {
        /// Framed `noAuth` acknowledgement for the peer
        reply: Bytes,
    },
    /// Normal traffic on an authenticated channel
    Inbound {
        /// The decoded message, request id already resolved
        message: DeviceMessage,
    },
    /// Keepalive or other frame with nothing to surface
    Ignored,
}

/// Decode state for one stream channel
#[derive(Debug)]
pub struct DeviceChannel {
    decoder: FrameDecoder,
    state: HandshakeState,
    device_id: Option<String>,
}

impl DeviceChannel {
    /// Channel in `AwaitingLogin`, framing through `decoder`
    pub fn new(decoder: FrameDecoder) -> Self {
        Self {
            decoder,
            state: HandshakeState::AwaitingLogin,
            device_id: None,
        }
    }

    /// Current handshake state
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Device id learned from a successful login
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Drain every complete frame body buffered in `buf`, in order
    pub fn push_bytes(&mut self, buf: &mut BytesMut) -> Result<Vec<Bytes>, SessionError> {
        let mut frames = Vec::new();
        while let Some(body) = self.decoder.decode(buf)? {
            frames.push(body);
        }
        Ok(frames)
    }

    /// Handle one frame body. The secret lookup suspends only while the
    /// channel is still awaiting login.
    pub async fn handle_frame<S>(
        &mut self,
        body: Bytes,
        secrets: &S,
        cache: &CorrelationCache,
    ) -> Result<ChannelEvent, SessionError>
    where
        S: SecretStore + ?Sized,
    {
        let mut body = body;
        let Some((mut message, sequence)) = envelope::read_message(&mut body, self.device_id())?
        else {
            return Ok(ChannelEvent::Ignored);
        };

        match self.state {
            HandshakeState::AwaitingLogin => {
                let verdict = authenticate(secrets, &message).await;
                let reply = encode_ack(&verdict.ack, sequence)?;
                self.state = verdict.state;
                if self.state == HandshakeState::Authenticated {
                    self.device_id = Some(message.device_id().to_string());
                    debug!(device = %message.device_id(), "device authenticated");
                    Ok(ChannelEvent::Accepted { message, reply })
                } else {
                    warn!(device = %message.device_id(), "login rejected");
                    Ok(ChannelEvent::Rejected { reply })
                }
            }
            HandshakeState::Authenticated => {
                if matches!(message, DeviceMessage::Online(_)) {
                    // the handshake never re-runs on a live channel
                    warn!(device = ?self.device_id, "duplicate online envelope ignored");
                    return Ok(ChannelEvent::Ignored);
                }
                attach_request_id(&mut message, sequence, cache);
                Ok(ChannelEvent::Inbound { message })
            }
            HandshakeState::Rejected => Err(SessionError::HandshakeRejected),
        }
    }
}

/// Resolve the wire sequence back to the platform request id. A miss falls
/// back to the raw sequence rendered as a string — degraded, not an error.
pub(crate) fn attach_request_id(
    message: &mut DeviceMessage,
    sequence: u16,
    cache: &CorrelationCache,
) {
    match cache.resolve(message.device_id(), sequence) {
        Some(request_id) => message.set_message_id(Some(request_id)),
        None if sequence > 0 => message.set_message_id(Some(sequence.to_string())),
        None => {}
    }
}

/// Encode an outbound message as a length-prefixed frame, allocating a
/// correlation sequence when the message carries a request id.
pub fn encode_outbound(
    message: &DeviceMessage,
    cache: &CorrelationCache,
) -> Result<Bytes, SessionError> {
    let sequence = cache.allocate(message.device_id(), message.message_id());
    let mut buf = BytesMut::new();
    envelope::write_message(message, sequence, &mut buf)?;
    Ok(encode_frame(&buf))
}

/// Length-prefixed keepalive frame
pub fn keepalive_frame() -> Bytes {
    let mut buf = BytesMut::new();
    envelope::write_keepalive(&mut buf);
    encode_frame(&buf)
}

fn encode_ack(ack: &AcknowledgeMessage, sequence: u16) -> Result<Bytes, SessionError> {
    let mut buf = BytesMut::new();
    envelope::write_message(&DeviceMessage::Acknowledge(ack.clone()), sequence, &mut buf)?;
    Ok(encode_frame(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::StaticSecretStore;
    use devlink_wire::message::{
        AckCode, OnlineMessage, ReadPropertyMessage, ReadPropertyReply, ReplyOutcome,
        ReportPropertyMessage,
    };
    use devlink_wire::value::Value;

    fn store() -> StaticSecretStore {
        let mut store = StaticSecretStore::new();
        store.insert("dev-1", "s3cr3t");
        store
    }

    fn framed(message: &DeviceMessage, sequence: u16) -> BytesMut {
        let mut buf = BytesMut::new();
        envelope::write_message(message, sequence, &mut buf).unwrap();
        BytesMut::from(&encode_frame(&buf)[..])
    }

    async fn handle(
        channel: &mut DeviceChannel,
        secrets: &StaticSecretStore,
        cache: &CorrelationCache,
        message: &DeviceMessage,
        sequence: u16,
    ) -> ChannelEvent {
        let mut stream = framed(message, sequence);
        let mut frames = channel.push_bytes(&mut stream).unwrap();
        assert_eq!(frames.len(), 1);
        channel
            .handle_frame(frames.remove(0), secrets, cache)
            .await
            .unwrap()
    }

    fn decode_ack(reply: &Bytes) -> (AcknowledgeMessage, u16) {
        let mut body = reply.slice(4..);
        let (message, sequence) = envelope::read_message(&mut body, None).unwrap().unwrap();
        match message {
            DeviceMessage::Acknowledge(ack) => (ack, sequence),
            other => panic!("expected ack, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_login_then_traffic() {
        let secrets = store();
        let cache = CorrelationCache::new();
        let mut channel = DeviceChannel::new(FrameDecoder::new());

        let online = DeviceMessage::Online(OnlineMessage::new("dev-1", "s3cr3t"));
        match handle(&mut channel, &secrets, &cache, &online, 3).await {
            ChannelEvent::Accepted { message, reply } => {
                assert_eq!(message.device_id(), "dev-1");
                let (ack, seq) = decode_ack(&reply);
                assert_eq!(ack.code, AckCode::Ok);
                assert_eq!(seq, 3);
            }
            other => panic!("expected accept, got {other:?}"),
        }
        assert_eq!(channel.state(), HandshakeState::Authenticated);
        assert_eq!(channel.device_id(), Some("dev-1"));

        let report = DeviceMessage::ReportProperty(ReportPropertyMessage::new(
            "dev-1",
            vec![("temp".to_string(), Value::Float64(32.88))],
        ));
        match handle(&mut channel, &secrets, &cache, &report, 4).await {
            ChannelEvent::Inbound { message } => {
                assert_eq!(message.device_id(), "dev-1");
                // no pending entry for 4, so the raw sequence is the id
                assert_eq!(message.message_id(), Some("4"));
            }
            other => panic!("expected inbound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bad_token_rejects_channel() {
        let secrets = store();
        let cache = CorrelationCache::new();
        let mut channel = DeviceChannel::new(FrameDecoder::new());

        let online = DeviceMessage::Online(OnlineMessage::new("dev-1", "wrong"));
        match handle(&mut channel, &secrets, &cache, &online, 1).await {
            ChannelEvent::Rejected { reply } => {
                let (ack, _) = decode_ack(&reply);
                assert_eq!(ack.code, AckCode::NoAuth);
            }
            other => panic!("expected reject, got {other:?}"),
        }
        assert_eq!(channel.state(), HandshakeState::Rejected);

        // the channel is dead; later frames are refused
        let report =
            DeviceMessage::ReportProperty(ReportPropertyMessage::new("dev-1", Vec::new()));
        let mut stream = framed(&report, 2);
        let frames = channel.push_bytes(&mut stream).unwrap();
        assert!(matches!(
            channel.handle_frame(frames[0].clone(), &secrets, &cache).await,
            Err(SessionError::HandshakeRejected)
        ));
    }

    #[tokio::test]
    async fn test_non_online_first_frame_is_rejected() {
        let secrets = store();
        let cache = CorrelationCache::new();
        let mut channel = DeviceChannel::new(FrameDecoder::new());

        let report =
            DeviceMessage::ReportProperty(ReportPropertyMessage::new("dev-1", Vec::new()));
        match handle(&mut channel, &secrets, &cache, &report, 1).await {
            ChannelEvent::Rejected { reply } => {
                let (ack, _) = decode_ack(&reply);
                assert_eq!(ack.code, AckCode::NoAuth);
            }
            other => panic!("expected reject, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_online_is_ignored() {
        let secrets = store();
        let cache = CorrelationCache::new();
        let mut channel = DeviceChannel::new(FrameDecoder::new());

        let online = DeviceMessage::Online(OnlineMessage::new("dev-1", "s3cr3t"));
        handle(&mut channel, &secrets, &cache, &online, 1).await;
        match handle(&mut channel, &secrets, &cache, &online, 2).await {
            ChannelEvent::Ignored => {}
            other => panic!("expected ignore, got {other:?}"),
        }
        assert_eq!(channel.state(), HandshakeState::Authenticated);
    }

    #[tokio::test]
    async fn test_reply_resolves_original_request_id() {
        let secrets = store();
        let cache = CorrelationCache::new();
        let mut channel = DeviceChannel::new(FrameDecoder::new());

        let online = DeviceMessage::Online(OnlineMessage::new("dev-1", "s3cr3t"));
        handle(&mut channel, &secrets, &cache, &online, 1).await;

        // platform sends a read with its own request id
        let mut request = DeviceMessage::ReadProperty(ReadPropertyMessage::new(
            "dev-1",
            vec!["temp".to_string()],
        ));
        request.set_message_id(Some("req-123".to_string()));
        let frame = encode_outbound(&request, &cache).unwrap();

        // device side decodes the frame to learn the wire sequence
        let mut body = frame.slice(4..);
        let (_, sequence) = envelope::read_message(&mut body, None).unwrap().unwrap();

        // and answers under the same sequence
        let reply = DeviceMessage::ReadPropertyReply(ReadPropertyReply {
            device_id: "dev-1".to_string(),
            message_id: None,
            timestamp: devlink_wire::message::now_millis(),
            outcome: ReplyOutcome::Success(vec![(
                "temp".to_string(),
                Value::Float64(21.5),
            )]),
        });
        match handle(&mut channel, &secrets, &cache, &reply, sequence).await {
            ChannelEvent::Inbound { message } => {
                assert_eq!(message.message_id(), Some("req-123"));
            }
            other => panic!("expected inbound, got {other:?}"),
        }

        // resolution is one-shot
        assert_eq!(cache.resolve("dev-1", sequence), None);
    }

    #[tokio::test]
    async fn test_keepalive_is_ignored() {
        let secrets = store();
        let cache = CorrelationCache::new();
        let mut channel = DeviceChannel::new(FrameDecoder::new());

        let mut stream = BytesMut::from(&keepalive_frame()[..]);
        let frames = channel.push_bytes(&mut stream).unwrap();
        match channel
            .handle_frame(frames[0].clone(), &secrets, &cache)
            .await
            .unwrap()
        {
            ChannelEvent::Ignored => {}
            other => panic!("expected ignore, got {other:?}"),
        }
        // a keepalive does not count as the login attempt
        assert_eq!(channel.state(), HandshakeState::AwaitingLogin);
    }
}
