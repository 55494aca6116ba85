//! Login handshake for stream channels.
//!
//! The first envelope on a new channel must be an online message carrying a
//! login token. The token is compared against the secret configured for the
//! claimed device id; everything else — a wrong token, an unknown device,
//! or any other message kind arriving first — is rejected.

use crate::secret::SecretStore;
use devlink_wire::message::{now_millis, AckCode, AcknowledgeMessage, DeviceMessage};

/// Per-channel authentication state.
///
/// Created as `AwaitingLogin` when the channel opens. `Rejected` closes the
/// channel; every transition out of `AwaitingLogin` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// No valid login seen yet
    AwaitingLogin,
    /// Login accepted; normal envelope processing is unlocked
    Authenticated,
    /// Login failed; the channel must be closed
    Rejected,
}

/// Result of validating the first envelope on a channel
#[derive(Debug)]
pub struct HandshakeVerdict {
    /// State the channel transitions to
    pub state: HandshakeState,
    /// Acknowledgement to send back before anything else
    pub ack: AcknowledgeMessage,
}

/// Validate the first envelope of a channel against the secret store.
pub async fn authenticate<S>(secrets: &S, message: &DeviceMessage) -> HandshakeVerdict
where
    S: SecretStore + ?Sized,
{
    let code = match message {
        DeviceMessage::Online(online) => {
            match secrets.lookup_secret(&online.device_id).await {
                Some(secret) if secret == online.token => AckCode::Ok,
                _ => AckCode::NoAuth,
            }
        }
        _ => AckCode::NoAuth,
    };

    let state = if code == AckCode::Ok {
        HandshakeState::Authenticated
    } else {
        HandshakeState::Rejected
    };

    HandshakeVerdict {
        state,
        ack: ack_for(message, code),
    }
}

/// Acknowledgement for `source`, echoing its device and message ids
pub fn ack_for(source: &DeviceMessage, code: AckCode) -> AcknowledgeMessage {
    AcknowledgeMessage {
        device_id: source.device_id().to_string(),
        message_id: source.message_id().map(str::to_string),
        timestamp: now_millis(),
        code,
    }
}
