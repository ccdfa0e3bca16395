//! Envelope types exchanged with the relay.
//!
//! Field values are opaque strings. Identity format and message content
//! are validated by the relay and the REST layer, never here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status value the relay sends when a connection is first accepted.
pub const STATUS_WELCOME: &str = "welcome";

/// Status value the relay sends back to the author of a relayed message.
pub const STATUS_DELIVERED: &str = "delivered";

/// Locally generated identifier for an outgoing message.
///
/// Never put on the wire: the relay protocol has no field for it. It lets
/// the client tell apart two in-flight messages with identical bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new time-ordered message identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `MessageId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chat message as written to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    /// Identity of the local user.
    pub sender: String,
    /// Identity of the peer the relay should route to.
    pub receiver: String,
    /// Message body.
    pub message: String,
}

impl OutboundEnvelope {
    /// Builds an envelope from borrowed parts.
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            message: message.into(),
        }
    }
}

/// Any frame received from the relay.
///
/// Every field is optional because the relay sends three shapes: a bare
/// `{"status": "welcome"}`, a delivery acknowledgment, and a forwarded
/// message without a status. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundEnvelope {
    /// `"welcome"`, `"delivered"`, some other relay status, or absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Author of the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Intended recipient of the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    /// Message body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Relay-side time the message was stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

/// Coarse classification of an [`InboundEnvelope`] by its `status` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Connection handshake noise.
    Welcome,
    /// Acknowledgment that a message this client sent was stored and routed.
    Delivered,
    /// Anything else, including forwarded messages with no status.
    Other,
}

impl InboundEnvelope {
    /// Classifies the envelope by its `status` field.
    #[must_use]
    pub fn kind(&self) -> EnvelopeKind {
        match self.status.as_deref() {
            Some(STATUS_WELCOME) => EnvelopeKind::Welcome,
            Some(STATUS_DELIVERED) => EnvelopeKind::Delivered,
            _ => EnvelopeKind::Other,
        }
    }

    /// Returns `true` if this envelope travels from `sender` to `receiver`.
    #[must_use]
    pub fn is_between(&self, sender: &str, receiver: &str) -> bool {
        self.sender.as_deref() == Some(sender) && self.receiver.as_deref() == Some(receiver)
    }

    /// Builds the acknowledgment the relay sends for `outbound`.
    #[must_use]
    pub fn delivered(outbound: &OutboundEnvelope, time: impl Into<String>) -> Self {
        Self {
            status: Some(STATUS_DELIVERED.to_string()),
            sender: Some(outbound.sender.clone()),
            receiver: Some(outbound.receiver.clone()),
            message: Some(outbound.message.clone()),
            time: Some(time.into()),
        }
    }

    /// Builds the frame the relay forwards to the recipient of `outbound`.
    #[must_use]
    pub fn forwarded(outbound: &OutboundEnvelope, time: impl Into<String>) -> Self {
        Self {
            status: None,
            sender: Some(outbound.sender.clone()),
            receiver: Some(outbound.receiver.clone()),
            message: Some(outbound.message.clone()),
            time: Some(time.into()),
        }
    }

    /// The handshake frame sent when a connection is accepted.
    #[must_use]
    pub fn welcome() -> Self {
        Self {
            status: Some(STATUS_WELCOME.to_string()),
            ..Self::default()
        }
    }
}
