//! Notification handling for [`ChatSession`].
//!
//! Each handler here mirrors one [`ConnectionEvent`] variant. They are
//! public so a front end that routes events itself can call them directly.

use relaychat_proto::envelope::{EnvelopeKind, InboundEnvelope};

use crate::connection::ConnectionEvent;
use crate::format::format_time;

use super::ChatSession;
use super::transcript::{IndicatorLevel, NOW};

impl ChatSession {
    /// Route one notification to its handler.
    pub fn apply(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::StatusChanged { status, detail } => {
                self.on_connection_status_changed(status.as_str(), &detail);
            }
            ConnectionEvent::MessageReceived(envelope) => self.on_message_received(&envelope),
            ConnectionEvent::ErrorOccurred(message) => self.on_error(&message),
        }
    }

    /// Handle an envelope from the relay.
    ///
    /// - `welcome` is ignored.
    /// - `delivered` from this session's pair resolves the oldest pending
    ///   entry with the same text and stamps it with the relay time.
    /// - Anything else from the peer to us is rendered as a peer message.
    /// - Everything else is ignored; the relay broadcasts to all sessions.
    pub fn on_message_received(&mut self, envelope: &InboundEnvelope) {
        match envelope.kind() {
            EnvelopeKind::Welcome => tracing::trace!("relay welcome"),
            EnvelopeKind::Delivered => self.on_delivered(envelope),
            EnvelopeKind::Other => {
                if !envelope.is_between(&self.remote_identity, &self.local_identity) {
                    tracing::trace!(sender = ?envelope.sender, "envelope for another chat, ignoring");
                    return;
                }
                let text = envelope.message.as_deref().unwrap_or_default();
                let time = format_time(envelope.time.as_deref().unwrap_or(NOW));
                self.transcript.push_peer(&self.remote_identity, text, time);
            }
        }
    }

    /// Reflect a connection status change in the indicator.
    ///
    /// Unknown status names show as an error.
    pub fn on_connection_status_changed(&mut self, status: &str, tooltip: &str) {
        self.indicator
            .set(IndicatorLevel::for_status(status), tooltip);
    }

    /// Show a connection error inline and in the indicator.
    pub fn on_error(&mut self, message: &str) {
        self.transcript
            .push_system(format!("Connection error: {message}"));
        self.indicator
            .set(IndicatorLevel::Error, format!("Error: {message}"));
    }

    fn on_delivered(&mut self, envelope: &InboundEnvelope) {
        if !envelope.is_between(&self.local_identity, &self.remote_identity) {
            return;
        }
        let Some(text) = envelope.message.as_deref() else {
            return;
        };
        let Some(resolved) = self.pending.acknowledge(text) else {
            tracing::debug!("ack for a message not pending here, ignoring");
            return;
        };
        let time = format_time(envelope.time.as_deref().unwrap_or(NOW));
        self.transcript.mark_delivered(resolved.entry, time);
        self.indicator
            .set(IndicatorLevel::Connected, "Message delivered");
        tracing::debug!(message_id = %resolved.id, "message delivered");
    }
}
