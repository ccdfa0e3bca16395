//! Send path for [`ChatSession`].

use relaychat_proto::envelope::MessageId;

use super::pending::PendingEntry;
use super::transcript::IndicatorLevel;
use super::{ChatSession, SEND_FAILED_NOTICE, SubmitError};

impl ChatSession {
    /// Submit `text` to the peer.
    ///
    /// The text is trimmed first. On success the message is shown at once
    /// as a pending entry with time "Now", recorded in the pending table,
    /// and handed to the relay. If the relay write fails a notice is added
    /// and the indicator turns red, but the pending entry stays: a late
    /// acknowledgment can still resolve it.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::EmptyMessage`] for blank text and
    /// [`SubmitError::NotLoggedIn`] when the session has no local identity.
    /// Neither touches the network or the transcript.
    pub async fn send_message(&mut self, text: &str) -> Result<MessageId, SubmitError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SubmitError::EmptyMessage);
        }
        if self.local_identity.trim().is_empty() {
            return Err(SubmitError::NotLoggedIn);
        }

        let id = MessageId::new();
        let entry = self.transcript.push_own(text);
        self.pending.insert(text, PendingEntry { id, entry });
        self.indicator
            .set(IndicatorLevel::Connecting, "Sending message...");

        if self.connection.send(&self.remote_identity, text).await {
            tracing::debug!(message_id = %id, peer = %self.remote_identity, "message submitted");
        } else {
            tracing::warn!(message_id = %id, peer = %self.remote_identity, "message not handed to relay");
            self.transcript.push_system(SEND_FAILED_NOTICE);
            self.indicator.set(IndicatorLevel::Error, SEND_FAILED_NOTICE);
        }
        Ok(id)
    }
}
