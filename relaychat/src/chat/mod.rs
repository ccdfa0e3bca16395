//! Chat session coordinator for one chat view.
//!
//! [`ChatSession`] bridges a chat view and its [`ConnectionManager`]: it
//! submits outgoing messages, keeps the table of messages still waiting for
//! a relay acknowledgment, and turns connection notifications into
//! transcript and status-indicator updates.
//!
//! Notifications arrive on a channel filled by the connection's background
//! task. They only reach display state through [`ChatSession::next_event`]
//! / [`ChatSession::drain_events`] followed by [`ChatSession::apply`], all
//! of which run on whatever task owns the session (the UI loop).

pub mod pending;
mod receive;
mod send;
pub mod transcript;

use tokio::sync::mpsc;

use crate::api::HistoryMessage;
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionSettings};
use crate::format::format_time;

use pending::PendingTable;
use transcript::{StatusIndicator, Transcript};

/// Notice shown when the initial connection does not open in time.
pub const CONNECT_FAILED_NOTICE: &str =
    "Failed to connect to chat server. Messages may not be delivered.";

/// Notice shown when a send could not be handed to the relay.
pub const SEND_FAILED_NOTICE: &str = "Failed to send message";

/// Reasons a submitted message is refused before touching the network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// Nothing left after trimming whitespace.
    #[error("Message cannot be empty")]
    EmptyMessage,

    /// No local identity to send as.
    #[error("You must be logged in to send messages")]
    NotLoggedIn,
}

/// State for one open chat between the local user and one peer.
pub struct ChatSession {
    /// Identity of the local user.
    local_identity: String,
    /// Identity of the peer this view talks to.
    remote_identity: String,
    /// The relay session owned by this view.
    connection: ConnectionManager,
    /// Notifications from the relay session, drained by the owner.
    events: mpsc::Receiver<ConnectionEvent>,
    /// Own messages awaiting acknowledgment.
    pending: PendingTable,
    /// Everything shown in the view.
    transcript: Transcript,
    /// Header status dot.
    indicator: StatusIndicator,
}

impl ChatSession {
    /// Create a session between `local_identity` and `remote_identity`.
    ///
    /// No socket is opened until [`open`](Self::open) is called.
    pub fn new(
        settings: ConnectionSettings,
        local_identity: impl Into<String>,
        remote_identity: impl Into<String>,
    ) -> Self {
        let local_identity = local_identity.into();
        let (connection, events) = ConnectionManager::new(settings, local_identity.clone());
        Self {
            local_identity,
            remote_identity: remote_identity.into(),
            connection,
            events,
            pending: PendingTable::new(),
            transcript: Transcript::new(),
            indicator: StatusIndicator::default(),
        }
    }

    /// Open the relay session for this chat.
    ///
    /// Returns `false` and adds a notice if the relay did not open within
    /// the connect timeout. The connection keeps retrying in the background.
    pub async fn open(&mut self) -> bool {
        let connected = self.connection.connect(Some(&self.remote_identity)).await;
        if !connected {
            self.transcript.push_system(CONNECT_FAILED_NOTICE);
        }
        connected
    }

    /// Wait for the next notification from the relay session.
    ///
    /// Returns `None` once the connection side has gone away. Pass the
    /// result to [`apply`](Self::apply).
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        self.events.recv().await
    }

    /// Apply every notification already queued, without waiting.
    ///
    /// Returns how many were applied.
    pub fn drain_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events.try_recv() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Render chat history fetched over REST before the session opened.
    pub fn seed_history(&mut self, messages: &[HistoryMessage]) {
        if messages.is_empty() {
            self.transcript.push_system("No previous messages found");
            return;
        }
        for message in messages {
            let time = format_time(&message.time);
            if message.sender.username == self.local_identity {
                self.transcript.push_own_history(&message.text, time);
            } else {
                self.transcript
                    .push_peer(&message.sender.username, &message.text, time);
            }
        }
        tracing::debug!(count = messages.len(), "seeded chat history");
    }

    /// Add an inline system notice to the transcript.
    pub fn push_notice(&mut self, text: impl Into<String>) {
        self.transcript.push_system(text);
    }

    /// Close the relay session and abandon every pending message.
    pub fn close(&mut self) {
        let abandoned = self.pending.abandon_all();
        if abandoned > 0 {
            tracing::info!(abandoned, "closing chat with unacknowledged messages");
        }
        self.connection.close();
    }

    /// Identity of the local user.
    #[must_use]
    pub fn local_identity(&self) -> &str {
        &self.local_identity
    }

    /// Identity of the peer.
    #[must_use]
    pub fn remote_identity(&self) -> &str {
        &self.remote_identity
    }

    /// Messages still awaiting acknowledgment.
    #[must_use]
    pub const fn pending(&self) -> &PendingTable {
        &self.pending
    }

    /// Transcript shown in the view.
    #[must_use]
    pub const fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Header status indicator.
    #[must_use]
    pub const fn indicator(&self) -> &StatusIndicator {
        &self.indicator
    }

    /// The relay session.
    #[must_use]
    pub const fn connection(&self) -> &ConnectionManager {
        &self.connection
    }
}
