//! Display model for one chat view.
//!
//! Holds the ordered transcript entries and the connection status
//! indicator. Toolkit-free: a front end renders these however it likes.

/// Who wrote a transcript entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Author {
    /// The local user.
    Own,
    /// The remote peer, by identity.
    Peer(String),
    /// Inline system notice (errors, connection problems).
    System,
}

impl Author {
    /// Label shown next to the entry.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Own => "You",
            Self::Peer(name) => name,
            Self::System => "System",
        }
    }
}

/// Delivery state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Sent, no acknowledgment yet.
    Pending,
    /// The relay acknowledged it.
    Delivered,
    /// Not applicable (peer messages, notices, history).
    None,
}

impl Delivery {
    /// Get the display symbol for this state.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Pending => "\u{22ef}",
            Self::Delivered => "\u{2713}",
            Self::None => "",
        }
    }
}

/// One line of the chat transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Who wrote it.
    pub author: Author,
    /// Message or notice text.
    pub text: String,
    /// Time label as displayed.
    pub time_label: String,
    /// Delivery state.
    pub delivery: Delivery,
}

/// Time label for entries that have no relay timestamp yet.
pub const NOW: &str = "Now";

/// Ordered list of transcript entries.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<Entry>,
}

impl Transcript {
    /// Create an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pending message from the local user. Returns its index.
    pub fn push_own(&mut self, text: impl Into<String>) -> usize {
        self.push(Entry {
            author: Author::Own,
            text: text.into(),
            time_label: NOW.to_string(),
            delivery: Delivery::Pending,
        })
    }

    /// Append a message from a peer. Returns its index.
    pub fn push_peer(
        &mut self,
        peer: impl Into<String>,
        text: impl Into<String>,
        time_label: impl Into<String>,
    ) -> usize {
        self.push(Entry {
            author: Author::Peer(peer.into()),
            text: text.into(),
            time_label: time_label.into(),
            delivery: Delivery::None,
        })
    }

    /// Append a past message of the local user, already delivered.
    pub fn push_own_history(
        &mut self,
        text: impl Into<String>,
        time_label: impl Into<String>,
    ) -> usize {
        self.push(Entry {
            author: Author::Own,
            text: text.into(),
            time_label: time_label.into(),
            delivery: Delivery::Delivered,
        })
    }

    /// Append a system notice. Returns its index.
    pub fn push_system(&mut self, text: impl Into<String>) -> usize {
        self.push(Entry {
            author: Author::System,
            text: text.into(),
            time_label: NOW.to_string(),
            delivery: Delivery::None,
        })
    }

    /// Mark the entry at `index` delivered and show `time_label`.
    ///
    /// Returns `false` if there is no such entry.
    pub fn mark_delivered(&mut self, index: usize, time_label: impl Into<String>) -> bool {
        let Some(entry) = self.entries.get_mut(index) else {
            return false;
        };
        entry.delivery = Delivery::Delivered;
        entry.time_label = time_label.into();
        true
    }

    /// All entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Entry at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the transcript is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent entry.
    #[must_use]
    pub fn last(&self) -> Option<&Entry> {
        self.entries.last()
    }

    fn push(&mut self, entry: Entry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }
}

/// Visual level of the connection indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorLevel {
    /// Connected, or last message delivered.
    Connected,
    /// Connecting, or a message is on its way.
    Connecting,
    /// Disconnected.
    Disconnected,
    /// Any error, and any status name we don't recognise.
    Error,
}

impl IndicatorLevel {
    /// Level for a status name from a status notification.
    #[must_use]
    pub fn for_status(name: &str) -> Self {
        match name {
            "connected" => Self::Connected,
            "connecting" => Self::Connecting,
            "disconnected" => Self::Disconnected,
            _ => Self::Error,
        }
    }

    /// Terminal color name for the indicator dot.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Connected => "green",
            Self::Connecting => "yellow",
            Self::Disconnected | Self::Error => "red",
        }
    }
}

/// Connection status indicator shown in the chat header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusIndicator {
    /// Current level.
    pub level: IndicatorLevel,
    /// Tooltip text.
    pub tooltip: String,
}

impl StatusIndicator {
    /// Set level and tooltip together.
    pub fn set(&mut self, level: IndicatorLevel, tooltip: impl Into<String>) {
        self.level = level;
        self.tooltip = tooltip.into();
    }
}

impl Default for StatusIndicator {
    fn default() -> Self {
        Self {
            level: IndicatorLevel::Connected,
            tooltip: "Ready".to_string(),
        }
    }
}
