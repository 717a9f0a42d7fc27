//! What a conversation reports after applying an event.

use crate::error::Inconsistency;

/// A mutation observers may want to re-render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// A message was appended at `index`.
    MessageAppended {
        /// Position in the stored sequence.
        index: usize,
    },
    /// The message at `index` changed in place (edit, delete, reaction).
    MessageUpdated {
        /// Position in the stored sequence.
        index: usize,
    },
    /// History was merged; indices at or after the first insertion shifted.
    HistoryMerged {
        /// Number of messages inserted.
        inserted: usize,
    },
    /// Roster membership, privileges or away state changed.
    RosterUpdated,
    /// Topic changed.
    TopicUpdated,
    /// Set of typing participants changed.
    TypingUpdated,
}

/// Result of [`ConversationStore::apply`](crate::ConversationStore::apply).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// State changed.
    Changed(StoreChange),
    /// Event was already applied; nothing to do.
    Unchanged,
    /// Event could not be applied and was dropped.
    Dropped(Inconsistency),
}

impl ApplyOutcome {
    /// The change, if any.
    pub fn change(&self) -> Option<&StoreChange> {
        match self {
            Self::Changed(change) => Some(change),
            Self::Unchanged | Self::Dropped(_) => None,
        }
    }

    /// Whether the event was dropped.
    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::Dropped(_))
    }
}

/// Result of merging a history page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Messages inserted.
    pub inserted: usize,
    /// Messages skipped because their identity was already held.
    pub skipped: usize,
}
