//! Soft failures while applying events.
//!
//! None of these are fatal. A conversation that receives an event it cannot
//! apply drops it, counts it in [`Diagnostics`] and carries on; state
//! self-corrects on the next consistent event or resync.

use thiserror::Error;

use crate::message::MessageId;

/// Why an event was dropped instead of applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    /// Event references a message that is not held locally.
    #[error("unknown message {id}")]
    UnknownMessage {
        /// Referenced identity.
        id: MessageId,
    },

    /// Event tries to mutate a deleted message.
    #[error("message {id} is deleted")]
    Tombstoned {
        /// Referenced identity.
        id: MessageId,
    },

    /// Event references a member that is not in the roster.
    #[error("unknown member {nick}")]
    UnknownMember {
        /// Referenced nickname.
        nick: String,
    },

    /// Event targets a conversation that does not exist and cannot be
    /// implicitly opened by this kind of event.
    #[error("unknown conversation {name}")]
    UnknownConversation {
        /// Target name.
        name: String,
    },

    /// Event does not apply to this kind of conversation, e.g. a roster event
    /// for a direct-message buffer.
    #[error("{event} does not apply to {name}")]
    NotApplicable {
        /// Event kind.
        event: &'static str,
        /// Conversation name.
        name: String,
    },
}

/// Per-conversation counters of dropped events and anomalies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Events referencing an unknown message.
    pub unknown_messages: u64,
    /// Events targeting a tombstone.
    pub tombstoned: u64,
    /// Events referencing an unknown member.
    pub unknown_members: u64,
    /// Events for a missing conversation.
    pub unknown_conversations: u64,
    /// Events that do not fit the conversation kind.
    pub not_applicable: u64,
    /// Live messages that arrived with a timestamp before the tail.
    pub ordering_anomalies: u64,
}

impl Diagnostics {
    /// Count a dropped event.
    pub fn record(&mut self, inconsistency: &Inconsistency) {
        let counter = match inconsistency {
            Inconsistency::UnknownMessage { .. } => &mut self.unknown_messages,
            Inconsistency::Tombstoned { .. } => &mut self.tombstoned,
            Inconsistency::UnknownMember { .. } => &mut self.unknown_members,
            Inconsistency::UnknownConversation { .. } => &mut self.unknown_conversations,
            Inconsistency::NotApplicable { .. } => &mut self.not_applicable,
        };
        *counter += 1;
    }

    /// Total number of dropped events.
    pub fn dropped(&self) -> u64 {
        self.unknown_messages
            + self.tombstoned
            + self.unknown_members
            + self.unknown_conversations
            + self.not_applicable
    }
}
