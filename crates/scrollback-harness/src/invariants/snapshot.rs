//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of a session at a point in time.
//! Invariants operate on snapshots rather than live state to ensure
//! consistent, atomic checks.

use std::collections::BTreeMap;

use scrollback_client::Session;
use scrollback_core::{ConversationKey, ConversationStore, Environment, MessageId, ReadPosition};
use scrollback_store::ReadPositionStore;

/// Snapshot of the whole session.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Focused conversation.
    pub active: Option<ConversationKey>,
    /// Every open conversation.
    pub conversations: BTreeMap<ConversationKey, ConversationSnapshot>,
    /// Outstanding history requests per conversation.
    pub outstanding_requests: BTreeMap<ConversationKey, usize>,
    /// Stored read positions, oldest observation first.
    pub read_history: BTreeMap<ConversationKey, Vec<ReadPosition>>,
}

impl SystemSnapshot {
    /// Create an empty snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture the current state of `session`.
    ///
    /// Read history holds only the current position; use a
    /// [`SessionObserver`] to accumulate it.
    pub fn from_session<E, S>(session: &Session<E, S>) -> Self
    where
        E: Environment,
        S: ReadPositionStore,
    {
        let registry = session.registry();
        let mut snapshot = Self { active: registry.active().cloned(), ..Self::default() };

        for (key, store) in registry.iter() {
            let boundary = session.boundary(key.as_str()).map(|boundary| boundary.index);
            snapshot.conversations.insert(key.clone(), ConversationSnapshot::of(store, boundary));
            if let Ok(Some(position)) = session.tracker().current(key) {
                snapshot.read_history.insert(key.clone(), vec![position]);
            }
        }
        for (key, count) in session.backfill().outstanding() {
            snapshot.outstanding_requests.insert(key.clone(), count);
        }
        snapshot
    }
}

/// Snapshot of one conversation.
#[derive(Debug, Clone, Default)]
pub struct ConversationSnapshot {
    /// Number of stored messages.
    pub len: usize,
    /// Identities of stored messages, in order.
    pub message_ids: Vec<MessageId>,
    /// Deleted messages.
    pub tombstones: Vec<TombstoneSnapshot>,
    /// Whether every roster key is its member's folded nick.
    pub roster_consistent: bool,
    /// Unread boundary index, if one was computed at open.
    pub boundary: Option<usize>,
}

impl ConversationSnapshot {
    fn of(store: &ConversationStore, boundary: Option<usize>) -> Self {
        let messages = store.messages();
        Self {
            len: messages.len(),
            message_ids: messages.iter().filter_map(|m| m.id.clone()).collect(),
            tombstones: messages
                .iter()
                .filter(|m| m.deleted)
                .map(|m| TombstoneSnapshot {
                    id: m.id.clone(),
                    body: m.body.clone(),
                    reactions: m.reactions.iter().map(|(_, reactors)| reactors.len()).sum(),
                })
                .collect(),
            roster_consistent: store.roster().keys_consistent(),
            boundary,
        }
    }
}

/// A deleted message as observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TombstoneSnapshot {
    /// Identity, if any.
    pub id: Option<MessageId>,
    /// Remaining body.
    pub body: String,
    /// Remaining reactions.
    pub reactions: usize,
}

/// Builds snapshots while remembering state across them.
#[derive(Debug, Default)]
pub struct SessionObserver {
    read_history: BTreeMap<ConversationKey, Vec<ReadPosition>>,
}

impl SessionObserver {
    /// Snapshot `session`, extending the read-position history.
    pub fn observe<E, S>(&mut self, session: &Session<E, S>) -> SystemSnapshot
    where
        E: Environment,
        S: ReadPositionStore,
    {
        let mut snapshot = SystemSnapshot::from_session(session);
        for (key, current) in &snapshot.read_history {
            let history = self.read_history.entry(key.clone()).or_default();
            for position in current {
                if history.last() != Some(position) {
                    history.push(position.clone());
                }
            }
        }
        snapshot.read_history = self.read_history.clone();
        snapshot
    }
}
