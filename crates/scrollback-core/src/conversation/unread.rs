//! Unread boundary computation.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ConversationStore;
use crate::{
    identity::Identity,
    message::{Message, MessageId},
};

/// Last message acknowledged as seen in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadPosition {
    /// Identity of the last seen message. `None` when only a time is known.
    pub id: Option<MessageId>,
    /// Timestamp of the last seen message.
    pub timestamp: DateTime<Utc>,
}

impl ReadPosition {
    /// Position at `message`.
    pub fn at(message: &Message) -> Self {
        Self { id: message.id.clone(), timestamp: message.timestamp }
    }

    /// Position known only by time.
    pub fn at_time(timestamp: DateTime<Utc>) -> Self {
        Self { id: None, timestamp }
    }
}

/// First unseen message. Derived on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadBoundary {
    /// Position in the stored sequence.
    pub index: usize,
    /// Identity of the boundary message.
    pub id: Option<MessageId>,
}

impl ConversationStore {
    /// First message after `position` that someone else wrote.
    ///
    /// The position is looked up by identity first. If the identity is not
    /// held (history trimmed, identity unstable) the first non-system message
    /// with a strictly later timestamp is used instead. Either way there is
    /// no boundary once the local user has written anything after the
    /// position: replying means they caught up.
    ///
    /// The timestamp fallback assumes timestamps are non-decreasing within
    /// the conversation.
    pub fn unread_boundary(
        &self,
        position: &ReadPosition,
        identity: &Identity,
    ) -> Option<UnreadBoundary> {
        let anchored = position.id.as_ref().and_then(|id| self.index_of(id));
        let start = match anchored {
            Some(index) => index + 1,
            None => self
                .messages
                .iter()
                .position(|m| !m.is_system() && m.timestamp > position.timestamp)?,
        };

        let after = self.messages.get(start..)?;
        if after.iter().any(|m| identity.is_self(&m.sender)) {
            return None;
        }
        let offset = after.iter().position(|m| !m.is_system())?;
        let index = start + offset;
        Some(UnreadBoundary { index, id: self.messages[index].id.clone() })
    }

    /// Order two read positions the way their messages are ordered here.
    ///
    /// Positions whose messages are both held compare by index, so a late
    /// message with an older server timestamp still counts as newer than
    /// what it follows. Anything else compares by timestamp.
    pub fn cmp_positions(&self, a: &ReadPosition, b: &ReadPosition) -> Ordering {
        let held = |position: &ReadPosition| position.id.as_ref().and_then(|id| self.index_of(id));
        match (held(a), held(b)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => a.timestamp.cmp(&b.timestamp),
        }
    }

    /// Messages at or after the unread boundary, excluding system notices
    /// and tombstones.
    pub fn unread_count(&self, position: &ReadPosition, identity: &Identity) -> usize {
        self.unread_messages(position, identity).count()
    }

    /// Whether any unread message mentions the local user.
    pub fn has_unread_mention(&self, position: &ReadPosition, identity: &Identity) -> bool {
        self.unread_messages(position, identity).any(|m| self.mentions(m, identity))
    }

    fn unread_messages<'a>(
        &'a self,
        position: &ReadPosition,
        identity: &Identity,
    ) -> impl Iterator<Item = &'a Message> + 'a {
        let start = self.unread_boundary(position, identity).map_or(self.messages.len(), |b| b.index);
        self.messages[start..].iter().filter(|m| !m.is_system() && !m.deleted)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{
        config::StoreConfig,
        event::{ConversationEvent, IncomingMessage},
    };

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn received(id: &str, sender: &str, body: &str, secs: i64) -> ConversationEvent {
        ConversationEvent::MessageReceived {
            target: "#rust".into(),
            message: IncomingMessage {
                id: Some(id.into()),
                sender: sender.into(),
                body: body.into(),
                timestamp: at(secs),
                is_action: false,
                reply_to: None,
            },
        }
    }

    fn store(events: &[ConversationEvent]) -> ConversationStore {
        let mut store = ConversationStore::new("#rust", StoreConfig::default(), Identity::new("me"));
        for event in events {
            store.apply(event, at(0));
        }
        store
    }

    fn read_at(id: &str, secs: i64) -> ReadPosition {
        ReadPosition { id: Some(id.into()), timestamp: at(secs) }
    }

    #[test]
    fn boundary_is_first_foreign_message_after_position() {
        let store = store(&[
            received("1", "alice", "hi", 0),
            received("2", "bob", "yo", 1),
            received("3", "carol", "sup", 2),
        ]);
        let me = Identity::new("me");
        let boundary = store.unread_boundary(&read_at("1", 0), &me).unwrap();
        assert_eq!(boundary, UnreadBoundary { index: 1, id: Some("2".into()) });
        assert_eq!(store.unread_count(&read_at("1", 0), &me), 2);
    }

    #[test]
    fn replying_means_caught_up() {
        let store = store(&[
            received("1", "alice", "hi", 0),
            received("2", "bob", "yo", 1),
            received("3", "me", "hey both", 2),
            received("4", "alice", "o/", 3),
        ]);
        let me = Identity::new("me");
        assert_eq!(store.unread_boundary(&read_at("1", 0), &me), None);
        assert_eq!(store.unread_count(&read_at("1", 0), &me), 0);
    }

    #[test]
    fn caught_up_under_an_earlier_nick() {
        let store = store(&[received("1", "alice", "hi", 0), received("2", "oldme", "hey", 1)]);
        let mut me = Identity::new("oldme");
        me.set_nick("me");
        assert_eq!(store.unread_boundary(&read_at("1", 0), &me), None);
    }

    #[test]
    fn falls_back_to_timestamp_when_identity_missing() {
        let store = store(&[
            received("10", "alice", "a", 100),
            received("11", "bob", "b", 200),
            received("12", "carol", "c", 300),
        ]);
        let me = Identity::new("me");
        let trimmed = read_at("gone", 150);
        assert_eq!(store.unread_boundary(&trimmed, &me).map(|b| b.index), Some(1));

        // Strictly greater.
        let exact = read_at("gone", 200);
        assert_eq!(store.unread_boundary(&exact, &me).map(|b| b.index), Some(2));

        let past_end = ReadPosition::at_time(at(300));
        assert_eq!(store.unread_boundary(&past_end, &me), None);
    }

    #[test]
    fn positions_order_by_index_when_held() {
        // "2" arrived after "1" but carries an older server timestamp.
        let store = store(&[received("1", "alice", "hi", 10), received("2", "bob", "yo", 5)]);
        let first = read_at("1", 10);
        let late = read_at("2", 5);
        assert_eq!(store.cmp_positions(&late, &first), Ordering::Greater);

        // Unknown identities fall back to time.
        let gone = read_at("gone", 7);
        assert_eq!(store.cmp_positions(&late, &gone), Ordering::Less);
        assert_eq!(store.cmp_positions(&ReadPosition::at_time(at(10)), &first), Ordering::Equal);
    }

    #[test]
    fn system_notices_are_never_boundaries() {
        let store = store(&[
            received("1", "alice", "hi", 0),
            ConversationEvent::MemberJoined { target: "#rust".into(), nick: "dave".into(), verified: false },
            received("2", "dave", "hello", 2),
        ]);
        let me = Identity::new("me");
        let boundary = store.unread_boundary(&read_at("1", 0), &me).unwrap();
        assert_eq!(boundary.id, Some("2".into()));
        assert_eq!(store.unread_count(&read_at("1", 0), &me), 1);
    }

    #[test]
    fn tombstones_are_not_counted() {
        let store = store(&[
            received("1", "alice", "hi", 0),
            received("2", "bob", "oops", 1),
            ConversationEvent::MessageDeleted { target: "#rust".into(), id: "2".into() },
            received("3", "bob", "me: look", 2),
        ]);
        let me = Identity::new("me");
        assert_eq!(store.unread_count(&read_at("1", 0), &me), 1);
        assert!(store.has_unread_mention(&read_at("1", 0), &me));
        assert!(!store.has_unread_mention(&read_at("3", 2), &me));
    }
}
