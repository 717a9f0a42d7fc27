//! Messages, message identities and reactions.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Crockford base32 alphabet used by ULID message ids.
const CROCKFORD: &str = "0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Length of a ULID in characters.
const ULID_LEN: usize = 26;

/// Server-assigned message identity, unique within a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

/// How an identity can be ordered against others.
enum IdScheme {
    /// Decimal sequence number.
    Numeric(u64),
    /// Time-sortable ULID.
    Ulid,
    /// Anything else. Not orderable.
    Opaque,
}

impl MessageId {
    /// Wrap a server-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as sent by the server.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Assignment order relative to `other`.
    ///
    /// Identities are only comparable when both come from the same orderable
    /// scheme: both decimal sequence numbers, or both ULIDs. Returns `None`
    /// otherwise, in which case callers fall back to timestamps.
    pub fn order_against(&self, other: &Self) -> Option<Ordering> {
        match (self.scheme(), other.scheme()) {
            (IdScheme::Numeric(a), IdScheme::Numeric(b)) => Some(a.cmp(&b)),
            (IdScheme::Ulid, IdScheme::Ulid) => {
                Some(self.0.to_ascii_uppercase().cmp(&other.0.to_ascii_uppercase()))
            },
            _ => None,
        }
    }

    fn scheme(&self) -> IdScheme {
        if let Ok(n) = self.0.parse::<u64>() {
            IdScheme::Numeric(n)
        } else if is_ulid(&self.0) {
            IdScheme::Ulid
        } else {
            IdScheme::Opaque
        }
    }
}

fn is_ulid(s: &str) -> bool {
    s.len() == ULID_LEN
        && s.starts_with(|c: char| ('0'..='7').contains(&c))
        && s.chars().all(|c| CROCKFORD.contains(c.to_ascii_uppercase()))
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Reactions on a message: emoji to the set of reactor identities.
///
/// Set membership is idempotent and an emoji key disappears when its last
/// reactor is removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reactions(BTreeMap<String, BTreeSet<String>>);

impl Reactions {
    /// Add `reactor` to `emoji`. Returns `true` if the set changed.
    pub fn add(&mut self, emoji: &str, reactor: &str) -> bool {
        self.0.entry(emoji.to_owned()).or_default().insert(reactor.to_owned())
    }

    /// Remove `reactor` from `emoji`. Returns `true` if the set changed.
    pub fn remove(&mut self, emoji: &str, reactor: &str) -> bool {
        let Some(reactors) = self.0.get_mut(emoji) else {
            return false;
        };
        let removed = reactors.remove(reactor);
        if reactors.is_empty() {
            self.0.remove(emoji);
        }
        removed
    }

    /// Reactors for `emoji`. `None` if nobody reacted with it.
    pub fn reactors(&self, emoji: &str) -> Option<&BTreeSet<String>> {
        self.0.get(emoji)
    }

    /// Number of reactors for `emoji`.
    pub fn count(&self, emoji: &str) -> usize {
        self.0.get(emoji).map_or(0, BTreeSet::len)
    }

    /// Emoji and their reactors, ordered by emoji.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.0.iter().map(|(emoji, reactors)| (emoji.as_str(), reactors))
    }

    /// Whether there are no reactions.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Remove all reactions. Returns `true` if there were any.
    pub fn clear(&mut self) -> bool {
        let had_any = !self.0.is_empty();
        self.0.clear();
        had_any
    }
}

/// One chat utterance or system notice as stored in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server identity. `None` for locally synthesized notices.
    pub id: Option<MessageId>,
    /// Sender nickname. Empty for system notices.
    pub sender: String,
    /// Body text. Cleared once the message is deleted.
    pub body: String,
    /// Server timestamp.
    pub timestamp: DateTime<Utc>,
    /// Third-person "/me" action.
    pub is_action: bool,
    /// Body was replaced by an edit.
    pub edited: bool,
    /// Tombstone: deleted, slot retained for ordering and reply chains.
    pub deleted: bool,
    /// Message this one replies to, within the same conversation.
    pub reply_to: Option<MessageId>,
    /// Emoji reactions.
    pub reactions: Reactions,
}

impl Message {
    /// Locally synthesized system notice (join/part announcements and the
    /// like). Never the target of edits, deletes, reactions or replies.
    pub fn system(body: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: None,
            sender: String::new(),
            body: body.into(),
            timestamp,
            is_action: false,
            edited: false,
            deleted: false,
            reply_to: None,
            reactions: Reactions::default(),
        }
    }

    /// Whether this is a system notice rather than a user utterance.
    pub fn is_system(&self) -> bool {
        self.sender.is_empty()
    }

    /// Body to render. `None` for tombstones.
    pub fn rendered_body(&self) -> Option<&str> {
        if self.deleted { None } else { Some(&self.body) }
    }

    /// Position of `self` relative to `other` in conversation order.
    ///
    /// Identity order wins when both identities are comparable, otherwise
    /// timestamps decide.
    pub fn cmp_order(&self, other: &Self) -> Ordering {
        let by_id = match (&self.id, &other.id) {
            (Some(a), Some(b)) => a.order_against(b),
            _ => None,
        };
        by_id.unwrap_or_else(|| self.timestamp.cmp(&other.timestamp))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn msg(id: &str, secs: i64) -> Message {
        Message {
            id: Some(MessageId::from(id)),
            sender: "alice".into(),
            ..Message::system("", at(secs))
        }
    }

    #[test]
    fn numeric_ids_compare_numerically() {
        let a = MessageId::from("9");
        let b = MessageId::from("10");
        assert_eq!(a.order_against(&b), Some(Ordering::Less));
    }

    #[test]
    fn ulids_compare_lexically_ignoring_case() {
        let a = MessageId::from("01HZY5T8K3QW7B2M9N4P6R8S0V");
        let b = MessageId::from("01hzy5t8k3qw7b2m9n4p6r8s1v");
        assert_eq!(a.order_against(&b), Some(Ordering::Less));
    }

    #[test]
    fn mixed_schemes_are_not_comparable() {
        let numeric = MessageId::from("42");
        let opaque = MessageId::from("abc-def");
        let ulid = MessageId::from("01HZY5T8K3QW7B2M9N4P6R8S0V");
        assert_eq!(numeric.order_against(&opaque), None);
        assert_eq!(numeric.order_against(&ulid), None);
        assert_eq!(opaque.order_against(&opaque), None);
    }

    #[test]
    fn order_falls_back_to_timestamp() {
        let newer_opaque = msg("zzz", 200);
        let older_opaque = msg("aaa", 100);
        assert_eq!(older_opaque.cmp_order(&newer_opaque), Ordering::Less);

        // Comparable ids win over timestamps.
        let late_id_early_time = msg("5", 100);
        let early_id_late_time = msg("4", 200);
        assert_eq!(late_id_early_time.cmp_order(&early_id_late_time), Ordering::Greater);
    }

    #[test]
    fn reactions_are_idempotent() {
        let mut reactions = Reactions::default();
        assert!(reactions.add("👍", "bob"));
        assert!(!reactions.add("👍", "bob"));
        assert_eq!(reactions.count("👍"), 1);

        assert!(!reactions.remove("👍", "carol"));
        assert!(!reactions.remove("🎉", "bob"));
        assert!(reactions.remove("👍", "bob"));
        assert!(reactions.reactors("👍").is_none());
        assert!(reactions.is_empty());
    }

    #[test]
    fn tombstones_hide_body() {
        let mut message = msg("1", 0);
        message.body = "secret".into();
        assert_eq!(message.rendered_body(), Some("secret"));
        message.deleted = true;
        assert_eq!(message.rendered_body(), None);
    }
}
