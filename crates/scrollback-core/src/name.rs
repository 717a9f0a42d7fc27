//! Conversation names and case folding.
//!
//! Conversation names and nicknames are compared case-insensitively. Keys are
//! stored lowercased while the original spelling is kept for display.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Leading characters that mark a name as a channel.
pub const CHANNEL_PREFIXES: [char; 2] = ['#', '&'];

/// Fold a conversation name or nickname into its comparison key.
pub fn fold(name: &str) -> String {
    name.to_lowercase()
}

/// Case-insensitive equality for names.
pub fn same_name(a: &str, b: &str) -> bool {
    a == b || fold(a) == fold(b)
}

/// Whether `name` is a channel (as opposed to a direct-message buffer).
pub fn is_channel_name(name: &str) -> bool {
    name.starts_with(CHANNEL_PREFIXES)
}

/// Routing key of a conversation: the lowercased name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    /// Key for the given conversation name.
    pub fn new(name: &str) -> Self {
        Self(fold(name))
    }

    /// Folded key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Channel or direct-message semantics, derived from the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    /// Multi-party channel with a roster.
    Channel,
    /// Direct-message buffer with the two implicit participants.
    Direct,
}

impl ConversationKind {
    /// Kind implied by a conversation name.
    pub fn of(name: &str) -> Self {
        if is_channel_name(name) { Self::Channel } else { Self::Direct }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_fold_case() {
        assert_eq!(ConversationKey::new("#Rust"), ConversationKey::new("#rust"));
        assert_eq!(ConversationKey::new("Alice").as_str(), "alice");
    }

    #[test]
    fn kind_from_prefix() {
        assert_eq!(ConversationKind::of("#general"), ConversationKind::Channel);
        assert_eq!(ConversationKind::of("&local"), ConversationKind::Channel);
        assert_eq!(ConversationKind::of("bob"), ConversationKind::Direct);
    }

    #[test]
    fn same_name_ignores_case() {
        assert!(same_name("Bob", "bOB"));
        assert!(!same_name("bob", "bobby"));
    }
}
