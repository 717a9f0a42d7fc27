//! The local user as seen by self-relative queries.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::name::{fold, same_name};

/// Local user identity.
///
/// Remembers every nickname used during the session so messages sent under an
/// earlier nick still count as own messages after a rename.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    nick: String,
    account: Option<String>,
    previous: BTreeSet<String>,
}

impl Identity {
    /// Identity with the given current nickname.
    pub fn new(nick: impl Into<String>) -> Self {
        Self { nick: nick.into(), account: None, previous: BTreeSet::new() }
    }

    /// Current nickname. Empty before registration.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Authenticated account, if any.
    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    /// Switch to a new nickname, remembering the old one.
    pub fn set_nick(&mut self, nick: impl Into<String>) {
        let nick = nick.into();
        if !self.nick.is_empty() && !same_name(&self.nick, &nick) {
            self.previous.insert(fold(&self.nick));
        }
        self.nick = nick;
    }

    /// Record the authenticated account.
    pub fn set_account(&mut self, account: impl Into<String>) {
        self.account = Some(account.into());
    }

    /// Whether `nick` is the current nickname. Case-insensitive; false before
    /// registration.
    pub fn is_current(&self, nick: &str) -> bool {
        !self.nick.is_empty() && same_name(&self.nick, nick)
    }

    /// Whether `nick` is the current or any earlier nickname of this session.
    pub fn is_self(&self, nick: &str) -> bool {
        !nick.is_empty() && (self.is_current(nick) || self.previous.contains(&fold(nick)))
    }

    /// Whether `body` mentions the current nickname as a whole word.
    pub fn is_mentioned_in(&self, body: &str) -> bool {
        if self.nick.is_empty() {
            return false;
        }
        let needle = fold(&self.nick);
        let haystack = fold(body);
        let mut from = 0;
        while let Some(pos) = haystack[from..].find(&needle) {
            let start = from + pos;
            let end = start + needle.len();
            let before = haystack[..start].chars().next_back();
            let after = haystack[end..].chars().next();
            if !before.is_some_and(is_nick_char) && !after.is_some_and(is_nick_char) {
                return true;
            }
            from = end;
        }
        false
    }
}

fn is_nick_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '[' | ']' | '\\' | '`' | '^' | '{' | '}' | '|')
}
