//! Typing indicators with per-participant expiry.

use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};

use crate::name::fold;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Typist {
    nick: String,
    expires_at: DateTime<Utc>,
}

/// Participants currently typing in one conversation.
///
/// Entries expire on their own deadline. There is no timer: callers sweep with
/// [`TypingSet::expire`] on tick, and reads through [`TypingSet::active`]
/// ignore stale entries.
#[derive(Debug, Clone, Default)]
pub struct TypingSet {
    typists: HashMap<String, Typist>,
}

impl TypingSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start or refresh `nick`. Returns `true` if the set of typists changed.
    pub fn start(&mut self, nick: &str, at: DateTime<Utc>, ttl: Duration) -> bool {
        let expires_at = at + TimeDelta::from_std(ttl).unwrap_or(TimeDelta::zero());
        let was_typing = self.typists.contains_key(&fold(nick));
        self.typists.insert(fold(nick), Typist { nick: nick.to_owned(), expires_at });
        !was_typing
    }

    /// Stop `nick`. Returns `true` if it was typing.
    pub fn stop(&mut self, nick: &str) -> bool {
        self.typists.remove(&fold(nick)).is_some()
    }

    /// Move a typing entry to a new nickname.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        let Some(mut typist) = self.typists.remove(&fold(old)) else {
            return false;
        };
        new.clone_into(&mut typist.nick);
        self.typists.insert(fold(new), typist);
        true
    }

    /// Drop entries whose deadline has passed. Returns `true` if any were
    /// dropped.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        let before = self.typists.len();
        self.typists.retain(|_, typist| typist.expires_at > now);
        self.typists.len() != before
    }

    /// Unexpired typists, sorted by nickname.
    pub fn active(&self, now: DateTime<Utc>) -> Vec<&str> {
        let mut nicks: Vec<&str> = self
            .typists
            .values()
            .filter(|typist| typist.expires_at > now)
            .map(|typist| typist.nick.as_str())
            .collect();
        nicks.sort_unstable_by_key(|nick| fold(nick));
        nicks
    }

    /// Forget everyone.
    pub fn clear(&mut self) -> bool {
        let had_any = !self.typists.is_empty();
        self.typists.clear();
        had_any
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const TTL: Duration = Duration::from_secs(6);

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn entries_expire() {
        let mut typing = TypingSet::new();
        assert!(typing.start("Bob", at(0), TTL));
        assert!(!typing.start("bob", at(3), TTL));
        assert_eq!(typing.active(at(8)), vec!["bob"]);
        assert!(typing.active(at(9)).is_empty());
        assert!(typing.expire(at(9)));
        assert!(!typing.expire(at(10)));
    }

    #[test]
    fn rename_moves_entry() {
        let mut typing = TypingSet::new();
        typing.start("bob", at(0), TTL);
        assert!(typing.rename("BOB", "robert"));
        assert_eq!(typing.active(at(1)), vec!["robert"]);
        assert!(typing.stop("Robert"));
        assert!(!typing.stop("robert"));
    }
}
