//! Derived read-only views over a conversation.
//!
//! Nothing here mutates state; rendering layers call these to place headers,
//! date separators and thread views without re-deriving the logic themselves.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeDelta, Utc};

use super::ConversationStore;
use crate::{
    identity::Identity,
    member::{Member, Rank},
    message::{Message, MessageId},
    name::{fold, same_name},
};

impl ConversationStore {
    /// Reply chain around `root`.
    ///
    /// Ancestors come first (earliest first), walking reply links upward while
    /// the parent is held locally, then the root, then messages replying
    /// directly to the root in stored order. A reply cycle ends the upward walk
    /// at the first revisited identity. Returns an empty chain if `root` is
    /// not held.
    pub fn build_thread(&self, root: &MessageId) -> Vec<&Message> {
        let Some(root_message) = self.find(root) else {
            return Vec::new();
        };

        let mut visited: HashSet<&MessageId> = HashSet::from([root]);
        let mut ancestors = Vec::new();
        let mut cursor = root_message;
        while let Some(parent_id) = &cursor.reply_to {
            if !visited.insert(parent_id) {
                break;
            }
            let Some(parent) = self.find(parent_id) else {
                break;
            };
            ancestors.push(parent);
            cursor = parent;
        }

        let mut thread: Vec<&Message> = ancestors.into_iter().rev().collect();
        thread.push(root_message);
        thread.extend(self.messages.iter().filter(|message| {
            message.reply_to.as_ref() == Some(root)
                && message.id.as_ref().is_none_or(|id| !visited.contains(id))
        }));
        thread
    }

    /// Current nickname for `nick`, following renames seen in this
    /// conversation.
    ///
    /// A nick that is currently in the roster resolves to itself.
    pub fn resolve_nick(&self, nick: &str) -> String {
        if let Some(member) = self.roster.get(nick) {
            return member.nick.clone();
        }
        let mut current = nick.to_owned();
        let mut visited = HashSet::from([fold(nick)]);
        while let Some(next) = self.renames.get(&fold(&current)) {
            if !visited.insert(fold(next)) {
                break;
            }
            current.clone_from(next);
        }
        current
    }

    /// Roster entry for the author of `message`, resolved through renames.
    pub fn author(&self, message: &Message) -> Option<&Member> {
        if message.is_system() {
            return None;
        }
        self.roster.get(&self.resolve_nick(&message.sender))
    }

    /// Sender name to render: rank prefix plus the resolved nickname.
    ///
    /// Senders who are not currently members get no prefix. System notices
    /// render with an empty name.
    pub fn effective_display_name(&self, message: &Message) -> String {
        if message.is_system() {
            return String::new();
        }
        match self.author(message) {
            Some(member) => member.display(),
            None => self.resolve_nick(&message.sender),
        }
    }

    /// Whether the message at `index` continues the previous message's group.
    ///
    /// False for the first message, for system notices, after a system notice
    /// or tombstone, across a sender change, after a gap longer than the quiet
    /// period and across a date boundary.
    pub fn should_group_with_previous(&self, index: usize) -> bool {
        if index == 0 || index >= self.messages.len() {
            return false;
        }
        let previous = &self.messages[index - 1];
        let current = &self.messages[index];

        if current.is_system() || previous.is_system() || previous.deleted {
            return false;
        }
        if !same_name(&self.resolve_nick(&previous.sender), &self.resolve_nick(&current.sender)) {
            return false;
        }
        let quiet = TimeDelta::from_std(self.config.quiet_period).unwrap_or(TimeDelta::MAX);
        if (current.timestamp - previous.timestamp).abs() > quiet {
            return false;
        }
        !self.starts_new_day(index)
    }

    /// Whether a date separator belongs above the message at `index`.
    ///
    /// The first message always starts a day. Dates are evaluated in the
    /// configured offset.
    pub fn starts_new_day(&self, index: usize) -> bool {
        match index {
            0 => !self.messages.is_empty(),
            i if i < self.messages.len() => {
                let offset = self.config.day_offset;
                local_date(self.messages[i - 1].timestamp, offset)
                    != local_date(self.messages[i].timestamp, offset)
            },
            _ => false,
        }
    }

    /// Messages whose body or sender contains `query`, case-insensitively.
    ///
    /// Most recent first, at most `limit` results, tombstones skipped.
    pub fn search(&self, query: &str, limit: usize) -> Vec<&Message> {
        let needle = fold(query.trim());
        if needle.is_empty() {
            return Vec::new();
        }
        self.messages
            .iter()
            .rev()
            .filter(|message| !message.deleted)
            .filter(|message| {
                fold(&message.body).contains(&needle) || fold(&message.sender).contains(&needle)
            })
            .take(limit)
            .collect()
    }

    /// Roster partitioned by rank, highest first, nick-sorted within.
    pub fn members_by_rank(&self) -> Vec<(Rank, Vec<&Member>)> {
        self.roster.by_rank()
    }

    /// Whether `message` mentions `identity` and was written by someone else.
    pub fn mentions(&self, message: &Message, identity: &Identity) -> bool {
        !message.is_system()
            && !message.deleted
            && !identity.is_self(&message.sender)
            && identity.is_mentioned_in(&message.body)
    }

    /// Whether `message` was written by the local user under any nick used
    /// this session.
    pub fn is_own(&self, message: &Message) -> bool {
        self.identity.is_self(&message.sender)
    }

    /// Whether `identity` holds operator status here. False when absent.
    pub fn is_operator(&self, identity: &Identity) -> bool {
        self.rank_of(identity.nick()).is_some_and(|rank| rank == Rank::Operator)
    }

    /// Effective rank of `nick`, if a member.
    pub fn rank_of(&self, nick: &str) -> Option<Rank> {
        self.roster.get(nick).map(Member::rank)
    }
}

fn local_date(timestamp: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    timestamp.with_timezone(&offset).date_naive()
}
