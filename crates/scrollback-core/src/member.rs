//! Channel members, privilege flags and the per-conversation roster.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::name::fold;

/// A single channel-scoped privilege flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    /// Channel operator (`+o`).
    Operator,
    /// Half-operator / moderator (`+h`).
    HalfOperator,
    /// Voiced (`+v`).
    Voiced,
}

impl Privilege {
    /// Privilege for a channel mode letter (`o`, `h`, `v`).
    pub fn from_mode(mode: char) -> Option<Self> {
        match mode {
            'o' => Some(Self::Operator),
            'h' => Some(Self::HalfOperator),
            'v' => Some(Self::Voiced),
            _ => None,
        }
    }
}

/// Independent privilege flags. Not mutually exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Privileges {
    /// Operator flag.
    pub operator: bool,
    /// Half-operator flag.
    pub half_operator: bool,
    /// Voice flag.
    pub voiced: bool,
}

impl Privileges {
    /// Set or clear one flag. Returns `true` if the flag changed.
    pub fn set(&mut self, privilege: Privilege, granted: bool) -> bool {
        let flag = match privilege {
            Privilege::Operator => &mut self.operator,
            Privilege::HalfOperator => &mut self.half_operator,
            Privilege::Voiced => &mut self.voiced,
        };
        let changed = *flag != granted;
        *flag = granted;
        changed
    }

    /// Highest flag held.
    pub fn rank(self) -> Rank {
        if self.operator {
            Rank::Operator
        } else if self.half_operator {
            Rank::HalfOperator
        } else if self.voiced {
            Rank::Voiced
        } else {
            Rank::None
        }
    }
}

/// Effective rank derived from [`Privileges`], used for grouping and prefix
/// display. Ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    /// No privileges.
    None,
    /// Voiced.
    Voiced,
    /// Half-operator.
    HalfOperator,
    /// Operator.
    Operator,
}

impl Rank {
    /// Display prefix for this rank.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Operator => "@",
            Self::HalfOperator => "%",
            Self::Voiced => "+",
            Self::None => "",
        }
    }
}

/// Away state with an optional message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwayStatus {
    /// Away message, if the member gave one.
    pub message: Option<String>,
}

/// One participant in one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Nickname with display case preserved.
    pub nick: String,
    /// Privilege flags.
    #[serde(default)]
    pub privileges: Privileges,
    /// `Some` while the member is away.
    #[serde(default)]
    pub away: Option<AwayStatus>,
    /// Nickname is linked to a verified account.
    #[serde(default)]
    pub verified: bool,
}

impl Member {
    /// Member with no privileges, present and unverified.
    pub fn new(nick: impl Into<String>) -> Self {
        Self { nick: nick.into(), privileges: Privileges::default(), away: None, verified: false }
    }

    /// Parse a roster entry with optional rank prefixes, e.g. `@%alice`.
    ///
    /// Returns `None` when nothing but prefixes remains.
    pub fn from_prefixed(entry: &str) -> Option<Self> {
        let mut privileges = Privileges::default();
        let nick = entry.trim_start_matches(|c| match c {
            '@' => {
                privileges.operator = true;
                true
            },
            '%' => {
                privileges.half_operator = true;
                true
            },
            '+' => {
                privileges.voiced = true;
                true
            },
            _ => false,
        });
        if nick.is_empty() {
            return None;
        }
        Some(Self { privileges, ..Self::new(nick) })
    }

    /// Effective rank.
    pub fn rank(&self) -> Rank {
        self.privileges.rank()
    }

    /// Nickname with its rank prefix, e.g. `@alice`.
    pub fn display(&self) -> String {
        format!("{}{}", self.rank().prefix(), self.nick)
    }
}

/// Members of one channel, keyed by case-folded nickname.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    members: HashMap<String, Member>,
}

impl Roster {
    /// Empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a member case-insensitively.
    pub fn get(&self, nick: &str) -> Option<&Member> {
        self.members.get(&fold(nick))
    }

    /// Mutable lookup.
    pub fn get_mut(&mut self, nick: &str) -> Option<&mut Member> {
        self.members.get_mut(&fold(nick))
    }

    /// Whether `nick` is present.
    pub fn contains(&self, nick: &str) -> bool {
        self.members.contains_key(&fold(nick))
    }

    /// Insert or replace a member. Returns `true` if the roster changed.
    pub fn upsert(&mut self, member: Member) -> bool {
        let key = fold(&member.nick);
        if self.members.get(&key) == Some(&member) {
            return false;
        }
        self.members.insert(key, member);
        true
    }

    /// Remove a member.
    pub fn remove(&mut self, nick: &str) -> Option<Member> {
        self.members.remove(&fold(nick))
    }

    /// Move `old` to `new`, keeping privileges and away state.
    ///
    /// Returns `false` when `old` is not present.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        let Some(mut member) = self.members.remove(&fold(old)) else {
            return false;
        };
        new.clone_into(&mut member.nick);
        self.members.insert(fold(new), member);
        true
    }

    /// Swap in a complete snapshot.
    pub fn replace(&mut self, members: impl IntoIterator<Item = Member>) {
        self.members = members.into_iter().map(|m| (fold(&m.nick), m)).collect();
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the roster is empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// Members partitioned by rank, highest rank first, nick-sorted within.
    ///
    /// Empty ranks are omitted.
    pub fn by_rank(&self) -> Vec<(Rank, Vec<&Member>)> {
        let mut sorted: Vec<&Member> = self.members.values().collect();
        sorted.sort_by(|a, b| {
            b.rank().cmp(&a.rank()).then_with(|| fold(&a.nick).cmp(&fold(&b.nick)))
        });

        let mut groups: Vec<(Rank, Vec<&Member>)> = Vec::new();
        for member in sorted {
            match groups.last_mut() {
                Some((rank, members)) if *rank == member.rank() => members.push(member),
                _ => groups.push((member.rank(), vec![member])),
            }
        }
        groups
    }

    /// Check key integrity: every key is the folded nick of its member.
    pub fn keys_consistent(&self) -> bool {
        self.members.iter().all(|(key, m)| *key == fold(&m.nick))
    }
}
