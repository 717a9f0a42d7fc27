//! Per-conversation state.
//!
//! A [`ConversationStore`] owns everything the client knows about one channel
//! or direct-message buffer: the ordered message sequence, the roster, topic,
//! typing set and the nickname renames observed while it was open.
//!
//! # Ordering
//!
//! Live messages are appended in arrival order. History pages are inserted
//! before the first held message they precede, where identity order decides
//! when both identities are comparable and timestamps decide otherwise (see
//! [`Message::cmp_order`]). Messages are never physically removed: a delete
//! leaves a tombstone in place so indices and reply chains stay stable.
//!
//! # Soft failures
//!
//! Events referencing state the store does not hold are dropped, counted in
//! [`Diagnostics`] and reported as [`ApplyOutcome::Dropped`].

mod queries;
mod unread;

use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
pub use unread::{ReadPosition, UnreadBoundary};

use crate::{
    change::{ApplyOutcome, MergeReport, StoreChange},
    config::StoreConfig,
    error::{Diagnostics, Inconsistency},
    event::{ConnectionState, ConversationEvent, IncomingMessage},
    identity::Identity,
    member::{AwayStatus, Member, Roster},
    message::{Message, MessageId},
    name::{ConversationKey, ConversationKind, fold, same_name},
    typing::TypingSet,
};

/// Channel topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    /// Topic text.
    pub text: String,
    /// Who set it, if known.
    pub set_by: Option<String>,
}

/// Where a history request should start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "anchor", content = "value", rename_all = "snake_case")]
pub enum HistoryAnchor {
    /// Nothing held yet: fetch the most recent page.
    Latest,
    /// Messages older than this identity.
    BeforeId(MessageId),
    /// Messages older than this timestamp.
    BeforeTime(DateTime<Utc>),
}

/// Which end of the held sequence a history page extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryDirection {
    /// Older history, scrolled back into.
    Before,
    /// Newer history, fetched to catch up after a gap.
    After,
}

/// State of one channel or direct-message buffer.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    name: String,
    key: ConversationKey,
    kind: ConversationKind,
    config: StoreConfig,
    identity: Identity,
    messages: Vec<Message>,
    by_id: HashMap<MessageId, usize>,
    roster: Roster,
    pending_roster: Option<Vec<Member>>,
    topic: Option<Topic>,
    typing: TypingSet,
    /// Folded old nickname to the nickname it was changed to.
    renames: HashMap<String, String>,
    last_activity: Option<DateTime<Utc>>,
    diagnostics: Diagnostics,
}

impl ConversationStore {
    /// Empty conversation named `name`. The kind follows from the name.
    pub fn new(name: impl Into<String>, config: StoreConfig, identity: Identity) -> Self {
        let name = name.into();
        Self {
            key: ConversationKey::new(&name),
            kind: ConversationKind::of(&name),
            name,
            config,
            identity,
            messages: Vec::new(),
            by_id: HashMap::new(),
            roster: Roster::new(),
            pending_roster: None,
            topic: None,
            typing: TypingSet::new(),
            renames: HashMap::new(),
            last_activity: None,
            diagnostics: Diagnostics::default(),
        }
    }

    /// Display name as first seen.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry key.
    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    /// Channel or direct message.
    pub fn kind(&self) -> ConversationKind {
        self.kind
    }

    /// Active configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Local identity used for own-message and mention checks.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Replace the local identity, e.g. after the local user changed nick.
    pub fn set_identity(&mut self, identity: Identity) {
        self.identity = identity;
    }

    /// Messages in conversation order, tombstones included.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of held messages, tombstones included.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether no messages are held.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Position of the message with identity `id`.
    pub fn index_of(&self, id: &MessageId) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// Message with identity `id`.
    pub fn find(&self, id: &MessageId) -> Option<&Message> {
        self.index_of(id).map(|index| &self.messages[index])
    }

    /// Current roster. Always empty for direct messages.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Current topic.
    pub fn topic(&self) -> Option<&Topic> {
        self.topic.as_ref()
    }

    /// Timestamp of the newest message seen, live or backfilled.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_activity
    }

    /// Dropped-event counters.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Unexpired typists as of `now`, excluding the local user.
    pub fn typing(&self, now: DateTime<Utc>) -> Vec<&str> {
        self.typing.active(now)
    }

    /// Sweep expired typing entries. Returns `true` if any were removed.
    pub fn expire_typing(&mut self, now: DateTime<Utc>) -> bool {
        self.typing.expire(now)
    }

    /// Read position pointing at the newest message, if any.
    ///
    /// System notices are skipped unless nothing else is held.
    pub fn latest_position(&self) -> Option<ReadPosition> {
        self.messages
            .iter()
            .rev()
            .find(|m| !m.is_system())
            .or_else(|| self.messages.last())
            .map(ReadPosition::at)
    }

    /// Apply one event.
    ///
    /// Re-delivering an already applied event returns
    /// [`ApplyOutcome::Unchanged`]. Events that cannot be applied return
    /// [`ApplyOutcome::Dropped`] and are counted in [`Self::diagnostics`].
    /// `now` stamps locally synthesized notices.
    pub fn apply(&mut self, event: &ConversationEvent, now: DateTime<Utc>) -> ApplyOutcome {
        let outcome = self.apply_inner(event, now);
        if let ApplyOutcome::Dropped(inconsistency) = &outcome {
            self.diagnostics.record(inconsistency);
            tracing::debug!(
                conversation = %self.name,
                reason = %inconsistency,
                "Dropped event"
            );
        }
        outcome
    }

    fn apply_inner(&mut self, event: &ConversationEvent, now: DateTime<Utc>) -> ApplyOutcome {
        match event {
            ConversationEvent::MessageReceived { message, .. } => {
                self.append(Message::from(message.clone()))
            },
            ConversationEvent::MessageEdited { id, body, .. } => self.edit(id, body),
            ConversationEvent::MessageDeleted { id, .. } => self.delete(id),
            ConversationEvent::ReactionAdded { id, emoji, reactor, .. } => {
                self.react(id, |message| message.reactions.add(emoji, reactor))
            },
            ConversationEvent::ReactionRemoved { id, emoji, reactor, .. } => {
                self.react(id, |message| message.reactions.remove(emoji, reactor))
            },
            ConversationEvent::MemberJoined { nick, verified, .. } => {
                self.join(nick, *verified, now)
            },
            ConversationEvent::MemberParted { nick, reason, .. } => {
                let notice = with_reason(format!("{nick} left"), reason.as_deref());
                self.depart(nick, notice, now, true)
            },
            ConversationEvent::MemberKicked { nick, by, reason, .. } => {
                let notice = with_reason(format!("{nick} was kicked by {by}"), reason.as_deref());
                self.depart(nick, notice, now, true)
            },
            ConversationEvent::MemberQuit { nick, reason } => {
                let notice = with_reason(format!("{nick} quit"), reason.as_deref());
                self.depart(nick, notice, now, false)
            },
            ConversationEvent::NickChanged { old, new } => self.rename(old, new, now),
            ConversationEvent::PrivilegeChanged { nick, privilege, granted, .. } => {
                if let Some(dropped) = self.require_channel("privilege_changed") {
                    return dropped;
                }
                let Some(member) = self.roster.get_mut(nick) else {
                    return ApplyOutcome::Dropped(Inconsistency::UnknownMember {
                        nick: nick.clone(),
                    });
                };
                if member.privileges.set(*privilege, *granted) {
                    ApplyOutcome::Changed(StoreChange::RosterUpdated)
                } else {
                    ApplyOutcome::Unchanged
                }
            },
            ConversationEvent::AwayChanged { nick, away, message } => {
                let Some(member) = self.roster.get_mut(nick) else {
                    return ApplyOutcome::Unchanged;
                };
                let away = away.then(|| AwayStatus { message: message.clone() });
                if member.away == away {
                    return ApplyOutcome::Unchanged;
                }
                member.away = away;
                ApplyOutcome::Changed(StoreChange::RosterUpdated)
            },
            ConversationEvent::MembersListed { members, .. } => {
                if let Some(dropped) = self.require_channel("members_listed") {
                    return dropped;
                }
                self.pending_roster.get_or_insert_with(Vec::new).extend(members.iter().cloned());
                ApplyOutcome::Unchanged
            },
            ConversationEvent::MembersListEnd { .. } => {
                if let Some(dropped) = self.require_channel("members_list_end") {
                    return dropped;
                }
                let Some(snapshot) = self.pending_roster.take() else {
                    return ApplyOutcome::Unchanged;
                };
                let before = self.roster.clone();
                self.roster.replace(snapshot);
                if self.roster == before {
                    ApplyOutcome::Unchanged
                } else {
                    ApplyOutcome::Changed(StoreChange::RosterUpdated)
                }
            },
            ConversationEvent::TopicChanged { topic, set_by, .. } => {
                if let Some(dropped) = self.require_channel("topic_changed") {
                    return dropped;
                }
                let topic = Topic { text: topic.clone(), set_by: set_by.clone() };
                if self.topic.as_ref() == Some(&topic) {
                    return ApplyOutcome::Unchanged;
                }
                self.topic = Some(topic);
                ApplyOutcome::Changed(StoreChange::TopicUpdated)
            },
            ConversationEvent::TypingStarted { nick, at, .. } => {
                if self.identity.is_current(nick) {
                    return ApplyOutcome::Unchanged;
                }
                if self.typing.start(nick, *at, self.config.typing_ttl) {
                    ApplyOutcome::Changed(StoreChange::TypingUpdated)
                } else {
                    ApplyOutcome::Unchanged
                }
            },
            ConversationEvent::TypingStopped { nick, .. } => {
                if self.typing.stop(nick) {
                    ApplyOutcome::Changed(StoreChange::TypingUpdated)
                } else {
                    ApplyOutcome::Unchanged
                }
            },
            ConversationEvent::HistoryPage { messages, .. } => {
                let report = self.merge_history(messages.clone(), HistoryDirection::Before);
                if report.inserted == 0 {
                    ApplyOutcome::Unchanged
                } else {
                    ApplyOutcome::Changed(StoreChange::HistoryMerged { inserted: report.inserted })
                }
            },
            ConversationEvent::ConnectionChanged { state } => {
                if !matches!(state, ConnectionState::Disconnected { .. }) {
                    return ApplyOutcome::Unchanged;
                }
                // Roster pages and typing notices do not survive a reconnect.
                self.pending_roster = None;
                if self.typing.clear() {
                    ApplyOutcome::Changed(StoreChange::TypingUpdated)
                } else {
                    ApplyOutcome::Unchanged
                }
            },
            ConversationEvent::Registered { .. } | ConversationEvent::Authenticated { .. } => {
                ApplyOutcome::Dropped(Inconsistency::NotApplicable {
                    event: "identity",
                    name: self.name.clone(),
                })
            },
        }
    }

    /// Merge a page of history.
    ///
    /// The page is stably sorted by timestamp. Messages whose identity is
    /// already held are skipped, as are identity-less messages identical to a
    /// held one. Each remaining message is inserted at its ordered position;
    /// `direction` says which end of the sequence the page extends and
    /// therefore where the search for that position starts.
    pub fn merge_history(
        &mut self,
        page: Vec<IncomingMessage>,
        direction: HistoryDirection,
    ) -> MergeReport {
        let mut page: Vec<Message> = page.into_iter().map(Message::from).collect();
        page.sort_by_key(|message| message.timestamp);

        let mut report = MergeReport::default();
        let mut seen: HashSet<MessageId> = HashSet::new();

        for message in page {
            let duplicate = match &message.id {
                Some(id) => self.by_id.contains_key(id) || !seen.insert(id.clone()),
                None => self.messages.iter().any(|held| {
                    held.id.is_none()
                        && held.timestamp == message.timestamp
                        && held.sender == message.sender
                        && held.body == message.body
                }),
            };
            if duplicate {
                report.skipped += 1;
                continue;
            }

            let position = match direction {
                HistoryDirection::Before => self
                    .messages
                    .iter()
                    .position(|held| message.cmp_order(held) == Ordering::Less)
                    .unwrap_or(self.messages.len()),
                HistoryDirection::After => self
                    .messages
                    .iter()
                    .rposition(|held| held.cmp_order(&message) != Ordering::Greater)
                    .map_or(0, |i| i + 1),
            };
            self.touch(message.timestamp);
            self.messages.insert(position, message);
            report.inserted += 1;
        }

        if report.inserted > 0 {
            self.reindex();
        }

        tracing::debug!(
            conversation = %self.name,
            inserted = report.inserted,
            skipped = report.skipped,
            ?direction,
            "Merged history page"
        );
        report
    }

    /// Where a request for older history should start.
    pub fn oldest_anchor(&self) -> HistoryAnchor {
        if let Some(id) = self.messages.iter().find_map(|m| m.id.clone()) {
            HistoryAnchor::BeforeId(id)
        } else if let Some(oldest) = self.messages.first() {
            HistoryAnchor::BeforeTime(oldest.timestamp)
        } else {
            HistoryAnchor::Latest
        }
    }

    fn append(&mut self, message: Message) -> ApplyOutcome {
        if let Some(id) = &message.id
            && self.by_id.contains_key(id)
        {
            return ApplyOutcome::Unchanged;
        }

        if let Some(tail) = self.messages.last()
            && message.timestamp < tail.timestamp
        {
            self.diagnostics.ordering_anomalies += 1;
            tracing::debug!(
                conversation = %self.name,
                id = ?message.id,
                timestamp = %message.timestamp,
                tail = %tail.timestamp,
                "Live message older than tail, appending in arrival order"
            );
        }

        if !message.is_system() {
            self.typing.stop(&message.sender);
        }
        self.touch(message.timestamp);
        let index = self.messages.len();
        if let Some(id) = &message.id {
            self.by_id.insert(id.clone(), index);
        }
        self.messages.push(message);
        ApplyOutcome::Changed(StoreChange::MessageAppended { index })
    }

    fn edit(&mut self, id: &MessageId, body: &str) -> ApplyOutcome {
        let index = match self.locate_live(id) {
            Ok(index) => index,
            Err(dropped) => return dropped,
        };
        let message = &mut self.messages[index];
        if message.edited && message.body == body {
            return ApplyOutcome::Unchanged;
        }
        body.clone_into(&mut message.body);
        message.edited = true;
        ApplyOutcome::Changed(StoreChange::MessageUpdated { index })
    }

    fn delete(&mut self, id: &MessageId) -> ApplyOutcome {
        let Some(index) = self.index_of(id) else {
            return ApplyOutcome::Dropped(Inconsistency::UnknownMessage { id: id.clone() });
        };
        let message = &mut self.messages[index];
        if message.deleted {
            return ApplyOutcome::Unchanged;
        }
        message.deleted = true;
        message.body.clear();
        message.reactions.clear();
        ApplyOutcome::Changed(StoreChange::MessageUpdated { index })
    }

    fn react(&mut self, id: &MessageId, mutate: impl FnOnce(&mut Message) -> bool) -> ApplyOutcome {
        let index = match self.locate_live(id) {
            Ok(index) => index,
            Err(dropped) => return dropped,
        };
        if mutate(&mut self.messages[index]) {
            ApplyOutcome::Changed(StoreChange::MessageUpdated { index })
        } else {
            ApplyOutcome::Unchanged
        }
    }

    fn join(&mut self, nick: &str, verified: bool, now: DateTime<Utc>) -> ApplyOutcome {
        if let Some(dropped) = self.require_channel("member_joined") {
            return dropped;
        }
        if self.roster.contains(nick) {
            return ApplyOutcome::Unchanged;
        }
        self.roster.upsert(Member { verified, ..Member::new(nick) });
        self.announce(format!("{nick} joined"), now);
        ApplyOutcome::Changed(StoreChange::RosterUpdated)
    }

    /// Remove `nick` after a part, kick or quit.
    ///
    /// Parts and kicks are targeted, so an absent member is an inconsistency.
    /// Quits fan out to every conversation and simply do not apply where the
    /// member is absent.
    fn depart(
        &mut self,
        nick: &str,
        notice: String,
        now: DateTime<Utc>,
        targeted: bool,
    ) -> ApplyOutcome {
        let typing_changed = self.typing.stop(nick);
        if self.kind == ConversationKind::Direct {
            if targeted {
                return ApplyOutcome::Dropped(Inconsistency::NotApplicable {
                    event: "member_departed",
                    name: self.name.clone(),
                });
            }
            if same_name(&self.name, nick) {
                let index = self.announce(notice, now);
                if let Some(index) = index {
                    return ApplyOutcome::Changed(StoreChange::MessageAppended { index });
                }
            }
            return if typing_changed {
                ApplyOutcome::Changed(StoreChange::TypingUpdated)
            } else {
                ApplyOutcome::Unchanged
            };
        }

        if self.roster.remove(nick).is_none() {
            return if targeted {
                ApplyOutcome::Dropped(Inconsistency::UnknownMember { nick: nick.to_owned() })
            } else {
                ApplyOutcome::Unchanged
            };
        }
        self.announce(notice, now);
        ApplyOutcome::Changed(StoreChange::RosterUpdated)
    }

    fn rename(&mut self, old: &str, new: &str, now: DateTime<Utc>) -> ApplyOutcome {
        if old == new {
            return ApplyOutcome::Unchanged;
        }
        let typing_changed = self.typing.rename(old, new);
        let involved = match self.kind {
            ConversationKind::Channel => self.roster.rename(old, new),
            ConversationKind::Direct => same_name(&self.name, old),
        };
        if !involved {
            return if typing_changed {
                ApplyOutcome::Changed(StoreChange::TypingUpdated)
            } else {
                ApplyOutcome::Unchanged
            };
        }

        // A nick that is reused by its original owner no longer redirects.
        self.renames.remove(&fold(new));
        self.renames.insert(fold(old), new.to_owned());
        let index = self.announce(format!("{old} is now known as {new}"), now);
        match (self.kind, index) {
            (ConversationKind::Channel, _) => ApplyOutcome::Changed(StoreChange::RosterUpdated),
            (ConversationKind::Direct, Some(index)) => {
                ApplyOutcome::Changed(StoreChange::MessageAppended { index })
            },
            (ConversationKind::Direct, None) => ApplyOutcome::Changed(StoreChange::RosterUpdated),
        }
    }

    /// Locate a message that may still be mutated.
    fn locate_live(&self, id: &MessageId) -> Result<usize, ApplyOutcome> {
        let Some(index) = self.index_of(id) else {
            return Err(ApplyOutcome::Dropped(Inconsistency::UnknownMessage { id: id.clone() }));
        };
        if self.messages[index].deleted {
            return Err(ApplyOutcome::Dropped(Inconsistency::Tombstoned { id: id.clone() }));
        }
        Ok(index)
    }

    fn require_channel(&self, event: &'static str) -> Option<ApplyOutcome> {
        (self.kind != ConversationKind::Channel).then(|| {
            ApplyOutcome::Dropped(Inconsistency::NotApplicable { event, name: self.name.clone() })
        })
    }

    /// Append a system notice if membership announcements are enabled.
    fn announce(&mut self, text: String, now: DateTime<Utc>) -> Option<usize> {
        if !self.config.announce_membership {
            return None;
        }
        let index = self.messages.len();
        self.messages.push(Message::system(text, now));
        Some(index)
    }

    fn touch(&mut self, timestamp: DateTime<Utc>) {
        if self.last_activity.is_none_or(|last| timestamp > last) {
            self.last_activity = Some(timestamp);
        }
    }

    fn reindex(&mut self) {
        self.by_id = self
            .messages
            .iter()
            .enumerate()
            .filter_map(|(index, message)| message.id.clone().map(|id| (id, index)))
            .collect();
    }
}

fn with_reason(notice: String, reason: Option<&str>) -> String {
    match reason {
        Some(reason) if !reason.is_empty() => format!("{notice} ({reason})"),
        _ => notice,
    }
}
