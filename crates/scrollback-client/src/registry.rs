//! Session-wide conversation registry.
//!
//! Owns every open [`ConversationStore`], keyed case-insensitively, and routes
//! each inbound event to the store (or stores) it belongs to. Session-level
//! events update the local identity and connection state instead.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use scrollback_core::{
    ApplyOutcome, ConnectionState, ConversationEvent, ConversationKey, ConversationKind,
    ConversationStore, Diagnostics, HistoryDirection, Identity, Inconsistency, IncomingMessage,
    Message, MessageId, ReadPosition, Route, StoreChange, StoreConfig,
};

use crate::{ClientError, event::Change};

/// Unread state of one conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnreadCount {
    /// Unread messages at or after the boundary.
    pub count: usize,
    /// Whether any unread message mentions the local user.
    pub mentioned: bool,
}

/// Unread state across the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnreadCounts {
    /// Per conversation.
    pub per_conversation: BTreeMap<ConversationKey, UnreadCount>,
    /// Sum over all conversations.
    pub total: usize,
}

/// Every open conversation plus the session-wide state they share.
#[derive(Debug)]
pub struct SessionRegistry {
    config: StoreConfig,
    identity: Identity,
    /// Ordered so fan-out is deterministic.
    conversations: BTreeMap<ConversationKey, ConversationStore>,
    active: Option<ConversationKey>,
    connection: ConnectionState,
    /// Events that found no conversation to apply to.
    diagnostics: Diagnostics,
}

impl SessionRegistry {
    /// Empty registry for the local user `identity`.
    pub fn new(config: StoreConfig, identity: Identity) -> Self {
        Self {
            config,
            identity,
            conversations: BTreeMap::new(),
            active: None,
            connection: ConnectionState::Connecting,
            diagnostics: Diagnostics::default(),
        }
    }

    /// Local user.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Last reported connection state.
    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    /// Drops that happened before reaching any conversation.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Deliver `event` to wherever it belongs.
    ///
    /// Creates the target conversation when the event is allowed to open one.
    /// `now` stamps synthesized notices.
    pub fn route(&mut self, event: &ConversationEvent, now: DateTime<Utc>) -> Vec<Change> {
        match event {
            ConversationEvent::Registered { nick } => self.rename_self(nick),
            ConversationEvent::Authenticated { account } => {
                tracing::info!(account, "Authenticated");
                self.identity.set_account(account.as_str());
                self.push_identity();
                Vec::new()
            },
            ConversationEvent::ConnectionChanged { state } => {
                tracing::info!(?state, "Connection state changed");
                self.connection = state.clone();
                let mut changes = vec![Change::ConnectionChanged(state.clone())];
                changes.extend(self.fan_out(event, now));
                changes
            },
            ConversationEvent::NickChanged { old, new } if self.identity.is_current(old) => {
                let mut changes = self.rename_self(new);
                changes.extend(self.fan_out(event, now));
                changes
            },
            ConversationEvent::MemberParted { target, nick, .. }
            | ConversationEvent::MemberKicked { target, nick, .. }
                if self.identity.is_current(nick) =>
            {
                tracing::info!(conversation = %target, "Left conversation");
                self.close(target).unwrap_or_default()
            },
            _ => match event.route() {
                Route::AllConversations => self.fan_out(event, now),
                Route::Conversation(target) => self.deliver(target, event, now),
                Route::Session => Vec::new(),
            },
        }
    }

    /// Open `name`, creating an empty conversation if needed.
    ///
    /// Returns the key and, if it was created, the [`Change::Opened`]
    /// notification.
    pub fn open(&mut self, name: &str) -> Result<(ConversationKey, Option<Change>), ClientError> {
        validate_name(name)?;
        let key = ConversationKey::new(name);
        if self.conversations.contains_key(&key) {
            return Ok((key, None));
        }
        self.insert(name, key.clone());
        Ok((key.clone(), Some(Change::Opened { key })))
    }

    /// Remove a conversation. Clears the active pointer if it pointed there.
    pub fn close(&mut self, name: &str) -> Result<Vec<Change>, ClientError> {
        let key = ConversationKey::new(name);
        if self.conversations.remove(&key).is_none() {
            return Err(ClientError::UnknownConversation { name: name.to_owned() });
        }
        let mut changes = vec![Change::Closed { key: key.clone() }];
        if self.active.as_ref() == Some(&key) {
            self.active = None;
            changes.push(Change::ActiveChanged { key: None });
        }
        Ok(changes)
    }

    /// Conversation by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&ConversationStore> {
        self.conversations.get(&ConversationKey::new(name))
    }

    /// Conversation by key.
    pub fn by_key(&self, key: &ConversationKey) -> Option<&ConversationStore> {
        self.conversations.get(key)
    }

    /// Whether `name` is open.
    pub fn contains(&self, name: &str) -> bool {
        self.conversations.contains_key(&ConversationKey::new(name))
    }

    /// All conversations in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&ConversationKey, &ConversationStore)> {
        self.conversations.iter()
    }

    /// Number of open conversations.
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// Whether no conversation is open.
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Focused conversation.
    pub fn active(&self) -> Option<&ConversationKey> {
        self.active.as_ref()
    }

    /// Focus `name`. Returns the change if focus moved.
    pub fn set_active(&mut self, name: &str) -> Result<Option<Change>, ClientError> {
        let key = ConversationKey::new(name);
        if !self.conversations.contains_key(&key) {
            return Err(ClientError::UnknownConversation { name: name.to_owned() });
        }
        if self.active.as_ref() == Some(&key) {
            return Ok(None);
        }
        self.active = Some(key.clone());
        Ok(Some(Change::ActiveChanged { key: Some(key) }))
    }

    /// Drop focus.
    pub fn clear_active(&mut self) -> Option<Change> {
        self.active.take().map(|_| Change::ActiveChanged { key: None })
    }

    /// Unread counts given each conversation's read position.
    ///
    /// The active conversation and conversations without a position count as
    /// fully read.
    pub fn unread_counts(&self, positions: &HashMap<ConversationKey, ReadPosition>) -> UnreadCounts {
        let mut counts = UnreadCounts::default();
        for (key, store) in &self.conversations {
            let unread = match positions.get(key) {
                Some(position) if self.active.as_ref() != Some(key) => UnreadCount {
                    count: store.unread_count(position, &self.identity),
                    mentioned: store.has_unread_mention(position, &self.identity),
                },
                _ => UnreadCount::default(),
            };
            counts.total += unread.count;
            counts.per_conversation.insert(key.clone(), unread);
        }
        counts
    }

    /// Conversations, most recently active first.
    pub fn conversations_by_activity(&self) -> Vec<&ConversationStore> {
        let mut stores: Vec<_> = self.conversations.values().collect();
        stores.sort_by(|a, b| {
            b.last_activity().cmp(&a.last_activity()).then_with(|| a.key().cmp(b.key()))
        });
        stores
    }

    /// Case-insensitive substring search across every conversation, newest
    /// first.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(&ConversationKey, &Message)> {
        let mut hits: Vec<_> = self
            .conversations
            .iter()
            .flat_map(|(key, store)| store.search(query, limit).into_iter().map(move |m| (key, m)))
            .collect();
        hits.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp).then_with(|| a.0.cmp(b.0)));
        hits.truncate(limit);
        hits
    }

    /// Merge a requested history page into `key`.
    pub fn merge_history(
        &mut self,
        key: &ConversationKey,
        page: Vec<IncomingMessage>,
        direction: HistoryDirection,
    ) -> Option<Change> {
        let store = self.conversations.get_mut(key)?;
        let report = store.merge_history(page, direction);
        (report.inserted > 0).then(|| Change::Conversation {
            key: key.clone(),
            change: StoreChange::HistoryMerged { inserted: report.inserted },
        })
    }

    /// Drop expired typing entries everywhere.
    pub fn expire_typing(&mut self, now: DateTime<Utc>) -> Vec<Change> {
        self.conversations
            .iter_mut()
            .filter_map(|(key, store)| {
                store.expire_typing(now).then(|| Change::Conversation {
                    key: key.clone(),
                    change: StoreChange::TypingUpdated,
                })
            })
            .collect()
    }

    fn rename_self(&mut self, nick: &str) -> Vec<Change> {
        if self.identity.nick() == nick {
            return Vec::new();
        }
        tracing::info!(nick, "Local nickname changed");
        self.identity.set_nick(nick);
        self.push_identity();
        vec![Change::IdentityChanged { nick: nick.to_owned() }]
    }

    fn push_identity(&mut self) {
        for store in self.conversations.values_mut() {
            store.set_identity(self.identity.clone());
        }
    }

    fn fan_out(&mut self, event: &ConversationEvent, now: DateTime<Utc>) -> Vec<Change> {
        self.conversations
            .iter_mut()
            .filter_map(|(key, store)| match store.apply(event, now) {
                ApplyOutcome::Changed(change) => {
                    Some(Change::Conversation { key: key.clone(), change })
                },
                ApplyOutcome::Unchanged | ApplyOutcome::Dropped(_) => None,
            })
            .collect()
    }

    fn deliver(&mut self, target: &str, event: &ConversationEvent, now: DateTime<Utc>) -> Vec<Change> {
        let Some(name) = self.conversation_for(target, event) else {
            return self.drop_event(Inconsistency::UnknownConversation { name: target.to_owned() });
        };

        let key = ConversationKey::new(&name);
        let mut changes = Vec::new();
        if !self.conversations.contains_key(&key) {
            if !may_open(event, ConversationKind::of(&name)) || validate_name(&name).is_err() {
                return self.drop_event(Inconsistency::UnknownConversation { name });
            }
            tracing::info!(conversation = %name, "Opened conversation");
            self.insert(&name, key.clone());
            changes.push(Change::Opened { key: key.clone() });
        }

        if let Some(store) = self.conversations.get_mut(&key)
            && let ApplyOutcome::Changed(change) = store.apply(event, now)
        {
            changes.push(Change::Conversation { key, change });
        }
        changes
    }

    /// Conversation an event addressed to `target` belongs to.
    ///
    /// Direct messages addressed to the local user belong to the buffer named
    /// after the other party. Edits and deletes carry no author, so the owning
    /// buffer is found by message id.
    fn conversation_for(&self, target: &str, event: &ConversationEvent) -> Option<String> {
        if ConversationKind::of(target) == ConversationKind::Channel || !self.identity.is_self(target) {
            return Some(target.to_owned());
        }
        match event {
            ConversationEvent::MessageReceived { message, .. } => Some(message.sender.clone()),
            ConversationEvent::HistoryPage { messages, .. } => messages
                .iter()
                .map(|m| m.sender.as_str())
                .find(|sender| !self.identity.is_self(sender))
                .map(str::to_owned),
            ConversationEvent::ReactionAdded { reactor, .. }
            | ConversationEvent::ReactionRemoved { reactor, .. } => Some(reactor.clone()),
            ConversationEvent::TypingStarted { nick, .. }
            | ConversationEvent::TypingStopped { nick, .. } => Some(nick.clone()),
            ConversationEvent::MessageEdited { id, .. } | ConversationEvent::MessageDeleted { id, .. } => {
                self.direct_holding(id)
            },
            _ => Some(target.to_owned()),
        }
    }

    fn direct_holding(&self, id: &MessageId) -> Option<String> {
        self.conversations
            .values()
            .find(|store| store.kind() == ConversationKind::Direct && store.index_of(id).is_some())
            .map(|store| store.name().to_owned())
    }

    fn insert(&mut self, name: &str, key: ConversationKey) {
        let store = ConversationStore::new(name, self.config.clone(), self.identity.clone());
        self.conversations.insert(key, store);
    }

    fn drop_event(&mut self, inconsistency: Inconsistency) -> Vec<Change> {
        tracing::debug!(reason = %inconsistency, "Dropped event");
        self.diagnostics.record(&inconsistency);
        Vec::new()
    }
}

/// Whether `event` may create a conversation of `kind`.
///
/// Direct-message buffers only appear when a message arrives; roster and
/// topic events never open one.
fn may_open(event: &ConversationEvent, kind: ConversationKind) -> bool {
    match kind {
        ConversationKind::Channel => event.creates_conversation(),
        ConversationKind::Direct => matches!(
            event,
            ConversationEvent::MessageReceived { .. } | ConversationEvent::HistoryPage { .. }
        ),
    }
}

fn validate_name(name: &str) -> Result<(), ClientError> {
    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c == ',') {
        return Err(ClientError::InvalidName { name: name.to_owned() });
    }
    Ok(())
}
