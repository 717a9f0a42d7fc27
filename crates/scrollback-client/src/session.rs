//! Session state machine.
//!
//! Ties the registry, read tracking and backfill together behind a single
//! event-in, action-out interface. The session never touches the network: it
//! asks for history through [`SessionAction::RequestHistory`] and expects the
//! answer back as [`SessionEvent::HistoryReceived`].
//!
//! Storage failures never fail an event. They are logged and the affected
//! feature degrades (no unread boundary, position not advanced).

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use scrollback_core::{
    ConnectionState, ConversationEvent, ConversationKey, Environment, HistoryDirection, Identity,
    IncomingMessage, ReadPosition, StoreChange, StoreConfig, UnreadBoundary,
};
use scrollback_store::{ReadPositionStore, ReadPositionTracker};

use crate::{
    ClientError,
    backfill::{BackfillConfig, BackfillCoordinator},
    event::{Change, SessionAction, SessionEvent},
    registry::{SessionRegistry, UnreadCounts},
};

/// Session configuration.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Local nickname before registration confirms one.
    pub nick: String,
    /// Per-conversation tunables.
    pub store: StoreConfig,
    /// History backfill tunables.
    pub backfill: BackfillConfig,
}

/// Client session: every conversation plus read and backfill state.
pub struct Session<E: Environment, S: ReadPositionStore> {
    env: E,
    config: SessionConfig,
    registry: SessionRegistry,
    tracker: ReadPositionTracker<S>,
    backfill: BackfillCoordinator<E::Instant>,
    /// Boundary computed when each conversation was last opened.
    boundaries: HashMap<ConversationKey, UnreadBoundary>,
}

impl<E: Environment, S: ReadPositionStore> Session<E, S> {
    /// New session persisting read positions in `store`.
    pub fn new(env: E, store: S, config: SessionConfig) -> Self {
        let registry = SessionRegistry::new(config.store.clone(), Identity::new(config.nick.as_str()));
        let backfill = BackfillCoordinator::new(config.backfill.clone());
        Self {
            env,
            config,
            registry,
            tracker: ReadPositionTracker::new(store),
            backfill,
            boundaries: HashMap::new(),
        }
    }

    /// Process one event.
    ///
    /// Only explicit user requests against conversations that are not open
    /// (or cannot exist) fail. Protocol events never do.
    pub fn handle(
        &mut self,
        event: SessionEvent<E::Instant>,
    ) -> Result<Vec<SessionAction>, ClientError> {
        match event {
            SessionEvent::Protocol(event) => Ok(self.handle_protocol(&event)),
            SessionEvent::Open { conversation } => self.handle_open(&conversation),
            SessionEvent::Close { conversation } => self.handle_close(&conversation),
            SessionEvent::ScrollToTop { conversation } => self.handle_scroll_to_top(&conversation),
            SessionEvent::HistoryReceived { request_id, messages } => {
                Ok(self.handle_history(request_id, messages))
            },
            SessionEvent::HistoryFailed { request_id, reason } => {
                if self.backfill.fail(request_id, self.env.now()) {
                    tracing::warn!(request_id, reason, "History request failed");
                } else {
                    tracing::debug!(request_id, reason, "Ignoring failure of unknown request");
                }
                Ok(Vec::new())
            },
            SessionEvent::Tick { now } => Ok(self.handle_tick(now)),
        }
    }

    fn handle_protocol(&mut self, event: &ConversationEvent) -> Vec<SessionAction> {
        let wall = self.env.wall_clock();
        let changes = self.registry.route(event, wall);

        let mut actions = Vec::with_capacity(changes.len());
        for change in changes {
            match &change {
                Change::Opened { key } => {
                    let seed = seed_position(event, wall);
                    self.seed(key, &seed);
                },
                Change::Closed { key } => self.forget(key),
                Change::Conversation { key, change: StoreChange::MessageAppended { .. } }
                    if self.registry.active() == Some(key) =>
                {
                    self.mark_read(key);
                },
                Change::Conversation { key, change: StoreChange::HistoryMerged { .. } } => {
                    self.merged(key);
                },
                _ => {},
            }
            let reconnected = matches!(change, Change::ConnectionChanged(ConnectionState::Connected));
            actions.push(SessionAction::Notify(change));

            if reconnected {
                let resync = self
                    .backfill
                    .reconnect(self.registry.iter().map(|(_, store)| store.name()));
                tracing::info!(channels = resync.len(), "Reconnected, requesting resync");
                actions.extend(resync.into_iter().map(SessionAction::RequestResync));
            }
        }
        actions
    }

    /// Snapshot the prior position, focus, compute the boundary, then mark
    /// everything read. The order matters: recording first would hide the
    /// boundary.
    fn handle_open(&mut self, conversation: &str) -> Result<Vec<SessionAction>, ClientError> {
        let mut actions = Vec::new();
        let (key, opened) = self.registry.open(conversation)?;
        if let Some(change) = opened {
            self.seed(&key, &ReadPosition::at_time(self.env.wall_clock()));
            actions.push(SessionAction::Notify(change));
        }

        if let Some(previous) = self.registry.active().cloned()
            && previous != key
        {
            self.tracker.end_viewing(&previous);
            self.boundaries.remove(&previous);
        }

        let prior = self.tracker.begin_viewing(&key).unwrap_or_else(|err| {
            tracing::warn!(conversation = %key, error = %err, "Failed to load read position");
            None
        });

        if let Some(change) = self.registry.set_active(conversation)? {
            actions.push(SessionAction::Notify(change));
        }

        let boundary = prior.and_then(|prior| {
            self.registry
                .by_key(&key)
                .and_then(|store| store.unread_boundary(&prior, self.registry.identity()))
        });
        match boundary {
            Some(boundary) => {
                tracing::debug!(conversation = %key, index = boundary.index, "Unread boundary");
                self.boundaries.insert(key.clone(), boundary);
            },
            None => {
                self.boundaries.remove(&key);
            },
        }

        self.mark_read(&key);
        Ok(actions)
    }

    fn handle_close(&mut self, conversation: &str) -> Result<Vec<SessionAction>, ClientError> {
        let changes = self.registry.close(conversation)?;
        for change in &changes {
            if let Change::Closed { key } = change {
                self.forget(key);
            }
        }
        Ok(changes.into_iter().map(SessionAction::Notify).collect())
    }

    fn handle_scroll_to_top(
        &mut self,
        conversation: &str,
    ) -> Result<Vec<SessionAction>, ClientError> {
        let Some(store) = self.registry.get(conversation) else {
            return Err(ClientError::UnknownConversation { name: conversation.to_owned() });
        };
        let request = self.backfill.request_before(
            store.name(),
            store.oldest_anchor(),
            self.config.backfill.page_size,
            self.env.now(),
        );
        Ok(request.map(SessionAction::RequestHistory).into_iter().collect())
    }

    fn handle_history(
        &mut self,
        request_id: u64,
        messages: Vec<IncomingMessage>,
    ) -> Vec<SessionAction> {
        let Some(key) = self.backfill.begin_merge(request_id) else {
            return Vec::new();
        };
        let page_len = messages.len();
        let change = self.registry.merge_history(&key, messages, HistoryDirection::Before);
        self.backfill.end_merge(&key, page_len);
        if change.is_some() {
            self.merged(&key);
        }
        change.map(SessionAction::Notify).into_iter().collect()
    }

    fn handle_tick(&mut self, now: E::Instant) -> Vec<SessionAction> {
        self.backfill.tick(now);
        self.registry
            .expire_typing(self.env.wall_clock())
            .into_iter()
            .map(SessionAction::Notify)
            .collect()
    }

    fn seed(&mut self, key: &ConversationKey, position: &ReadPosition) {
        if let Err(err) = self.tracker.seed_if_absent(key, position) {
            tracing::warn!(conversation = %key, error = %err, "Failed to seed read position");
        }
    }

    /// Merged history shifts indices and may land past the tail.
    fn merged(&mut self, key: &ConversationKey) {
        if let Some(boundary) = self.boundaries.get_mut(key)
            && let Some(id) = &boundary.id
            && let Some(index) = self.registry.by_key(key).and_then(|store| store.index_of(id))
        {
            boundary.index = index;
        }
        if self.registry.active() == Some(key) {
            self.mark_read(key);
        }
    }

    fn mark_read(&mut self, key: &ConversationKey) {
        let Some(store) = self.registry.by_key(key) else {
            return;
        };
        let Some(position) = store.latest_position() else {
            return;
        };
        let recorded =
            self.tracker.record_read_by(key, position, |a, b| store.cmp_positions(a, b));
        if let Err(err) = recorded {
            tracing::warn!(conversation = %key, error = %err, "Failed to record read position");
        }
    }

    fn forget(&mut self, key: &ConversationKey) {
        self.backfill.cancel(key);
        self.tracker.end_viewing(key);
        self.boundaries.remove(key);
    }

    /// Conversation registry.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Read-position tracker.
    pub fn tracker(&self) -> &ReadPositionTracker<S> {
        &self.tracker
    }

    /// Backfill coordinator.
    pub fn backfill(&self) -> &BackfillCoordinator<E::Instant> {
        &self.backfill
    }

    /// Environment the session runs in.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Unread boundary computed when `conversation` was opened.
    pub fn boundary(&self, conversation: &str) -> Option<&UnreadBoundary> {
        self.boundaries.get(&ConversationKey::new(conversation))
    }

    /// Unread counts from the persisted read positions.
    pub fn unread_counts(&self) -> UnreadCounts {
        let mut positions = HashMap::new();
        for (key, _) in self.registry.iter() {
            match self.tracker.current(key) {
                Ok(Some(position)) => {
                    positions.insert(key.clone(), position);
                },
                Ok(None) => {},
                Err(err) => {
                    tracing::warn!(conversation = %key, error = %err, "Failed to load read position");
                },
            }
        }
        self.registry.unread_counts(&positions)
    }
}

/// Starting read position for a conversation created by `event`.
///
/// A conversation opened by a live message starts just before that message so
/// the message itself counts as unread. Anything else starts at `now`.
fn seed_position(event: &ConversationEvent, now: DateTime<Utc>) -> ReadPosition {
    match event {
        ConversationEvent::MessageReceived { message, .. } => ReadPosition::at_time(
            message
                .timestamp
                .checked_sub_signed(TimeDelta::milliseconds(1))
                .unwrap_or(message.timestamp),
        ),
        _ => ReadPosition::at_time(now),
    }
}
