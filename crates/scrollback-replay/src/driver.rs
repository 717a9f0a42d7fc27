//! Driver that plays a parsed log into the runtime.

use std::collections::{HashMap, VecDeque};

use scrollback_app::Driver;
use scrollback_client::{HistoryRequest, ResyncRequest, SessionEvent};
use scrollback_core::{ConversationKey, Environment, IncomingMessage};

use crate::{
    ReplayError,
    clock::LogClock,
    input::{Entry, ReplayLog, timestamp_of},
};

/// Serves log entries in order and answers history requests from the log's
/// archived pages.
pub struct ReplayDriver {
    clock: LogClock,
    entries: VecDeque<Entry>,
    pages: HashMap<ConversationKey, VecDeque<Vec<IncomingMessage>>>,
    responses: VecDeque<SessionEvent<std::time::Duration>>,
    history_requests: usize,
    resync_requests: usize,
}

impl ReplayDriver {
    /// Driver over `log`, advancing `clock` as timestamps go by.
    pub fn new(log: ReplayLog, clock: LogClock) -> Self {
        Self {
            clock,
            entries: log.entries.into(),
            pages: log.pages,
            responses: VecDeque::new(),
            history_requests: 0,
            resync_requests: 0,
        }
    }

    /// History requests issued during the replay.
    pub fn history_requests(&self) -> usize {
        self.history_requests
    }

    /// Resync requests issued during the replay.
    pub fn resync_requests(&self) -> usize {
        self.resync_requests
    }
}

impl Driver for ReplayDriver {
    type Error = ReplayError;
    type Instant = std::time::Duration;

    async fn poll_event(
        &mut self,
    ) -> Result<Option<SessionEvent<std::time::Duration>>, ReplayError> {
        if let Some(response) = self.responses.pop_front() {
            return Ok(Some(response));
        }
        let Some(entry) = self.entries.pop_front() else {
            return Ok(None);
        };
        let event = match entry {
            Entry::Protocol(event) => {
                if let Some(at) = timestamp_of(&event) {
                    self.clock.observe(at);
                }
                SessionEvent::Protocol(event)
            },
            Entry::Open(conversation) => SessionEvent::Open { conversation },
            Entry::Close(conversation) => SessionEvent::Close { conversation },
            Entry::ScrollToTop(conversation) => SessionEvent::ScrollToTop { conversation },
            Entry::Wait(by) => {
                self.clock.advance(by);
                SessionEvent::Tick { now: self.clock.now() }
            },
        };
        Ok(Some(event))
    }

    async fn request_history(&mut self, request: HistoryRequest) -> Result<(), ReplayError> {
        self.history_requests += 1;
        // A conversation with no archived pages left has no more history.
        let messages = self
            .pages
            .get_mut(&ConversationKey::new(&request.conversation))
            .and_then(VecDeque::pop_front)
            .unwrap_or_default();
        tracing::info!(
            conversation = %request.conversation,
            anchor = ?request.anchor,
            served = messages.len(),
            "History requested"
        );
        self.responses
            .push_back(SessionEvent::HistoryReceived { request_id: request.request_id, messages });
        Ok(())
    }

    async fn request_resync(&mut self, request: ResyncRequest) -> Result<(), ReplayError> {
        self.resync_requests += 1;
        tracing::info!(conversation = %request.conversation, "Resync requested");
        Ok(())
    }

    fn stop(&mut self) {
        tracing::debug!(pending = self.entries.len(), "Replay driver stopped");
    }
}
