//! History backfill coordination.
//!
//! Tracks at most one outstanding history request per conversation. Repeated
//! triggers (every scroll-to-top) coalesce into the request already in flight.
//!
//! ```text
//! Idle ──request──▶ Requesting ──response──▶ Merging ──merged──▶ Idle
//!                        │
//!                        └──failure/timeout──▶ Failed ──backoff──▶ Idle
//! ```
//!
//! Responses carry the request id they answer. A response whose id is unknown
//! (cancelled, superseded by a reconnect, already timed out) is discarded.

use std::{collections::HashMap, ops::Add, time::Duration};

use scrollback_core::{ConversationKey, ConversationKind, HistoryAnchor};
use serde::{Deserialize, Serialize};

/// Default number of messages per history page.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Backfill tunables.
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    /// Messages requested per page.
    pub page_size: usize,
    /// How long a request may stay unanswered before it counts as failed.
    pub request_timeout: Duration,
    /// Backoff after the first failure. Doubles per consecutive failure.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout: Duration::from_secs(10),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// History request for the transport to issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRequest {
    /// Correlates the eventual response.
    pub request_id: u64,
    /// Conversation name as the server knows it.
    pub conversation: String,
    /// Where the page should end.
    pub anchor: HistoryAnchor,
    /// Maximum messages to return.
    pub limit: usize,
}

/// Request for a fresh roster and topic after a reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResyncRequest {
    /// Channel name.
    pub conversation: String,
}

/// Externally visible backfill state of one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillPhase {
    /// Nothing outstanding.
    Idle,
    /// Request sent, waiting for the response.
    Requesting,
    /// Response being merged.
    Merging,
    /// Last request failed; waiting out the backoff.
    Failed,
}

#[derive(Debug, Clone, Copy)]
enum State<I> {
    Idle,
    Requesting { request_id: u64, deadline: I },
    Merging { request_id: u64 },
    Failed { retry_at: I },
}

#[derive(Debug, Clone)]
struct Entry<I> {
    state: State<I>,
    consecutive_failures: u32,
    exhausted: bool,
}

impl<I> Default for Entry<I> {
    fn default() -> Self {
        Self { state: State::Idle, consecutive_failures: 0, exhausted: false }
    }
}

/// Per-conversation backfill state machines.
///
/// Generic over the monotonic instant type so simulation can drive timeouts
/// with a virtual clock.
#[derive(Debug)]
pub struct BackfillCoordinator<I> {
    config: BackfillConfig,
    entries: HashMap<ConversationKey, Entry<I>>,
    /// Outstanding request id to its conversation.
    in_flight: HashMap<u64, ConversationKey>,
    next_request_id: u64,
}

impl<I> BackfillCoordinator<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// Coordinator with no conversations.
    pub fn new(config: BackfillConfig) -> Self {
        Self { config, entries: HashMap::new(), in_flight: HashMap::new(), next_request_id: 1 }
    }

    /// Active configuration.
    pub fn config(&self) -> &BackfillConfig {
        &self.config
    }

    /// Ask for history older than `anchor`.
    ///
    /// Returns `None` (coalesced) while a request is outstanding or merging,
    /// during failure backoff, or once the server reported no more history.
    pub fn request_before(
        &mut self,
        conversation: &str,
        anchor: HistoryAnchor,
        page_size: usize,
        now: I,
    ) -> Option<HistoryRequest> {
        let key = ConversationKey::new(conversation);
        let entry = self.entries.entry(key.clone()).or_default();

        if entry.exhausted {
            tracing::debug!(conversation, "History exhausted, not requesting");
            return None;
        }
        match entry.state {
            State::Idle => {},
            State::Failed { retry_at } if retry_at <= now => {},
            State::Requesting { .. } | State::Merging { .. } | State::Failed { .. } => {
                tracing::debug!(conversation, "Backfill already in progress, coalescing");
                return None;
            },
        }

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        entry.state = State::Requesting { request_id, deadline: now + self.config.request_timeout };
        self.in_flight.insert(request_id, key);

        tracing::debug!(conversation, request_id, ?anchor, "Requesting history");
        Some(HistoryRequest {
            request_id,
            conversation: conversation.to_owned(),
            anchor,
            limit: page_size,
        })
    }

    /// Accept the response to `request_id` for merging.
    ///
    /// Returns the conversation to merge into, or `None` if the response must
    /// be discarded.
    pub fn begin_merge(&mut self, request_id: u64) -> Option<ConversationKey> {
        let Some(key) = self.in_flight.remove(&request_id) else {
            tracing::debug!(request_id, "Discarding response to unknown request");
            return None;
        };
        let entry = self.entries.get_mut(&key)?;
        match entry.state {
            State::Requesting { request_id: current, .. } if current == request_id => {
                entry.state = State::Merging { request_id };
                Some(key)
            },
            _ => {
                tracing::debug!(request_id, conversation = %key, "Discarding superseded response");
                None
            },
        }
    }

    /// Finish merging a page of `page_len` messages.
    ///
    /// An empty page means the server has no older history.
    pub fn end_merge(&mut self, key: &ConversationKey, page_len: usize) {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        if !matches!(entry.state, State::Merging { .. }) {
            return;
        }
        entry.state = State::Idle;
        entry.consecutive_failures = 0;
        if page_len == 0 {
            tracing::debug!(conversation = %key, "History exhausted");
            entry.exhausted = true;
        }
    }

    /// Record that `request_id` failed. Returns `false` for unknown requests.
    pub fn fail(&mut self, request_id: u64, now: I) -> bool {
        let Some(key) = self.in_flight.remove(&request_id) else {
            return false;
        };
        let Some(entry) = self.entries.get_mut(&key) else {
            return false;
        };
        if !matches!(entry.state, State::Requesting { request_id: current, .. } if current == request_id)
        {
            return false;
        }
        entry.consecutive_failures += 1;
        let backoff = backoff_for(&self.config, entry.consecutive_failures);
        entry.state = State::Failed { retry_at: now + backoff };
        tracing::debug!(conversation = %key, request_id, ?backoff, "History request failed");
        true
    }

    /// Time out overdue requests and end expired backoffs.
    ///
    /// Returns the conversations whose request timed out.
    pub fn tick(&mut self, now: I) -> Vec<ConversationKey> {
        let mut timed_out = Vec::new();
        for (key, entry) in &mut self.entries {
            match entry.state {
                State::Requesting { request_id, deadline } if deadline <= now => {
                    self.in_flight.remove(&request_id);
                    entry.consecutive_failures += 1;
                    let backoff = backoff_for(&self.config, entry.consecutive_failures);
                    entry.state = State::Failed { retry_at: now + backoff };
                    timed_out.push(key.clone());
                },
                State::Failed { retry_at } if retry_at <= now => entry.state = State::Idle,
                _ => {},
            }
        }
        for key in &timed_out {
            tracing::debug!(conversation = %key, "History request timed out");
        }
        timed_out
    }

    /// Forget a conversation. A later response for it is discarded.
    pub fn cancel(&mut self, key: &ConversationKey) {
        if self.entries.remove(key).is_some() {
            self.in_flight.retain(|_, owner| owner != key);
        }
    }

    /// Reset after a reconnect.
    ///
    /// In-flight requests are abandoned (their responses will be discarded),
    /// exhaustion is cleared, and every channel gets a resync request for its
    /// roster and topic. Message history is only backfilled on demand.
    pub fn reconnect<'a>(
        &mut self,
        conversations: impl IntoIterator<Item = &'a str>,
    ) -> Vec<ResyncRequest> {
        self.in_flight.clear();
        self.entries.clear();
        conversations
            .into_iter()
            .filter(|name| ConversationKind::of(name) == ConversationKind::Channel)
            .map(|name| ResyncRequest { conversation: name.to_owned() })
            .collect()
    }

    /// Current phase for a conversation.
    pub fn phase(&self, key: &ConversationKey) -> BackfillPhase {
        match self.entries.get(key).map(|entry| entry.state) {
            None | Some(State::Idle) => BackfillPhase::Idle,
            Some(State::Requesting { .. }) => BackfillPhase::Requesting,
            Some(State::Merging { .. }) => BackfillPhase::Merging,
            Some(State::Failed { .. }) => BackfillPhase::Failed,
        }
    }

    /// Whether the server reported no older history.
    pub fn is_exhausted(&self, key: &ConversationKey) -> bool {
        self.entries.get(key).is_some_and(|entry| entry.exhausted)
    }

    /// Outstanding request ids per conversation.
    pub fn outstanding(&self) -> HashMap<&ConversationKey, usize> {
        let mut counts = HashMap::new();
        for key in self.in_flight.values() {
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }
}

/// Exponential backoff: `initial * 2^(failures - 1)`, capped.
fn backoff_for(config: &BackfillConfig, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    config.initial_backoff.saturating_mul(1 << exponent).min(config.max_backoff)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Seconds on a virtual clock.
    type Instant = Duration;

    fn secs(n: u64) -> Instant {
        Duration::from_secs(n)
    }

    fn coordinator() -> BackfillCoordinator<Instant> {
        BackfillCoordinator::new(BackfillConfig::default())
    }

    fn key() -> ConversationKey {
        ConversationKey::new("#rust")
    }

    #[test]
    fn second_trigger_coalesces() {
        let mut backfill = coordinator();
        let first = backfill.request_before("#rust", HistoryAnchor::Latest, 50, secs(0));
        assert!(first.is_some());
        assert_eq!(backfill.phase(&key()), BackfillPhase::Requesting);
        assert!(backfill.request_before("#rust", HistoryAnchor::Latest, 50, secs(1)).is_none());
        assert_eq!(backfill.outstanding().get(&key()), Some(&1));
    }

    #[test]
    fn merge_cycle_returns_to_idle() {
        let mut backfill = coordinator();
        let request = backfill.request_before("#Rust", HistoryAnchor::Latest, 50, secs(0)).unwrap();
        assert_eq!(request.conversation, "#Rust");
        assert_eq!(backfill.begin_merge(request.request_id), Some(key()));
        assert_eq!(backfill.phase(&key()), BackfillPhase::Merging);
        assert!(backfill.request_before("#rust", HistoryAnchor::Latest, 50, secs(1)).is_none());

        backfill.end_merge(&key(), 50);
        assert_eq!(backfill.phase(&key()), BackfillPhase::Idle);
        assert!(backfill.request_before("#rust", HistoryAnchor::Latest, 50, secs(2)).is_some());
    }

    #[test]
    fn duplicate_response_is_discarded() {
        let mut backfill = coordinator();
        let request = backfill.request_before("#rust", HistoryAnchor::Latest, 50, secs(0)).unwrap();
        assert!(backfill.begin_merge(request.request_id).is_some());
        assert!(backfill.begin_merge(request.request_id).is_none());
        assert!(backfill.begin_merge(999).is_none());
    }

    #[test]
    fn empty_page_exhausts() {
        let mut backfill = coordinator();
        let request = backfill.request_before("#rust", HistoryAnchor::Latest, 50, secs(0)).unwrap();
        backfill.begin_merge(request.request_id);
        backfill.end_merge(&key(), 0);
        assert!(backfill.is_exhausted(&key()));
        assert!(backfill.request_before("#rust", HistoryAnchor::Latest, 50, secs(1)).is_none());

        backfill.reconnect(["#rust"]);
        assert!(!backfill.is_exhausted(&key()));
    }

    #[test]
    fn failure_backs_off_exponentially() {
        let mut backfill = coordinator();
        let request = backfill.request_before("#rust", HistoryAnchor::Latest, 50, secs(0)).unwrap();
        assert!(backfill.fail(request.request_id, secs(0)));
        assert!(!backfill.fail(request.request_id, secs(0)));
        assert_eq!(backfill.phase(&key()), BackfillPhase::Failed);

        // First backoff is one second.
        assert!(backfill.request_before("#rust", HistoryAnchor::Latest, 50, secs(0)).is_none());
        let retry = backfill.request_before("#rust", HistoryAnchor::Latest, 50, secs(1)).unwrap();

        // Second consecutive failure doubles it.
        backfill.fail(retry.request_id, secs(1));
        backfill.tick(secs(2));
        assert_eq!(backfill.phase(&key()), BackfillPhase::Failed);
        backfill.tick(secs(3));
        assert_eq!(backfill.phase(&key()), BackfillPhase::Idle);
    }

    #[test]
    fn timeout_moves_to_failed() {
        let mut backfill = coordinator();
        let request = backfill.request_before("#rust", HistoryAnchor::Latest, 50, secs(0)).unwrap();
        assert!(backfill.tick(secs(9)).is_empty());
        assert_eq!(backfill.tick(secs(10)), vec![key()]);
        assert_eq!(backfill.phase(&key()), BackfillPhase::Failed);

        // The late response is discarded.
        assert!(backfill.begin_merge(request.request_id).is_none());
    }

    #[test]
    fn cancel_discards_late_response() {
        let mut backfill = coordinator();
        let request = backfill.request_before("#rust", HistoryAnchor::Latest, 50, secs(0)).unwrap();
        backfill.cancel(&key());
        assert!(backfill.begin_merge(request.request_id).is_none());
        assert!(backfill.outstanding().is_empty());
    }

    #[test]
    fn reconnect_resyncs_channels_only() {
        let mut backfill = coordinator();
        let request = backfill.request_before("#rust", HistoryAnchor::Latest, 50, secs(0)).unwrap();
        let resync = backfill.reconnect(["#rust", "alice", "&local"]);
        assert_eq!(
            resync,
            vec![
                ResyncRequest { conversation: "#rust".into() },
                ResyncRequest { conversation: "&local".into() },
            ]
        );
        assert!(backfill.begin_merge(request.request_id).is_none());
        assert_eq!(backfill.phase(&key()), BackfillPhase::Idle);
    }

    #[test]
    fn backoff_is_capped() {
        let config = BackfillConfig::default();
        assert_eq!(backoff_for(&config, 1), Duration::from_secs(1));
        assert_eq!(backoff_for(&config, 3), Duration::from_secs(4));
        assert_eq!(backoff_for(&config, 40), Duration::from_secs(30));
    }
}
