//! Session events and actions.

use scrollback_core::{ConnectionState, ConversationEvent, ConversationKey, IncomingMessage, StoreChange};

use crate::backfill::{HistoryRequest, ResyncRequest};

/// Events the caller feeds into the session.
///
/// The caller is responsible for:
/// - Translating protocol traffic into [`ConversationEvent`]s
/// - Forwarding user intents (open, close, scroll)
/// - Delivering history responses and failures
/// - Driving time forward via ticks
///
/// Generic over `I` (Instant type) so simulation can drive backfill timeouts
/// with a virtual clock.
#[derive(Debug, Clone)]
pub enum SessionEvent<I = std::time::Instant> {
    /// Normalized protocol event.
    Protocol(ConversationEvent),

    /// User opened (focused) a conversation.
    Open {
        /// Conversation name.
        conversation: String,
    },

    /// User closed a conversation.
    Close {
        /// Conversation name.
        conversation: String,
    },

    /// User scrolled to the top of a conversation's history.
    ScrollToTop {
        /// Conversation name.
        conversation: String,
    },

    /// Response to an earlier [`SessionAction::RequestHistory`].
    HistoryReceived {
        /// Request being answered.
        request_id: u64,
        /// Page of older messages. Empty means no more history.
        messages: Vec<IncomingMessage>,
    },

    /// An earlier history request failed.
    HistoryFailed {
        /// Request that failed.
        request_id: u64,
        /// Transport-supplied reason.
        reason: String,
    },

    /// Time tick for timeouts and typing expiry.
    Tick {
        /// Current time from the environment.
        now: I,
    },
}

/// Observable state change, for re-rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// A conversation's contents changed.
    Conversation {
        /// Which conversation.
        key: ConversationKey,
        /// What changed.
        change: StoreChange,
    },

    /// A conversation was created.
    Opened {
        /// New conversation.
        key: ConversationKey,
    },

    /// A conversation was removed.
    Closed {
        /// Removed conversation.
        key: ConversationKey,
    },

    /// The focused conversation changed.
    ActiveChanged {
        /// Newly focused conversation, if any.
        key: Option<ConversationKey>,
    },

    /// The local nickname changed.
    IdentityChanged {
        /// New nickname.
        nick: String,
    },

    /// The connection changed state.
    ConnectionChanged(ConnectionState),
}

/// Actions the session produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Ask the server for a page of older history.
    ///
    /// Answer with [`SessionEvent::HistoryReceived`] or
    /// [`SessionEvent::HistoryFailed`] carrying the same request id.
    RequestHistory(HistoryRequest),

    /// Ask the server for a channel's roster and topic.
    RequestResync(ResyncRequest),

    /// Tell observers something changed.
    Notify(Change),
}
