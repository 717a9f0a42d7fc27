//! Inbound protocol events.
//!
//! The transport layer parses wire traffic into [`ConversationEvent`]s. Each
//! variant carries exactly the fields needed to apply it idempotently, so
//! re-delivery of an applied event is a no-op rather than a duplicate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    member::{Member, Privilege},
    message::{Message, MessageId, Reactions},
};

/// Transport connection state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    /// Connection attempt in progress.
    Connecting,
    /// Connected and registered.
    Connected,
    /// Connection lost or closed.
    Disconnected {
        /// Why the connection ended.
        reason: String,
    },
}

/// A message as delivered by the transport, live or from history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Server identity, if the server assigned one.
    #[serde(default)]
    pub id: Option<MessageId>,
    /// Sender nickname.
    pub sender: String,
    /// Body text.
    pub body: String,
    /// Server timestamp.
    pub timestamp: DateTime<Utc>,
    /// Third-person action.
    #[serde(default)]
    pub is_action: bool,
    /// Parent message this one replies to.
    #[serde(default)]
    pub reply_to: Option<MessageId>,
}

impl From<IncomingMessage> for Message {
    fn from(incoming: IncomingMessage) -> Self {
        Self {
            id: incoming.id,
            sender: incoming.sender,
            body: incoming.body,
            timestamp: incoming.timestamp,
            is_action: incoming.is_action,
            edited: false,
            deleted: false,
            reply_to: incoming.reply_to,
            reactions: Reactions::default(),
        }
    }
}

/// Every inbound protocol occurrence the engine understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    /// A live message arrived.
    MessageReceived {
        /// Channel name or, for direct messages, the recipient nick.
        target: String,
        /// The message.
        message: IncomingMessage,
    },

    /// An earlier message's body was replaced.
    MessageEdited {
        /// Conversation name.
        target: String,
        /// Identity of the edited message.
        id: MessageId,
        /// Replacement body.
        body: String,
    },

    /// An earlier message was deleted.
    MessageDeleted {
        /// Conversation name.
        target: String,
        /// Identity of the deleted message.
        id: MessageId,
    },

    /// A reactor added an emoji to a message.
    ReactionAdded {
        /// Conversation name.
        target: String,
        /// Identity of the reacted-to message.
        id: MessageId,
        /// Emoji.
        emoji: String,
        /// Who reacted.
        reactor: String,
    },

    /// A reactor withdrew an emoji from a message.
    ReactionRemoved {
        /// Conversation name.
        target: String,
        /// Identity of the reacted-to message.
        id: MessageId,
        /// Emoji.
        emoji: String,
        /// Who withdrew the reaction.
        reactor: String,
    },

    /// Someone joined a channel.
    MemberJoined {
        /// Channel name.
        target: String,
        /// Joining nickname.
        nick: String,
        /// Nick is linked to a verified account.
        #[serde(default)]
        verified: bool,
    },

    /// Someone left a channel.
    MemberParted {
        /// Channel name.
        target: String,
        /// Leaving nickname.
        nick: String,
        /// Part message.
        #[serde(default)]
        reason: Option<String>,
    },

    /// Someone was removed from a channel.
    MemberKicked {
        /// Channel name.
        target: String,
        /// Removed nickname.
        nick: String,
        /// Who kicked.
        by: String,
        /// Kick message.
        #[serde(default)]
        reason: Option<String>,
    },

    /// Someone disconnected. Applies to every conversation they are in.
    MemberQuit {
        /// Quitting nickname.
        nick: String,
        /// Quit message.
        #[serde(default)]
        reason: Option<String>,
    },

    /// Someone changed nickname. Applies to every conversation.
    NickChanged {
        /// Previous nickname.
        old: String,
        /// New nickname.
        new: String,
    },

    /// A privilege flag was granted or revoked.
    PrivilegeChanged {
        /// Channel name.
        target: String,
        /// Affected nickname.
        nick: String,
        /// Which flag.
        privilege: Privilege,
        /// Granted (`true`) or revoked.
        granted: bool,
    },

    /// Someone went away or came back. Applies to every conversation.
    AwayChanged {
        /// Affected nickname.
        nick: String,
        /// Away (`true`) or back.
        away: bool,
        /// Away message, if one was given. Ignored when coming back.
        #[serde(default)]
        message: Option<String>,
    },

    /// One page of a roster snapshot. Accumulated until
    /// [`ConversationEvent::MembersListEnd`].
    MembersListed {
        /// Channel name.
        target: String,
        /// Members on this page.
        members: Vec<Member>,
    },

    /// End of a roster snapshot; the accumulated pages replace the roster.
    MembersListEnd {
        /// Channel name.
        target: String,
    },

    /// The channel topic changed or was reported.
    TopicChanged {
        /// Channel name.
        target: String,
        /// Topic text.
        topic: String,
        /// Who set it, if known.
        #[serde(default)]
        set_by: Option<String>,
    },

    /// Someone started typing.
    TypingStarted {
        /// Conversation name.
        target: String,
        /// Typing nickname.
        nick: String,
        /// When the notice was sent.
        at: DateTime<Utc>,
    },

    /// Someone stopped typing.
    TypingStopped {
        /// Conversation name.
        target: String,
        /// Nickname.
        nick: String,
    },

    /// A batch of history the server sent without being asked.
    HistoryPage {
        /// Conversation name.
        target: String,
        /// Messages in the batch.
        messages: Vec<IncomingMessage>,
    },

    /// The transport connection changed state.
    ConnectionChanged {
        /// New state.
        state: ConnectionState,
    },

    /// Registration completed; `nick` is the confirmed local nickname.
    Registered {
        /// Local nickname.
        nick: String,
    },

    /// The local user authenticated.
    Authenticated {
        /// Account identifier.
        account: String,
    },
}

/// Where an event must be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// A single named conversation.
    Conversation(&'a str),
    /// Every open conversation.
    AllConversations,
    /// Session-level state only.
    Session,
}

impl ConversationEvent {
    /// Delivery route for this event.
    pub fn route(&self) -> Route<'_> {
        match self {
            Self::MessageReceived { target, .. }
            | Self::MessageEdited { target, .. }
            | Self::MessageDeleted { target, .. }
            | Self::ReactionAdded { target, .. }
            | Self::ReactionRemoved { target, .. }
            | Self::MemberJoined { target, .. }
            | Self::MemberParted { target, .. }
            | Self::MemberKicked { target, .. }
            | Self::PrivilegeChanged { target, .. }
            | Self::MembersListed { target, .. }
            | Self::MembersListEnd { target }
            | Self::TopicChanged { target, .. }
            | Self::TypingStarted { target, .. }
            | Self::TypingStopped { target, .. }
            | Self::HistoryPage { target, .. } => Route::Conversation(target),
            Self::MemberQuit { .. } | Self::NickChanged { .. } | Self::AwayChanged { .. } => {
                Route::AllConversations
            },
            Self::ConnectionChanged { .. } | Self::Registered { .. } | Self::Authenticated { .. } => {
                Route::Session
            },
        }
    }

    /// Whether this event may open a conversation that does not exist yet.
    ///
    /// Events that only make sense against prior state (edits, deletes,
    /// reactions, parts, kicks, privilege changes, typing, roster end) never
    /// create one.
    pub fn creates_conversation(&self) -> bool {
        matches!(
            self,
            Self::MessageReceived { .. }
                | Self::MemberJoined { .. }
                | Self::MembersListed { .. }
                | Self::TopicChanged { .. }
                | Self::HistoryPage { .. }
        )
    }
}
