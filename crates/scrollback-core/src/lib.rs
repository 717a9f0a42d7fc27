//! Scrollback core
//!
//! Client-side conversation state for an IRC-derived chat protocol. Turns a
//! stream of already-parsed protocol events into consistent, queryable
//! per-conversation state: message order, tombstones, reactions, threads,
//! rosters with privilege ranks, typing indicators and unread boundaries.
//!
//! # Architecture
//!
//! Everything in this crate is a pure, synchronous state machine. A
//! [`ConversationStore`] consumes [`ConversationEvent`]s through
//! [`ConversationStore::apply`] and reports what happened as an
//! [`ApplyOutcome`]. Events that reference state the store does not hold are
//! soft failures ([`Inconsistency`]): counted, logged and dropped, never fatal.
//!
//! # Components
//!
//! - [`ConversationEvent`]: closed set of inbound protocol occurrences
//! - [`Message`], [`Member`], [`Roster`]: the stored entities
//! - [`ConversationStore`]: ordered messages, roster, topic and typing set for
//!   one channel or direct-message buffer
//! - [`Identity`]: the local user, used for own-message and mention checks
//! - [`Environment`]: time abstraction so callers can run on a virtual clock

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod change;
mod config;
pub mod conversation;
pub mod env;
mod error;
pub mod event;
mod identity;
pub mod member;
pub mod message;
pub mod name;
mod typing;

pub use change::{ApplyOutcome, MergeReport, StoreChange};
pub use config::{DEFAULT_QUIET_PERIOD, DEFAULT_SEARCH_LIMIT, DEFAULT_TYPING_TTL, StoreConfig};
pub use conversation::{
    ConversationStore, HistoryAnchor, HistoryDirection, ReadPosition, Topic, UnreadBoundary,
};
pub use env::Environment;
pub use error::{Diagnostics, Inconsistency};
pub use event::{ConnectionState, ConversationEvent, IncomingMessage, Route};
pub use identity::Identity;
pub use member::{AwayStatus, Member, Privilege, Privileges, Rank, Roster};
pub use message::{Message, MessageId, Reactions};
pub use name::{ConversationKey, ConversationKind};
pub use typing::TypingSet;
