//! Scrollback client
//!
//! Action-based session state machine over the conversation stores of
//! [`scrollback_core`]. Routes protocol events to the right conversation,
//! tracks what the user has read and coordinates history backfill.
//!
//! # Architecture
//!
//! The session follows the same Sans-IO pattern as the conversation stores.
//! It receives events ([`SessionEvent`]), processes them through synchronous
//! state machine logic, and returns actions ([`SessionAction`]) for the caller
//! to execute. The only side effect it performs itself is persisting read
//! positions through a [`ReadPositionStore`](scrollback_store::ReadPositionStore).
//!
//! # Components
//!
//! - [`Session`]: top-level state machine
//! - [`SessionRegistry`]: open conversations, event routing, unread counts
//! - [`BackfillCoordinator`]: one outstanding history request per conversation
//! - [`SessionEvent`] / [`SessionAction`] / [`Change`]: the session interface

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod backfill;
mod error;
mod event;
pub mod registry;
mod session;

pub use backfill::{
    BackfillConfig, BackfillCoordinator, BackfillPhase, DEFAULT_PAGE_SIZE, HistoryRequest,
    ResyncRequest,
};
pub use error::ClientError;
pub use event::{Change, SessionAction, SessionEvent};
pub use registry::{SessionRegistry, UnreadCount, UnreadCounts};
pub use scrollback_core::env::Environment;
pub use session::{Session, SessionConfig};
