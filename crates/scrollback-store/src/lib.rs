//! Scrollback read-position storage
//!
//! Durable per-conversation read positions and the tracker that guarantees the
//! position used for an unread boundary is the one that stood before the
//! current viewing session overwrote it.
//!
//! # Components
//!
//! - [`ReadPositionStore`]: synchronous storage trait keyed by conversation
//! - [`RedbStore`]: durable implementation, survives restarts
//! - [`MemoryStore`]: in-memory implementation for tests and simulation
//! - [`ChaoticStore`]: failure-injecting wrapper for chaos tests
//! - [`ReadPositionTracker`]: snapshot-before-update bookkeeping

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod chaotic;
mod error;
mod memory;
mod redb;
mod tracker;

pub use chaotic::ChaoticStore;
pub use error::StoreError;
pub use memory::MemoryStore;
use scrollback_core::{ConversationKey, ReadPosition};
pub use tracker::ReadPositionTracker;

pub use self::redb::RedbStore;

/// Storage abstraction for read positions.
///
/// Must be Clone (shared between the tracker and inspection code), Send + Sync
/// and synchronous. Implementations share internal state via `Arc`, so clones
/// see the same positions.
pub trait ReadPositionStore: Clone + Send + Sync + 'static {
    /// Stored position for a conversation. `None` if never read.
    fn load(&self, key: &ConversationKey) -> Result<Option<ReadPosition>, StoreError>;

    /// Overwrite the position for a conversation.
    fn save(&self, key: &ConversationKey, position: &ReadPosition) -> Result<(), StoreError>;

    /// Forget a conversation. Removing an absent key is not an error.
    fn remove(&self, key: &ConversationKey) -> Result<(), StoreError>;

    /// Every stored position. Order is not guaranteed.
    fn list(&self) -> Result<Vec<(ConversationKey, ReadPosition)>, StoreError>;
}
