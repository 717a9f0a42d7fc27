//! Per-conversation tunables.

use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

/// Largest gap between two messages from the same sender that still groups
/// them under one header.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(5 * 60);

/// How long a typing notice stays active without a refresh.
pub const DEFAULT_TYPING_TTL: Duration = Duration::from_secs(6);

/// Maximum number of search results.
pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// Conversation store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Grouping quiet period.
    pub quiet_period: Duration,
    /// Typing indicator lifetime.
    pub typing_ttl: Duration,
    /// Default search result cap.
    pub search_limit: usize,
    /// Offset in which date boundaries are evaluated.
    pub day_offset: FixedOffset,
    /// Synthesize system notices for joins, parts, kicks, quits and nick
    /// changes.
    pub announce_membership: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            quiet_period: DEFAULT_QUIET_PERIOD,
            typing_ttl: DEFAULT_TYPING_TTL,
            search_limit: DEFAULT_SEARCH_LIMIT,
            day_offset: Utc.fix(),
            announce_membership: true,
        }
    }
}
