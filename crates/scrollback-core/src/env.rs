//! Environment abstraction for deterministic testing.
//!
//! Decouples conversation logic from system time. Production code reads the
//! real clocks; simulation advances a virtual clock so typing expiry, backfill
//! timeouts and retry backoff can be tested without sleeping.

use std::{
    future::Future,
    ops::{Add, Sub},
    time::Duration,
};

use chrono::{DateTime, Utc};

/// Abstract environment providing monotonic time, wall-clock time and sleep.
///
/// # Invariants
///
/// Implementations MUST guarantee that `now()` never goes backwards. The wall
/// clock may jump (NTP, user changes) and is only used to stamp locally
/// synthesized events and to evaluate typing expiry.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type.
    ///
    /// Production environments use `std::time::Instant`, simulation uses a
    /// virtual instant that only moves when the test advances it.
    type Instant: Copy
        + Ord
        + Send
        + Sync
        + std::fmt::Debug
        + Sub<Output = Duration>
        + Add<Duration, Output = Self::Instant>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time.
    fn wall_clock(&self) -> DateTime<Utc>;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code awaits this; state machines never sleep.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}
