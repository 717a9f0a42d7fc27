//! Virtual-clock environment.
//!
//! Time only moves when the test advances it (or when something sleeps), so
//! typing expiry, backfill timeouts and retry backoff are reproducible.

use std::{
    ops::{Add, Sub},
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use scrollback_core::Environment;

/// Virtual monotonic instant: time elapsed since the simulation started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Elapsed virtual time.
    pub fn elapsed(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for SimInstant {
    type Output = SimInstant;

    fn add(self, rhs: Duration) -> SimInstant {
        SimInstant(self.0.saturating_add(rhs))
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: SimInstant) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

/// Shared virtual clock.
///
/// Clones share the same clock, so the test and the session observe the same
/// time.
#[derive(Debug, Clone)]
pub struct SimEnv {
    elapsed: Arc<Mutex<Duration>>,
    epoch: DateTime<Utc>,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEnv {
    /// Wall clock starting at 2023-11-14T22:13:20Z.
    pub fn new() -> Self {
        let epoch = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default();
        Self::with_epoch(epoch)
    }

    /// Wall clock starting at `epoch`.
    pub fn with_epoch(epoch: DateTime<Utc>) -> Self {
        Self { elapsed: Arc::new(Mutex::new(Duration::ZERO)), epoch }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        #[allow(clippy::expect_used)]
        let mut elapsed = self.elapsed.lock().expect("SimEnv clock mutex poisoned");
        *elapsed = elapsed.saturating_add(by);
    }

    /// Virtual time elapsed since the start.
    pub fn elapsed(&self) -> Duration {
        #[allow(clippy::expect_used)]
        *self.elapsed.lock().expect("SimEnv clock mutex poisoned")
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.elapsed())
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.elapsed()).unwrap_or(TimeDelta::MAX);
        self.epoch.checked_add_signed(elapsed).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Advances the virtual clock when first polled and completes at once.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        let clock = self.clone();
        async move { clock.advance(duration) }
    }
}
