//! Replay clock.
//!
//! Wall-clock time follows the log: it starts at the first recorded timestamp
//! and moves forward to each later one, so conversations created during the
//! replay are seeded at log time rather than at the time the tool runs.
//! Monotonic time is the offset from the start.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use scrollback_core::Environment;

#[derive(Debug)]
struct ClockState {
    wall: DateTime<Utc>,
    elapsed: Duration,
}

/// [`Environment`] driven by log timestamps.
#[derive(Clone, Debug)]
pub struct LogClock {
    state: Arc<Mutex<ClockState>>,
}

impl LogClock {
    /// Clock reading `start` on the wall.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self { state: Arc::new(Mutex::new(ClockState { wall: start, elapsed: Duration::ZERO })) }
    }

    /// Move forward to `at`. Earlier timestamps are ignored.
    pub fn observe(&self, at: DateTime<Utc>) {
        #[allow(clippy::expect_used)]
        let mut state = self.state.lock().expect("LogClock mutex poisoned");
        if let Ok(step) = (at - state.wall).to_std() {
            state.elapsed += step;
            state.wall = at;
        }
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        #[allow(clippy::expect_used)]
        let mut state = self.state.lock().expect("LogClock mutex poisoned");
        state.elapsed += by;
        if let Some(wall) =
            TimeDelta::from_std(by).ok().and_then(|by| state.wall.checked_add_signed(by))
        {
            state.wall = wall;
        }
    }
}

impl Environment for LogClock {
    type Instant = Duration;

    fn now(&self) -> Duration {
        #[allow(clippy::expect_used)]
        self.state.lock().expect("LogClock mutex poisoned").elapsed
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        #[allow(clippy::expect_used)]
        self.state.lock().expect("LogClock mutex poisoned").wall
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        let clock = self.clone();
        async move { clock.advance(duration) }
    }
}
