//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the session runtime from specific I/O
//! implementations. Each frontend implements the trait to provide its
//! transport and input, while the generic [`crate::Runtime`] handles all
//! orchestration.

use std::{future::Future, ops::Sub, time::Duration};

use scrollback_client::{HistoryRequest, ResyncRequest, SessionEvent};

/// Abstracts I/O operations for the session runtime.
///
/// Implementations provide platform-specific I/O while the generic
/// [`Runtime`](crate::Runtime) handles orchestration logic. This ensures the
/// same orchestration code runs in production and simulation.
///
/// # Implementations
///
/// - **Production**: protocol connection plus UI input
/// - **Simulation**: scripted events and an in-memory history archive
/// - **Replay**: events read from a recorded log
///
/// # Associated Types
///
/// - [`Error`](Driver::Error): Platform-specific error type
/// - [`Instant`](Driver::Instant): Time representation (real or virtual)
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Time instant type. Enables virtual time in simulation.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// Wait for the next inbound event.
    ///
    /// Protocol traffic, user intents and history responses all arrive here,
    /// in delivery order. Returns `None` once the input is closed, which stops
    /// the runtime.
    fn poll_event(
        &mut self,
    ) -> impl Future<Output = Result<Option<SessionEvent<Self::Instant>>, Self::Error>> + Send;

    /// Ask the server for a page of older history.
    ///
    /// Fire-and-forget: the response must come back through
    /// [`poll_event`](Driver::poll_event) as a history event carrying the
    /// same request id.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent.
    fn request_history(
        &mut self,
        request: HistoryRequest,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Ask the server for a channel's roster and topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent.
    fn request_resync(
        &mut self,
        request: ResyncRequest,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Stop the connection and clean up resources.
    fn stop(&mut self);
}
