//! Scrollback application layer
//!
//! Generic async runtime that drives the session state machine of
//! [`scrollback_client`], enabling deterministic simulation testing with the
//! same orchestration code that runs in production.
//!
//! # Components
//!
//! - [`Driver`]: trait for platform-specific I/O abstraction
//! - [`Runtime`]: single-task orchestration loop using a Driver, broadcasting
//!   every [`Change`](scrollback_client::Change) to subscribers
//! - [`SystemEnv`]: production [`Environment`](scrollback_core::Environment)

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod driver;
mod runtime;
mod system_env;

pub use driver::Driver;
pub use runtime::{CHANGE_CHANNEL_CAPACITY, DEFAULT_TICK_INTERVAL, Runtime};
pub use system_env::SystemEnv;
