//! Deterministic simulation harness for scrollback session testing.
//!
//! Virtual-time [`Environment`](scrollback_core::Environment) and
//! [`Driver`](scrollback_app::Driver) implementations for reproducible runs of
//! the session state machine against messy protocol traffic.
//!
//! # Scenarios
//!
//! The `scenario` module generates seeded step sequences (messages, edits,
//! reactions, membership churn, reconnects, user intents, clock advances)
//! along with a history archive for backfill. [`ScenarioRunner`] drives a
//! session through them synchronously; [`SimDriver`] does the same through the
//! async runtime.
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Invariants verify WHAT must be true across all execution paths, not
//! specific scenarios. Use [`InvariantRegistry::standard()`] for the full set.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod scenario;
pub mod sim_driver;
pub mod sim_env;

pub use invariants::{
    ActiveConversationOpen, BoundaryInRange, ConversationSnapshot, Invariant, InvariantRegistry,
    InvariantResult, ReadPositionMonotonicity, RosterKeysConsistent, SessionObserver,
    SingleOutstandingBackfill, SystemSnapshot, TombstoneSnapshot, TombstonesStayEmpty,
    UniqueMessageIds, Violation,
};
pub use scenario::{HistoryArchive, LOCAL_NICK, Scenario, ScenarioRunner, Step};
pub use sim_driver::SimDriver;
pub use sim_env::{SimEnv, SimInstant};
