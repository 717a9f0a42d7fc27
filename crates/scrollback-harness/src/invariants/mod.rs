//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties that must always hold during session execution.
//! Unlike example-based tests that check specific scenarios, invariants
//! verify behavioral properties across all possible event sequences.
//!
//! # Architecture
//!
//! The invariant system extracts observable state from a
//! [`Session`](scrollback_client::Session) into a [`SystemSnapshot`], then
//! runs registered [`Invariant`] checks against it. Properties that span time
//! (read positions only move forward) use a [`SessionObserver`], which keeps
//! history between snapshots.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let mut observer = SessionObserver::default();
//! registry.assert_all(&observer.observe(&session), "after open");
//! ```

mod checks;
mod snapshot;

pub use checks::{
    ActiveConversationOpen, BoundaryInRange, ReadPositionMonotonicity, RosterKeysConsistent,
    SingleOutstandingBackfill, TombstonesStayEmpty, UniqueMessageIds,
};
pub use snapshot::{ConversationSnapshot, SessionObserver, SystemSnapshot, TombstoneSnapshot};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// An invariant that can be checked against session state.
///
/// Invariants are behavioral properties that must always hold.
/// They capture WHAT must be true, not specific test scenarios.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against the current state.
    ///
    /// Returns `Ok(())` if the invariant holds, or a [`Violation`]
    /// describing what went wrong.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
///
/// Collects multiple invariants and runs them all against session state.
/// Use [`InvariantRegistry::standard()`] for the full set.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Registry with nothing to check.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Every session invariant this crate defines:
    ///
    /// - [`ActiveConversationOpen`]
    /// - [`UniqueMessageIds`]
    /// - [`TombstonesStayEmpty`]
    /// - [`RosterKeysConsistent`]
    /// - [`SingleOutstandingBackfill`]
    /// - [`ReadPositionMonotonicity`]
    /// - [`BoundaryInRange`]
    pub fn standard() -> Self {
        let invariants: Vec<Box<dyn Invariant>> = vec![
            Box::new(ActiveConversationOpen),
            Box::new(UniqueMessageIds),
            Box::new(TombstonesStayEmpty),
            Box::new(RosterKeysConsistent),
            Box::new(SingleOutstandingBackfill),
            Box::new(ReadPositionMonotonicity),
            Box::new(BoundaryInRange),
        ];
        Self { invariants }
    }

    /// Register another invariant.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Names of the registered invariants, in check order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.invariants.iter().map(|invariant| invariant.name())
    }

    /// Run every invariant against `state`, collecting all violations.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let mut violations = Vec::new();
        for invariant in &self.invariants {
            if let Err(violation) = invariant.check(state) {
                violations.push(violation);
            }
        }
        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Like [`check_all`](Self::check_all), but panics with every violation
    /// and `context` (typically the step that was just applied).
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        let Err(violations) = self.check_all(state) else {
            return;
        };
        let mut report = format!("{} invariant(s) violated at {context}", violations.len());
        for violation in &violations {
            report.push_str("\n  ");
            report.push_str(&violation.to_string());
        }
        panic!("{report}");
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
