//! Invariant checking for conversation state.
//!
//! Invariants are properties that must hold after every event, whatever the
//! interleaving of sends, REST responses, and pushes that led there. Tests
//! check them against a [`ConversationSnapshot`] after each step.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! registry.assert_all(&conversation.snapshot(), "after echo");
//! ```

mod checks;

use amity_client::ConversationSnapshot;
pub use checks::{ConfirmedNotSending, FlagsExclusive, NoDuplicateMessages, UniqueTempIds};

/// Outcome of one check.
pub type InvariantResult = Result<(), Violation>;

/// A failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Which invariant failed.
    pub invariant: &'static str,
    /// The offending entry or entries.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property every reachable message list satisfies.
pub trait Invariant: Send + Sync {
    /// Short identifier used in reports.
    fn name(&self) -> &'static str;

    /// Inspect `state`.
    fn check(&self, state: &ConversationSnapshot) -> InvariantResult;
}

/// An ordered set of invariants run together.
#[derive(Default)]
pub struct InvariantRegistry {
    checks: Vec<Box<dyn Invariant>>,
}

impl InvariantRegistry {
    /// Registry with nothing in it.
    pub fn new() -> Self {
        Self::default()
    }

    /// The message-list invariants every conversation must keep.
    pub fn standard() -> Self {
        Self::new()
            .with(NoDuplicateMessages)
            .with(UniqueTempIds)
            .with(FlagsExclusive)
            .with(ConfirmedNotSending)
    }

    /// Builder form of [`Self::add`].
    #[must_use]
    pub fn with<I: Invariant + 'static>(mut self, invariant: I) -> Self {
        self.add(invariant);
        self
    }

    /// Register `invariant`.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.checks.push(Box::new(invariant));
    }

    /// Run every check; all failures are reported, not just the first.
    pub fn check_all(&self, state: &ConversationSnapshot) -> Result<(), Vec<Violation>> {
        let failed: Vec<Violation> =
            self.checks.iter().filter_map(|check| check.check(state).err()).collect();
        if failed.is_empty() { Ok(()) } else { Err(failed) }
    }

    /// [`Self::check_all`] for tests: panics listing each failure and the
    /// list that caused it.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &ConversationSnapshot, context: &str) {
        let Err(failed) = self.check_all(state) else { return };

        let report: String = failed.iter().map(|v| format!("\n  {v}")).collect();
        let entries: String = state
            .messages
            .iter()
            .map(|m| {
                format!(
                    "\n    id={:?} temp={:?} sending={} failed={}",
                    m.id, m.temp_id, m.sending, m.failed
                )
            })
            .collect();
        panic!("{} invariant(s) broken {context}:{report}\n  messages:{entries}", failed.len());
    }

    /// Registered invariant count.
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}
