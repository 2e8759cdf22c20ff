//! Aggregate root trait for event-sourced domain models.

use crate::error::{DomainError, DomainResult};
use crate::id::AggregateId;

/// Aggregate root marker + minimal interface.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug + Into<AggregateId>;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Number of events applied to this instance.
    ///
    /// Always equals the length of the folded history; it is the value a
    /// writer passes back as its expected stream version.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for an aggregate stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (migrations, administrative appends).
    Any,
    /// Require the stream to be at an exact version (0 = stream must not exist).
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

impl From<u64> for ExpectedVersion {
    fn from(value: u64) -> Self {
        ExpectedVersion::Exact(value)
    }
}

/// Aggregate execution semantics (pure, deterministic).
///
/// - **Decision logic**: `handle(&self, cmd)` returns events.
/// - **State mutation**: `apply(&mut self, event)` evolves state.
///
/// Aggregates must not perform IO or side effects. `apply` is the only path
/// allowed to change state, so current state is always the fold of history.
pub trait Aggregate: AggregateRoot + Sized {
    /// Stream type tag persisted alongside every event (e.g. `"org.employee"`).
    const AGGREGATE_TYPE: &'static str;

    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;

    /// Zero-value state used as the starting point of a fold.
    fn empty(id: Self::Id) -> Self;

    /// Evolve in-memory state from a single event.
    ///
    /// Implementations must increment `version()` by exactly one per event.
    fn apply(&mut self, event: &Self::Event);

    /// Decide which events to emit given the current state and a command.
    ///
    /// A rejected command yields an error and no events.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, DomainError>;
}

/// Rebuild an aggregate by folding its ordered history from the zero state.
pub fn rehydrate<'a, A, I>(id: A::Id, events: I) -> A
where
    A: Aggregate,
    A::Event: 'a,
    I: IntoIterator<Item = &'a A::Event>,
{
    events.into_iter().fold(A::empty(id), |mut aggregate, event| {
        aggregate.apply(event);
        aggregate
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_version_only_matches_itself() {
        assert!(ExpectedVersion::Exact(3).matches(3));
        assert!(!ExpectedVersion::Exact(3).matches(4));
        assert!(ExpectedVersion::Any.matches(42));
    }

    #[test]
    fn check_reports_conflict() {
        let err = ExpectedVersion::Exact(1).check(2).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }
}
