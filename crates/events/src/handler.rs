use perfrev_core::{Aggregate, DomainError};

/// Execute an aggregate command deterministically (no IO, no async).
///
/// Canonical in-memory lifecycle:
///
/// 1. **Decide**: `aggregate.handle(command)` produces events (no mutation)
/// 2. **Evolve**: each event is applied via `aggregate.apply(event)`
///
/// A rejected command leaves the aggregate untouched. For persistence and
/// optimistic concurrency use `AggregateRepository::execute` in `perfrev-infra`.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, DomainError>
where
    A: Aggregate,
{
    let events = aggregate.handle(command)?;
    for ev in &events {
        aggregate.apply(ev);
    }
    Ok(events)
}
