//! Aggregate persistence (load / save / execute) over an `EventStore`.
//!
//! ```text
//! load:     stream → validate ordering → decode → fold (apply)
//! execute:  load (or empty) → handle → save(expected = loaded version)
//! save:     encode → append(ExpectedVersion)
//! ```
//!
//! The repository never retries: a stale `save` surfaces as
//! `ConcurrencyConflict` and the caller decides whether to reload and retry.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use perfrev_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use perfrev_events::Event;

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("aggregate {0} not found")]
    NotFound(AggregateId),

    #[error("concurrency conflict (expected: {expected:?}, actual: {actual})")]
    ConcurrencyConflict {
        expected: ExpectedVersion,
        actual: u64,
    },

    #[error("corrupt stream {aggregate_id}: {reason}")]
    Corrupt {
        aggregate_id: AggregateId,
        reason: String,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("event store error: {0}")]
    Store(EventStoreError),
}

impl From<EventStoreError> for RepositoryError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency { expected, actual } => {
                RepositoryError::ConcurrencyConflict { expected, actual }
            }
            other => RepositoryError::Store(other),
        }
    }
}

impl RepositoryError {
    fn corrupt(aggregate_id: AggregateId, reason: impl Into<String>) -> Self {
        RepositoryError::Corrupt {
            aggregate_id,
            reason: reason.into(),
        }
    }

    /// Whether retrying the same call later may succeed.
    ///
    /// A concurrency conflict is not: the caller must reload the stream and
    /// decide again, and resubmitting the same expected version fails forever.
    pub fn is_transient(&self) -> bool {
        match self {
            RepositoryError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// What to do with a stored event whose type tag the aggregate doesn't know.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownEventPolicy {
    /// Fail the load with `Corrupt`.
    #[default]
    Reject,
    /// Skip the event (forward-compatible readers only).
    Skip,
}

/// A rehydrated aggregate plus the stream version it was read at.
///
/// `version` is the stream's last sequence number and is what `save` expects;
/// it equals `aggregate.version()` unless events were skipped.
#[derive(Debug, Clone)]
pub struct Loaded<A> {
    pub aggregate: A,
    pub version: u64,
}

#[derive(Debug)]
pub struct AggregateRepository<S> {
    store: S,
}

impl<S> AggregateRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> AggregateRepository<S>
where
    S: EventStore,
{
    pub fn load<A>(&self, id: A::Id) -> Result<Loaded<A>, RepositoryError>
    where
        A: Aggregate,
        A::Event: Event + DeserializeOwned,
    {
        self.load_with(id, UnknownEventPolicy::Reject)
    }

    pub fn load_with<A>(
        &self,
        id: A::Id,
        policy: UnknownEventPolicy,
    ) -> Result<Loaded<A>, RepositoryError>
    where
        A: Aggregate,
        A::Event: Event + DeserializeOwned,
    {
        let aggregate_id: AggregateId = id.into();
        let history = self.store.load_stream(aggregate_id)?;
        if history.is_empty() {
            return Err(RepositoryError::NotFound(aggregate_id));
        }
        validate_loaded_stream::<A>(aggregate_id, &history)?;

        let mut aggregate = A::empty(id);
        let mut skipped = 0usize;
        for stored in &history {
            if !<A::Event as Event>::is_known_type(&stored.event_type) {
                match policy {
                    UnknownEventPolicy::Reject => {
                        return Err(RepositoryError::corrupt(
                            aggregate_id,
                            format!(
                                "unknown event type '{}' at sequence {}",
                                stored.event_type, stored.sequence_number
                            ),
                        ));
                    }
                    UnknownEventPolicy::Skip => {
                        skipped += 1;
                        continue;
                    }
                }
            }

            let event = decode::<A>(aggregate_id, stored)?;
            aggregate.apply(&event);
        }

        let version = stream_version(&history);
        debug!(
            aggregate_type = A::AGGREGATE_TYPE,
            aggregate_id = %aggregate_id,
            version,
            skipped,
            "aggregate loaded"
        );

        Ok(Loaded { aggregate, version })
    }

    /// Append `events` if the stream is still at `expected_version`.
    ///
    /// Returns the new stream version.
    pub fn save<A>(
        &self,
        id: A::Id,
        expected_version: ExpectedVersion,
        events: &[A::Event],
    ) -> Result<u64, RepositoryError>
    where
        A: Aggregate,
        A::Event: Event + Serialize,
    {
        let aggregate_id: AggregateId = id.into();

        if events.is_empty() {
            let current = stream_version(&self.store.load_stream(aggregate_id)?);
            if !expected_version.matches(current) {
                return Err(RepositoryError::ConcurrencyConflict {
                    expected: expected_version,
                    actual: current,
                });
            }
            return Ok(current);
        }

        let committed = self.append::<A>(aggregate_id, expected_version, events)?;
        Ok(stream_version(&committed))
    }

    /// Load (or start from `empty`), decide, and save at the loaded version.
    ///
    /// Returns the committed events; empty when the command was a no-op.
    pub fn execute<A>(
        &self,
        id: A::Id,
        command: &A::Command,
    ) -> Result<Vec<StoredEvent>, RepositoryError>
    where
        A: Aggregate,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        let (aggregate, version) = match self.load::<A>(id) {
            Ok(loaded) => (loaded.aggregate, loaded.version),
            Err(RepositoryError::NotFound(_)) => (A::empty(id), 0),
            Err(e) => return Err(e),
        };

        let decided = aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        self.append::<A>(id.into(), ExpectedVersion::Exact(version), &decided)
    }

    fn append<A>(
        &self,
        aggregate_id: AggregateId,
        expected_version: ExpectedVersion,
        events: &[A::Event],
    ) -> Result<Vec<StoredEvent>, RepositoryError>
    where
        A: Aggregate,
        A::Event: Event + Serialize,
    {
        let uncommitted = events
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(aggregate_id, A::AGGREGATE_TYPE, Uuid::now_v7(), ev)
            })
            .collect::<Result<Vec<_>, _>>()?;

        match self.store.append(uncommitted, expected_version) {
            Ok(committed) => {
                debug!(
                    aggregate_type = A::AGGREGATE_TYPE,
                    aggregate_id = %aggregate_id,
                    appended = committed.len(),
                    version = stream_version(&committed),
                    "events appended"
                );
                Ok(committed)
            }
            Err(err @ EventStoreError::Concurrency { .. }) => {
                warn!(
                    aggregate_type = A::AGGREGATE_TYPE,
                    aggregate_id = %aggregate_id,
                    error = %err,
                    "stale write rejected"
                );
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream<A: Aggregate>(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), RepositoryError> {
    // Sequence numbers must be 1..=n with no gaps, even if a backend misbehaves.
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(RepositoryError::corrupt(
                aggregate_id,
                format!("loaded stream contains wrong aggregate_id at index {idx}"),
            ));
        }
        if e.aggregate_type != A::AGGREGATE_TYPE {
            return Err(RepositoryError::corrupt(
                aggregate_id,
                format!(
                    "stream holds '{}' events, expected '{}'",
                    e.aggregate_type,
                    A::AGGREGATE_TYPE
                ),
            ));
        }
        let expected = idx as u64 + 1;
        if e.sequence_number != expected {
            return Err(RepositoryError::corrupt(
                aggregate_id,
                format!(
                    "non-monotonic sequence_number (expected={expected}, found={})",
                    e.sequence_number
                ),
            ));
        }
    }
    Ok(())
}

fn decode<A>(aggregate_id: AggregateId, stored: &StoredEvent) -> Result<A::Event, RepositoryError>
where
    A: Aggregate,
    A::Event: Event + DeserializeOwned,
{
    let event: A::Event = serde_json::from_value(stored.payload.clone()).map_err(|e| {
        RepositoryError::corrupt(
            aggregate_id,
            format!(
                "undecodable '{}' payload at sequence {}: {e}",
                stored.event_type, stored.sequence_number
            ),
        )
    })?;

    if event.event_type() != stored.event_type {
        return Err(RepositoryError::corrupt(
            aggregate_id,
            format!(
                "payload decodes as '{}' but is tagged '{}'",
                event.event_type(),
                stored.event_type
            ),
        ));
    }

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::json;

    use perfrev_core::AggregateRoot;
    use perfrev_questionnaire::{
        AddCategory, Category, CategoryCommand, CategoryId, DeactivateCategory, RenameCategory,
    };

    use crate::event_store::InMemoryEventStore;

    fn repo() -> AggregateRepository<Arc<InMemoryEventStore>> {
        AggregateRepository::new(Arc::new(InMemoryEventStore::new()))
    }

    fn add(id: CategoryId, name: &str) -> CategoryCommand {
        CategoryCommand::AddCategory(AddCategory {
            category_id: id,
            name: name.to_string(),
            description: None,
            sort_order: 1,
            occurred_at: Utc::now(),
        })
    }

    fn rename(id: CategoryId, name: &str) -> CategoryCommand {
        CategoryCommand::RenameCategory(RenameCategory {
            category_id: id,
            name: name.to_string(),
            occurred_at: Utc::now(),
        })
    }

    fn raw(id: CategoryId, seq: u64, event_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id: id.0,
            aggregate_type: "questionnaire.category".to_string(),
            event_type: event_type.to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({ "seq": seq }),
        }
    }

    #[test]
    fn empty_stream_is_not_found() {
        let repo = repo();
        let err = repo.load::<Category>(CategoryId::new(AggregateId::new())).unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[test]
    fn execute_then_load_round_trips() {
        let repo = repo();
        let id = CategoryId::new(AggregateId::new());

        repo.execute::<Category>(id, &add(id, "Delivery")).unwrap();
        repo.execute::<Category>(id, &rename(id, "Impact")).unwrap();

        let loaded = repo.load::<Category>(id).unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.aggregate.version(), 2);
        assert_eq!(loaded.aggregate.name(), "Impact");
    }

    #[test]
    fn domain_errors_surface_unchanged() {
        let repo = repo();
        let id = CategoryId::new(AggregateId::new());
        repo.execute::<Category>(id, &add(id, "Delivery")).unwrap();
        repo.execute::<Category>(
            id,
            &CategoryCommand::DeactivateCategory(DeactivateCategory {
                category_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let err = repo.execute::<Category>(id, &rename(id, "Impact")).unwrap_err();
        assert!(matches!(err, RepositoryError::Domain(DomainError::RuleViolation(_))));
        assert_eq!(repo.load::<Category>(id).unwrap().version, 2);
    }

    #[test]
    fn no_op_commands_append_nothing() {
        let repo = repo();
        let id = CategoryId::new(AggregateId::new());
        repo.execute::<Category>(id, &add(id, "Delivery")).unwrap();

        let committed = repo.execute::<Category>(id, &rename(id, "Delivery")).unwrap();
        assert!(committed.is_empty());
        assert_eq!(repo.load::<Category>(id).unwrap().version, 1);
    }

    #[test]
    fn unknown_event_types_are_corrupt_unless_skipped() {
        let repo = repo();
        let id = CategoryId::new(AggregateId::new());
        repo.execute::<Category>(id, &add(id, "Delivery")).unwrap();
        repo.store()
            .append(vec![raw(id, 2, "questionnaire.category.archived")], ExpectedVersion::Exact(1))
            .unwrap();

        let err = repo.load::<Category>(id).unwrap_err();
        assert!(matches!(err, RepositoryError::Corrupt { .. }));

        let loaded = repo.load_with::<Category>(id, UnknownEventPolicy::Skip).unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.aggregate.version(), 1);
        assert_eq!(loaded.aggregate.name(), "Delivery");
    }

    #[test]
    fn undecodable_payloads_are_corrupt() {
        let repo = repo();
        let id = CategoryId::new(AggregateId::new());
        repo.store()
            .append(vec![raw(id, 1, "questionnaire.category.added")], ExpectedVersion::Exact(0))
            .unwrap();

        let err = repo.load_with::<Category>(id, UnknownEventPolicy::Skip).unwrap_err();
        assert!(matches!(err, RepositoryError::Corrupt { .. }));
    }

    #[test]
    fn save_with_no_events_still_checks_the_version() {
        let repo = repo();
        let id = CategoryId::new(AggregateId::new());
        repo.execute::<Category>(id, &add(id, "Delivery")).unwrap();

        assert_eq!(repo.save::<Category>(id, ExpectedVersion::Exact(1), &[]).unwrap(), 1);
        let err = repo.save::<Category>(id, ExpectedVersion::Exact(0), &[]).unwrap_err();
        assert!(matches!(err, RepositoryError::ConcurrencyConflict { actual: 1, .. }));
    }

    #[test]
    fn conflicts_need_a_reload_rather_than_a_retry() {
        let repo = repo();
        let id = CategoryId::new(AggregateId::new());
        repo.execute::<Category>(id, &add(id, "Delivery")).unwrap();

        let err = repo.save::<Category>(id, ExpectedVersion::Exact(0), &[]).unwrap_err();
        assert!(!err.is_transient());
        assert!(repo.save::<Category>(id, ExpectedVersion::Exact(0), &[]).is_err());

        let outage = RepositoryError::from(EventStoreError::Unavailable("connection reset".into()));
        assert!(outage.is_transient());
        assert!(!RepositoryError::NotFound(id.into()).is_transient());
    }
}
