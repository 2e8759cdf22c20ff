use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use perfrev_core::{AggregateId, ExpectedVersion};
use std::sync::Arc;

/// An event ready to be appended to a stream (not yet assigned a sequence number).
///
/// ## Event Lifecycle
///
/// 1. **Domain event**: Created by an aggregate's `handle()` method
/// 2. **UncommittedEvent**: Wrapped with stream metadata (aggregate_id, aggregate_type)
/// 3. **StoredEvent**: Persisted with an assigned `sequence_number` and `global_position`
/// 4. **EventEnvelope**: Handed to projections (live or during replay)
///
/// Use `UncommittedEvent::from_typed()` to build one from a typed domain event:
/// it serializes the payload and captures the metadata needed to decode it later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A stored event in an append-only stream.
///
/// ## Positions
///
/// - `sequence_number`: per stream, starts at 1, no gaps. Drives optimistic concurrency.
/// - `global_position`: store-wide, starts at 1, strictly increasing. Drives replay.
///
/// Both are assigned by the store during append and never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    pub sequence_number: u64,
    /// Monotonically increasing position in the global log.
    pub global_position: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert a stored event into the envelope projections consume.
    pub fn to_envelope(&self) -> perfrev_events::EventEnvelope<JsonValue> {
        perfrev_events::EventEnvelope::new(
            self.event_id,
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.event_type.clone(),
            self.sequence_number,
            self.global_position,
            self.payload.clone(),
        )
    }
}

/// Event store operation error.
///
/// These are **infrastructure errors** (storage, concurrency) as opposed to
/// domain errors (validation, invariants).
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed (expected: {expected:?}, actual: {actual})")]
    Concurrency {
        expected: ExpectedVersion,
        actual: u64,
    },

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("event store unavailable: {0}")]
    Unavailable(String),
}

impl EventStoreError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, EventStoreError::Unavailable(_))
    }
}

/// Append-only event store.
///
/// ## Design Principles
///
/// - **No storage assumptions**: in-memory for tests/dev, SQL backends elsewhere
/// - **Optimistic locking**: via `ExpectedVersion`
/// - **Append-only**: events are never modified or deleted
///
/// ## Append Semantics
///
/// `append()`:
/// - Validates aggregate scoping (all events must target the same stream)
/// - Checks optimistic concurrency (version must match expected)
/// - Assigns sequence numbers (starting at current_version + 1) and global positions
/// - Persists events atomically (all or nothing)
///
/// ## Load Semantics
///
/// `load_stream()` returns the stream in sequence order, or an empty vector if
/// the stream doesn't exist.
pub trait EventStore: Send + Sync {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(aggregate_id)
    }
}

/// Ordered, store-wide read access used by replay.
#[async_trait::async_trait]
pub trait EventLog: Send + Sync {
    /// Up to `limit` events with `global_position >= from_position`, ascending.
    async fn read_global(
        &self,
        from_position: u64,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Position of the newest event (0 for an empty log).
    async fn head_position(&self) -> Result<u64, EventStoreError>;
}

#[async_trait::async_trait]
impl<L> EventLog for Arc<L>
where
    L: EventLog + ?Sized,
{
    async fn read_global(
        &self,
        from_position: u64,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).read_global(from_position, limit).await
    }

    async fn head_position(&self) -> Result<u64, EventStoreError> {
        (**self).head_position().await
    }
}

impl UncommittedEvent {
    /// Convenience constructor from a typed domain event.
    pub fn from_typed<E>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: perfrev_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidAppend(format!("payload serialization failed: {e}"))
        })?;

        Ok(Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}
