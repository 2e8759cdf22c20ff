use std::collections::HashMap;
use std::sync::RwLock;

use perfrev_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventLog, EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Default)]
struct Inner {
    /// The global log; `log[i].global_position == i + 1`.
    log: Vec<StoredEvent>,
    /// Per-stream indexes into `log`, in sequence order.
    streams: HashMap<AggregateId, Vec<usize>>,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> EventStoreError {
        EventStoreError::Unavailable("lock poisoned".to_string())
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };

        // All events must target the same stream.
        let aggregate_id = first.aggregate_id;
        let aggregate_type = first.aggregate_type.clone();

        for (idx, e) in events.iter().enumerate() {
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        let Inner { log, streams } = &mut *inner;

        let stream = streams.entry(aggregate_id).or_default();
        let current = stream.len() as u64;

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency {
                expected: expected_version,
                actual: current,
            });
        }

        // Enforce aggregate type stability across the stream.
        if let Some(&head) = stream.first() {
            let existing = &log[head].aggregate_type;
            if *existing != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{existing}', attempted append with '{aggregate_type}'"
                )));
            }
        }

        let mut committed = Vec::with_capacity(events.len());
        for (offset, e) in events.into_iter().enumerate() {
            let stored = StoredEvent {
                event_id: e.event_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: current + offset as u64 + 1,
                global_position: log.len() as u64 + 1,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            stream.push(log.len());
            log.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;

        Ok(inner
            .streams
            .get(&aggregate_id)
            .map(|indexes| indexes.iter().map(|&i| inner.log[i].clone()).collect())
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl EventLog for InMemoryEventStore {
    async fn read_global(
        &self,
        from_position: u64,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        let start = from_position.saturating_sub(1) as usize;

        Ok(inner.log.iter().skip(start).take(limit).cloned().collect())
    }

    async fn head_position(&self) -> Result<u64, EventStoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(inner.log.len() as u64)
    }
}
