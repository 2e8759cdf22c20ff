//! Per-stream projection cursors.
//!
//! A cursor is the last `sequence_number` a projection folded for one
//! aggregate stream. It makes projections idempotent (redelivered events at or
//! below the cursor are ignored) and catches gaps in delivery.

use std::collections::HashMap;
use std::sync::RwLock;

use perfrev_core::AggregateId;
use perfrev_events::ProjectionError;

#[derive(Debug, Default)]
pub struct StreamCursors {
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, aggregate_id: AggregateId) -> Result<u64, ProjectionError> {
        let cursors = self.cursors.read().map_err(|_| Self::poisoned())?;
        Ok(cursors.get(&aggregate_id).copied().unwrap_or(0))
    }

    /// `Ok(true)` if `seq` is the next event to fold, `Ok(false)` if it was
    /// already folded.
    pub fn admit(&self, aggregate_id: AggregateId, seq: u64) -> Result<bool, ProjectionError> {
        let last = self.get(aggregate_id)?;
        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(false);
        }
        if seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        Ok(true)
    }

    pub fn advance(&self, aggregate_id: AggregateId, seq: u64) -> Result<(), ProjectionError> {
        self.cursors
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(aggregate_id, seq);
        Ok(())
    }

    pub fn clear(&self) -> Result<(), ProjectionError> {
        self.cursors.write().map_err(|_| Self::poisoned())?.clear();
        Ok(())
    }

    fn poisoned() -> ProjectionError {
        ProjectionError::Store("projection cursor lock poisoned".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_only_the_next_sequence() {
        let cursors = StreamCursors::new();
        let id = AggregateId::new();

        assert!(cursors.admit(id, 1).unwrap());
        cursors.advance(id, 1).unwrap();

        assert!(!cursors.admit(id, 1).unwrap());
        assert!(cursors.admit(id, 2).unwrap());
        assert!(matches!(
            cursors.admit(id, 3),
            Err(ProjectionError::NonMonotonicSequence { last: 1, found: 3 })
        ));
    }

    #[test]
    fn streams_start_at_one() {
        let cursors = StreamCursors::new();
        let id = AggregateId::new();
        assert!(cursors.admit(id, 0).is_err());
        assert!(cursors.admit(id, 2).is_err());
    }

    #[test]
    fn poisoned_cursors_fail_instead_of_reading_zero() {
        let cursors = std::sync::Arc::new(StreamCursors::new());
        let id = AggregateId::new();
        cursors.advance(id, 1).unwrap();

        let held = std::sync::Arc::clone(&cursors);
        let _ = std::thread::spawn(move || {
            let _guard = held.cursors.write().unwrap();
            panic!("writer died");
        })
        .join();

        assert!(matches!(cursors.admit(id, 2), Err(ProjectionError::Store(_))));
        assert!(cursors.advance(id, 2).is_err());
        assert!(cursors.clear().is_err());
    }
}
