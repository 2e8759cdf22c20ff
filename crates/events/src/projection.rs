use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::EventEnvelope;

/// Failure while folding an event into a read model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("failed to decode {event_type} payload: {message}")]
    Decode { event_type: String, message: String },

    #[error("read model store rejected write: {0}")]
    Store(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// A projection builds a read model from the append-only event log.
///
/// Projections implement the **CQRS read model pattern**: they transform events
/// (write model) into queryable state (read model).
///
/// ## Disposability
///
/// Read models are **disposable**: they can be cleared and rebuilt from the log
/// at any time (see the replay coordinator in `perfrev-infra`). Events are the
/// source of truth.
///
/// ## Idempotency
///
/// `apply` must be idempotent: applying the same envelope twice yields the same
/// read model. This keeps at-least-once delivery and replay safe.
///
/// ## Persistence
///
/// This trait doesn't define how read models are stored; implementations hold
/// their own store handle.
pub trait Projection: Send + Sync {
    /// Stable name of the read model this projection owns.
    fn name(&self) -> &str;

    /// Whether events of `aggregate_type` feed this projection.
    fn subscribes_to(&self, aggregate_type: &str) -> bool;

    /// Fold a single envelope into the read model.
    fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError>;

    /// Drop every record (and cursor) so the read model can be rebuilt.
    fn clear(&self) -> Result<(), ProjectionError>;
}
