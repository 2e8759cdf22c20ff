//! Append-only event store boundary.
//!
//! This module defines an infrastructure-facing abstraction for storing and
//! loading event streams without making any storage assumptions, plus the
//! ordered global read used to rebuild read models.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventLog, EventStore, EventStoreError, StoredEvent, UncommittedEvent};
