use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use perfrev_core::{Aggregate, DomainError};
use perfrev_events::EventEnvelope;

use crate::directory::{DirectoryError, EmployeeDirectory};
use crate::employee::Employee;
use crate::hierarchy::HierarchyIndex;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HierarchyCacheError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("hierarchy index rejected directory data: {0}")]
    Index(#[from] DomainError),

    #[error("hierarchy cache lock poisoned")]
    Poisoned,
}

#[derive(Debug)]
struct CachedIndex {
    index: Arc<HierarchyIndex>,
    built_at: Instant,
}

/// Read-mostly cache of the hierarchy index.
///
/// Readers get a shared `Arc<HierarchyIndex>`; the index is rebuilt from the
/// directory once it is older than `max_staleness` or has been invalidated.
#[derive(Debug)]
pub struct HierarchyCache<D> {
    directory: D,
    max_staleness: Duration,
    state: RwLock<Option<CachedIndex>>,
}

impl<D> HierarchyCache<D>
where
    D: EmployeeDirectory,
{
    pub fn new(directory: D, max_staleness: Duration) -> Self {
        Self {
            directory,
            max_staleness,
            state: RwLock::new(None),
        }
    }

    pub fn max_staleness(&self) -> Duration {
        self.max_staleness
    }

    pub fn resolver(&self) -> Result<Arc<HierarchyIndex>, HierarchyCacheError> {
        self.resolver_at(Instant::now())
    }

    /// Same as `resolver`, with the clock supplied by the caller.
    pub fn resolver_at(&self, now: Instant) -> Result<Arc<HierarchyIndex>, HierarchyCacheError> {
        {
            let state = self.state.read().map_err(|_| HierarchyCacheError::Poisoned)?;
            if let Some(cached) = state.as_ref() {
                if now.saturating_duration_since(cached.built_at) <= self.max_staleness {
                    return Ok(Arc::clone(&cached.index));
                }
            }
        }

        self.rebuild(now)
    }

    /// Rebuild unconditionally.
    pub fn refresh(&self) -> Result<Arc<HierarchyIndex>, HierarchyCacheError> {
        self.rebuild(Instant::now())
    }

    /// Drop the cached index. A poisoned lock is recovered: an empty cache is
    /// always a consistent state, and the next reader rebuilds.
    pub fn invalidate(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = None;
        drop(state);
        self.state.clear_poison();
    }

    /// Drop the cached index when an employee event passes by.
    pub fn observe(&self, envelope: &EventEnvelope<JsonValue>) {
        if envelope.aggregate_type() == Employee::AGGREGATE_TYPE {
            debug!(
                event_type = %envelope.event_type(),
                aggregate_id = %envelope.aggregate_id(),
                "invalidating hierarchy cache"
            );
            self.invalidate();
        }
    }

    fn rebuild(&self, now: Instant) -> Result<Arc<HierarchyIndex>, HierarchyCacheError> {
        let edges = self.directory.manager_edges()?;
        let index = Arc::new(HierarchyIndex::from_edges(edges)?);

        let mut state = self.state.write().map_err(|_| HierarchyCacheError::Poisoned)?;
        *state = Some(CachedIndex {
            index: Arc::clone(&index),
            built_at: now,
        });

        debug!(edges = index.edge_count(), "hierarchy index rebuilt");
        Ok(index)
    }
}
