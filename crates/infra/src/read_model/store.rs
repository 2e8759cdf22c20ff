use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadModelError {
    #[error("read model store unavailable: {0}")]
    Unavailable(String),
}

/// Key/value store for disposable read models, partitioned by projection name.
///
/// Everything in here can be cleared and rebuilt from the event log.
pub trait ReadModelStore<K, V>: Send + Sync {
    fn get(&self, projection: &str, key: &K) -> Option<V>;
    fn upsert(&self, projection: &str, key: K, value: V) -> Result<(), ReadModelError>;
    /// All records of a projection, in key order.
    fn list(&self, projection: &str) -> Vec<V>;
    /// Drop every record of a projection (rebuild support).
    fn clear(&self, projection: &str) -> Result<(), ReadModelError>;
}

impl<K, V, S> ReadModelStore<K, V> for Arc<S>
where
    S: ReadModelStore<K, V> + ?Sized,
{
    fn get(&self, projection: &str, key: &K) -> Option<V> {
        (**self).get(projection, key)
    }

    fn upsert(&self, projection: &str, key: K, value: V) -> Result<(), ReadModelError> {
        (**self).upsert(projection, key, value)
    }

    fn list(&self, projection: &str) -> Vec<V> {
        (**self).list(projection)
    }

    fn clear(&self, projection: &str) -> Result<(), ReadModelError> {
        (**self).clear(projection)
    }
}

/// In-memory read model store for tests/dev.
#[derive(Debug)]
pub struct InMemoryReadModelStore<K, V> {
    inner: RwLock<BTreeMap<String, BTreeMap<K, V>>>,
}

impl<K, V> InMemoryReadModelStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
        }
    }

    fn poisoned() -> ReadModelError {
        ReadModelError::Unavailable("lock poisoned".to_string())
    }
}

impl<K, V> Default for InMemoryReadModelStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ReadModelStore<K, V> for InMemoryReadModelStore<K, V>
where
    K: Clone + Ord + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, projection: &str, key: &K) -> Option<V> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(projection)?.get(key).cloned()
    }

    fn upsert(&self, projection: &str, key: K, value: V) -> Result<(), ReadModelError> {
        let mut map = self.inner.write().map_err(|_| Self::poisoned())?;
        map.entry(projection.to_string()).or_default().insert(key, value);
        Ok(())
    }

    fn list(&self, projection: &str) -> Vec<V> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);

        map.get(projection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    fn clear(&self, projection: &str) -> Result<(), ReadModelError> {
        let mut map = self.inner.write().map_err(|_| Self::poisoned())?;
        map.remove(projection);
        Ok(())
    }
}
