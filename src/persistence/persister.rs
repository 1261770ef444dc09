use std::marker::PhantomData;

use dashmap::DashMap;

use crate::errors::PersistenceError;
use crate::persistence::types::StateRecord;

/// Storage for one kind of dehydrated state, keyed by record key.
///
/// `save` is idempotent. `all_ids` is not a point-in-time view when writers
/// run concurrently.
pub trait StatePersister<S: StateRecord>: Send + Sync {
    fn save(&self, state: &S) -> Result<(), PersistenceError>;

    fn get(&self, id: &str) -> Result<S, PersistenceError>;

    fn exists(&self, id: &str) -> Result<bool, PersistenceError>;

    fn remove(&self, id: &str) -> Result<(), PersistenceError>;

    fn all_ids(&self) -> Result<Vec<String>, PersistenceError>;
}

pub(crate) fn not_found<S: StateRecord>(id: &str) -> PersistenceError {
    PersistenceError::NotFound {
        kind: S::KIND,
        id: id.to_string(),
    }
}

// ==========================================
// IN-MEMORY
// ==========================================

pub struct MemoryPersister<S> {
    records: DashMap<String, S>,
    _kind: PhantomData<fn() -> S>,
}

impl<S: StateRecord> MemoryPersister<S> {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            _kind: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<S: StateRecord> Default for MemoryPersister<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StateRecord> StatePersister<S> for MemoryPersister<S> {
    fn save(&self, state: &S) -> Result<(), PersistenceError> {
        self.records.insert(state.record_key(), state.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<S, PersistenceError> {
        self.records
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| not_found::<S>(id))
    }

    fn exists(&self, id: &str) -> Result<bool, PersistenceError> {
        Ok(self.records.contains_key(id))
    }

    fn remove(&self, id: &str) -> Result<(), PersistenceError> {
        self.records
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found::<S>(id))
    }

    fn all_ids(&self) -> Result<Vec<String>, PersistenceError> {
        let mut ids: Vec<String> = self.records.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}
