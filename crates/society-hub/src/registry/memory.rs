use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{RegistryRecord, RegistryRepository, SocietyId};
use crate::polls::RepositoryError;

/// Process-local table keyed by record id.
pub struct InMemoryRegistry<T: RegistryRecord> {
    rows: Arc<Mutex<BTreeMap<T::Id, T>>>,
}

impl<T: RegistryRecord> Default for InMemoryRegistry<T> {
    fn default() -> Self {
        Self {
            rows: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

impl<T: RegistryRecord> Clone for InMemoryRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            rows: self.rows.clone(),
        }
    }
}

impl<T: RegistryRecord> InMemoryRegistry<T> {
    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<T::Id, T>>, RepositoryError> {
        self.rows
            .lock()
            .map_err(|_| RepositoryError::Unavailable("registry mutex poisoned".to_string()))
    }
}

impl<T: RegistryRecord> RegistryRepository<T> for InMemoryRegistry<T> {
    fn insert(&self, record: T) -> Result<T, RepositoryError> {
        let mut rows = self.lock()?;
        if rows.contains_key(record.id()) {
            return Err(RepositoryError::Conflict);
        }
        rows.insert(record.id().clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: T) -> Result<T, RepositoryError> {
        let mut rows = self.lock()?;
        let slot = rows.get_mut(record.id()).ok_or(RepositoryError::NotFound)?;
        *slot = record.clone();
        Ok(record)
    }

    fn fetch(&self, id: &T::Id) -> Result<Option<T>, RepositoryError> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn list(&self, society_id: &SocietyId) -> Result<Vec<T>, RepositoryError> {
        Ok(self
            .lock()?
            .values()
            .filter(|record| record.society_id() == society_id)
            .cloned()
            .collect())
    }

    fn all(&self) -> Result<Vec<T>, RepositoryError> {
        Ok(self.lock()?.values().cloned().collect())
    }

    fn remove(&self, id: &T::Id) -> Result<(), RepositoryError> {
        self.lock()?
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }
}
