//! In-memory backend.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{AccessPolicy, SecureStorage, StoredKey};
use crate::error::BackendError;
use crate::key::KeyFamily;

type Rows = BTreeMap<(String, KeyFamily), (StoredKey, AccessPolicy)>;

/// Thread-safe map of `(tag, family)` to key rows. Nothing survives the process.
#[derive(Default)]
pub struct MemoryBackend {
    rows: RwLock<Rows>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows across all families.
    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Rows>, BackendError> {
        self.rows
            .read()
            .map_err(|_| BackendError::Unavailable("memory backend lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Rows>, BackendError> {
        self.rows
            .write()
            .map_err(|_| BackendError::Unavailable("memory backend lock poisoned".into()))
    }
}

impl SecureStorage for MemoryBackend {
    fn put(
        &self,
        tag: &str,
        family: KeyFamily,
        key: StoredKey,
        policy: AccessPolicy,
    ) -> Result<(), BackendError> {
        self.write()?.insert((tag.to_string(), family), (key, policy));
        Ok(())
    }

    fn get(&self, tag: &str, family: KeyFamily) -> Result<Option<StoredKey>, BackendError> {
        Ok(self
            .read()?
            .get(&(tag.to_string(), family))
            .map(|(key, _)| key.clone()))
    }

    fn delete(&self, tag: &str, family: KeyFamily) -> Result<(), BackendError> {
        self.write()?.remove(&(tag.to_string(), family));
        Ok(())
    }

    fn enumerate(&self, family: KeyFamily) -> Result<Vec<String>, BackendError> {
        Ok(self
            .read()?
            .keys()
            .filter(|(_, f)| *f == family)
            .map(|(tag, _)| tag.clone())
            .collect())
    }

    // Both steps happen under one write guard, so readers never see the tag missing.
    fn replace(
        &self,
        tag: &str,
        family: KeyFamily,
        key: StoredKey,
        policy: AccessPolicy,
    ) -> Result<(), BackendError> {
        let mut rows = self.write()?;
        let address = (tag.to_string(), family);
        rows.remove(&address);
        rows.insert(address, (key, policy));
        Ok(())
    }
}
