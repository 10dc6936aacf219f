//! Tag-addressed key store over an injected [`SecureStorage`] backend.

use std::sync::Arc;

use crate::backend::{AccessPolicy, EntryInfo, SecureStorage, StoredKey};
use crate::error::{BackendError, StoreError};
use crate::key::{KeyFamily, KeyMaterial};

/// Maps caller-chosen tags to RSA key material.
///
/// Every row lives at `(tag, KeyFamily::Rsa2048)`; the role travels with the row
/// and plays no part in addressing, so one tag holds at most one key.
#[derive(Clone)]
pub struct KeyStore {
    backend: Arc<dyn SecureStorage>,
    family: KeyFamily,
    policy: AccessPolicy,
}

impl KeyStore {
    pub fn new(backend: Arc<dyn SecureStorage>) -> Self {
        Self {
            backend,
            family: KeyFamily::Rsa2048,
            policy: AccessPolicy::default(),
        }
    }

    /// Access policy recorded on rows written from now on.
    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// `true` iff a key is stored under `tag`. A backend read error counts as absent.
    pub fn exists(&self, tag: &str) -> bool {
        match self.backend.get(tag, self.family) {
            Ok(row) => row.is_some(),
            Err(e) => {
                tracing::warn!(tag, error = %e, "existence check failed");
                false
            }
        }
    }

    /// Stores `key` under `tag`, replacing whatever was there.
    ///
    /// The swap goes through [`SecureStorage::replace`]; with the bundled backends
    /// no reader ever sees the tag missing because of it.
    pub fn store(&self, tag: &str, key: &KeyMaterial) -> Result<(), StoreError> {
        let der = key.to_der().map_err(|e| StoreError::StorageWriteFailed {
            tag: tag.to_string(),
            source: BackendError::Write(format!("{e:#}")),
        })?;

        self.backend
            .replace(tag, self.family, StoredKey::new(key.role(), der), self.policy)
            .map_err(|source| StoreError::StorageWriteFailed {
                tag: tag.to_string(),
                source,
            })?;

        tracing::info!(tag, role = %key.role(), "stored key");
        Ok(())
    }

    /// Raw row under `tag`, kept aside so a later write can be undone.
    pub(crate) fn snapshot(&self, tag: &str) -> Result<Option<StoredKey>, StoreError> {
        self.backend
            .get(tag, self.family)
            .map_err(|source| StoreError::StorageReadFailed {
                tag: tag.to_string(),
                source,
            })
    }

    /// Puts back a row taken by [`snapshot`](Self::snapshot); `None` removes the tag.
    pub(crate) fn restore(&self, tag: &str, previous: Option<StoredKey>) -> Result<(), StoreError> {
        let result = match previous {
            Some(row) => self.backend.replace(tag, self.family, row, self.policy),
            None => self.backend.delete(tag, self.family),
        };

        result.map_err(|source| StoreError::StorageWriteFailed {
            tag: tag.to_string(),
            source,
        })?;

        tracing::info!(tag, "restored previous key row");
        Ok(())
    }

    pub fn load(&self, tag: &str) -> Result<KeyMaterial, StoreError> {
        let row = self
            .backend
            .get(tag, self.family)
            .map_err(|source| StoreError::StorageReadFailed {
                tag: tag.to_string(),
                source,
            })?
            .ok_or_else(|| StoreError::KeyNotFound(tag.to_string()))?;

        let key = KeyMaterial::from_der(row.role(), row.der()).map_err(|e| {
            StoreError::MalformedEntry {
                tag: tag.to_string(),
                reason: format!("{e:#}"),
            }
        })?;

        tracing::debug!(tag, role = %key.role(), "loaded key");
        Ok(key)
    }

    /// Every stored tag, unordered. Listing is advisory: a backend failure is
    /// logged and yields an empty list.
    pub fn list_tags(&self) -> Vec<String> {
        self.backend.enumerate(self.family).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to enumerate keys");
            Vec::new()
        })
    }

    /// Like [`list_tags`](Self::list_tags) but with role and last update.
    pub fn list_entries(&self) -> Vec<EntryInfo> {
        self.backend.entries(self.family).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to enumerate keys");
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::key::{KeyRole, MODULUS_LEN};
    use rand::rngs::OsRng;
    use rsa::RsaPrivateKey;
    use std::sync::OnceLock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use zeroize::Zeroizing;

    fn private_key(slot: usize) -> KeyMaterial {
        static KEYS: OnceLock<Vec<RsaPrivateKey>> = OnceLock::new();
        let keys = KEYS.get_or_init(|| {
            (0..2)
                .map(|_| RsaPrivateKey::new(&mut OsRng, 2048).unwrap())
                .collect()
        });
        KeyMaterial::Private(keys[slot].clone())
    }

    fn store() -> (Arc<MemoryBackend>, KeyStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = KeyStore::new(backend.clone());
        (backend, store)
    }

    /// Backend whose every call fails.
    struct BrokenBackend;

    impl SecureStorage for BrokenBackend {
        fn put(
            &self,
            _: &str,
            _: KeyFamily,
            _: StoredKey,
            _: AccessPolicy,
        ) -> Result<(), BackendError> {
            Err(BackendError::Write("keychain rejected attributes".into()))
        }

        fn get(&self, _: &str, _: KeyFamily) -> Result<Option<StoredKey>, BackendError> {
            Err(BackendError::Read("keychain locked".into()))
        }

        fn delete(&self, _: &str, _: KeyFamily) -> Result<(), BackendError> {
            Err(BackendError::Write("keychain rejected attributes".into()))
        }

        fn enumerate(&self, _: KeyFamily) -> Result<Vec<String>, BackendError> {
            Err(BackendError::Read("keychain locked".into()))
        }
    }

    /// Memory backend that counts reads.
    #[derive(Default)]
    struct CountingBackend {
        inner: MemoryBackend,
        reads: AtomicUsize,
    }

    impl SecureStorage for CountingBackend {
        fn put(
            &self,
            tag: &str,
            family: KeyFamily,
            key: StoredKey,
            policy: AccessPolicy,
        ) -> Result<(), BackendError> {
            self.inner.put(tag, family, key, policy)
        }

        fn get(&self, tag: &str, family: KeyFamily) -> Result<Option<StoredKey>, BackendError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get(tag, family)
        }

        fn delete(&self, tag: &str, family: KeyFamily) -> Result<(), BackendError> {
            self.inner.delete(tag, family)
        }

        fn enumerate(&self, family: KeyFamily) -> Result<Vec<String>, BackendError> {
            self.inner.enumerate(family)
        }

        fn replace(
            &self,
            tag: &str,
            family: KeyFamily,
            key: StoredKey,
            policy: AccessPolicy,
        ) -> Result<(), BackendError> {
            self.inner.replace(tag, family, key, policy)
        }
    }

    #[test]
    fn store_then_load() {
        let (_, store) = store();
        let key = private_key(0);

        store.store("priv1", &key).unwrap();

        assert!(store.exists("priv1"));
        let loaded = store.load("priv1").unwrap();
        assert_eq!(loaded, key);
        assert_eq!(loaded.role(), KeyRole::Private);
        assert_eq!(loaded.size(), MODULUS_LEN);
    }

    #[test]
    fn public_half_keeps_its_role() {
        let (_, store) = store();
        let public = KeyMaterial::Public(private_key(0).public_key());

        store.store("pub1", &public).unwrap();
        assert_eq!(store.load("pub1").unwrap().role(), KeyRole::Public);
    }

    #[test]
    fn load_missing_tag_is_key_not_found() {
        let (_, store) = store();
        match store.load("nonexistent") {
            Err(StoreError::KeyNotFound(tag)) => assert_eq!(tag, "nonexistent"),
            other => panic!("expected KeyNotFound, got: {other:?}"),
        }
        assert!(!store.exists("nonexistent"));
    }

    #[test]
    fn storing_again_replaces_the_key() {
        let (backend, store) = store();
        let k1 = private_key(0);
        let k2 = private_key(1);

        store.store("tag", &k1).unwrap();
        store.store("tag", &k2).unwrap();

        let loaded = store.load("tag").unwrap();
        assert_eq!(loaded, k2);
        assert_ne!(loaded, k1);
        assert_eq!(backend.len(), 1);
        assert_eq!(store.list_tags(), vec!["tag".to_string()]);
    }

    #[test]
    fn replacing_can_change_role() {
        let (_, store) = store();
        let private = private_key(0);

        store.store("t", &private).unwrap();
        store
            .store("t", &KeyMaterial::Public(private.public_key()))
            .unwrap();

        assert_eq!(store.load("t").unwrap().role(), KeyRole::Public);
        assert_eq!(store.list_entries().len(), 1);
    }

    #[test]
    fn garbage_row_is_malformed_entry() {
        let (backend, store) = store();
        backend
            .put(
                "bad",
                KeyFamily::Rsa2048,
                StoredKey::new(KeyRole::Private, Zeroizing::new(vec![0u8; 32])),
                AccessPolicy::default(),
            )
            .unwrap();

        assert!(store.exists("bad"));
        match store.load("bad") {
            Err(StoreError::MalformedEntry { tag, .. }) => assert_eq!(tag, "bad"),
            other => panic!("expected MalformedEntry, got: {other:?}"),
        }
    }

    #[test]
    fn role_mismatch_in_row_is_malformed_entry() {
        let (backend, store) = store();
        let der = private_key(0).to_der().unwrap();
        backend
            .put(
                "mixed",
                KeyFamily::Rsa2048,
                StoredKey::new(KeyRole::Public, der),
                AccessPolicy::default(),
            )
            .unwrap();

        assert!(matches!(
            store.load("mixed"),
            Err(StoreError::MalformedEntry { .. })
        ));
    }

    #[test]
    fn broken_backend_maps_to_storage_errors() {
        let store = KeyStore::new(Arc::new(BrokenBackend));

        assert!(matches!(
            store.store("t", &private_key(0)),
            Err(StoreError::StorageWriteFailed { .. })
        ));
        assert!(matches!(
            store.load("t"),
            Err(StoreError::StorageReadFailed { .. })
        ));
        assert!(!store.exists("t"));
    }

    #[test]
    fn store_does_not_read_the_backend() {
        let backend = Arc::new(CountingBackend::default());
        let store = KeyStore::new(backend.clone());

        store.store("t", &private_key(0)).unwrap();
        store.store("t", &private_key(1)).unwrap();

        assert_eq!(backend.reads.load(Ordering::SeqCst), 0);
        assert_eq!(store.load("t").unwrap(), private_key(1));
    }

    #[test]
    fn restore_puts_back_or_removes() {
        let (_, store) = store();
        store.store("t", &private_key(0)).unwrap();
        let previous = store.snapshot("t").unwrap();

        store.store("t", &private_key(1)).unwrap();
        store.restore("t", previous).unwrap();
        assert_eq!(store.load("t").unwrap(), private_key(0));

        store.restore("t", None).unwrap();
        assert!(!store.exists("t"));
    }

    #[test]
    fn listing_is_advisory() {
        let store = KeyStore::new(Arc::new(BrokenBackend));
        assert!(store.list_tags().is_empty());
        assert!(store.list_entries().is_empty());
    }

    #[test]
    fn list_tags_has_no_duplicates_after_restore() {
        let (_, store) = store();
        let private = private_key(0);
        let public = KeyMaterial::Public(private.public_key());

        store.store("a.public", &public).unwrap();
        store.store("a.private", &private).unwrap();
        store.store("a.public", &public).unwrap();

        let mut tags = store.list_tags();
        tags.sort();
        assert_eq!(tags, vec!["a.private".to_string(), "a.public".to_string()]);
    }

    #[test]
    fn policy_is_configurable() {
        let (_, store) = store();
        let store = store.with_policy(AccessPolicy::WhenUnlocked);
        store.store("p", &private_key(0)).unwrap();
        assert!(store.exists("p"));
    }
}
