//! Secure-storage backends.
//!
//! The key store talks to persisted key material only through [`SecureStorage`].
//! Two implementations ship with the crate:
//! - `MemoryBackend`: process-local map, used by tests and ephemeral sessions
//! - `VaultBackend`: password-sealed vault file on disk

mod memory;
mod vault;

pub use memory::MemoryBackend;
pub use vault::{VaultBackend, VaultInfo};

use crate::error::BackendError;
use crate::key::{KeyFamily, KeyRole};
use chrono::Local;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// When a stored key may be read back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessPolicy {
    #[default]
    AfterFirstUnlock,
    WhenUnlocked,
}

/// One persisted key row, keyed externally by `(tag, family)`.
#[derive(Clone)]
pub struct StoredKey {
    role: KeyRole,
    der: Zeroizing<Vec<u8>>,
    updated: String,
}

impl StoredKey {
    pub fn new(role: KeyRole, der: Zeroizing<Vec<u8>>) -> Self {
        Self {
            role,
            der,
            updated: Local::now().to_string(),
        }
    }

    pub(crate) fn with_updated(role: KeyRole, der: Zeroizing<Vec<u8>>, updated: String) -> Self {
        Self { role, der, updated }
    }

    pub fn role(&self) -> KeyRole {
        self.role
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn updated(&self) -> &str {
        &self.updated
    }
}

impl std::fmt::Debug for StoredKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredKey")
            .field("role", &self.role)
            .field("len", &self.der.len())
            .field("updated", &self.updated)
            .finish()
    }
}

/// Tag-level listing row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub tag: String,
    pub role: KeyRole,
    pub updated: String,
}

/// Durable, access-controlled key-value store for key material.
///
/// Rows are addressed by `(tag, family)` alone. Implementations must be safe for
/// concurrent readers and must serialize writers touching the same tag.
pub trait SecureStorage: Send + Sync {
    /// Insert a row. An existing row under the same address is overwritten.
    fn put(
        &self,
        tag: &str,
        family: KeyFamily,
        key: StoredKey,
        policy: AccessPolicy,
    ) -> Result<(), BackendError>;

    /// Fetch a row, `Ok(None)` when absent.
    fn get(&self, tag: &str, family: KeyFamily) -> Result<Option<StoredKey>, BackendError>;

    /// Remove a row. Removing an absent row succeeds.
    fn delete(&self, tag: &str, family: KeyFamily) -> Result<(), BackendError>;

    /// All tags filed under `family`, in no particular order.
    fn enumerate(&self, family: KeyFamily) -> Result<Vec<String>, BackendError>;

    /// Delete-then-insert.
    ///
    /// The default leaves a window in which the tag is absent; backends able to
    /// swap the row in one step should override it.
    fn replace(
        &self,
        tag: &str,
        family: KeyFamily,
        key: StoredKey,
        policy: AccessPolicy,
    ) -> Result<(), BackendError> {
        self.delete(tag, family)?;
        self.put(tag, family, key, policy)
    }

    /// Tag, role and last update of every row under `family`.
    fn entries(&self, family: KeyFamily) -> Result<Vec<EntryInfo>, BackendError> {
        let mut out = Vec::new();
        for tag in self.enumerate(family)? {
            if let Some(row) = self.get(&tag, family)? {
                out.push(EntryInfo {
                    role: row.role(),
                    updated: row.updated().to_string(),
                    tag,
                });
            }
        }
        Ok(out)
    }
}
