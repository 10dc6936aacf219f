//! Password-sealed vault file backend.
//!
//! The whole vault is one JSON document sealed with XChaCha20-Poly1305 under an
//! Argon2id key. Each mutation re-seals the document with a fresh nonce and
//! replaces the file atomically, so a replace is a single write on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result, bail};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::Local;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use super::{AccessPolicy, SecureStorage, StoredKey};
use crate::crypto::{self, KEY_LEN, KdfParams, SALT_LEN};
use crate::error::BackendError;
use crate::format::{self, VaultFile};
use crate::key::{KeyFamily, KeyRole};
use crate::storage::Storage;

type Rows = BTreeMap<(String, KeyFamily), (StoredKey, AccessPolicy)>;

#[derive(Serialize, Deserialize)]
struct VaultDocument {
    created: String,
    entries: Vec<VaultRow>,
}

#[derive(Serialize, Deserialize)]
struct VaultRow {
    tag: String,
    family: KeyFamily,
    role: KeyRole,
    policy: AccessPolicy,
    der: String,
    updated: String,
}

impl Drop for VaultRow {
    fn drop(&mut self) {
        self.der.zeroize();
    }
}

struct VaultState {
    created: String,
    rows: Rows,
}

/// Summary shown by `rsakeep info`.
#[derive(Debug, Clone)]
pub struct VaultInfo {
    pub path: PathBuf,
    pub version: u8,
    pub kdf: KdfParams,
    pub entries: usize,
    pub created: String,
}

impl std::fmt::Display for VaultInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "path:    {}", self.path.display())?;
        writeln!(f, "format:  v{}", self.version)?;
        writeln!(f, "kdf:     {}", self.kdf)?;
        writeln!(f, "keys:    {}", self.entries)?;
        write!(f, "created: {}", self.created)
    }
}

pub struct VaultBackend {
    storage: Storage,
    kdf: KdfParams,
    salt: [u8; SALT_LEN],
    key: Zeroizing<[u8; KEY_LEN]>,
    state: RwLock<VaultState>,
}

impl Drop for VaultBackend {
    fn drop(&mut self) {
        self.salt.zeroize();
    }
}

impl VaultBackend {
    /// Creates an empty vault at `storage`. Fails if a file is already there.
    pub fn init(password: Zeroizing<String>, storage: Storage, kdf: KdfParams) -> Result<Self> {
        if storage.exists() {
            bail!("rsakeep vault already exists");
        }

        let salt = crypto::random_salt()?;
        let key = crypto::derive_key(&password, &salt, kdf)
            .context("failed to derive vault key")?;
        drop(password);

        let backend = Self {
            storage,
            kdf,
            salt,
            key,
            state: RwLock::new(VaultState {
                created: Local::now().to_string(),
                rows: Rows::new(),
            }),
        };

        {
            let state = backend.read_state().map_err(anyhow::Error::new)?;
            backend.persist(&state.created, &state.rows)?;
        }

        tracing::info!(path = %backend.storage.path().display(), "created vault");
        Ok(backend)
    }

    /// Unseals an existing vault.
    pub fn open(password: Zeroizing<String>, storage: Storage) -> Result<Self> {
        if !storage.exists() {
            bail!("rsakeep vault does not exist");
        }

        let file = format::parse(&storage.load()?)?;
        let key = crypto::derive_key(&password, file.salt(), *file.kdf())
            .context("failed to derive vault key")?;
        drop(password);

        let payload = crypto::open(&key, file.nonce(), file.sealed())?;
        let document: VaultDocument = serde_json::from_slice(&payload)
            .context("failed to decode vault; possibly wrong password or corrupted data")?;

        let mut rows = Rows::new();
        for row in &document.entries {
            let der = STANDARD
                .decode(&row.der)
                .with_context(|| format!("corrupted vault entry '{}'", row.tag))?;
            rows.insert(
                (row.tag.clone(), row.family),
                (
                    StoredKey::with_updated(row.role, Zeroizing::new(der), row.updated.clone()),
                    row.policy,
                ),
            );
        }

        tracing::debug!(
            path = %storage.path().display(),
            entries = rows.len(),
            "opened vault"
        );

        Ok(Self {
            storage,
            kdf: *file.kdf(),
            salt: *file.salt(),
            key,
            state: RwLock::new(VaultState {
                created: document.created.clone(),
                rows,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        self.storage.path()
    }

    pub fn info(&self) -> Result<VaultInfo> {
        let state = self.read_state()?;
        Ok(VaultInfo {
            path: self.storage.path().to_path_buf(),
            version: format::CURRENT_VERSION,
            kdf: self.kdf,
            entries: state.rows.len(),
            created: state.created.clone(),
        })
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, VaultState>, BackendError> {
        self.state
            .read()
            .map_err(|_| BackendError::Unavailable("vault lock poisoned".into()))
    }

    /// Runs `change` on a copy of the rows, seals and writes the copy, and only
    /// then makes it visible. A failed write leaves the vault untouched.
    fn mutate<F>(&self, change: F) -> Result<(), BackendError>
    where
        F: FnOnce(&mut Rows),
    {
        let mut state = self
            .state
            .write()
            .map_err(|_| BackendError::Unavailable("vault lock poisoned".into()))?;

        let mut next = state.rows.clone();
        change(&mut next);

        self.persist(&state.created, &next)
            .map_err(|e| BackendError::Write(format!("{e:#}")))?;

        state.rows = next;
        Ok(())
    }

    fn persist(&self, created: &str, rows: &Rows) -> Result<()> {
        let document = VaultDocument {
            created: created.to_string(),
            entries: rows
                .iter()
                .map(|((tag, family), (key, policy))| VaultRow {
                    tag: tag.clone(),
                    family: *family,
                    role: key.role(),
                    policy: *policy,
                    der: STANDARD.encode(key.der()),
                    updated: key.updated().to_string(),
                })
                .collect(),
        };

        let payload = Zeroizing::new(serde_json::to_vec(&document)?);
        let (sealed, nonce) = crypto::seal(&self.key, &payload)?;

        let file = VaultFile::new(self.kdf, self.salt, nonce, sealed);
        self.storage.save(&format::serialize(&file)?)?;
        Ok(())
    }
}

impl SecureStorage for VaultBackend {
    fn put(
        &self,
        tag: &str,
        family: KeyFamily,
        key: StoredKey,
        policy: AccessPolicy,
    ) -> Result<(), BackendError> {
        self.mutate(|rows| {
            rows.insert((tag.to_string(), family), (key, policy));
        })
    }

    fn get(&self, tag: &str, family: KeyFamily) -> Result<Option<StoredKey>, BackendError> {
        Ok(self
            .read_state()?
            .rows
            .get(&(tag.to_string(), family))
            .map(|(key, _)| key.clone()))
    }

    fn delete(&self, tag: &str, family: KeyFamily) -> Result<(), BackendError> {
        let address = (tag.to_string(), family);
        if !self.read_state()?.rows.contains_key(&address) {
            return Ok(());
        }
        self.mutate(|rows| {
            rows.remove(&address);
        })
    }

    fn enumerate(&self, family: KeyFamily) -> Result<Vec<String>, BackendError> {
        Ok(self
            .read_state()?
            .rows
            .keys()
            .filter(|(_, f)| *f == family)
            .map(|(tag, _)| tag.clone())
            .collect())
    }

    fn replace(
        &self,
        tag: &str,
        family: KeyFamily,
        key: StoredKey,
        policy: AccessPolicy,
    ) -> Result<(), BackendError> {
        self.mutate(|rows| {
            let address = (tag.to_string(), family);
            rows.remove(&address);
            rows.insert(address, (key, policy));
        })
    }
}
