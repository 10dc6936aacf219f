//! rsakeep: RSA key pairs kept under tags, with RSA-OAEP-SHA256 encryption.
//!
//! A [`CryptoEngine`] generates 2048-bit pairs and encrypts or decrypts raw bytes
//! with keys it resolves by tag through a [`KeyStore`]. The store writes through
//! an injected [`SecureStorage`] backend: [`MemoryBackend`] for tests and
//! throwaway sessions, [`VaultBackend`] for a password-sealed file on disk.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rsakeep::{CryptoEngine, KeyStore, MemoryBackend};
//!
//! # fn main() -> Result<(), rsakeep::CryptoError> {
//! let engine = CryptoEngine::new(KeyStore::new(Arc::new(MemoryBackend::new())));
//! engine.generate_and_store("pub1", "priv1")?;
//!
//! let ciphertext = engine.encrypt(b"hello world", "pub1")?;
//! assert_eq!(engine.decrypt(&ciphertext, "priv1")?, b"hello world");
//! # Ok(())
//! # }
//! ```

pub mod backend;
mod crypto;
mod engine;
mod error;
mod format;
mod key;
mod keystore;
mod storage;

pub use crate::backend::{
    AccessPolicy, EntryInfo, MemoryBackend, SecureStorage, StoredKey, VaultBackend, VaultInfo,
};
pub use crate::crypto::KdfParams;
pub use crate::engine::{CryptoEngine, MAX_PLAINTEXT_LEN, OAEP_HASH_LEN, capacity};
pub use crate::error::{BackendError, CryptoError, StoreError};
pub use crate::key::{KEY_BITS, KeyFamily, KeyMaterial, KeyPair, KeyRole, MODULUS_LEN};
pub use crate::keystore::KeyStore;
pub use crate::storage::Storage;

use anyhow::{Context, Result};
use directories::ProjectDirs;

/// Vault file in the platform data directory.
pub fn default_storage() -> Result<Storage> {
    let dirs =
        ProjectDirs::from("", "", "rsakeep").context("could not determine platform directories")?;

    Ok(Storage::new(dirs.data_dir().join("vault.db")))
}
