//! Error types returned by the key store, the crypto engine and storage backends.

use thiserror::Error;

/// Failure reported by a [`SecureStorage`](crate::backend::SecureStorage) backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not read its rows.
    #[error("backend read failed: {0}")]
    Read(String),

    /// The backend rejected or could not persist a write.
    #[error("backend write failed: {0}")]
    Write(String),

    /// The backend is in an unusable state (poisoned lock, closed vault).
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by [`KeyStore`](crate::KeyStore) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no key stored under tag '{0}'")]
    KeyNotFound(String),

    #[error("failed to read key '{tag}': {source}")]
    StorageReadFailed {
        tag: String,
        #[source]
        source: BackendError,
    },

    #[error("failed to write key '{tag}': {source}")]
    StorageWriteFailed {
        tag: String,
        #[source]
        source: BackendError,
    },

    /// An entry exists but cannot be turned back into a usable RSA key.
    #[error("entry '{tag}' is malformed: {reason}")]
    MalformedEntry { tag: String, reason: String },
}

/// Errors raised by [`CryptoEngine`](crate::CryptoEngine) operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("RSA key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// The tag could not be resolved to a key through the store.
    #[error("could not resolve key '{tag}'")]
    KeyResolutionFailed {
        tag: String,
        #[source]
        source: StoreError,
    },

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Deliberately carries no detail.
    #[error("decryption failed")]
    DecryptionFailed,

    /// Persisting freshly generated key material failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
