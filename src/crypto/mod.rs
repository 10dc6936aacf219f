//! Primitives that seal the vault file: password KDF and authenticated encryption.

pub mod aead;
pub mod kdf;

pub use aead::{open, random_salt, seal};
pub use kdf::{KdfParams, derive_key};

/// Length of the KDF salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the XChaCha20-Poly1305 nonce (24 bytes).
pub const NONCE_LEN: usize = 24;
/// Length of the vault sealing key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
