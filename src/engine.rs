//! RSA-2048 key generation and RSA-OAEP-SHA256 encryption over tagged keys.
//!
//! The engine keeps no key state: every call resolves its tag through the
//! [`KeyStore`] again. Ciphertexts are exactly [`MODULUS_LEN`] bytes and a single
//! operation accepts at most [`MAX_PLAINTEXT_LEN`] bytes of plaintext.

use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey};
use sha2::Sha256;

use crate::error::CryptoError;
use crate::key::{KEY_BITS, KeyMaterial, KeyPair, MODULUS_LEN};
use crate::keystore::KeyStore;

/// Output size of the OAEP hash (SHA-256).
pub const OAEP_HASH_LEN: usize = 32;

/// Largest plaintext one OAEP-SHA256 operation accepts under a 2048-bit key (190 bytes).
pub const MAX_PLAINTEXT_LEN: usize = capacity(MODULUS_LEN);

/// Plaintext capacity of OAEP-SHA256 for a modulus of `modulus_len` bytes.
pub const fn capacity(modulus_len: usize) -> usize {
    modulus_len.saturating_sub(2 * OAEP_HASH_LEN + 2)
}

fn oaep() -> Oaep {
    Oaep::new::<Sha256>()
}

#[derive(Clone)]
pub struct CryptoEngine {
    store: KeyStore,
}

impl CryptoEngine {
    pub fn new(store: KeyStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    /// Produces a fresh 2048-bit pair from the OS random generator.
    pub fn generate_key_pair(&self) -> Result<KeyPair, CryptoError> {
        let private = RsaPrivateKey::new(&mut OsRng, KEY_BITS)
            .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;

        let private = KeyMaterial::Private(private);
        if private.size() != MODULUS_LEN {
            return Err(CryptoError::KeyGenerationFailed(format!(
                "generated modulus has {} bits",
                private.size() * 8
            )));
        }

        let public = KeyMaterial::Public(private.public_key());

        tracing::info!(bits = KEY_BITS, "generated RSA key pair");
        Ok(KeyPair { public, private })
    }

    /// Generates a pair and stores its halves under the two tags.
    ///
    /// If the private half cannot be written, the row previously under
    /// `public_tag` is put back, so the tag never names a public key whose
    /// private half was lost.
    pub fn generate_and_store(
        &self,
        public_tag: &str,
        private_tag: &str,
    ) -> Result<KeyPair, CryptoError> {
        let pair = self.generate_key_pair()?;

        let previous = self.store.snapshot(public_tag)?;
        self.store.store(public_tag, &pair.public)?;

        if let Err(e) = self.store.store(private_tag, &pair.private) {
            if let Err(undo) = self.store.restore(public_tag, previous) {
                tracing::error!(tag = public_tag, error = %undo, "failed to roll back public key");
            }
            return Err(e.into());
        }

        Ok(pair)
    }

    fn resolve(&self, tag: &str) -> Result<KeyMaterial, CryptoError> {
        self.store
            .load(tag)
            .map_err(|source| CryptoError::KeyResolutionFailed {
                tag: tag.to_string(),
                source,
            })
    }

    /// Encrypts `plaintext` to the public key stored under `public_tag`.
    ///
    /// Oversize input is rejected up front, never truncated.
    pub fn encrypt(&self, plaintext: &[u8], public_tag: &str) -> Result<Vec<u8>, CryptoError> {
        let public = match self.resolve(public_tag)? {
            KeyMaterial::Public(key) => key,
            KeyMaterial::Private(_) => {
                return Err(CryptoError::EncryptionFailed(format!(
                    "key '{public_tag}' does not support OAEP-SHA256 encryption"
                )));
            }
        };

        let limit = capacity(MODULUS_LEN);
        if plaintext.len() > limit {
            return Err(CryptoError::EncryptionFailed(format!(
                "plaintext is {} bytes, capacity is {limit}",
                plaintext.len()
            )));
        }

        let ciphertext = public
            .encrypt(&mut OsRng, oaep(), plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        tracing::debug!(tag = public_tag, len = ciphertext.len(), "encrypted payload");
        Ok(ciphertext)
    }

    /// Decrypts `ciphertext` with the private key stored under `private_tag`.
    ///
    /// A wrong key, a bad length and a padding failure all come back as the same
    /// [`CryptoError::DecryptionFailed`].
    ///
    /// The private-key operation is blinded, but `rsa` 0.9 does big-integer
    /// arithmetic in variable time and is subject to the Marvin timing attack
    /// (RUSTSEC-2023-0071). Blinding narrows that channel without closing it, so
    /// do not expose this call as an unthrottled network decryption oracle.
    pub fn decrypt(&self, ciphertext: &[u8], private_tag: &str) -> Result<Vec<u8>, CryptoError> {
        let private = match self.resolve(private_tag)? {
            KeyMaterial::Private(key) => key,
            KeyMaterial::Public(_) => {
                tracing::debug!(tag = private_tag, "decryption requested with a public key");
                return Err(CryptoError::DecryptionFailed);
            }
        };

        if ciphertext.len() != MODULUS_LEN {
            tracing::debug!(tag = private_tag, "decryption failed");
            return Err(CryptoError::DecryptionFailed);
        }

        private
            .decrypt_blinded(&mut OsRng, oaep(), ciphertext)
            .map_err(|_| {
                tracing::debug!(tag = private_tag, "decryption failed");
                CryptoError::DecryptionFailed
            })
    }
}
