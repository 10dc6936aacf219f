//! RSA key material and its storage encoding.

use anyhow::{Context, Result, bail};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

/// Modulus size of every key this crate produces or accepts.
pub const KEY_BITS: usize = 2048;
/// Modulus size in bytes; also the length of every ciphertext.
pub const MODULUS_LEN: usize = KEY_BITS / 8;

/// The single asymmetric family rows are filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyFamily {
    #[serde(rename = "rsa-2048")]
    Rsa2048,
}

impl fmt::Display for KeyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyFamily::Rsa2048 => write!(f, "rsa-2048"),
        }
    }
}

/// Which half of a pair a stored key is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyRole {
    Public,
    Private,
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRole::Public => write!(f, "public"),
            KeyRole::Private => write!(f, "private"),
        }
    }
}

/// One half of an RSA key pair.
///
/// Handles are immutable once built; cloning shares nothing mutable.
#[derive(Clone, PartialEq)]
pub enum KeyMaterial {
    Public(RsaPublicKey),
    Private(RsaPrivateKey),
}

impl KeyMaterial {
    pub fn role(&self) -> KeyRole {
        match self {
            KeyMaterial::Public(_) => KeyRole::Public,
            KeyMaterial::Private(_) => KeyRole::Private,
        }
    }

    /// The public half, derived from the private key when needed.
    pub fn public_key(&self) -> RsaPublicKey {
        match self {
            KeyMaterial::Public(key) => key.clone(),
            KeyMaterial::Private(key) => key.to_public_key(),
        }
    }

    /// Modulus size in bytes.
    pub fn size(&self) -> usize {
        match self {
            KeyMaterial::Public(key) => key.size(),
            KeyMaterial::Private(key) => key.size(),
        }
    }

    /// SHA-256 over the SubjectPublicKeyInfo DER, hex encoded.
    ///
    /// Both halves of a pair share a fingerprint.
    pub fn fingerprint(&self) -> Result<String> {
        let spki = self
            .public_key()
            .to_public_key_der()
            .context("failed to encode public key")?;
        let digest = Sha256::digest(spki.as_bytes());
        Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }

    /// Encodes the key for storage: SPKI DER for public halves, PKCS#8 DER for private ones.
    pub(crate) fn to_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        match self {
            KeyMaterial::Public(key) => {
                let doc = key
                    .to_public_key_der()
                    .context("failed to encode public key")?;
                Ok(Zeroizing::new(doc.into_vec()))
            }
            KeyMaterial::Private(key) => {
                let doc = key
                    .to_pkcs8_der()
                    .context("failed to encode private key")?;
                Ok(Zeroizing::new(doc.as_bytes().to_vec()))
            }
        }
    }

    /// Rebuilds a key handle from its stored encoding.
    pub(crate) fn from_der(role: KeyRole, der: &[u8]) -> Result<Self> {
        let key = match role {
            KeyRole::Public => KeyMaterial::Public(
                RsaPublicKey::from_public_key_der(der).context("invalid public key encoding")?,
            ),
            KeyRole::Private => KeyMaterial::Private(
                RsaPrivateKey::from_pkcs8_der(der).context("invalid private key encoding")?,
            ),
        };

        if key.size() != MODULUS_LEN {
            bail!(
                "expected a {KEY_BITS}-bit modulus, found {} bits",
                key.size() * 8
            );
        }

        Ok(key)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("role", &self.role())
            .field("bits", &(self.size() * 8))
            .finish_non_exhaustive()
    }
}

/// A freshly generated, mathematically linked pair.
#[derive(Clone, Debug)]
pub struct KeyPair {
    pub public: KeyMaterial,
    pub private: KeyMaterial,
}
