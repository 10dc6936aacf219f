//! On-disk layout of the vault file.
//!
//! Parsing is version-aware: the version byte after the magic selects the codec.

use anyhow::{Result, bail};

use crate::crypto::{KdfParams, NONCE_LEN, SALT_LEN};

pub mod v1;

/// Magic bytes opening every vault file ("RSKV").
pub const MAGIC: &[u8; 4] = b"RSKV";
pub const MAGIC_LEN: usize = 4;
pub const VER_LEN: usize = 1;
/// Version written by this build.
pub const CURRENT_VERSION: u8 = v1::VERSION_V1;

/// A vault file split into header fields and the sealed payload.
#[derive(Debug)]
pub(crate) struct VaultFile {
    version: u8,
    kdf: KdfParams,
    salt: [u8; SALT_LEN],
    nonce: [u8; NONCE_LEN],
    sealed: Vec<u8>,
}

impl VaultFile {
    pub fn new(
        kdf: KdfParams,
        salt: [u8; SALT_LEN],
        nonce: [u8; NONCE_LEN],
        sealed: Vec<u8>,
    ) -> Self {
        Self {
            version: CURRENT_VERSION,
            kdf,
            salt,
            nonce,
            sealed,
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn kdf(&self) -> &KdfParams {
        &self.kdf
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    pub fn sealed(&self) -> &[u8] {
        &self.sealed
    }
}

/// Parses raw file bytes.
///
/// # Errors
///
/// Fails on short input, foreign magic, or an unknown version.
pub(crate) fn parse(data: &[u8]) -> Result<VaultFile> {
    if data.len() < MAGIC_LEN + VER_LEN {
        bail!("vault file too short");
    }

    if &data[..MAGIC_LEN] != MAGIC {
        bail!("not an rsakeep vault file");
    }

    match data[MAGIC_LEN] {
        v1::VERSION_V1 => v1::parse(data),
        other => bail!("unsupported vault version: {other}"),
    }
}

/// Renders a vault file with the codec matching its version.
pub(crate) fn serialize(file: &VaultFile) -> Result<Vec<u8>> {
    match file.version() {
        v1::VERSION_V1 => v1::serialize(file),
        other => bail!("unsupported vault version: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dispatches_on_version() {
        let file = VaultFile::new(KdfParams::default(), [5u8; 16], [6u8; 24], vec![1, 2, 3]);
        let bytes = serialize(&file).unwrap();
        let parsed = parse(&bytes).unwrap();

        assert_eq!(parsed.version(), CURRENT_VERSION);
        assert_eq!(parsed.sealed(), &[1, 2, 3]);
    }

    #[test]
    fn foreign_magic_is_rejected() {
        let err = parse(b"KNST\x01rest-of-file").unwrap_err();
        assert!(err.to_string().contains("not an rsakeep vault"));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut data = MAGIC.to_vec();
        data.push(42);
        let err = parse(&data).unwrap_err();
        assert!(err.to_string().contains("unsupported vault version: 42"));
    }
}
