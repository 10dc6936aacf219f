//! Vault format v1.
//!
//! ```text
//! MAGIC (4) | VERSION (1) | MEM_COST (4) | TIME_COST (4) | PARALLELISM (4) | SALT (16) | NONCE (24) | SEALED PAYLOAD
//! ```
//!
//! Integers are little-endian.

use super::{MAGIC, MAGIC_LEN, VER_LEN, VaultFile};
use crate::crypto::{KdfParams, NONCE_LEN, SALT_LEN};
use anyhow::{Result, bail};

pub const VERSION_V1: u8 = 1;

const U32_LEN: usize = 4;

pub const HEADER_LEN: usize = MAGIC_LEN + VER_LEN + 3 * U32_LEN + SALT_LEN + NONCE_LEN;

fn read_u32(data: &[u8], offset: &mut usize) -> Result<u32> {
    let value = u32::from_le_bytes(data[*offset..*offset + U32_LEN].try_into()?);
    *offset += U32_LEN;
    Ok(value)
}

pub(crate) fn parse(data: &[u8]) -> Result<VaultFile> {
    if data.len() < HEADER_LEN {
        bail!("vault file too short for v1 header");
    }

    let mut offset = MAGIC_LEN + VER_LEN;
    let mem_cost = read_u32(data, &mut offset)?;
    let time_cost = read_u32(data, &mut offset)?;
    let parallelism = read_u32(data, &mut offset)?;

    let salt: [u8; SALT_LEN] = data[offset..offset + SALT_LEN].try_into()?;
    offset += SALT_LEN;

    let nonce: [u8; NONCE_LEN] = data[offset..offset + NONCE_LEN].try_into()?;
    offset += NONCE_LEN;

    let kdf = KdfParams::new(mem_cost, time_cost, parallelism)?;

    Ok(VaultFile::new(kdf, salt, nonce, data[offset..].to_vec()))
}

pub(crate) fn serialize(file: &VaultFile) -> Result<Vec<u8>> {
    if file.version() != VERSION_V1 {
        bail!("v1 codec cannot write version {}", file.version());
    }

    let mut buf = Vec::with_capacity(HEADER_LEN + file.sealed().len());

    buf.extend_from_slice(MAGIC);
    buf.push(VERSION_V1);

    buf.extend_from_slice(&file.kdf().mem_cost_kib().to_le_bytes());
    buf.extend_from_slice(&file.kdf().time_cost().to_le_bytes());
    buf.extend_from_slice(&file.kdf().parallelism().to_le_bytes());

    buf.extend_from_slice(file.salt());
    buf.extend_from_slice(file.nonce());
    buf.extend_from_slice(file.sealed());

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields_survive_serialization() {
        let file = VaultFile::new(
            KdfParams::new(65536, 3, 2).unwrap(),
            [1u8; SALT_LEN],
            [2u8; NONCE_LEN],
            vec![0u8; 10],
        );

        let bytes = serialize(&file).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 10);

        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed.kdf().mem_cost_kib(), 65536);
        assert_eq!(parsed.kdf().time_cost(), 3);
        assert_eq!(parsed.kdf().parallelism(), 2);
        assert_eq!(parsed.salt(), file.salt());
        assert_eq!(parsed.nonce(), file.nonce());
        assert_eq!(parsed.sealed(), file.sealed());
    }

    #[test]
    fn truncated_header_fails() {
        let mut data = MAGIC.to_vec();
        data.push(VERSION_V1);
        data.extend_from_slice(&[0u8; 10]);
        assert!(parse(&data).is_err());
    }

    #[test]
    fn invalid_kdf_params_in_header_fail() {
        let mut data = vec![0u8; HEADER_LEN];
        data[..MAGIC_LEN].copy_from_slice(MAGIC);
        data[MAGIC_LEN] = VERSION_V1;
        assert!(parse(&data).is_err());
    }

    #[test]
    fn oversized_parallelism_in_header_fails() {
        let mut data = vec![0u8; HEADER_LEN];
        data[..MAGIC_LEN].copy_from_slice(MAGIC);
        data[MAGIC_LEN] = VERSION_V1;

        let mut offset = MAGIC_LEN + VER_LEN;
        for value in [64u32, 1, 0x2000_0001] {
            data[offset..offset + U32_LEN].copy_from_slice(&value.to_le_bytes());
            offset += U32_LEN;
        }

        let err = parse(&data).unwrap_err();
        assert!(err.to_string().contains("parallelism"));
    }
}
