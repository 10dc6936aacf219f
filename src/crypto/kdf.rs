use anyhow::{Context, Result, anyhow, bail};
use argon2::{Algorithm, Argon2, Params, Version};
use std::fmt;
use zeroize::Zeroizing;

use super::KEY_LEN;

/// Argon2id cost parameters, carried in the vault header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    mem_cost_kib: u32,
    time_cost: u32,
    parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 64 * 1024, // 64 MiB
            time_cost: 3,
            parallelism: 1,
        }
    }
}

impl fmt::Display for KdfParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "argon2id m={}KiB t={} p={}",
            self.mem_cost_kib, self.time_cost, self.parallelism
        )
    }
}

impl KdfParams {
    pub fn new(mem_cost_kib: u32, time_cost: u32, parallelism: u32) -> Result<Self> {
        if time_cost < 1 {
            bail!("argon2 time cost must be >= 1");
        }
        if parallelism < 1 {
            bail!("argon2 parallelism must be >= 1");
        }
        if parallelism
            .checked_mul(8)
            .is_none_or(|min| mem_cost_kib < min)
        {
            bail!("argon2 memory cost must be at least 8 * parallelism");
        }
        Ok(Self {
            mem_cost_kib,
            time_cost,
            parallelism,
        })
    }

    pub fn mem_cost_kib(&self) -> u32 {
        self.mem_cost_kib
    }

    pub fn time_cost(&self) -> u32 {
        self.time_cost
    }

    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }
}

/// Derives the vault sealing key from the password.
pub fn derive_key(password: &str, salt: &[u8], kdf: KdfParams) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let params = Params::new(
        kdf.mem_cost_kib,
        kdf.time_cost,
        kdf.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| anyhow!("invalid argon2 parameters: {e}"))?;

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|e| anyhow!("{e}"))
        .context("argon2 key derivation failed")?;

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> KdfParams {
        KdfParams::new(64, 1, 1).unwrap()
    }

    #[test]
    fn derivation_is_deterministic() {
        let salt = [42u8; 16];
        let k1 = derive_key("password", &salt, cheap()).unwrap();
        let k2 = derive_key("password", &salt, cheap()).unwrap();
        assert_eq!(*k1, *k2);
    }

    #[test]
    fn salt_changes_key() {
        let k1 = derive_key("pw", &[1u8; 16], cheap()).unwrap();
        let k2 = derive_key("pw", &[2u8; 16], cheap()).unwrap();
        assert_ne!(*k1, *k2);
    }

    #[test]
    fn cost_parameters_change_key() {
        let salt = [7u8; 16];
        let k1 = derive_key("pw", &salt, KdfParams::new(64, 1, 1).unwrap()).unwrap();
        let k2 = derive_key("pw", &salt, KdfParams::new(128, 1, 1).unwrap()).unwrap();
        assert_ne!(*k1, *k2);
    }

    #[test]
    fn invalid_params_are_rejected() {
        assert!(KdfParams::new(0, 0, 0).is_err());
        assert!(KdfParams::new(64, 0, 1).is_err());
        assert!(KdfParams::new(8, 1, 2).is_err());
    }

    #[test]
    fn huge_parallelism_is_rejected_without_overflow() {
        assert!(KdfParams::new(64, 1, 0x2000_0001).is_err());
        assert!(KdfParams::new(u32::MAX, 1, u32::MAX).is_err());
    }

    #[test]
    fn display_lists_costs() {
        assert_eq!(
            KdfParams::default().to_string(),
            "argon2id m=65536KiB t=3 p=1"
        );
    }
}
