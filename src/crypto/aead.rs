use super::{KEY_LEN, NONCE_LEN, SALT_LEN};
use anyhow::{Result, anyhow};
use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use getrandom::fill;
use zeroize::Zeroizing;

fn os_random(buf: &mut [u8]) -> Result<()> {
    fill(buf).map_err(|_| anyhow!("OS random generator unavailable"))
}

/// Fresh random salt for a new vault.
pub fn random_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    os_random(&mut salt)?;
    Ok(salt)
}

/// Seals the vault payload under a fresh random nonce.
pub fn seal(key: &[u8; KEY_LEN], payload: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_LEN])> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    let mut nonce = [0u8; NONCE_LEN];
    os_random(&mut nonce)?;

    let sealed = cipher
        .encrypt(XNonce::from_slice(&nonce), payload)
        .map_err(|_| anyhow!("vault sealing failed"))?;

    Ok((sealed, nonce))
}

/// Opens a sealed payload. A wrong password and a tampered file look the same.
pub fn open(key: &[u8; KEY_LEN], nonce: &[u8], sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if nonce.len() != NONCE_LEN {
        return Err(anyhow!("invalid nonce length"));
    }
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    cipher
        .decrypt(XNonce::from_slice(nonce), sealed)
        .map(Zeroizing::new)
        .map_err(|_| anyhow!("Invalid password or corrupted data"))
}
