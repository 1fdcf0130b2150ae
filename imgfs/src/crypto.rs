//! Optional metadata encryption (C12, out-of-core).
//!
//! Governed by the superblock's `ENCRYPTED` flag. When
//! enabled, inode and directory payload bytes are encrypted with an
//! AEAD cipher whose key is derived from a user passphrase and a
//! per-volume salt using the same password-hashing approach this
//! workspace's `utils`-style code uses for login credentials
//! (`Argon2id`). This module is never called by C1–C10: formatting,
//! allocation, directory and resize logic behave identically whether or
//! not the flag is set. It exists because the flag lives in the wire
//! format, not because the engine enforces it.

use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand_core::{OsRng, RngCore};

use crate::error::{Error, Result};

/// Length in bytes of the per-volume salt stored in the superblock's
/// reserved region.
pub const SALT_LEN: usize = 16;

/// Generates a fresh, cryptographically random per-volume salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derives a 256-bit key from `passphrase` and `salt` using Argon2id.
fn derive_key(passphrase: &str, salt: &[u8; SALT_LEN]) -> Result<[u8; 32]> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|_| Error::Invalid)?;
    Ok(key)
}

/// Builds the per-block nonce from a 32-bit block index, so encrypting
/// the same volume's many blocks under one key never reuses a nonce.
fn block_nonce(block_id: u32) -> Nonce {
    let mut bytes = [0u8; 12];
    bytes[..4].copy_from_slice(&block_id.to_le_bytes());
    *Nonce::from_slice(&bytes)
}

/// Encrypts `plaintext` (an inode or directory payload) for block
/// `block_id` under a key derived from `passphrase` and `salt`.
pub fn encrypt(passphrase: &str, salt: &[u8; SALT_LEN], block_id: u32, plaintext: &[u8]) -> Result<Vec<u8>> {
    let key = derive_key(passphrase, salt)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    cipher
        .encrypt(&block_nonce(block_id), plaintext)
        .map_err(|_| Error::Invalid)
}

/// Decrypts and authenticates `ciphertext` for block `block_id`. Fails
/// with [`Error::Invalid`] if the passphrase is wrong or the data was
/// tampered with.
pub fn decrypt(passphrase: &str, salt: &[u8; SALT_LEN], block_id: u32, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let key = derive_key(passphrase, salt)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    cipher
        .decrypt(&block_nonce(block_id), ciphertext)
        .map_err(|_| Error::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let salt = generate_salt();
        let plaintext = b"directory payload bytes go here";
        let ct = encrypt("hunter2", &salt, 5, plaintext).unwrap();
        let pt = decrypt("hunter2", &salt, 5, &ct).unwrap();
        assert_eq!(pt, plaintext);
    }

    #[test]
    fn wrong_passphrase_fails_authentication() {
        let salt = generate_salt();
        let ct = encrypt("correct horse", &salt, 2, b"secret inode bytes").unwrap();
        let err = decrypt("wrong password", &salt, 2, &ct).unwrap_err();
        assert!(matches!(err, Error::Invalid));
    }

    #[test]
    fn ciphertext_for_one_block_does_not_decrypt_as_another() {
        let salt = generate_salt();
        let ct = encrypt("pw", &salt, 3, b"payload").unwrap();
        let err = decrypt("pw", &salt, 4, &ct).unwrap_err();
        assert!(matches!(err, Error::Invalid));
    }
}
