// src/storage/encrypted/cipher.rs
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use sha3::{Digest, Sha3_256};

use super::errors::{Result, StorageError};

const NONCE_LEN: usize = 12;

/// AES-256-GCM keyed by the SHA3-256 of the configured secret. Output is
/// `nonce || ciphertext`.
pub struct StorageCipher {
    cipher: Aes256Gcm,
}

impl StorageCipher {
    pub fn new(secret: &[u8]) -> Self {
        let hash = Sha3_256::digest(secret);
        let key = Key::<Aes256Gcm>::from_slice(hash.as_slice());
        Self { cipher: Aes256Gcm::new(key) }
    }

    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, data)
            .map_err(|e| StorageError::EncryptionError(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(StorageError::DecryptionError("Invalid encrypted data length".to_string()));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| StorageError::DecryptionError(e.to_string()))
    }
}
