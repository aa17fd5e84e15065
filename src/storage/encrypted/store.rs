// src/storage/encrypted/store.rs
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rocksdb::{Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{cipher::StorageCipher, errors::*};
use crate::core::identity::types::{EnrollmentTemplate, Modality};
use crate::storage::{BackupCodeStatus, BackupCodeStore, StoredBackupCode, TemplateStore};

/// RocksDB-backed store whose values are JSON sealed with AES-256-GCM.
pub struct EncryptedStore {
    db: DB,
    cipher: RwLock<StorageCipher>,
    consume_lock: Mutex<()>,
}

fn template_key(user_id: Uuid, modality: Modality) -> Vec<u8> {
    format!("template/{user_id}/{modality}").into_bytes()
}

fn backup_prefix(user_id: Uuid) -> Vec<u8> {
    format!("backup/{user_id}/").into_bytes()
}

fn backup_key(user_id: Uuid, code_id: Uuid) -> Vec<u8> {
    format!("backup/{user_id}/{code_id}").into_bytes()
}

fn seal<T: Serialize>(cipher: &StorageCipher, value: &T) -> Result<Vec<u8>> {
    let serialized = serde_json::to_vec(value).map_err(|e| StorageError::InvalidFormat(e.to_string()))?;
    cipher.encrypt(&serialized)
}

fn open_value<T: DeserializeOwned>(cipher: &StorageCipher, sealed: &[u8]) -> Result<T> {
    let decrypted = cipher.decrypt(sealed)?;
    serde_json::from_slice(&decrypted).map_err(|e| StorageError::InvalidFormat(e.to_string()))
}

impl EncryptedStore {
    pub fn open<P: AsRef<Path>>(path: P, secret: &[u8]) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path)?;
        info!("Encrypted store opened");

        Ok(Self {
            db,
            cipher: RwLock::new(StorageCipher::new(secret)),
            consume_lock: Mutex::new(()),
        })
    }

    // Writers keep the cipher read guard until their put lands, so a
    // rotation never sees half of a write.
    pub fn store<T: Serialize>(&self, key: &[u8], value: &T) -> Result<()> {
        let cipher = self.cipher.read();
        self.db.put(key, seal(&cipher, value)?)?;
        Ok(())
    }

    pub fn retrieve<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        let cipher = self.cipher.read();
        self.retrieve_with(&cipher, key)
    }

    fn retrieve_with<T: DeserializeOwned>(&self, cipher: &StorageCipher, key: &[u8]) -> Result<Option<T>> {
        match self.db.get(key)? {
            Some(sealed) => Ok(Some(open_value(cipher, &sealed)?)),
            None => Ok(None),
        }
    }

    pub fn remove(&self, key: &[u8]) -> Result<bool> {
        let existed = self.db.get(key)?.is_some();
        self.db.delete(key)?;
        Ok(existed)
    }

    fn scan<T: DeserializeOwned>(&self, cipher: &StorageCipher, prefix: &[u8]) -> Result<Vec<(Box<[u8]>, T)>> {
        let mut values = Vec::new();
        for item in self.db.prefix_iterator(prefix) {
            let (key, sealed) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            let value = open_value(cipher, &sealed)?;
            values.push((key, value));
        }
        Ok(values)
    }

    /// Re-encrypts every value under a new secret in one batch.
    pub fn rotate_encryption_key(&self, new_secret: &[u8]) -> Result<()> {
        let new_cipher = StorageCipher::new(new_secret);
        let mut cipher = self.cipher.write();

        let mut batch = WriteBatch::default();
        for item in self.db.iterator(rocksdb::IteratorMode::Start) {
            let (key, sealed) = item?;
            let decrypted = cipher.decrypt(&sealed)?;
            batch.put(&key, new_cipher.encrypt(&decrypted)?);
        }
        self.db.write(batch)?;

        *cipher = new_cipher;
        info!("Storage encryption key rotated");
        Ok(())
    }
}

#[async_trait]
impl TemplateStore for EncryptedStore {
    async fn load(&self, user_id: Uuid, modality: Modality) -> crate::utils::error::Result<Option<EnrollmentTemplate>> {
        Ok(self.retrieve(&template_key(user_id, modality))?)
    }

    async fn save(&self, template: &EnrollmentTemplate) -> crate::utils::error::Result<()> {
        Ok(self.store(&template_key(template.user_id, template.modality()), template)?)
    }

    async fn delete(&self, user_id: Uuid, modality: Modality) -> crate::utils::error::Result<bool> {
        Ok(self.remove(&template_key(user_id, modality))?)
    }

    async fn enrolled(&self, user_id: Uuid) -> crate::utils::error::Result<Vec<Modality>> {
        let mut enrolled = Vec::new();
        for modality in Modality::TEMPLATED {
            if self.db.get(template_key(user_id, modality)).map_err(StorageError::from)?.is_some() {
                enrolled.push(modality);
            }
        }
        Ok(enrolled)
    }
}

#[async_trait]
impl BackupCodeStore for EncryptedStore {
    async fn replace_all(&self, user_id: Uuid, codes: Vec<StoredBackupCode>) -> crate::utils::error::Result<()> {
        let _guard = self.consume_lock.lock();
        let cipher = self.cipher.read();
        let prefix = backup_prefix(user_id);

        let mut batch = WriteBatch::default();
        for (key, _) in self.scan::<StoredBackupCode>(&cipher, &prefix)? {
            batch.delete(key);
        }
        for code in &codes {
            batch.put(backup_key(user_id, code.id), seal(&cipher, code)?);
        }
        self.db.write(batch).map_err(StorageError::from)?;
        Ok(())
    }

    async fn unused(&self, user_id: Uuid) -> crate::utils::error::Result<Vec<StoredBackupCode>> {
        let cipher = self.cipher.read();
        Ok(self
            .scan::<StoredBackupCode>(&cipher, &backup_prefix(user_id))?
            .into_iter()
            .map(|(_, code)| code)
            .filter(|code| !code.is_used())
            .collect())
    }

    async fn consume(&self, user_id: Uuid, code_id: Uuid, at: DateTime<Utc>) -> crate::utils::error::Result<bool> {
        let _guard = self.consume_lock.lock();
        let cipher = self.cipher.read();
        let key = backup_key(user_id, code_id);

        match self.retrieve_with::<StoredBackupCode>(&cipher, &key)? {
            Some(mut code) if !code.is_used() => {
                code.used_at = Some(at);
                self.db.put(&key, seal(&cipher, &code)?).map_err(StorageError::from)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn status(&self, user_id: Uuid) -> crate::utils::error::Result<BackupCodeStatus> {
        let cipher = self.cipher.read();
        let codes: Vec<StoredBackupCode> = self
            .scan(&cipher, &backup_prefix(user_id))?
            .into_iter()
            .map(|(_, code)| code)
            .collect();
        Ok(BackupCodeStatus::of(&codes))
    }
}
