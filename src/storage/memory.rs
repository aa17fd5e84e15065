// src/storage/memory.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::{BackupCodeStatus, BackupCodeStore, StoredBackupCode, TemplateStore};
use crate::core::identity::types::{EnrollmentTemplate, Modality};
use crate::utils::error::Result;

/// Process-local store. Every operation holds the lock for one whole-value
/// read or write.
#[derive(Default)]
pub struct MemoryStore {
    templates: RwLock<HashMap<(Uuid, Modality), EnrollmentTemplate>>,
    backup_codes: RwLock<HashMap<Uuid, Vec<StoredBackupCode>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateStore for MemoryStore {
    async fn load(&self, user_id: Uuid, modality: Modality) -> Result<Option<EnrollmentTemplate>> {
        Ok(self.templates.read().get(&(user_id, modality)).cloned())
    }

    async fn save(&self, template: &EnrollmentTemplate) -> Result<()> {
        self.templates
            .write()
            .insert((template.user_id, template.modality()), template.clone());
        Ok(())
    }

    async fn delete(&self, user_id: Uuid, modality: Modality) -> Result<bool> {
        Ok(self.templates.write().remove(&(user_id, modality)).is_some())
    }

    async fn enrolled(&self, user_id: Uuid) -> Result<Vec<Modality>> {
        let templates = self.templates.read();
        Ok(Modality::TEMPLATED
            .into_iter()
            .filter(|modality| templates.contains_key(&(user_id, *modality)))
            .collect())
    }
}

#[async_trait]
impl BackupCodeStore for MemoryStore {
    async fn replace_all(&self, user_id: Uuid, codes: Vec<StoredBackupCode>) -> Result<()> {
        self.backup_codes.write().insert(user_id, codes);
        Ok(())
    }

    async fn unused(&self, user_id: Uuid) -> Result<Vec<StoredBackupCode>> {
        Ok(self
            .backup_codes
            .read()
            .get(&user_id)
            .map(|codes| codes.iter().filter(|c| !c.is_used()).cloned().collect())
            .unwrap_or_default())
    }

    async fn consume(&self, user_id: Uuid, code_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut all = self.backup_codes.write();
        let code = all
            .get_mut(&user_id)
            .and_then(|codes| codes.iter_mut().find(|c| c.id == code_id));

        match code {
            Some(code) if !code.is_used() => {
                code.used_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn status(&self, user_id: Uuid) -> Result<BackupCodeStatus> {
        let all = self.backup_codes.read();
        Ok(BackupCodeStatus::of(all.get(&user_id).map(Vec::as_slice).unwrap_or_default()))
    }
}
