// src/storage/mod.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::identity::types::{EnrollmentTemplate, Modality};
use crate::utils::error::Result;

pub mod encrypted;
pub mod memory;

pub use encrypted::EncryptedStore;
pub use memory::MemoryStore;

/// One active template per (user, modality).
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn load(&self, user_id: Uuid, modality: Modality) -> Result<Option<EnrollmentTemplate>>;

    /// Replaces any previous template for the same user and modality as a
    /// single write.
    async fn save(&self, template: &EnrollmentTemplate) -> Result<()>;

    /// Returns whether a template existed.
    async fn delete(&self, user_id: Uuid, modality: Modality) -> Result<bool>;

    /// Enrolled modalities in [`Modality::TEMPLATED`] order.
    async fn enrolled(&self, user_id: Uuid) -> Result<Vec<Modality>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBackupCode {
    pub id: Uuid,
    pub code_hash: String,
    pub used_at: Option<DateTime<Utc>>,
}

impl StoredBackupCode {
    pub fn new(code_hash: String) -> Self {
        Self { id: Uuid::new_v4(), code_hash, used_at: None }
    }

    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupCodeStatus {
    pub total: usize,
    pub used: usize,
    pub remaining: usize,
}

impl BackupCodeStatus {
    pub fn of(codes: &[StoredBackupCode]) -> Self {
        let used = codes.iter().filter(|c| c.is_used()).count();
        Self { total: codes.len(), used, remaining: codes.len() - used }
    }
}

#[async_trait]
pub trait BackupCodeStore: Send + Sync {
    /// Discards every existing code for the user.
    async fn replace_all(&self, user_id: Uuid, codes: Vec<StoredBackupCode>) -> Result<()>;

    async fn unused(&self, user_id: Uuid) -> Result<Vec<StoredBackupCode>>;

    /// Marks the code used only if it is still unused. Returns `true` for
    /// exactly one caller per code.
    async fn consume(&self, user_id: Uuid, code_id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    async fn status(&self, user_id: Uuid) -> Result<BackupCodeStatus>;
}
