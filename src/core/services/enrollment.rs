// src/core/services/enrollment.rs
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::matchers::Matchers;
use crate::{
    core::{
        biometrics::{keystroke::KeystrokeEnrollment, payload::decode_base64_payload, GestureInput, KeystrokeInput},
        crypto::{secrets, TotpProvisioning},
        identity::types::{EnrollmentTemplate, Modality},
    },
    storage::{BackupCodeStatus, BackupCodeStore, StoredBackupCode, TemplateStore},
    utils::{config::BackupCodeConfig, error::Result},
};

/// Builds templates from raw enrollment input and persists them. Enrolling
/// a modality again replaces the previous template in one write.
pub struct EnrollmentService {
    matchers: Arc<Matchers>,
    templates: Arc<dyn TemplateStore>,
    backup_codes: Arc<dyn BackupCodeStore>,
    backup_config: BackupCodeConfig,
}

impl EnrollmentService {
    pub fn new(
        matchers: Arc<Matchers>,
        templates: Arc<dyn TemplateStore>,
        backup_codes: Arc<dyn BackupCodeStore>,
        backup_config: BackupCodeConfig,
    ) -> Self {
        Self {
            matchers,
            templates,
            backup_codes,
            backup_config,
        }
    }

    async fn persist(&self, template: EnrollmentTemplate) -> Result<EnrollmentTemplate> {
        self.templates.save(&template).await?;
        info!(user_id = %template.user_id, modality = %template.modality(), "Template enrolled");
        Ok(template)
    }

    /// `image` is base64, optionally carrying a `data:` URL header.
    pub async fn enroll_face(&self, user_id: Uuid, image: &str) -> Result<EnrollmentTemplate> {
        let bytes = decode_base64_payload(image)?;
        let template = self.matchers.face.enroll(user_id, &bytes).map_err(|e| {
            warn!(%user_id, reason = e.reason(), "Face enrollment failed");
            e
        })?;
        self.persist(template).await
    }

    pub async fn enroll_voice(&self, user_id: Uuid, audio: &str) -> Result<EnrollmentTemplate> {
        let bytes = decode_base64_payload(audio)?;
        let template = self.matchers.voice.enroll(user_id, &bytes).map_err(|e| {
            warn!(%user_id, reason = e.reason(), "Voice enrollment failed");
            e
        })?;
        self.persist(template).await
    }

    pub async fn enroll_gesture(&self, user_id: Uuid, input: &GestureInput) -> Result<EnrollmentTemplate> {
        let template = self.matchers.gesture.enroll(user_id, input).map_err(|e| {
            warn!(%user_id, reason = e.reason(), "Gesture enrollment failed");
            e
        })?;
        self.persist(template).await
    }

    /// Builds the timing profile from every sample. Weak but acceptable
    /// patterns are enrolled; the returned strength carries the feedback.
    pub async fn enroll_keystroke(
        &self,
        user_id: Uuid,
        passphrase: &str,
        samples: &[KeystrokeInput],
    ) -> Result<KeystrokeEnrollment> {
        let enrollment = self.matchers.keystroke.enroll(user_id, passphrase, samples).map_err(|e| {
            warn!(%user_id, reason = e.reason(), "Keystroke enrollment failed");
            e
        })?;

        debug!(
            %user_id,
            score = enrollment.strength.score,
            consistency = enrollment.strength.consistency,
            "Keystroke pattern strength"
        );
        let template = self.persist(enrollment.template).await?;
        Ok(KeystrokeEnrollment { template, strength: enrollment.strength })
    }

    /// Stores a fresh secret and returns what the authenticator app needs.
    pub async fn enroll_totp(&self, user_id: Uuid, account_name: &str) -> Result<TotpProvisioning> {
        let (template, provisioning) = self.matchers.totp.enroll(user_id, account_name)?;
        self.persist(template).await?;
        Ok(provisioning)
    }

    /// Replaces the whole code set. The plaintext codes are returned once and
    /// never stored.
    pub async fn regenerate_backup_codes(&self, user_id: Uuid) -> Result<Vec<String>> {
        let mut plaintext = Vec::with_capacity(self.backup_config.count);
        let mut stored = Vec::with_capacity(self.backup_config.count);

        for _ in 0..self.backup_config.count {
            let code = secrets::generate_backup_code()?;
            stored.push(StoredBackupCode::new(secrets::hash_backup_code(
                &code,
                self.backup_config.pbkdf2_iterations,
            )?));
            plaintext.push(code);
        }

        self.backup_codes.replace_all(user_id, stored).await?;
        info!(%user_id, count = plaintext.len(), "Backup codes regenerated");
        Ok(plaintext)
    }

    pub async fn backup_code_status(&self, user_id: Uuid) -> Result<BackupCodeStatus> {
        self.backup_codes.status(user_id).await
    }

    /// Removes the modality for the user; `false` if nothing was enrolled.
    pub async fn unenroll(&self, user_id: Uuid, modality: Modality) -> Result<bool> {
        let removed = match modality {
            Modality::BackupCode => {
                let existed = self.backup_codes.status(user_id).await?.total > 0;
                self.backup_codes.replace_all(user_id, Vec::new()).await?;
                existed
            }
            _ => self.templates.delete(user_id, modality).await?,
        };

        if removed {
            info!(%user_id, %modality, "Modality unenrolled");
        }
        Ok(removed)
    }

    pub async fn enrolled_modalities(&self, user_id: Uuid) -> Result<Vec<Modality>> {
        self.templates.enrolled(user_id).await
    }
}
