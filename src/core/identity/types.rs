// src/core/identity/types.rs
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::biometrics::errors::BiometricError;
use crate::core::biometrics::voice::VoiceProfile;
use super::codec::serde_features;

/// Bumped whenever any extractor changes its output layout.
pub const EXTRACTOR_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Face,
    Voice,
    Gesture,
    Keystroke,
    Totp,
    BackupCode,
}

impl Modality {
    /// Every template-backed modality, in the order offered at login.
    pub const TEMPLATED: [Modality; 5] = [
        Modality::Face,
        Modality::Voice,
        Modality::Gesture,
        Modality::Keystroke,
        Modality::Totp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Face => "face",
            Modality::Voice => "voice",
            Modality::Gesture => "gesture",
            Modality::Keystroke => "keystroke",
            Modality::Totp => "totp",
            Modality::BackupCode => "backup_code",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistical summary of a user's typing rhythm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeystrokeProfile {
    #[serde(with = "serde_features")]
    pub mean: Vec<f64>,
    #[serde(with = "serde_features")]
    pub std: Vec<f64>,
    pub num_samples: usize,
    pub consistency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemplatePayload {
    Face {
        #[serde(with = "serde_features")]
        embedding: Vec<f64>,
    },
    Voice {
        #[serde(with = "serde_features")]
        features: Vec<f64>,
        quality: f64,
        profile: VoiceProfile,
    },
    Gesture {
        #[serde(with = "serde_features")]
        features: Vec<f64>,
    },
    Keystroke {
        profile: KeystrokeProfile,
        passphrase_digest: String,
    },
    Totp {
        secret_base32: String,
        account_name: String,
    },
}

impl TemplatePayload {
    pub fn modality(&self) -> Modality {
        match self {
            TemplatePayload::Face { .. } => Modality::Face,
            TemplatePayload::Voice { .. } => Modality::Voice,
            TemplatePayload::Gesture { .. } => Modality::Gesture,
            TemplatePayload::Keystroke { .. } => Modality::Keystroke,
            TemplatePayload::Totp { .. } => Modality::Totp,
        }
    }
}

/// The single active template for one (user, modality) pair. Re-enrollment
/// replaces the whole value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentTemplate {
    pub user_id: Uuid,
    pub payload: TemplatePayload,
    pub created_at: DateTime<Utc>,
    pub extractor_version: u32,
}

impl EnrollmentTemplate {
    pub fn new(user_id: Uuid, payload: TemplatePayload) -> Self {
        Self {
            user_id,
            payload,
            created_at: Utc::now(),
            extractor_version: EXTRACTOR_VERSION,
        }
    }

    pub fn modality(&self) -> Modality {
        self.payload.modality()
    }

    /// Templates written by another extractor layout cannot be compared
    /// with a freshly extracted probe.
    pub fn check_extractor_version(&self) -> Result<(), BiometricError> {
        if self.extractor_version == EXTRACTOR_VERSION {
            return Ok(());
        }
        Err(BiometricError::StoredTemplateCorrupt(format!(
            "{} template from extractor v{}, current is v{}",
            self.modality(),
            self.extractor_version,
            EXTRACTOR_VERSION
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryFlag {
    LowQuality,
    CosineDeficit,
    PossibleReplay,
}

/// Result of one matching attempt. Extraction failures and mismatches are
/// both represented here, never as an `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub modality: Modality,
    pub is_match: bool,
    /// Similarity or confidence in [0, 1].
    pub confidence: f64,
    /// Non-negative; failed attempts report 1.0.
    pub distance: f64,
    pub flags: Vec<AdvisoryFlag>,
    pub failure: Option<BiometricError>,
}

impl VerificationOutcome {
    pub fn decided(modality: Modality, is_match: bool, confidence: f64, distance: f64) -> Self {
        Self {
            modality,
            is_match,
            confidence,
            distance,
            flags: Vec::new(),
            failure: None,
        }
    }

    pub fn failed(modality: Modality, error: BiometricError) -> Self {
        Self {
            modality,
            is_match: false,
            confidence: 0.0,
            distance: 1.0,
            flags: Vec::new(),
            failure: Some(error),
        }
    }

    pub fn with_flags(mut self, flags: Vec<AdvisoryFlag>) -> Self {
        self.flags = flags;
        self
    }
}
