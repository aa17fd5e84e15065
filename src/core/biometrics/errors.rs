// src/core/biometrics/errors.rs
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures raised while turning raw input into a feature vector.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ExtractionError {
    #[error("No face detected in image")]
    NoFaceDetected,

    #[error("Multiple faces detected ({0}); exactly one is required")]
    MultipleFacesDetected(usize),

    #[error("Gesture has {found} points, at least {min} required")]
    InsufficientPoints { found: usize, min: usize },

    #[error("Gesture has {found} points, at most {max} allowed")]
    TooManyPoints { found: usize, max: usize },

    #[error("Keystroke sample has {found} timing entries, at least {min} required")]
    InsufficientKeystrokeData { found: usize, min: usize },

    #[error("{found} enrollment samples supplied, at least {min} required")]
    InsufficientSamples { found: usize, min: usize },

    #[error("Audio is {found} bytes, at least {min} required")]
    AudioTooShort { found: usize, min: usize },

    #[error("Audio is {found} bytes, at most {max} allowed")]
    AudioTooLarge { found: usize, max: usize },

    #[error("Keystroke pattern too weak (score {score:.2})")]
    WeakKeystrokePattern { score: f64 },

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),
}

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum BiometricError {
    #[error("Invalid input: {0}")]
    InputValidation(String),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Stored template is corrupt: {0}")]
    StoredTemplateCorrupt(String),

    #[error("Passphrase does not match")]
    PassphraseMismatch,
}

impl BiometricError {
    pub fn dimension_mismatch(expected: usize, found: usize) -> Self {
        BiometricError::StoredTemplateCorrupt(format!(
            "dimension mismatch: template has {expected} features, probe has {found}; re-enrollment required"
        ))
    }

    /// Short machine-readable reason recorded in the attempt log.
    pub fn reason(&self) -> &'static str {
        match self {
            BiometricError::InputValidation(_) => "invalid_input",
            BiometricError::StoredTemplateCorrupt(_) => "stored_template_corrupt",
            BiometricError::PassphraseMismatch => "passphrase_mismatch",
            BiometricError::Extraction(e) => match e {
                ExtractionError::NoFaceDetected => "no_face_detected",
                ExtractionError::MultipleFacesDetected(_) => "multiple_faces_detected",
                ExtractionError::InsufficientPoints { .. } => "insufficient_points",
                ExtractionError::TooManyPoints { .. } => "too_many_points",
                ExtractionError::InsufficientKeystrokeData { .. } => "insufficient_keystroke_data",
                ExtractionError::InsufficientSamples { .. } => "insufficient_samples",
                ExtractionError::AudioTooShort { .. } => "audio_too_short",
                ExtractionError::AudioTooLarge { .. } => "audio_too_large",
                ExtractionError::WeakKeystrokePattern { .. } => "weak_keystroke_pattern",
                ExtractionError::EncodingFailed(_) => "encoding_failed",
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, BiometricError>;
