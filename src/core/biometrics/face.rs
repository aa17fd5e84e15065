// src/core/biometrics/face.rs
use std::sync::Arc;

use image::{imageops, imageops::FilterType, DynamicImage, GenericImageView};
use tracing::debug;
use uuid::Uuid;

use super::errors::{BiometricError, ExtractionError, Result};
use super::similarity;
use crate::core::identity::types::{EnrollmentTemplate, Modality, TemplatePayload, VerificationOutcome};
use crate::utils::config::FaceConfig;

pub const EMBEDDING_DIM: usize = 128;

const GRID_WIDTH: u32 = 16;
const GRID_HEIGHT: u32 = 8;

/// Bounding box of a detected face, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn whole(image: &DynamicImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(0, 0, width, height)
    }
}

/// Locates faces in a decoded image.
#[cfg_attr(test, mockall::automock)]
pub trait FaceDetector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Vec<FaceRegion>;
}

/// Turns one detected face region into a fixed-length embedding.
#[cfg_attr(test, mockall::automock)]
pub trait FaceEncoder: Send + Sync {
    fn encode(&self, image: &DynamicImage, region: FaceRegion) -> std::result::Result<Vec<f64>, ExtractionError>;
}

/// Appearance encoder: the face crop is reduced to a 16x8 grayscale grid,
/// centred and scaled to unit length. Lighting offsets cancel out; the
/// result is comparable under the same distance family as learned
/// embeddings (range [0, 2]).
#[derive(Debug, Default, Clone, Copy)]
pub struct PixelGridEncoder;

impl FaceEncoder for PixelGridEncoder {
    fn encode(&self, image: &DynamicImage, region: FaceRegion) -> std::result::Result<Vec<f64>, ExtractionError> {
        let gray = image.to_luma8();
        let crop = imageops::crop_imm(&gray, region.x, region.y, region.width, region.height).to_image();
        if crop.width() == 0 || crop.height() == 0 {
            return Err(ExtractionError::EncodingFailed("face region lies outside the image".into()));
        }

        let grid = imageops::resize(&crop, GRID_WIDTH, GRID_HEIGHT, FilterType::Triangle);
        let mut embedding: Vec<f64> = grid.pixels().map(|p| p.0[0] as f64 / 255.0).collect();

        let mean = embedding.iter().sum::<f64>() / embedding.len() as f64;
        embedding.iter_mut().for_each(|v| *v -= mean);
        if similarity::norm(&embedding) < 1e-9 {
            return Err(ExtractionError::EncodingFailed("face region has no contrast".into()));
        }
        similarity::l2_normalize(&mut embedding);

        Ok(embedding)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceThresholds {
    pub distance_threshold: f64,
    /// Percent.
    pub min_confidence: f64,
    pub min_cosine: f64,
}

impl Default for FaceThresholds {
    fn default() -> Self {
        Self {
            distance_threshold: 0.35,
            min_confidence: 90.0,
            min_cosine: 0.65,
        }
    }
}

impl From<&FaceConfig> for FaceThresholds {
    fn from(config: &FaceConfig) -> Self {
        Self {
            distance_threshold: config.distance_threshold,
            min_confidence: config.min_confidence,
            min_cosine: config.min_cosine,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceDecision {
    pub is_match: bool,
    /// Percent.
    pub confidence: f64,
}

impl FaceThresholds {
    pub fn confidence(&self, distance: f64) -> f64 {
        if distance < self.distance_threshold {
            (1.0 - distance / self.distance_threshold) * 100.0
        } else {
            0.0
        }
    }

    /// All three criteria must hold; any single failure rejects.
    pub fn decide(&self, distance: f64, cosine: f64) -> FaceDecision {
        let confidence = self.confidence(distance);
        let is_match = distance < self.distance_threshold
            && confidence >= self.min_confidence
            && cosine > self.min_cosine;
        FaceDecision { is_match, confidence }
    }
}

pub struct FaceMatcher {
    detector: Arc<dyn FaceDetector>,
    encoder: Arc<dyn FaceEncoder>,
    thresholds: FaceThresholds,
}

impl FaceMatcher {
    pub fn new(
        detector: Arc<dyn FaceDetector>,
        encoder: Arc<dyn FaceEncoder>,
        thresholds: FaceThresholds,
    ) -> Self {
        Self { detector, encoder, thresholds }
    }

    pub fn thresholds(&self) -> &FaceThresholds {
        &self.thresholds
    }

    /// Decodes the image, requires exactly one detected face and encodes it.
    pub fn extract_embedding(&self, image_bytes: &[u8]) -> Result<Vec<f64>> {
        let image = image::load_from_memory(image_bytes)
            .map_err(|e| BiometricError::InputValidation(format!("unreadable image: {e}")))?;

        let regions = self.detector.detect(&image);
        let region = match regions.as_slice() {
            [] => return Err(ExtractionError::NoFaceDetected.into()),
            [region] => *region,
            many => return Err(ExtractionError::MultipleFacesDetected(many.len()).into()),
        };

        let embedding = self.encoder.encode(&image, region)?;
        if embedding.len() != EMBEDDING_DIM {
            return Err(ExtractionError::EncodingFailed(format!(
                "encoder produced {} values, expected {EMBEDDING_DIM}",
                embedding.len()
            ))
            .into());
        }
        Ok(embedding)
    }

    pub fn verify(&self, known: &[f64], probe: &[f64]) -> VerificationOutcome {
        if known.len() != probe.len() || known.is_empty() {
            return VerificationOutcome::failed(
                Modality::Face,
                BiometricError::dimension_mismatch(known.len(), probe.len()),
            );
        }

        let distance = similarity::euclidean(known, probe);
        let cosine = similarity::cosine(known, probe);
        let decision = self.thresholds.decide(distance, cosine);

        debug!(
            distance,
            cosine,
            confidence = decision.confidence,
            is_match = decision.is_match,
            "Face comparison"
        );

        VerificationOutcome::decided(Modality::Face, decision.is_match, decision.confidence / 100.0, distance)
    }

    pub fn enroll(&self, user_id: Uuid, image_bytes: &[u8]) -> Result<EnrollmentTemplate> {
        let embedding = self.extract_embedding(image_bytes)?;
        Ok(EnrollmentTemplate::new(user_id, TemplatePayload::Face { embedding }))
    }

    pub fn verify_template(&self, template: &EnrollmentTemplate, image_bytes: &[u8]) -> VerificationOutcome {
        let TemplatePayload::Face { embedding: known } = &template.payload else {
            return VerificationOutcome::failed(
                Modality::Face,
                BiometricError::StoredTemplateCorrupt(format!("expected a face template, found {}", template.modality())),
            );
        };

        if let Err(e) = template.check_extractor_version() {
            return VerificationOutcome::failed(Modality::Face, e);
        }

        match self.extract_embedding(image_bytes) {
            Ok(probe) => self.verify(known, &probe),
            Err(e) => VerificationOutcome::failed(Modality::Face, e),
        }
    }
}
