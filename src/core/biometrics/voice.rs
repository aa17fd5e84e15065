// src/core/biometrics/voice.rs
use ring::digest::{digest, SHA256};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::errors::{BiometricError, ExtractionError, Result};
use super::similarity;
use crate::core::identity::types::{AdvisoryFlag, EnrollmentTemplate, Modality, TemplatePayload, VerificationOutcome};
use crate::utils::config::VoiceConfig;

pub const FEATURE_SIZE: usize = 256;
pub const DEFAULT_MAX_AUDIO_BYTES: usize = 5_000_000;

const SEGMENT_LEN: usize = 2000;
const HISTOGRAM_BINS: usize = 32;
const WINDOWS: usize = 10;
const SUBSAMPLE_STRIDE: usize = 100;
const SUBSAMPLE_LEN: usize = 32;
/// Nominal byte rate used to estimate recording duration.
const BYTES_PER_SECOND: f64 = 16_000.0;

const COSINE_DEFICIT_MARGIN: f64 = 0.15;
const LOW_QUALITY: f64 = 0.5;
const REPLAY_SIMILARITY: f64 = 0.999;
const REPLAY_QUALITY: f64 = 0.6;

/// Trades the minimum recording length against decision strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceProfile {
    Relaxed,
    Balanced,
    Strict,
}

impl VoiceProfile {
    pub fn min_audio_bytes(&self) -> usize {
        match self {
            VoiceProfile::Relaxed => 5_000,
            VoiceProfile::Balanced => 10_000,
            VoiceProfile::Strict => 20_000,
        }
    }

    pub fn threshold(&self) -> f64 {
        match self {
            VoiceProfile::Relaxed => 0.85,
            VoiceProfile::Balanced => 0.90,
            VoiceProfile::Strict => 0.92,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioQuality {
    pub score: f64,
    pub clip_ratio: f64,
    pub duration_secs: f64,
}

impl AudioQuality {
    /// Clean audio reaches full duration quality at the profile's minimum
    /// length, so any recording the profile accepts can match itself.
    pub fn measure(audio: &[u8], profile: VoiceProfile) -> Self {
        let clipped = audio.iter().filter(|&&b| b == 0x00 || b == 0xFF).count();
        let clip_ratio = clipped as f64 / audio.len().max(1) as f64;
        let duration_secs = audio.len() as f64 / BYTES_PER_SECOND;

        let clip_factor = 1.0 - (2.0 * clip_ratio).min(1.0);
        let coverage = audio.len() as f64 / profile.min_audio_bytes() as f64;
        let duration_factor = 0.4 + 0.6 * coverage.min(1.0);

        Self {
            score: clip_factor * duration_factor,
            clip_ratio,
            duration_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoiceFeatures {
    pub features: Vec<f64>,
    pub quality: AudioQuality,
}

pub struct VoiceMatcher {
    enroll_profile: VoiceProfile,
    login_profile: VoiceProfile,
    max_audio_bytes: usize,
}

impl Default for VoiceMatcher {
    fn default() -> Self {
        Self::new(VoiceProfile::Balanced, VoiceProfile::Balanced, DEFAULT_MAX_AUDIO_BYTES)
    }
}

impl From<&VoiceConfig> for VoiceMatcher {
    fn from(config: &VoiceConfig) -> Self {
        Self::new(config.enroll_profile, config.login_profile, config.max_audio_bytes)
    }
}

impl VoiceMatcher {
    pub fn new(enroll_profile: VoiceProfile, login_profile: VoiceProfile, max_audio_bytes: usize) -> Self {
        Self { enroll_profile, login_profile, max_audio_bytes }
    }

    pub fn login_profile(&self) -> VoiceProfile {
        self.login_profile
    }

    pub fn extract_features(&self, audio: &[u8], profile: VoiceProfile) -> Result<VoiceFeatures> {
        let min = profile.min_audio_bytes();
        if audio.len() < min {
            return Err(ExtractionError::AudioTooShort { found: audio.len(), min }.into());
        }
        if audio.len() > self.max_audio_bytes {
            return Err(ExtractionError::AudioTooLarge { found: audio.len(), max: self.max_audio_bytes }.into());
        }

        let mut features = Vec::with_capacity(FEATURE_SIZE);

        // Content fingerprints of the opening, middle and closing segments.
        let middle = (audio.len() / 2).saturating_sub(SEGMENT_LEN / 2);
        let segments = [
            &audio[..SEGMENT_LEN.min(audio.len())],
            &audio[middle..(middle + SEGMENT_LEN).min(audio.len())],
            &audio[audio.len().saturating_sub(SEGMENT_LEN)..],
        ];
        for segment in segments {
            features.extend(digest(&SHA256, segment).as_ref().iter().map(|&b| b as f64 / 255.0));
        }

        let mut histogram = [0.0f64; HISTOGRAM_BINS];
        for &byte in audio {
            histogram[byte as usize * HISTOGRAM_BINS / 256] += 1.0;
        }
        let total = audio.len() as f64 + 1e-10;
        features.extend(histogram.iter().map(|count| count / total));

        let samples: Vec<f64> = audio.iter().map(|&b| b as f64 / 255.0).collect();
        let window = samples.len() / WINDOWS;
        for chunk in samples.chunks_exact(window).take(WINDOWS) {
            let lowest = chunk.iter().copied().fold(f64::INFINITY, f64::min);
            let highest = chunk.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mean = chunk.iter().sum::<f64>() / chunk.len() as f64;
            let variance = chunk.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / chunk.len() as f64;
            features.extend([mean, variance.sqrt(), variance, highest - lowest]);
        }

        let subsampled = samples.iter().step_by(SUBSAMPLE_STRIDE).take(SUBSAMPLE_LEN).copied();
        features.extend(similarity::fit_length(subsampled.collect(), SUBSAMPLE_LEN));

        let mut features = similarity::fit_length(features, FEATURE_SIZE);
        similarity::l2_normalize(&mut features);

        Ok(VoiceFeatures {
            features,
            quality: AudioQuality::measure(audio, profile),
        })
    }

    /// Weighted similarity of two voice vectors, scaled by the mean quality
    /// of both recordings before the profile threshold applies.
    pub fn verify(
        &self,
        known: &[f64],
        probe: &[f64],
        profile: VoiceProfile,
        quality_known: f64,
        quality_probe: f64,
    ) -> VerificationOutcome {
        if known.len() != probe.len() || known.is_empty() {
            return VerificationOutcome::failed(
                Modality::Voice,
                BiometricError::dimension_mismatch(known.len(), probe.len()),
            );
        }

        let cosine = similarity::cosine(known, probe);
        let euclidean = similarity::euclidean(known, probe);
        let correlation = similarity::pearson(known, probe);
        let raw = 0.5 * cosine
            + 0.3 * similarity::inverse(euclidean)
            + 0.2 * similarity::rescale_correlation(correlation);

        let average_quality = ((quality_known + quality_probe) / 2.0).clamp(0.0, 1.0);
        let effective = raw * (0.5 + 0.5 * average_quality);
        let threshold = profile.threshold();
        let is_match = effective >= threshold;

        let mut flags = Vec::new();
        if average_quality < LOW_QUALITY {
            flags.push(AdvisoryFlag::LowQuality);
        }
        if cosine < threshold - COSINE_DEFICIT_MARGIN {
            flags.push(AdvisoryFlag::CosineDeficit);
        }
        if raw >= REPLAY_SIMILARITY && average_quality < REPLAY_QUALITY {
            flags.push(AdvisoryFlag::PossibleReplay);
        }

        debug!(
            cosine,
            euclidean,
            correlation,
            raw,
            effective,
            average_quality,
            threshold,
            is_match,
            "Voice comparison"
        );

        VerificationOutcome::decided(Modality::Voice, is_match, effective, 1.0 - effective).with_flags(flags)
    }

    pub fn enroll(&self, user_id: Uuid, audio: &[u8]) -> Result<EnrollmentTemplate> {
        let extracted = self.extract_features(audio, self.enroll_profile)?;
        Ok(EnrollmentTemplate::new(
            user_id,
            TemplatePayload::Voice {
                features: extracted.features,
                quality: extracted.quality.score,
                profile: self.enroll_profile,
            },
        ))
    }

    pub fn verify_template(&self, template: &EnrollmentTemplate, audio: &[u8]) -> VerificationOutcome {
        let TemplatePayload::Voice { features: known, quality, .. } = &template.payload else {
            return VerificationOutcome::failed(
                Modality::Voice,
                BiometricError::StoredTemplateCorrupt(format!("expected a voice template, found {}", template.modality())),
            );
        };

        if let Err(e) = template.check_extractor_version() {
            return VerificationOutcome::failed(Modality::Voice, e);
        }

        match self.extract_features(audio, self.login_profile) {
            Ok(probe) => self.verify(known, &probe.features, self.login_profile, *quality, probe.quality.score),
            Err(e) => VerificationOutcome::failed(Modality::Voice, e),
        }
    }
}
