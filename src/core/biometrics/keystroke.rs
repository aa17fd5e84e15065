// src/core/biometrics/keystroke.rs
use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::errors::{BiometricError, ExtractionError, Result};
use super::stats;
use crate::core::crypto::secrets;
use crate::core::identity::types::{
    EnrollmentTemplate, KeystrokeProfile, Modality, TemplatePayload, VerificationOutcome,
};
use crate::utils::config::KeystrokeConfig;

pub const FEATURE_COUNT: usize = 13;
pub const MIN_TIMINGS: usize = 3;
/// Sample count at which enrollment stops being penalized.
pub const IDEAL_SAMPLES: usize = 5;

const EPSILON: f64 = 1e-6;

/// One key press as reported by the client, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyTiming {
    pub hold_time: f64,
    /// Gap since the previous key was released; absent for the first key.
    #[serde(default)]
    pub flight_time: Option<f64>,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyEventKind {
    KeyDown,
    KeyUp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: KeyEventKind,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeystrokeInput {
    Timings(Vec<KeyTiming>),
    RawEvents(Vec<KeyEvent>),
}

impl KeystrokeInput {
    /// Parses `{"timings": [..]}` or `{"raw_events": [..]}`.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| BiometricError::InputValidation(format!("malformed keystroke payload: {e}")))
    }

    /// Paired timings ordered by press time. Raw events are matched
    /// down-to-up per key label in arrival order; unmatched events are
    /// dropped.
    pub fn to_timings(&self) -> Vec<KeyTiming> {
        match self {
            KeystrokeInput::Timings(timings) => timings.clone(),
            KeystrokeInput::RawEvents(events) => pair_events(events),
        }
    }
}

fn pair_events(events: &[KeyEvent]) -> Vec<KeyTiming> {
    let mut ordered: Vec<&KeyEvent> = events.iter().collect();
    ordered.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let mut pending: HashMap<&str, VecDeque<f64>> = HashMap::new();
    let mut strokes: Vec<(f64, f64)> = Vec::new();
    for event in ordered {
        match event.kind {
            KeyEventKind::KeyDown => pending.entry(event.key.as_str()).or_default().push_back(event.timestamp),
            KeyEventKind::KeyUp => {
                if let Some(press) = pending.get_mut(event.key.as_str()).and_then(VecDeque::pop_front) {
                    strokes.push((press, event.timestamp));
                }
            }
        }
    }
    strokes.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut timings = Vec::with_capacity(strokes.len());
    let mut previous_release: Option<f64> = None;
    for (press, release) in strokes {
        timings.push(KeyTiming {
            hold_time: release - press,
            flight_time: previous_release.map(|released| press - released),
            timestamp: press,
        });
        previous_release = Some(release);
    }
    timings
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrengthCategory {
    Strong,
    Good,
    Moderate,
    Weak,
}

/// Enrollment-quality feedback returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStrength {
    pub category: StrengthCategory,
    pub score: f64,
    pub consistency: f64,
    pub num_samples: usize,
    pub recommendations: Vec<String>,
}

impl PatternStrength {
    pub fn assess(consistency: f64, num_samples: usize) -> Self {
        let sample_factor = (num_samples as f64 / IDEAL_SAMPLES as f64).min(1.0);
        let score = consistency * 0.7 + sample_factor * 0.3;

        let category = if score >= 0.8 {
            StrengthCategory::Strong
        } else if score >= 0.6 {
            StrengthCategory::Good
        } else if score >= 0.4 {
            StrengthCategory::Moderate
        } else {
            StrengthCategory::Weak
        };

        let mut recommendations = Vec::new();
        if num_samples < IDEAL_SAMPLES {
            recommendations.push("Add more samples for better accuracy".to_string());
        }
        if consistency < 0.6 {
            recommendations.push("Try to type more consistently".to_string());
        }

        Self { category, score, consistency, num_samples, recommendations }
    }
}

#[derive(Debug, Clone)]
pub struct KeystrokeEnrollment {
    pub template: EnrollmentTemplate,
    pub strength: PatternStrength,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeystrokeThresholds {
    pub distance_threshold: f64,
    /// Percent.
    pub min_confidence: f64,
    pub min_samples: usize,
    pub min_strength: f64,
}

impl Default for KeystrokeThresholds {
    fn default() -> Self {
        Self {
            distance_threshold: 1.2,
            min_confidence: 38.0,
            min_samples: 3,
            min_strength: 0.3,
        }
    }
}

impl From<&KeystrokeConfig> for KeystrokeThresholds {
    fn from(config: &KeystrokeConfig) -> Self {
        Self {
            distance_threshold: config.distance_threshold,
            min_confidence: config.min_confidence,
            min_samples: config.min_samples,
            min_strength: config.min_strength,
        }
    }
}

impl KeystrokeThresholds {
    /// Confidence in [0, 1] for a normalized distance.
    pub fn confidence(distance: f64) -> f64 {
        1.0 / (1.0 + distance)
    }

    /// Both the distance ceiling and the confidence floor must hold.
    pub fn decide(&self, distance: f64) -> bool {
        distance < self.distance_threshold && Self::confidence(distance) * 100.0 > self.min_confidence
    }
}

#[derive(Debug, Default)]
pub struct KeystrokeMatcher {
    thresholds: KeystrokeThresholds,
}

impl KeystrokeMatcher {
    pub fn new(thresholds: KeystrokeThresholds) -> Self {
        Self { thresholds }
    }

    /// Hold statistics (5), flight statistics (5), then interval mean,
    /// interval deviation and keys per second.
    pub fn extract_features(&self, input: &KeystrokeInput) -> Result<Vec<f64>> {
        let timings = input.to_timings();
        if timings.len() < MIN_TIMINGS {
            return Err(ExtractionError::InsufficientKeystrokeData { found: timings.len(), min: MIN_TIMINGS }.into());
        }
        let finite = timings.iter().all(|t| {
            t.hold_time.is_finite() && t.timestamp.is_finite() && t.flight_time.map_or(true, f64::is_finite)
        });
        if !finite || timings.iter().any(|t| t.hold_time < 0.0) {
            return Err(BiometricError::InputValidation("keystroke timings must be finite and non-negative".into()));
        }

        let holds: Vec<f64> = timings.iter().map(|t| t.hold_time).collect();
        let flights: Vec<f64> = timings.iter().filter_map(|t| t.flight_time).collect();
        let intervals: Vec<f64> = timings.windows(2).map(|w| w[1].timestamp - w[0].timestamp).collect();

        let span = timings[timings.len() - 1].timestamp - timings[0].timestamp;
        let keys_per_second = if span > 0.0 {
            intervals.len() as f64 / span * 1000.0
        } else {
            0.0
        };

        let mut features = Vec::with_capacity(FEATURE_COUNT);
        features.extend(stats::summary(&holds));
        features.extend(stats::summary(&flights));
        features.extend([stats::mean(&intervals), stats::std_dev(&intervals), keys_per_second]);
        Ok(features)
    }

    /// Per-feature mean and deviation across enrollment samples.
    pub fn build_profile(&self, samples: &[KeystrokeInput]) -> Result<KeystrokeProfile> {
        if samples.len() < self.thresholds.min_samples {
            return Err(ExtractionError::InsufficientSamples {
                found: samples.len(),
                min: self.thresholds.min_samples,
            }
            .into());
        }

        let vectors = samples
            .iter()
            .map(|sample| self.extract_features(sample))
            .collect::<Result<Vec<_>>>()?;

        let column = |i: usize| vectors.iter().map(|v| v[i]).collect::<Vec<f64>>();
        let mean: Vec<f64> = (0..FEATURE_COUNT).map(|i| stats::mean(&column(i))).collect();
        let std: Vec<f64> = (0..FEATURE_COUNT).map(|i| stats::std_dev(&column(i))).collect();

        let relative_spread: Vec<f64> = std.iter().zip(&mean).map(|(s, m)| s / (m + EPSILON)).collect();
        let consistency = (1.0 - stats::mean(&relative_spread)).clamp(0.0, 1.0);

        Ok(KeystrokeProfile { mean, std, num_samples: samples.len(), consistency })
    }

    /// Root-mean-square of per-feature z-scores against the profile.
    pub fn distance(profile: &KeystrokeProfile, features: &[f64]) -> f64 {
        let squared: Vec<f64> = features
            .iter()
            .zip(profile.mean.iter().zip(&profile.std))
            .map(|(value, (mean, std))| ((value - mean) / (std + EPSILON)).powi(2))
            .collect();
        stats::mean(&squared).sqrt()
    }

    pub fn verify(&self, profile: &KeystrokeProfile, features: &[f64]) -> VerificationOutcome {
        if profile.mean.len() != features.len()
            || profile.std.len() != features.len()
            || features.len() != FEATURE_COUNT
        {
            return VerificationOutcome::failed(
                Modality::Keystroke,
                BiometricError::dimension_mismatch(profile.mean.len(), features.len()),
            );
        }

        let distance = Self::distance(profile, features);
        let confidence = KeystrokeThresholds::confidence(distance);
        let is_match = self.thresholds.decide(distance);

        debug!(distance, confidence, is_match, "Keystroke comparison");

        VerificationOutcome::decided(Modality::Keystroke, is_match, confidence, distance)
    }

    pub fn enroll(&self, user_id: Uuid, passphrase: &str, samples: &[KeystrokeInput]) -> Result<KeystrokeEnrollment> {
        if passphrase.is_empty() {
            return Err(BiometricError::InputValidation("passphrase must not be empty".into()));
        }

        let profile = self.build_profile(samples)?;
        let strength = PatternStrength::assess(profile.consistency, profile.num_samples);
        if strength.score < self.thresholds.min_strength {
            return Err(ExtractionError::WeakKeystrokePattern { score: strength.score }.into());
        }

        let template = EnrollmentTemplate::new(
            user_id,
            TemplatePayload::Keystroke {
                profile,
                passphrase_digest: secrets::passphrase_digest(passphrase),
            },
        );
        Ok(KeystrokeEnrollment { template, strength })
    }

    /// The passphrase must match exactly before any timing is compared.
    pub fn verify_template(
        &self,
        template: &EnrollmentTemplate,
        passphrase: &str,
        input: &KeystrokeInput,
    ) -> VerificationOutcome {
        let TemplatePayload::Keystroke { profile, passphrase_digest } = &template.payload else {
            return VerificationOutcome::failed(
                Modality::Keystroke,
                BiometricError::StoredTemplateCorrupt(format!("expected a keystroke template, found {}", template.modality())),
            );
        };

        if let Err(e) = template.check_extractor_version() {
            return VerificationOutcome::failed(Modality::Keystroke, e);
        }

        if !secrets::passphrase_matches(passphrase_digest, passphrase) {
            return VerificationOutcome::failed(Modality::Keystroke, BiometricError::PassphraseMismatch);
        }

        match self.extract_features(input) {
            Ok(features) => self.verify(profile, &features),
            Err(e) => VerificationOutcome::failed(Modality::Keystroke, e),
        }
    }
}
