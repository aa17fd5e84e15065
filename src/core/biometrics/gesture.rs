// src/core/biometrics/gesture.rs
use std::f64::consts::FRAC_PI_4;
use std::fmt::Write as _;

use ring::digest::{digest, SHA256};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::errors::{BiometricError, ExtractionError, Result};
use super::{similarity, stats};
use crate::core::identity::types::{EnrollmentTemplate, Modality, TemplatePayload, VerificationOutcome};
use crate::utils::config::GestureConfig;

pub const FEATURE_SIZE: usize = 200;
pub const DEFAULT_THRESHOLD: f64 = 0.88;
pub const DEFAULT_MIN_POINTS: usize = 15;
pub const DEFAULT_MAX_POINTS: usize = 1000;

const RESAMPLE_COUNT: usize = 20;
const EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GesturePoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

impl GesturePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, timestamp: None }
    }

    pub fn timed(x: f64, y: f64, timestamp: f64) -> Self {
        Self { x, y, timestamp: Some(timestamp) }
    }
}

/// A freehand stroke as captured by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureInput {
    pub points: Vec<GesturePoint>,
}

impl GestureInput {
    pub fn new(points: Vec<GesturePoint>) -> Self {
        Self { points }
    }

    /// Parses `{"points": [{"x": .., "y": .., "timestamp": ..}, ..]}`.
    pub fn from_json(raw: &str) -> Result<Self> {
        let input: Self = serde_json::from_str(raw)
            .map_err(|e| BiometricError::InputValidation(format!("malformed gesture payload: {e}")))?;
        input.validate_values()?;
        Ok(input)
    }

    fn validate_values(&self) -> Result<()> {
        let finite = self.points.iter().all(|p| {
            p.x.is_finite() && p.y.is_finite() && p.timestamp.map_or(true, f64::is_finite)
        });
        if !finite {
            return Err(BiometricError::InputValidation("gesture contains non-finite values".into()));
        }
        Ok(())
    }
}

pub struct GestureMatcher {
    threshold: f64,
    min_points: usize,
    max_points: usize,
}

impl Default for GestureMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_MIN_POINTS, DEFAULT_MAX_POINTS)
    }
}

impl From<&GestureConfig> for GestureMatcher {
    fn from(config: &GestureConfig) -> Self {
        Self::new(config.threshold, config.min_points, config.max_points)
    }
}

impl GestureMatcher {
    pub fn new(threshold: f64, min_points: usize, max_points: usize) -> Self {
        Self { threshold, min_points, max_points }
    }

    pub fn extract_features(&self, input: &GestureInput) -> Result<Vec<f64>> {
        let count = input.points.len();
        if count < self.min_points {
            return Err(ExtractionError::InsufficientPoints { found: count, min: self.min_points }.into());
        }
        if count > self.max_points {
            return Err(ExtractionError::TooManyPoints { found: count, max: self.max_points }.into());
        }
        input.validate_values()?;

        let mut features = similarity::fit_length(path_features(&input.points), FEATURE_SIZE);
        similarity::l2_normalize(&mut features);
        Ok(features)
    }

    pub fn verify(&self, known: &[f64], probe: &[f64]) -> VerificationOutcome {
        if known.len() != probe.len() || known.is_empty() {
            return VerificationOutcome::failed(
                Modality::Gesture,
                BiometricError::dimension_mismatch(known.len(), probe.len()),
            );
        }

        let cosine = similarity::cosine(known, probe);
        let euclidean = similarity::euclidean(known, probe);
        let correlation = similarity::pearson(known, probe);
        let manhattan = similarity::manhattan(known, probe);

        let combined = 0.40 * cosine
            + 0.25 * similarity::inverse(euclidean)
            + 0.25 * similarity::rescale_correlation(correlation)
            + 0.10 * similarity::inverse(manhattan);
        let is_match = combined >= self.threshold;

        debug!(cosine, euclidean, correlation, manhattan, combined, is_match, "Gesture comparison");

        VerificationOutcome::decided(Modality::Gesture, is_match, combined, 1.0 - combined)
    }

    pub fn enroll(&self, user_id: Uuid, input: &GestureInput) -> Result<EnrollmentTemplate> {
        let features = self.extract_features(input)?;
        Ok(EnrollmentTemplate::new(user_id, TemplatePayload::Gesture { features }))
    }

    pub fn verify_template(&self, template: &EnrollmentTemplate, input: &GestureInput) -> VerificationOutcome {
        let TemplatePayload::Gesture { features: known } = &template.payload else {
            return VerificationOutcome::failed(
                Modality::Gesture,
                BiometricError::StoredTemplateCorrupt(format!("expected a gesture template, found {}", template.modality())),
            );
        };

        if let Err(e) = template.check_extractor_version() {
            return VerificationOutcome::failed(Modality::Gesture, e);
        }

        match self.extract_features(input) {
            Ok(probe) => self.verify(known, &probe),
            Err(e) => VerificationOutcome::failed(Modality::Gesture, e),
        }
    }
}

fn path_features(points: &[GesturePoint]) -> Vec<f64> {
    let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.y).collect();
    let dx: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let dy: Vec<f64> = ys.windows(2).map(|w| w[1] - w[0]).collect();
    let segments: Vec<f64> = dx.iter().zip(&dy).map(|(x, y)| x.hypot(*y)).collect();

    let mut features = Vec::with_capacity(FEATURE_SIZE);

    // Path geometry.
    let total_length: f64 = segments.iter().sum();
    features.extend([total_length, stats::mean(&segments), stats::variance(&segments)]);

    // Bounding box.
    let (x_min, x_max) = (stats::min(&xs), stats::max(&xs));
    let (y_min, y_max) = (stats::min(&ys), stats::max(&ys));
    let width = x_max - x_min;
    let height = y_max - y_min;
    features.extend([width, height, x_min, x_max, y_min, y_max]);
    features.extend([height / (width + EPSILON), width.hypot(height)]);

    // Centroid and spread around it.
    let centroid_x = stats::mean(&xs);
    let centroid_y = stats::mean(&ys);
    let radial: Vec<f64> = xs.iter().zip(&ys).map(|(x, y)| (x - centroid_x).hypot(y - centroid_y)).collect();
    features.extend([centroid_x, centroid_y]);
    features.extend([
        stats::min(&radial),
        stats::quantile(&radial, 0.25),
        stats::median(&radial),
        stats::quantile(&radial, 0.75),
        stats::max(&radial),
    ]);

    // Turning behaviour.
    let angles: Vec<f64> = dx.iter().zip(&dy).map(|(x, y)| y.atan2(*x)).collect();
    if angles.is_empty() {
        features.extend([0.0; 6]);
    } else {
        let turns: Vec<f64> = angles.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
        let sharp_turns = turns.iter().filter(|&&t| t > FRAC_PI_4).count() as f64;
        features.extend([
            stats::mean(&angles),
            stats::std_dev(&angles),
            stats::min(&angles),
            stats::max(&angles),
            sharp_turns,
            turns.iter().sum(),
        ]);
    }

    features.extend(kinematic_features(points, &segments));
    features.extend(coordinate_fingerprint(&xs, &ys));

    // Resampled path, normalized into the bounding box.
    if xs.len() >= RESAMPLE_COUNT {
        let last = (xs.len() - 1) as f64;
        let indices: Vec<usize> = (0..RESAMPLE_COUNT)
            .map(|i| (i as f64 * last / (RESAMPLE_COUNT - 1) as f64) as usize)
            .collect();
        let scale = |value: f64, origin: f64, extent: f64| {
            if extent > 0.0 { (value - origin) / extent } else { value }
        };
        features.extend(indices.iter().map(|&i| scale(xs[i], x_min, width)));
        features.extend(indices.iter().map(|&i| scale(ys[i], y_min, height)));
    } else {
        features.extend([0.0; RESAMPLE_COUNT * 2]);
    }

    // Shape complexity.
    features.extend([local_maxima(&xs), local_maxima(&ys)]);

    // Start and end.
    let (start_x, start_y) = (xs[0], ys[0]);
    let (end_x, end_y) = (xs[xs.len() - 1], ys[ys.len() - 1]);
    let start_end = (end_x - start_x).hypot(end_y - start_y);
    features.extend([start_x, start_y, end_x, end_y, start_end, start_end / (total_length + EPSILON)]);

    features.extend([
        stats::std_dev(&xs),
        stats::std_dev(&ys),
        stats::variance(&xs),
        stats::variance(&ys),
    ]);

    features
}

/// Velocity and acceleration statistics; zero-filled unless every point
/// carries a timestamp.
fn kinematic_features(points: &[GesturePoint], segments: &[f64]) -> [f64; 8] {
    let timestamps: Option<Vec<f64>> = points.iter().map(|p| p.timestamp).collect();
    let Some(timestamps) = timestamps else {
        return [0.0; 8];
    };

    let velocities: Vec<f64> = timestamps
        .windows(2)
        .zip(segments)
        .map(|(t, distance)| distance / (t[1] - t[0] + EPSILON))
        .collect();
    let [mean, std, median, min, max] = stats::summary(&velocities);

    let mut kinematics = [mean, std, min, max, median, 0.0, 0.0, 0.0];
    if velocities.len() > 1 {
        let accelerations: Vec<f64> = velocities.windows(2).map(|w| w[1] - w[0]).collect();
        let magnitudes: Vec<f64> = accelerations.iter().map(|a| a.abs()).collect();
        kinematics[5] = stats::mean(&magnitudes);
        kinematics[6] = stats::std_dev(&accelerations);
        kinematics[7] = stats::max(&magnitudes);
    }
    kinematics
}

/// SHA-256 of every other coordinate pair rendered to two decimals.
fn coordinate_fingerprint(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let mut rendered = String::new();
    for (x, y) in xs.iter().zip(ys).step_by(2) {
        let _ = write!(rendered, "{x:.2},{y:.2};");
    }
    digest(&SHA256, rendered.as_bytes())
        .as_ref()
        .iter()
        .map(|&b| b as f64 / 255.0)
        .collect()
}

fn local_maxima(values: &[f64]) -> f64 {
    values
        .windows(3)
        .filter(|w| w[1] > w[0] && w[1] > w[2])
        .count() as f64
}
