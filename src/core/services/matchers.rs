// src/core/services/matchers.rs
use std::sync::Arc;

use crate::core::biometrics::{
    FaceDetector, FaceEncoder, FaceMatcher, FaceThresholds, GestureMatcher, KeystrokeMatcher,
    KeystrokeThresholds, VoiceMatcher,
};
use crate::core::crypto::TotpFactor;
use crate::utils::config::Config;

/// One matcher per modality, built once at start-up and shared by the
/// enrollment and verification services.
pub struct Matchers {
    pub face: FaceMatcher,
    pub voice: VoiceMatcher,
    pub gesture: GestureMatcher,
    pub keystroke: KeystrokeMatcher,
    pub totp: TotpFactor,
}

impl Matchers {
    pub fn new(config: &Config, face_detector: Arc<dyn FaceDetector>, face_encoder: Arc<dyn FaceEncoder>) -> Self {
        Self {
            face: FaceMatcher::new(face_detector, face_encoder, FaceThresholds::from(&config.face)),
            voice: VoiceMatcher::from(&config.voice),
            gesture: GestureMatcher::from(&config.gesture),
            keystroke: KeystrokeMatcher::new(KeystrokeThresholds::from(&config.keystroke)),
            totp: TotpFactor::from(&config.totp),
        }
    }
}
