// src/core/biometrics/mod.rs
//! Feature extraction and matching for the biometric and behavioural
//! modalities. Matchers hold configuration only and are shared freely.

pub mod errors;
pub mod face;
pub mod gesture;
pub mod keystroke;
pub mod payload;
pub mod similarity;
pub mod stats;
pub mod voice;

pub use errors::{BiometricError, ExtractionError};
pub use face::{FaceDetector, FaceEncoder, FaceMatcher, FaceRegion, FaceThresholds, PixelGridEncoder};
pub use gesture::{GestureInput, GestureMatcher, GesturePoint};
pub use keystroke::{
    KeyEvent, KeyEventKind, KeyTiming, KeystrokeInput, KeystrokeMatcher, KeystrokeThresholds,
    PatternStrength, StrengthCategory,
};
pub use voice::{AudioQuality, VoiceMatcher, VoiceProfile};
