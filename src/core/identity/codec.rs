// src/core/identity/codec.rs
use crate::core::biometrics::errors::{BiometricError, Result};

/// Converts feature vectors to and from their stored string form.
///
/// Vectors are written as comma-separated decimals using the shortest
/// representation that parses back to the identical `f64`. Decoding also
/// accepts a JSON array, the layout older templates were stored in.
pub struct FeatureCodec;

impl FeatureCodec {
    pub fn encode(features: &[f64]) -> String {
        features
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn decode(stored: &str) -> Result<Vec<f64>> {
        let stored = stored.trim();
        if stored.starts_with('[') {
            return serde_json::from_str(stored)
                .map_err(|e| BiometricError::StoredTemplateCorrupt(format!("invalid feature array: {e}")));
        }
        if stored.is_empty() {
            return Ok(Vec::new());
        }

        stored
            .split(',')
            .map(|part| {
                part.trim().parse::<f64>().map_err(|_| {
                    BiometricError::StoredTemplateCorrupt(format!("invalid feature value '{part}'"))
                })
            })
            .collect()
    }
}

/// `#[serde(with = "serde_features")]` support for `Vec<f64>` fields.
pub mod serde_features {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    use super::FeatureCodec;

    pub fn serialize<S: Serializer>(features: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&FeatureCodec::encode(features))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let stored = String::deserialize(deserializer)?;
        FeatureCodec::decode(&stored).map_err(D::Error::custom)
    }
}
