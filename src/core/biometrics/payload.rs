// src/core/biometrics/payload.rs
use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::errors::{BiometricError, Result};

/// Decodes a base64 payload, accepting an optional `data:<mime>;base64,`
/// prefix as produced by browser capture APIs.
pub fn decode_base64_payload(payload: &str) -> Result<Vec<u8>> {
    let trimmed = payload.trim();
    let body = match trimmed.strip_prefix("data:") {
        Some(rest) => match rest.split_once(',') {
            Some((header, body)) if header.ends_with(";base64") => body,
            _ => {
                return Err(BiometricError::InputValidation(
                    "data URL must be base64 encoded".into(),
                ))
            }
        },
        None => trimmed,
    };

    let bytes = STANDARD
        .decode(body.trim())
        .map_err(|e| BiometricError::InputValidation(format!("malformed base64 payload: {e}")))?;

    if bytes.is_empty() {
        return Err(BiometricError::InputValidation("payload is empty".into()));
    }
    Ok(bytes)
}
