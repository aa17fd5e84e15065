// src/core/crypto/totp.rs
use serde::{Deserialize, Serialize};
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::debug;
use uuid::Uuid;

use super::secrets::random_bytes;
use crate::core::biometrics::errors::BiometricError;
use crate::core::identity::types::{EnrollmentTemplate, Modality, TemplatePayload, VerificationOutcome};
use crate::utils::config::TotpConfig;
use crate::utils::error::{AuthError, Result};

/// 160-bit shared secret.
const SECRET_LEN: usize = 20;

/// What an authenticator app needs to be provisioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotpProvisioning {
    pub secret_base32: String,
    pub provisioning_uri: String,
}

pub struct TotpFactor {
    issuer: String,
    digits: usize,
    skew: u8,
    step: u64,
}

impl From<&TotpConfig> for TotpFactor {
    fn from(config: &TotpConfig) -> Self {
        Self::new(config.issuer.clone(), config.digits, config.skew, config.step)
    }
}

impl TotpFactor {
    pub fn new(issuer: String, digits: usize, skew: u8, step: u64) -> Self {
        Self { issuer, digits, skew, step }
    }

    fn build(&self, secret: Vec<u8>, account_name: &str) -> Result<TOTP> {
        TOTP::new(
            Algorithm::SHA1,
            self.digits,
            self.skew,
            self.step,
            secret,
            Some(self.issuer.clone()),
            account_name.to_string(),
        )
        .map_err(|e| AuthError::Crypto(format!("invalid TOTP parameters: {e}")))
    }

    pub fn enroll(&self, user_id: Uuid, account_name: &str) -> Result<(EnrollmentTemplate, TotpProvisioning)> {
        let totp = self.build(random_bytes(SECRET_LEN)?, account_name)?;
        let provisioning = TotpProvisioning {
            secret_base32: totp.get_secret_base32(),
            provisioning_uri: totp.get_url(),
        };

        let template = EnrollmentTemplate::new(
            user_id,
            TemplatePayload::Totp {
                secret_base32: provisioning.secret_base32.clone(),
                account_name: account_name.to_string(),
            },
        );
        Ok((template, provisioning))
    }

    /// Code generated for a stored template at `unix_time`.
    pub fn generate(&self, template: &EnrollmentTemplate, unix_time: u64) -> Result<String> {
        let TemplatePayload::Totp { secret_base32, account_name } = &template.payload else {
            return Err(AuthError::NotEnrolled(Modality::Totp));
        };
        let secret = Secret::Encoded(secret_base32.clone())
            .to_bytes()
            .map_err(|e| AuthError::Crypto(format!("stored TOTP secret is invalid: {e:?}")))?;
        Ok(self.build(secret, account_name)?.generate(unix_time))
    }

    /// Accepts codes within `skew` steps either side of `unix_time`.
    pub fn verify_template(&self, template: &EnrollmentTemplate, code: &str, unix_time: u64) -> VerificationOutcome {
        let code = code.trim();
        if code.len() != self.digits || !code.chars().all(|c| c.is_ascii_digit()) {
            return VerificationOutcome::failed(
                Modality::Totp,
                BiometricError::InputValidation(format!("code must be {} digits", self.digits)),
            );
        }

        let TemplatePayload::Totp { secret_base32, account_name } = &template.payload else {
            return VerificationOutcome::failed(
                Modality::Totp,
                BiometricError::StoredTemplateCorrupt(format!("expected a totp template, found {}", template.modality())),
            );
        };

        let totp = Secret::Encoded(secret_base32.clone())
            .to_bytes()
            .map_err(|e| format!("{e:?}"))
            .and_then(|secret| self.build(secret, account_name).map_err(|e| e.to_string()));
        let totp = match totp {
            Ok(totp) => totp,
            Err(e) => {
                return VerificationOutcome::failed(Modality::Totp, BiometricError::StoredTemplateCorrupt(e));
            }
        };

        // Earliest instants cannot look back `skew` steps.
        let earliest = self.step * self.skew as u64;
        let is_match = totp.check(code, unix_time.max(earliest));
        debug!(is_match, "TOTP check");

        let confidence = if is_match { 1.0 } else { 0.0 };
        VerificationOutcome::decided(Modality::Totp, is_match, confidence, 1.0 - confidence)
    }
}
