// src/core/services/orchestrator.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::biometrics::errors::BiometricError;
use crate::core::crypto::{ChallengeClaims, ChallengeCodec, TokenError};
use crate::core::identity::{IdentityProvider, Modality, SessionCredentials, VerificationOutcome};
use crate::utils::{
    clock::Clock,
    config::ChallengeConfig,
    error::{AuthError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    TokenInvalid,
    TokenExpired,
    TokenAlreadyRedeemed,
    NotEnrolled,
    PassphraseMismatch,
    InvalidCode,
    InputValidation,
    ExtractionFailure,
    StoredTemplateCorrupt,
    MatchRejected,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::TokenInvalid => "token_invalid",
            RejectReason::TokenExpired => "token_expired",
            RejectReason::TokenAlreadyRedeemed => "token_already_redeemed",
            RejectReason::NotEnrolled => "not_enrolled",
            RejectReason::PassphraseMismatch => "passphrase_mismatch",
            RejectReason::InvalidCode => "invalid_code",
            RejectReason::InputValidation => "invalid_input",
            RejectReason::ExtractionFailure => "extraction_failure",
            RejectReason::StoredTemplateCorrupt => "stored_template_corrupt",
            RejectReason::MatchRejected => "match_rejected",
        }
    }

    /// Why a non-matching outcome was rejected. `None` for a match.
    pub fn for_outcome(outcome: &VerificationOutcome) -> Option<Self> {
        if outcome.is_match {
            return None;
        }

        let reason = match &outcome.failure {
            Some(BiometricError::InputValidation(_)) => RejectReason::InputValidation,
            Some(BiometricError::Extraction(_)) => RejectReason::ExtractionFailure,
            Some(BiometricError::StoredTemplateCorrupt(_)) => RejectReason::StoredTemplateCorrupt,
            Some(BiometricError::PassphraseMismatch) => RejectReason::PassphraseMismatch,
            None if matches!(outcome.modality, Modality::Totp | Modality::BackupCode) => RejectReason::InvalidCode,
            None => RejectReason::MatchRejected,
        };
        Some(reason)
    }
}

impl From<TokenError> for RejectReason {
    fn from(error: TokenError) -> Self {
        match error {
            TokenError::Invalid(_) => RejectReason::TokenInvalid,
            TokenError::Expired => RejectReason::TokenExpired,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Redemption {
    SessionGranted(SessionCredentials),
    Rejected(RejectReason),
}

impl Redemption {
    pub fn is_granted(&self) -> bool {
        matches!(self, Redemption::SessionGranted(_))
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Redemption::SessionGranted(_) => None,
            Redemption::Rejected(reason) => Some(*reason),
        }
    }
}

/// Issued challenge: the signed token and when it stops being accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedChallenge {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Drives password-verified -> awaiting-second-factor -> granted/rejected.
///
/// Tokens are stateless; the only state kept here is the set of token ids
/// that already produced a session, and only while those tokens could
/// still pass the expiry check.
pub struct ChallengeOrchestrator {
    codec: ChallengeCodec,
    clock: Arc<dyn Clock>,
    single_use: bool,
    redeemed: Mutex<HashMap<Uuid, i64>>,
}

impl ChallengeOrchestrator {
    pub fn new(codec: ChallengeCodec, clock: Arc<dyn Clock>, single_use: bool) -> Self {
        Self {
            codec,
            clock,
            single_use,
            redeemed: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &ChallengeConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let ttl = Duration::from_std(std::time::Duration::from_secs(config.ttl_secs))
            .map_err(|e| AuthError::Config(format!("challenge.ttl_secs out of range: {e}")))?;
        Ok(Self::new(ChallengeCodec::new(config.secret.as_bytes(), ttl), clock, config.single_use))
    }

    pub fn issue_challenge(&self, user_id: Uuid) -> Result<IssuedChallenge> {
        let now = self.clock.now();
        let (token, claims) = self.codec.sign(user_id, now)?;
        let expires_at = claims
            .expires_at()
            .ok_or_else(|| AuthError::Crypto("challenge expiry out of range".into()))?;

        info!(%user_id, %expires_at, "Challenge issued");
        Ok(IssuedChallenge { token, user_id, expires_at })
    }

    /// Validates a token for a second-factor attempt: signature, type,
    /// expiry and, when tokens are single-use, that it has not already
    /// produced a session.
    pub fn open(&self, token: &str) -> std::result::Result<ChallengeClaims, RejectReason> {
        let now = self.clock.now();
        let claims = self.codec.verify(token, now).map_err(|e| {
            warn!(error = %e, "Challenge token rejected");
            RejectReason::from(e)
        })?;

        if self.single_use && self.redeemed.lock().contains_key(&claims.jti) {
            warn!(user_id = %claims.sub, "Challenge token already redeemed");
            return Err(RejectReason::TokenAlreadyRedeemed);
        }

        Ok(claims)
    }

    /// Converts a matcher outcome into a session or a rejection. The token
    /// is checked again so an outcome can never outlive its challenge.
    pub async fn redeem_challenge(
        &self,
        token: &str,
        outcome: &VerificationOutcome,
        identity: &dyn IdentityProvider,
    ) -> Result<Redemption> {
        let claims = match self.open(token) {
            Ok(claims) => claims,
            Err(reason) => return Ok(Redemption::Rejected(reason)),
        };

        if let Some(reason) = RejectReason::for_outcome(outcome) {
            warn!(
                user_id = %claims.sub,
                modality = %outcome.modality,
                reason = reason.as_str(),
                "Second factor rejected"
            );
            return Ok(Redemption::Rejected(reason));
        }

        if self.single_use && !self.claim(&claims) {
            warn!(user_id = %claims.sub, "Challenge token already redeemed");
            return Ok(Redemption::Rejected(RejectReason::TokenAlreadyRedeemed));
        }

        match identity.issue_session_credentials(claims.sub).await {
            Ok(credentials) => {
                info!(user_id = %claims.sub, modality = %outcome.modality, "Session granted");
                Ok(Redemption::SessionGranted(credentials))
            }
            Err(e) => {
                self.redeemed.lock().remove(&claims.jti);
                Err(e)
            }
        }
    }

    /// Records the token id; `false` if another redemption got there first.
    fn claim(&self, claims: &ChallengeClaims) -> bool {
        let now = self.clock.now().timestamp();
        let mut redeemed = self.redeemed.lock();
        redeemed.retain(|_, exp| *exp > now);

        if redeemed.contains_key(&claims.jti) {
            return false;
        }
        redeemed.insert(claims.jti, claims.exp);
        true
    }

    #[cfg(test)]
    fn ledger_len(&self) -> usize {
        self.redeemed.lock().len()
    }
}
