// src/core/crypto/challenge.rs
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use ring::hmac;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const TOKEN_TYPE: &str = "mfa_challenge";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Invalid challenge token: {0}")]
    Invalid(String),

    #[error("Challenge token expired")]
    Expired,
}

/// Claims carried by a second-factor challenge token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeClaims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
    pub typ: String,
}

impl ChallengeClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// Signs and verifies `base64url(claims) "." base64url(HMAC-SHA256)` tokens.
pub struct ChallengeCodec {
    key: hmac::Key,
    ttl: Duration,
}

impl ChallengeCodec {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn sign(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<(String, ChallengeClaims), TokenError> {
        let claims = ChallengeClaims {
            sub: user_id,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            jti: Uuid::new_v4(),
            typ: TOKEN_TYPE.to_string(),
        };

        let json = serde_json::to_vec(&claims).map_err(|e| TokenError::Invalid(e.to_string()))?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = hmac::sign(&self.key, payload.as_bytes());
        let token = format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(signature.as_ref()));

        Ok((token, claims))
    }

    /// Checks the signature before anything else, then the token type and
    /// expiry. A token is expired from the second `exp` is reached.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<ChallengeClaims, TokenError> {
        let (payload, signature) = token
            .split_once('.')
            .ok_or_else(|| TokenError::Invalid("malformed token".into()))?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Invalid("malformed signature".into()))?;
        hmac::verify(&self.key, payload.as_bytes(), &signature)
            .map_err(|_| TokenError::Invalid("signature mismatch".into()))?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Invalid("malformed payload".into()))?;
        let claims: ChallengeClaims =
            serde_json::from_slice(&json).map_err(|e| TokenError::Invalid(e.to_string()))?;

        if claims.typ != TOKEN_TYPE {
            return Err(TokenError::Invalid(format!("unexpected token type '{}'", claims.typ)));
        }
        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}
