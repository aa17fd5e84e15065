// src/core/identity/provider.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredentials {
    pub access: String,
    pub refresh: String,
}

/// Account layer this crate sits behind: password checks and session
/// issuance are owned by the host application.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify_password(&self, user_id: Uuid, password: &str) -> Result<bool>;

    async fn issue_session_credentials(&self, user_id: Uuid) -> Result<SessionCredentials>;
}
