// src/utils/error.rs
use thiserror::Error;

use crate::core::biometrics::errors::BiometricError;
use crate::core::crypto::challenge::TokenError;
use crate::core::identity::types::Modality;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Identity error: {0}")]
    Identity(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{0} is not enrolled for this user")]
    NotEnrolled(Modality),

    #[error(transparent)]
    Biometric(#[from] BiometricError),

    #[error(transparent)]
    Token(#[from] TokenError),
}

pub type Result<T> = std::result::Result<T, AuthError>;

impl From<crate::storage::encrypted::StorageError> for AuthError {
    fn from(error: crate::storage::encrypted::StorageError) -> Self {
        AuthError::Storage(error.to_string())
    }
}
