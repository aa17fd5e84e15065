// src/core/identity/mod.rs
pub mod codec;
pub mod provider;
pub mod types;

pub use codec::FeatureCodec;
pub use provider::{IdentityProvider, SessionCredentials};
pub use types::{
    AdvisoryFlag, EnrollmentTemplate, KeystrokeProfile, Modality, TemplatePayload,
    VerificationOutcome,
};
