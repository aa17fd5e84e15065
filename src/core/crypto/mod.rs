//! Challenge tokens, one-time secrets and TOTP

pub mod challenge;
pub mod secrets;
pub mod totp;

pub use challenge::{ChallengeClaims, ChallengeCodec, TokenError};
pub use totp::{TotpFactor, TotpProvisioning};
