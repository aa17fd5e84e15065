// src/core/services/mod.rs
pub mod enrollment;
pub mod matchers;
pub mod orchestrator;
pub mod verification;

pub use enrollment::EnrollmentService;
pub use matchers::Matchers;
pub use orchestrator::{ChallengeOrchestrator, IssuedChallenge, RejectReason, Redemption};
pub use verification::{LoginChallenge, VerificationService};
