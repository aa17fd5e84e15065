pub mod core;
pub mod storage;
pub mod utils;

use std::sync::Arc;
use tracing::info;

use crate::{
    core::{
        audit::{AttemptLog, InMemoryAttemptLog},
        biometrics::{FaceDetector, FaceEncoder, PixelGridEncoder},
        identity::IdentityProvider,
        services::{ChallengeOrchestrator, EnrollmentService, Matchers, VerificationService},
    },
    storage::{BackupCodeStore, EncryptedStore, MemoryStore, TemplateStore},
    utils::{
        clock::{Clock, SystemClock},
        config::Config,
        error::{AuthError, Result},
    },
};

const ATTEMPT_RETENTION_DAYS: i64 = 90;

/// Everything the engine consumes from its host.
pub struct Collaborators {
    pub identity: Arc<dyn IdentityProvider>,
    pub face_detector: Arc<dyn FaceDetector>,
    pub face_encoder: Arc<dyn FaceEncoder>,
    pub templates: Arc<dyn TemplateStore>,
    pub backup_codes: Arc<dyn BackupCodeStore>,
    pub attempts: Arc<dyn AttemptLog>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Process-local storage, the pixel-grid face encoder and the system
    /// clock.
    pub fn in_memory(identity: Arc<dyn IdentityProvider>, face_detector: Arc<dyn FaceDetector>) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_store(identity, face_detector, store.clone(), store)
    }

    /// Like [`Collaborators::in_memory`] but templates and backup codes live
    /// in the encrypted store configured under `storage`.
    pub fn encrypted(
        config: &Config,
        identity: Arc<dyn IdentityProvider>,
        face_detector: Arc<dyn FaceDetector>,
    ) -> Result<Self> {
        if config.storage.encryption_key.is_empty() {
            return Err(AuthError::Config("storage.encryption_key must be set".into()));
        }

        let store = Arc::new(EncryptedStore::open(
            &config.storage.path,
            config.storage.encryption_key.as_bytes(),
        )?);

        Ok(Self::with_store(identity, face_detector, store.clone(), store))
    }

    fn with_store(
        identity: Arc<dyn IdentityProvider>,
        face_detector: Arc<dyn FaceDetector>,
        templates: Arc<dyn TemplateStore>,
        backup_codes: Arc<dyn BackupCodeStore>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            identity,
            face_detector,
            face_encoder: Arc::new(PixelGridEncoder),
            templates,
            backup_codes,
            attempts: Arc::new(InMemoryAttemptLog::new(ATTEMPT_RETENTION_DAYS, clock.clone())),
            clock,
        }
    }
}

pub struct AuthEngine {
    config: Arc<Config>,
    enrollment_service: Arc<EnrollmentService>,
    verification_service: Arc<VerificationService>,
}

impl AuthEngine {
    pub fn new(config: Config, collaborators: Collaborators) -> Result<Self> {
        let config = Arc::new(config);

        info!("Initializing matchers...");
        let matchers = Arc::new(Matchers::new(
            &config,
            collaborators.face_detector,
            collaborators.face_encoder,
        ));

        info!("Initializing services...");
        let orchestrator = ChallengeOrchestrator::from_config(&config.challenge, collaborators.clock.clone())?;
        let enrollment_service = Arc::new(EnrollmentService::new(
            matchers.clone(),
            collaborators.templates.clone(),
            collaborators.backup_codes.clone(),
            config.backup_codes.clone(),
        ));
        let verification_service = Arc::new(VerificationService::new(
            orchestrator,
            matchers,
            collaborators.templates,
            collaborators.backup_codes,
            collaborators.identity,
            collaborators.attempts,
            collaborators.clock,
        ));

        info!("Authentication engine ready");
        Ok(Self {
            config,
            enrollment_service,
            verification_service,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn enrollment(&self) -> Arc<EnrollmentService> {
        self.enrollment_service.clone()
    }

    pub fn verification(&self) -> Arc<VerificationService> {
        self.verification_service.clone()
    }
}
