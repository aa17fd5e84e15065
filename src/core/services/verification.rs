// src/core/services/verification.rs
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    matchers::Matchers,
    orchestrator::{ChallengeOrchestrator, IssuedChallenge, RejectReason, Redemption},
};
use crate::{
    core::{
        audit::{AttemptLog, AttemptMethod, LoginAttempt},
        biometrics::{payload::decode_base64_payload, GestureInput, KeystrokeInput},
        crypto::secrets,
        identity::{
            types::{EnrollmentTemplate, Modality, VerificationOutcome},
            IdentityProvider,
        },
    },
    storage::{BackupCodeStore, TemplateStore},
    utils::{
        clock::Clock,
        error::{AuthError, Result},
    },
};

/// Password accepted: the challenge to present with a second factor and
/// the methods the user can present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginChallenge {
    pub challenge: IssuedChallenge,
    pub methods: Vec<Modality>,
}

pub struct VerificationService {
    orchestrator: ChallengeOrchestrator,
    matchers: Arc<Matchers>,
    templates: Arc<dyn TemplateStore>,
    backup_codes: Arc<dyn BackupCodeStore>,
    identity: Arc<dyn IdentityProvider>,
    attempts: Arc<dyn AttemptLog>,
    clock: Arc<dyn Clock>,
}

impl VerificationService {
    pub fn new(
        orchestrator: ChallengeOrchestrator,
        matchers: Arc<Matchers>,
        templates: Arc<dyn TemplateStore>,
        backup_codes: Arc<dyn BackupCodeStore>,
        identity: Arc<dyn IdentityProvider>,
        attempts: Arc<dyn AttemptLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            orchestrator,
            matchers,
            templates,
            backup_codes,
            identity,
            attempts,
            clock,
        }
    }

    pub fn orchestrator(&self) -> &ChallengeOrchestrator {
        &self.orchestrator
    }

    /// First step of a login. A wrong password is recorded and surfaces as
    /// [`AuthError::InvalidCredentials`].
    pub async fn begin_login(&self, user_id: Uuid, password: &str) -> Result<LoginChallenge> {
        let now = self.clock.now();

        if !self.identity.verify_password(user_id, password).await? {
            warn!(%user_id, "Password rejected");
            self.record(LoginAttempt::failed(user_id, AttemptMethod::Password, None, "invalid_credentials", now))
                .await;
            return Err(AuthError::InvalidCredentials);
        }

        self.record(LoginAttempt::succeeded(user_id, AttemptMethod::Password, None, now))
            .await;

        let mut methods = self.templates.enrolled(user_id).await?;
        methods.push(Modality::BackupCode);

        let challenge = self.orchestrator.issue_challenge(user_id)?;
        info!(%user_id, methods = methods.len(), "Awaiting second factor");
        Ok(LoginChallenge { challenge, methods })
    }

    /// `image` is base64, optionally carrying a `data:` URL header.
    pub async fn verify_face(&self, token: &str, image: &str) -> Result<Redemption> {
        self.second_factor(token, Modality::Face, |template| {
            match decode_base64_payload(image) {
                Ok(bytes) => self.matchers.face.verify_template(template, &bytes),
                Err(e) => VerificationOutcome::failed(Modality::Face, e),
            }
        })
        .await
    }

    /// Audio is checked against the login profile.
    pub async fn verify_voice(&self, token: &str, audio: &str) -> Result<Redemption> {
        self.second_factor(token, Modality::Voice, |template| {
            match decode_base64_payload(audio) {
                Ok(bytes) => self.matchers.voice.verify_template(template, &bytes),
                Err(e) => VerificationOutcome::failed(Modality::Voice, e),
            }
        })
        .await
    }

    pub async fn verify_gesture(&self, token: &str, input: &GestureInput) -> Result<Redemption> {
        self.second_factor(token, Modality::Gesture, |template| {
            self.matchers.gesture.verify_template(template, input)
        })
        .await
    }

    pub async fn verify_keystroke(&self, token: &str, passphrase: &str, input: &KeystrokeInput) -> Result<Redemption> {
        self.second_factor(token, Modality::Keystroke, |template| {
            self.matchers.keystroke.verify_template(template, passphrase, input)
        })
        .await
    }

    pub async fn verify_totp(&self, token: &str, code: &str) -> Result<Redemption> {
        let unix_time = u64::try_from(self.clock.now().timestamp()).unwrap_or_default();
        self.second_factor(token, Modality::Totp, |template| {
            self.matchers.totp.verify_template(template, code, unix_time)
        })
        .await
    }

    /// The matching code is consumed with a conditional update before the
    /// session is issued, so concurrent use of one code grants at most one
    /// session.
    pub async fn verify_backup_code(&self, token: &str, code: &str) -> Result<Redemption> {
        let claims = match self.orchestrator.open(token) {
            Ok(claims) => claims,
            Err(reason) => return Ok(Redemption::Rejected(reason)),
        };
        let user_id = claims.sub;

        let unused = self.backup_codes.unused(user_id).await?;
        let matched = unused
            .iter()
            .find(|stored| secrets::verify_backup_code(&stored.code_hash, code));

        let consumed = match matched {
            Some(stored) => self.backup_codes.consume(user_id, stored.id, self.clock.now()).await?,
            None => false,
        };
        let outcome = if consumed {
            VerificationOutcome::decided(Modality::BackupCode, true, 1.0, 0.0)
        } else {
            VerificationOutcome::decided(Modality::BackupCode, false, 0.0, 1.0)
        };

        self.conclude(token, user_id, &outcome).await
    }

    pub async fn login_history(&self, user_id: Uuid, limit: usize) -> Result<Vec<LoginAttempt>> {
        self.attempts.history(user_id, limit).await
    }

    async fn second_factor<F>(&self, token: &str, modality: Modality, matcher: F) -> Result<Redemption>
    where
        F: FnOnce(&EnrollmentTemplate) -> VerificationOutcome,
    {
        let claims = match self.orchestrator.open(token) {
            Ok(claims) => claims,
            Err(reason) => return Ok(Redemption::Rejected(reason)),
        };
        let user_id = claims.sub;

        let Some(template) = self.templates.load(user_id, modality).await? else {
            warn!(%user_id, %modality, "Second factor not enrolled");
            let method = AttemptMethod::SecondFactor(modality);
            let reason = RejectReason::NotEnrolled;
            self.record(LoginAttempt::failed(user_id, method, None, reason.as_str(), self.clock.now()))
                .await;
            return Ok(Redemption::Rejected(reason));
        };

        let outcome = matcher(&template);
        debug!(
            %user_id,
            %modality,
            is_match = outcome.is_match,
            confidence = outcome.confidence,
            distance = outcome.distance,
            flags = ?outcome.flags,
            "Second factor evaluated"
        );

        self.conclude(token, user_id, &outcome).await
    }

    async fn conclude(&self, token: &str, user_id: Uuid, outcome: &VerificationOutcome) -> Result<Redemption> {
        let redemption = self
            .orchestrator
            .redeem_challenge(token, outcome, self.identity.as_ref())
            .await?;

        let method = AttemptMethod::SecondFactor(outcome.modality);
        let confidence = outcome.failure.is_none().then_some(outcome.confidence);
        let attempt = match &redemption {
            Redemption::SessionGranted(_) => LoginAttempt::succeeded(user_id, method, confidence, self.clock.now()),
            Redemption::Rejected(reason) => {
                LoginAttempt::failed(user_id, method, confidence, reason.as_str(), self.clock.now())
            }
        };
        self.record(attempt).await;

        Ok(redemption)
    }

    /// Logging failures are reported and swallowed; a session may already
    /// have been issued for the attempt.
    async fn record(&self, attempt: LoginAttempt) {
        let (user_id, method) = (attempt.user_id, attempt.method.label());
        if let Err(e) = self.attempts.record(attempt).await {
            warn!(%user_id, method, error = %e, "Failed to record login attempt");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audit::{InMemoryAttemptLog, MockAttemptLog};
    use crate::core::biometrics::{
        gesture::tests::{loop_gesture, swipe_gesture},
        keystroke::tests::{enrollment_samples, similar_probe, slow_probe, PASSPHRASE},
        FaceRegion, PixelGridEncoder,
    };
    use crate::core::biometrics::face::MockFaceDetector;
    use crate::core::identity::provider::MockIdentityProvider;
    use crate::core::identity::SessionCredentials;
    use crate::core::services::enrollment::EnrollmentService;
    use crate::storage::MemoryStore;
    use crate::utils::{clock::ManualClock, config::Config};
    use chrono::{Duration, Utc};

    struct Harness {
        enrollment: EnrollmentService,
        verification: VerificationService,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        harness_with_log(|clock| Arc::new(InMemoryAttemptLog::new(30, clock)))
    }

    fn harness_with_log(attempts: impl FnOnce(Arc<ManualClock>) -> Arc<dyn AttemptLog>) -> Harness {
        let config = Config::from_toml(
            "[challenge]\nsecret = \"0123456789abcdef0123456789abcdef\"\n\n[backup_codes]\ncount = 3\npbkdf2_iterations = 1000\n",
        )
        .unwrap();

        let mut detector = MockFaceDetector::new();
        detector.expect_detect().returning(|image| vec![FaceRegion::whole(image)]);

        let mut identity = MockIdentityProvider::new();
        identity
            .expect_verify_password()
            .returning(|_, password| Ok(password == "correct horse"));
        identity.expect_issue_session_credentials().returning(|user_id| {
            Ok(SessionCredentials {
                access: format!("access-{user_id}"),
                refresh: format!("refresh-{user_id}"),
            })
        });

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let matchers = Arc::new(Matchers::new(&config, Arc::new(detector), Arc::new(PixelGridEncoder)));
        let store = Arc::new(MemoryStore::new());
        let orchestrator = ChallengeOrchestrator::from_config(&config.challenge, clock.clone()).unwrap();

        Harness {
            enrollment: EnrollmentService::new(matchers.clone(), store.clone(), store.clone(), config.backup_codes.clone()),
            verification: VerificationService::new(
                orchestrator,
                matchers,
                store.clone(),
                store,
                Arc::new(identity),
                attempts(clock.clone()),
                clock.clone(),
            ),
            clock,
        }
    }

    async fn token_for(harness: &Harness, user: Uuid) -> String {
        harness
            .verification
            .begin_login(user, "correct horse")
            .await
            .unwrap()
            .challenge
            .token
    }

    #[tokio::test]
    async fn test_wrong_password_is_recorded() {
        let harness = harness();
        let user = Uuid::new_v4();

        let err = harness.verification.begin_login(user, "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        let history = harness.verification.login_history(user, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].method, AttemptMethod::Password);
        assert_eq!(history[0].failure_reason.as_deref(), Some("invalid_credentials"));
    }

    #[tokio::test]
    async fn test_methods_always_end_with_backup_codes() {
        let harness = harness();
        let user = Uuid::new_v4();
        harness.enrollment.enroll_gesture(user, &loop_gesture(40)).await.unwrap();

        let login = harness.verification.begin_login(user, "correct horse").await.unwrap();
        assert_eq!(login.methods, vec![Modality::Gesture, Modality::BackupCode]);
        assert_eq!(login.challenge.user_id, user);
    }

    #[tokio::test]
    async fn test_keystroke_flow_checks_passphrase_first() {
        let harness = harness();
        let user = Uuid::new_v4();
        harness
            .enrollment
            .enroll_keystroke(user, PASSPHRASE, &enrollment_samples())
            .await
            .unwrap();
        let token = token_for(&harness, user).await;

        let wrong = harness.verification.verify_keystroke(&token, "Hello123", &similar_probe()).await.unwrap();
        assert_eq!(wrong.reject_reason(), Some(RejectReason::PassphraseMismatch));

        let slow = harness.verification.verify_keystroke(&token, PASSPHRASE, &slow_probe()).await.unwrap();
        assert_eq!(slow.reject_reason(), Some(RejectReason::MatchRejected));

        let granted = harness.verification.verify_keystroke(&token, PASSPHRASE, &similar_probe()).await.unwrap();
        assert!(granted.is_granted());

        let history = harness.verification.login_history(user, 10).await.unwrap();
        let outcomes: Vec<_> = history.iter().map(|a| (a.method.label(), a.success)).collect();
        assert_eq!(
            outcomes,
            vec![("keystroke", true), ("keystroke", false), ("keystroke", false), ("password", true)]
        );
    }

    #[tokio::test]
    async fn test_unenrolled_modality_rejected() {
        let harness = harness();
        let user = Uuid::new_v4();
        let token = token_for(&harness, user).await;

        let redemption = harness.verification.verify_gesture(&token, &loop_gesture(40)).await.unwrap();
        assert_eq!(redemption.reject_reason(), Some(RejectReason::NotEnrolled));
    }

    #[tokio::test]
    async fn test_gesture_mismatch_then_fallback_to_backup_code() {
        let harness = harness();
        let user = Uuid::new_v4();
        harness.enrollment.enroll_gesture(user, &loop_gesture(40)).await.unwrap();
        let codes = harness.enrollment.regenerate_backup_codes(user).await.unwrap();
        let token = token_for(&harness, user).await;

        let miss = harness.verification.verify_gesture(&token, &swipe_gesture(40)).await.unwrap();
        assert_eq!(miss.reject_reason(), Some(RejectReason::MatchRejected));

        let lowercase = codes[1].to_lowercase();
        let granted = harness.verification.verify_backup_code(&token, &lowercase).await.unwrap();
        assert!(granted.is_granted());

        let status = harness.enrollment.backup_code_status(user).await.unwrap();
        assert_eq!((status.used, status.remaining), (1, 2));

        let fresh = token_for(&harness, user).await;
        let reused = harness.verification.verify_backup_code(&fresh, &codes[1]).await.unwrap();
        assert_eq!(reused.reject_reason(), Some(RejectReason::InvalidCode));
    }

    #[tokio::test]
    async fn test_expired_challenge_rejected() {
        let harness = harness();
        let user = Uuid::new_v4();
        harness.enrollment.enroll_gesture(user, &loop_gesture(40)).await.unwrap();
        let token = token_for(&harness, user).await;

        harness.clock.advance(Duration::seconds(300));

        let redemption = harness.verification.verify_gesture(&token, &loop_gesture(40)).await.unwrap();
        assert_eq!(redemption.reject_reason(), Some(RejectReason::TokenExpired));
    }

    #[tokio::test]
    async fn test_totp_code_from_current_step_grants_session() {
        let harness = harness();
        let user = Uuid::new_v4();
        harness.enrollment.enroll_totp(user, "alice@example.com").await.unwrap();
        let token = token_for(&harness, user).await;

        let wrong = harness.verification.verify_totp(&token, "abc").await.unwrap();
        assert_eq!(wrong.reject_reason(), Some(RejectReason::InputValidation));

        let template = harness
            .verification
            .templates
            .load(user, Modality::Totp)
            .await
            .unwrap()
            .unwrap();
        let now = harness.clock.now().timestamp() as u64;
        let code = harness.verification.matchers.totp.generate(&template, now).unwrap();

        let granted = harness.verification.verify_totp(&token, &code).await.unwrap();
        assert!(granted.is_granted());
    }

    #[tokio::test]
    async fn test_unavailable_attempt_log_does_not_lose_session() {
        let harness = harness_with_log(|_| {
            let mut log = MockAttemptLog::new();
            log.expect_record()
                .returning(|_| Err(AuthError::Storage("attempt log unavailable".into())));
            log.expect_history().returning(|_, _| Ok(Vec::new()));
            Arc::new(log)
        });
        let user = Uuid::new_v4();
        harness.enrollment.enroll_gesture(user, &loop_gesture(40)).await.unwrap();
        let codes = harness.enrollment.regenerate_backup_codes(user).await.unwrap();

        let err = harness.verification.begin_login(user, "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        let token = token_for(&harness, user).await;
        let missing = harness.verification.verify_totp(&token, "123456").await.unwrap();
        assert_eq!(missing.reject_reason(), Some(RejectReason::NotEnrolled));

        let granted = harness.verification.verify_gesture(&token, &loop_gesture(40)).await.unwrap();
        assert!(granted.is_granted());

        let token = token_for(&harness, user).await;
        let granted = harness.verification.verify_backup_code(&token, &codes[0]).await.unwrap();
        assert!(granted.is_granted());
        let status = harness.enrollment.backup_code_status(user).await.unwrap();
        assert_eq!((status.used, status.remaining), (1, 2));
    }
}
