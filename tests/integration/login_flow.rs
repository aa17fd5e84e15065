// tests/integration/login_flow.rs
use biogate::core::{
    biometrics::KeystrokeInput,
    identity::Modality,
    services::{RejectReason, Redemption},
};
use biogate::utils::error::AuthError;
use chrono::Duration;

use crate::common::*;

fn keystroke_samples() -> Vec<KeystrokeInput> {
    enrollment_samples()
        .iter()
        .map(|raw| KeystrokeInput::from_json(raw).unwrap())
        .collect()
}

#[test_log::test(tokio::test)]
async fn test_face_login_end_to_end() -> anyhow::Result<()> {
    let ctx = TestContext::new();
    let enrollment = ctx.engine.enrollment();
    let verification = ctx.engine.verification();

    enrollment.enroll_face(ctx.user, &face_image(3, false)).await?;

    let login = verification.begin_login(ctx.user, PASSWORD).await?;
    assert_eq!(login.methods, vec![Modality::Face, Modality::BackupCode]);

    let spoof = verification.verify_face(&login.challenge.token, &face_image(3, true)).await?;
    assert_eq!(spoof.reject_reason(), Some(RejectReason::MatchRejected));

    let granted = verification.verify_face(&login.challenge.token, &face_image(3, false)).await?;
    match granted {
        Redemption::SessionGranted(credentials) => assert!(credentials.access.starts_with("access-")),
        other => panic!("expected a session, got {other:?}"),
    }
    assert_eq!(ctx.identity.sessions_issued(), 1);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_every_modality_matches_its_own_enrollment() -> anyhow::Result<()> {
    let ctx = TestContext::new();
    let enrollment = ctx.engine.enrollment();
    let verification = ctx.engine.verification();

    enrollment.enroll_face(ctx.user, &face_image(5, false)).await?;
    enrollment.enroll_voice(ctx.user, &audio(64_000, 21)).await?;
    enrollment.enroll_gesture(ctx.user, &loop_gesture(60)).await?;
    enrollment.enroll_keystroke(ctx.user, PASSPHRASE, &keystroke_samples()).await?;

    let methods = verification.begin_login(ctx.user, PASSWORD).await?.methods;
    assert_eq!(
        methods,
        vec![Modality::Face, Modality::Voice, Modality::Gesture, Modality::Keystroke, Modality::BackupCode]
    );

    let token = ctx.login().await;
    assert!(verification.verify_face(&token, &face_image(5, false)).await?.is_granted());

    let token = ctx.login().await;
    assert!(verification.verify_voice(&token, &audio(64_000, 21)).await?.is_granted());

    let token = ctx.login().await;
    assert!(verification.verify_gesture(&token, &loop_gesture(60)).await?.is_granted());

    let probe = KeystrokeInput::from_json(&keystroke_json(
        &[85.0, 101.0, 115.0, 94.0, 108.0, 97.0, 104.0, 112.0],
        &flights(2),
    ))?;
    let token = ctx.login().await;
    assert!(verification.verify_keystroke(&token, PASSPHRASE, &probe).await?.is_granted());

    assert_eq!(ctx.identity.sessions_issued(), 4);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_different_voice_and_gesture_are_rejected() -> anyhow::Result<()> {
    let ctx = TestContext::new();
    let enrollment = ctx.engine.enrollment();
    let verification = ctx.engine.verification();

    enrollment.enroll_voice(ctx.user, &audio(64_000, 1)).await?;
    enrollment.enroll_gesture(ctx.user, &loop_gesture(40)).await?;
    let token = ctx.login().await;

    let voice = verification.verify_voice(&token, &audio(64_000, 2)).await?;
    assert_eq!(voice.reject_reason(), Some(RejectReason::MatchRejected));

    let gesture = verification.verify_gesture(&token, &swipe_gesture(40)).await?;
    assert_eq!(gesture.reject_reason(), Some(RejectReason::MatchRejected));

    let short = verification.verify_voice(&token, &audio(2_000, 1)).await?;
    assert_eq!(short.reject_reason(), Some(RejectReason::ExtractionFailure));

    assert_eq!(ctx.identity.sessions_issued(), 0);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_challenge_expires_after_ttl() -> anyhow::Result<()> {
    let ctx = TestContext::new();
    ctx.engine.enrollment().enroll_gesture(ctx.user, &loop_gesture(40)).await?;
    let token = ctx.login().await;

    ctx.clock.advance(Duration::seconds(299));
    let verification = ctx.engine.verification();
    let still_valid = verification.verify_gesture(&token, &swipe_gesture(40)).await?;
    assert_eq!(still_valid.reject_reason(), Some(RejectReason::MatchRejected));

    ctx.clock.advance(Duration::seconds(1));
    let expired = verification.verify_gesture(&token, &loop_gesture(40)).await?;
    assert_eq!(expired.reject_reason(), Some(RejectReason::TokenExpired));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_token_is_single_use_across_modalities() -> anyhow::Result<()> {
    let ctx = TestContext::new();
    let enrollment = ctx.engine.enrollment();
    let verification = ctx.engine.verification();

    enrollment.enroll_gesture(ctx.user, &loop_gesture(40)).await?;
    let codes = enrollment.regenerate_backup_codes(ctx.user).await?;
    let token = ctx.login().await;

    assert!(verification.verify_gesture(&token, &loop_gesture(40)).await?.is_granted());

    let replay = verification.verify_backup_code(&token, &codes[0]).await?;
    assert_eq!(replay.reject_reason(), Some(RejectReason::TokenAlreadyRedeemed));
    assert_eq!(enrollment.backup_code_status(ctx.user).await?.used, 0);

    let tampered = format!("{token}x");
    let forged = verification.verify_gesture(&tampered, &loop_gesture(40)).await?;
    assert_eq!(forged.reject_reason(), Some(RejectReason::TokenInvalid));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_login_history_records_every_step() -> anyhow::Result<()> {
    let ctx = TestContext::new();
    let verification = ctx.engine.verification();

    let err = verification.begin_login(ctx.user, "guess").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));

    let token = ctx.login().await;
    let missing = verification.verify_face(&token, &face_image(1, false)).await?;
    assert_eq!(missing.reject_reason(), Some(RejectReason::NotEnrolled));

    let history = verification.login_history(ctx.user, 10).await?;
    let trail: Vec<_> = history
        .iter()
        .map(|a| (a.method.label(), a.success, a.failure_reason.clone()))
        .collect();
    assert_eq!(
        trail,
        vec![
            ("face", false, Some("not_enrolled".to_string())),
            ("password", true, None),
            ("password", false, Some("invalid_credentials".to_string())),
        ]
    );
    Ok(())
}
