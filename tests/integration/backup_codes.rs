// tests/integration/backup_codes.rs
use std::sync::Arc;

use biogate::core::services::RejectReason;

use crate::common::*;

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_concurrent_redemption_of_one_code_grants_once() -> anyhow::Result<()> {
    let ctx = Arc::new(TestContext::new());
    let codes = ctx.engine.enrollment().regenerate_backup_codes(ctx.user).await?;
    let code = codes[2].clone();

    let mut tokens = Vec::new();
    for _ in 0..6 {
        tokens.push(ctx.login().await);
    }

    let attempts = tokens.into_iter().map(|token| {
        let verification = ctx.engine.verification();
        let code = code.clone();
        tokio::spawn(async move { verification.verify_backup_code(&token, &code).await })
    });
    let results = futures::future::join_all(attempts).await;

    let mut granted = 0;
    for result in results {
        let redemption = result??;
        if redemption.is_granted() {
            granted += 1;
        } else {
            assert_eq!(redemption.reject_reason(), Some(RejectReason::InvalidCode));
        }
    }

    assert_eq!(granted, 1);
    assert_eq!(ctx.identity.sessions_issued(), 1);

    let status = ctx.engine.enrollment().backup_code_status(ctx.user).await?;
    assert_eq!((status.total, status.used, status.remaining), (5, 1, 4));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_codes_are_case_and_whitespace_insensitive() -> anyhow::Result<()> {
    let ctx = TestContext::new();
    let codes = ctx.engine.enrollment().regenerate_backup_codes(ctx.user).await?;
    let token = ctx.login().await;

    let sloppy = format!("  {}\n", codes[0].to_lowercase());
    assert!(ctx.engine.verification().verify_backup_code(&token, &sloppy).await?.is_granted());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_regeneration_invalidates_previous_codes() -> anyhow::Result<()> {
    let ctx = TestContext::new();
    let enrollment = ctx.engine.enrollment();
    let verification = ctx.engine.verification();

    let old = enrollment.regenerate_backup_codes(ctx.user).await?;
    let new = enrollment.regenerate_backup_codes(ctx.user).await?;

    let token = ctx.login().await;
    let stale = verification.verify_backup_code(&token, &old[0]).await?;
    assert_eq!(stale.reject_reason(), Some(RejectReason::InvalidCode));

    assert!(verification.verify_backup_code(&token, &new[0]).await?.is_granted());
    Ok(())
}
