// tests/integration/storage/encrypted_store_tests.rs
use std::sync::Arc;

use biogate::{
    core::{
        identity::{EnrollmentTemplate, Modality, TemplatePayload},
        services::RejectReason,
    },
    storage::{encrypted::EncryptedStore, BackupCodeStore, StoredBackupCode, TemplateStore},
};
use chrono::Utc;
use tempfile::tempdir;
use uuid::Uuid;

use crate::common::*;

fn setup_test_store() -> (Arc<EncryptedStore>, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let store = EncryptedStore::open(temp_dir.path(), b"integration-storage-key").unwrap();
    (Arc::new(store), temp_dir)
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_concurrent_template_writes() {
    let (store, _temp_dir) = setup_test_store();

    let mut handles = Vec::new();
    for i in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let user = Uuid::new_v4();
            let template = EnrollmentTemplate::new(user, TemplatePayload::Gesture { features: vec![i as f64; 200] });

            store.save(&template).await.unwrap();
            let loaded = store.load(user, Modality::Gesture).await.unwrap().unwrap();
            assert_eq!(template, loaded);
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
}

#[test_log::test(tokio::test)]
async fn test_key_rotation_durability() {
    let (store, _temp_dir) = setup_test_store();
    let user = Uuid::new_v4();

    let template = EnrollmentTemplate::new(user, TemplatePayload::Face { embedding: vec![0.5; 128] });
    store.save(&template).await.unwrap();
    store
        .replace_all(user, (0..3).map(|i| StoredBackupCode::new(format!("hash-{i}"))).collect())
        .await
        .unwrap();

    store.rotate_encryption_key(b"rotated-storage-key").unwrap();

    assert_eq!(store.load(user, Modality::Face).await.unwrap(), Some(template));
    assert_eq!(store.unused(user).await.unwrap().len(), 3);
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_concurrent_consume_through_encrypted_store() {
    let (store, _temp_dir) = setup_test_store();
    let user = Uuid::new_v4();
    let code = StoredBackupCode::new("hash".into());
    let code_id = code.id;
    store.replace_all(user, vec![code]).await.unwrap();

    let attempts = (0..8).map(|_| {
        let store = store.clone();
        tokio::spawn(async move { store.consume(user, code_id, Utc::now()).await.unwrap() })
    });
    let consumed = futures::future::join_all(attempts)
        .await
        .into_iter()
        .filter(|result| *result.as_ref().unwrap())
        .count();

    assert_eq!(consumed, 1);
    assert_eq!(store.status(user).await.unwrap().remaining, 0);
}

#[test_log::test(tokio::test)]
async fn test_full_login_on_encrypted_store() {
    let (store, _temp_dir) = setup_test_store();
    let ctx = TestContext::with_store(store.clone(), store.clone());
    let enrollment = ctx.engine.enrollment();
    let verification = ctx.engine.verification();

    enrollment.enroll_gesture(ctx.user, &loop_gesture(50)).await.unwrap();
    let codes = enrollment.regenerate_backup_codes(ctx.user).await.unwrap();

    let token = ctx.login().await;
    assert!(verification.verify_backup_code(&token, &codes[4]).await.unwrap().is_granted());

    let token = ctx.login().await;
    let reused = verification.verify_backup_code(&token, &codes[4]).await.unwrap();
    assert_eq!(reused.reject_reason(), Some(RejectReason::InvalidCode));
    assert!(verification.verify_gesture(&token, &loop_gesture(50)).await.unwrap().is_granted());

    assert!(enrollment.unenroll(ctx.user, Modality::Gesture).await.unwrap());
    assert_eq!(store.enrolled(ctx.user).await.unwrap(), Vec::<Modality>::new());
}
