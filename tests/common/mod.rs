// tests/common/mod.rs
use std::collections::HashMap;
use std::f64::consts::TAU;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use biogate::{
    core::{
        audit::InMemoryAttemptLog,
        biometrics::{FaceDetector, FaceRegion, GestureInput, GesturePoint, PixelGridEncoder},
        identity::{IdentityProvider, SessionCredentials},
    },
    storage::{BackupCodeStore, MemoryStore, TemplateStore},
    utils::{clock::ManualClock, config::Config, error::Result},
    AuthEngine, Collaborators,
};
use chrono::Utc;
use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Luma};
use parking_lot::RwLock;
use serde_json::json;
use uuid::Uuid;

pub const PASSWORD: &str = "correct horse battery staple";
pub const PASSPHRASE: &str = "hello123";

pub fn test_config() -> Config {
    Config::from_toml(
        r#"
[challenge]
secret = "integration-secret-integration-secret"

[backup_codes]
count = 5
pbkdf2_iterations = 1000
"#,
    )
    .expect("valid test config")
}

/// Accepts one password per registered user and counts issued sessions.
#[derive(Default)]
pub struct FakeIdentity {
    passwords: RwLock<HashMap<Uuid, String>>,
    sessions: AtomicUsize,
}

impl FakeIdentity {
    pub fn register(&self, user_id: Uuid, password: &str) {
        self.passwords.write().insert(user_id, password.to_string());
    }

    pub fn sessions_issued(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn verify_password(&self, user_id: Uuid, password: &str) -> Result<bool> {
        Ok(self.passwords.read().get(&user_id).is_some_and(|p| p == password))
    }

    async fn issue_session_credentials(&self, user_id: Uuid) -> Result<SessionCredentials> {
        let n = self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(SessionCredentials {
            access: format!("access-{user_id}-{n}"),
            refresh: format!("refresh-{user_id}-{n}"),
        })
    }
}

/// Treats the whole frame as the single face.
pub struct WholeFrameDetector;

impl FaceDetector for WholeFrameDetector {
    fn detect(&self, image: &DynamicImage) -> Vec<FaceRegion> {
        vec![FaceRegion::whole(image)]
    }
}

pub struct TestContext {
    pub engine: AuthEngine,
    pub identity: Arc<FakeIdentity>,
    pub clock: Arc<ManualClock>,
    pub user: Uuid,
}

impl TestContext {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_store(store.clone(), store)
    }

    pub fn with_store(templates: Arc<dyn TemplateStore>, backup_codes: Arc<dyn BackupCodeStore>) -> Self {
        let identity = Arc::new(FakeIdentity::default());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let user = Uuid::new_v4();
        identity.register(user, PASSWORD);

        let collaborators = Collaborators {
            identity: identity.clone(),
            face_detector: Arc::new(WholeFrameDetector),
            face_encoder: Arc::new(PixelGridEncoder),
            templates,
            backup_codes,
            attempts: Arc::new(InMemoryAttemptLog::new(30, clock.clone())),
            clock: clock.clone(),
        };
        let engine = AuthEngine::new(test_config(), collaborators).expect("engine");

        Self { engine, identity, clock, user }
    }

    pub async fn login(&self) -> String {
        self.engine
            .verification()
            .begin_login(self.user, PASSWORD)
            .await
            .expect("password accepted")
            .challenge
            .token
    }
}

/// Base64 PNG of a synthetic face-like gradient. `inverted` flips every
/// pixel, which negates the appearance embedding.
pub fn face_image(seed: u32, inverted: bool) -> String {
    let image = ImageBuffer::from_fn(64, 64, |x, y| {
        let cx = x as i64 - 32;
        let cy = y as i64 - 28;
        let shade = ((cx * cx + 2 * cy * cy) as u32 / 8 + seed * (x % 7) + y) % 256;
        let shade = shade as u8;
        Luma([if inverted { 255 - shade } else { shade }])
    });

    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image)
        .write_to(&mut bytes, ImageOutputFormat::Png)
        .expect("png encoding");
    STANDARD.encode(bytes.into_inner())
}

/// Base64 pseudo-random audio with no clipped bytes.
pub fn audio(len: usize, seed: u64) -> String {
    let mut state = seed;
    let bytes: Vec<u8> = (0..len)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            1 + ((state >> 33) % 254) as u8
        })
        .collect();
    format!("data:audio/webm;base64,{}", STANDARD.encode(bytes))
}

pub fn loop_gesture(points: usize) -> GestureInput {
    GestureInput::new(
        (0..points)
            .map(|i| {
                let t = i as f64 / points as f64 * TAU;
                GesturePoint::timed(200.0 + 80.0 * t.cos(), 150.0 + 50.0 * (2.0 * t).sin(), i as f64 * 16.0)
            })
            .collect(),
    )
}

pub fn swipe_gesture(points: usize) -> GestureInput {
    GestureInput::new(
        (0..points)
            .map(|i| GesturePoint::new(10.0 + 30.0 * i as f64, 400.0 - 5.0 * i as f64))
            .collect(),
    )
}

/// `{"timings": [...]}` for keys typed back to back.
pub fn keystroke_json(holds: &[f64], flights: &[f64]) -> String {
    let mut timestamp = 0.0;
    let timings: Vec<_> = holds
        .iter()
        .enumerate()
        .map(|(i, &hold)| {
            if i == 0 {
                json!({ "holdTime": hold, "timestamp": timestamp })
            } else {
                timestamp += holds[i - 1] + flights[i - 1];
                json!({ "holdTime": hold, "flightTime": flights[i - 1], "timestamp": timestamp })
            }
        })
        .collect();
    json!({ "timings": timings }).to_string()
}

pub fn flights(k: usize) -> Vec<f64> {
    (1..8).map(|j| 60.0 + ((j * 11 + k * 5) % 31) as f64).collect()
}

/// Five samples of the passphrase with holds between 80 and 120 ms.
pub fn enrollment_samples() -> Vec<String> {
    (0..5)
        .map(|k| {
            let holds: Vec<f64> = (0..8).map(|j| 80.0 + ((j * 7 + k * 13) % 41) as f64).collect();
            keystroke_json(&holds, &flights(k))
        })
        .collect()
}
