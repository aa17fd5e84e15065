use serde::Deserialize;
use std::time::Duration;
use config::{Config as ConfigLib, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use config::builder::DefaultState;

use crate::core::biometrics::voice::VoiceProfile;
use crate::utils::error::{Result, AuthError};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub challenge: ChallengeConfig,
    pub face: FaceConfig,
    pub voice: VoiceConfig,
    pub gesture: GestureConfig,
    pub keystroke: KeystrokeConfig,
    pub totp: TotpConfig,
    pub backup_codes: BackupCodeConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChallengeConfig {
    pub secret: String,
    pub ttl_secs: u64,
    pub single_use: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaceConfig {
    pub distance_threshold: f64,
    pub min_confidence: f64,
    pub min_cosine: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    pub enroll_profile: VoiceProfile,
    pub login_profile: VoiceProfile,
    pub max_audio_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GestureConfig {
    pub threshold: f64,
    pub min_points: usize,
    pub max_points: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeystrokeConfig {
    pub distance_threshold: f64,
    pub min_confidence: f64,
    pub min_samples: usize,
    pub min_strength: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TotpConfig {
    pub issuer: String,
    pub skew: u8,
    pub step: u64,
    pub digits: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackupCodeConfig {
    pub count: usize,
    pub pbkdf2_iterations: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub path: String,
    pub encryption_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    /// Loads configuration from `config/default`, `config/local` and
    /// `APP__SECTION__KEY` environment variables, in that order of precedence.
    pub fn new() -> Result<Self> {
        dotenv::dotenv().ok();

        let config = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        Self::finish(config)
    }

    pub fn from_toml(source: &str) -> Result<Self> {
        let config = Self::defaults()?
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?;

        Self::finish(config)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let builder = ConfigLib::builder()
            .set_default("challenge.secret", "")?
            .set_default("challenge.ttl_secs", 300)?
            .set_default("challenge.single_use", true)?
            .set_default("face.distance_threshold", 0.35)?
            .set_default("face.min_confidence", 90.0)?
            .set_default("face.min_cosine", 0.65)?
            .set_default("voice.enroll_profile", "balanced")?
            .set_default("voice.login_profile", "balanced")?
            .set_default("voice.max_audio_bytes", 5_000_000)?
            .set_default("gesture.threshold", 0.88)?
            .set_default("gesture.min_points", 15)?
            .set_default("gesture.max_points", 1000)?
            .set_default("keystroke.distance_threshold", 1.2)?
            .set_default("keystroke.min_confidence", 38.0)?
            .set_default("keystroke.min_samples", 3)?
            .set_default("keystroke.min_strength", 0.3)?
            .set_default("totp.issuer", "Biogate")?
            .set_default("totp.skew", 1)?
            .set_default("totp.step", 30)?
            .set_default("totp.digits", 6)?
            .set_default("backup_codes.count", 10)?
            .set_default("backup_codes.pbkdf2_iterations", 10_000)?
            .set_default("storage.path", "data/biogate")?
            .set_default("storage.encryption_key", "")?
            .set_default("logging.level", "info")?;

        Ok(builder)
    }

    fn finish(config: ConfigLib) -> Result<Self> {
        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.challenge.secret.len() < 32 {
            return Err(AuthError::Config("challenge.secret must be at least 32 bytes".into()));
        }
        if self.challenge.ttl_secs == 0 {
            return Err(AuthError::Config("challenge.ttl_secs must be greater than 0".into()));
        }

        if self.face.distance_threshold <= 0.0 {
            return Err(AuthError::Config("face.distance_threshold must be positive".into()));
        }
        if !(0.0..=100.0).contains(&self.face.min_confidence) {
            return Err(AuthError::Config("face.min_confidence must be a percentage".into()));
        }
        if !(-1.0..=1.0).contains(&self.face.min_cosine) {
            return Err(AuthError::Config("face.min_cosine must lie in [-1, 1]".into()));
        }

        if self.voice.max_audio_bytes == 0 {
            return Err(AuthError::Config("voice.max_audio_bytes must be greater than 0".into()));
        }

        if !(self.gesture.threshold > 0.0 && self.gesture.threshold <= 1.0) {
            return Err(AuthError::Config("gesture.threshold must lie in (0, 1]".into()));
        }
        if self.gesture.min_points < 2 || self.gesture.min_points > self.gesture.max_points {
            return Err(AuthError::Config("gesture point bounds are inconsistent".into()));
        }

        if self.keystroke.distance_threshold <= 0.0 {
            return Err(AuthError::Config("keystroke.distance_threshold must be positive".into()));
        }
        if !(0.0..=100.0).contains(&self.keystroke.min_confidence) {
            return Err(AuthError::Config("keystroke.min_confidence must be a percentage".into()));
        }
        if self.keystroke.min_samples < 3 {
            return Err(AuthError::Config("keystroke.min_samples must be at least 3".into()));
        }

        if self.totp.step == 0 || !(6..=8).contains(&self.totp.digits) {
            return Err(AuthError::Config("totp.step must be positive and totp.digits within 6..=8".into()));
        }
        if self.totp.issuer.contains(':') {
            return Err(AuthError::Config("totp.issuer must not contain ':'".into()));
        }

        if self.backup_codes.count == 0 || self.backup_codes.pbkdf2_iterations == 0 {
            return Err(AuthError::Config("backup_codes.count and pbkdf2_iterations must be greater than 0".into()));
        }

        Ok(())
    }

    pub fn challenge_ttl(&self) -> Duration {
        Duration::from_secs(self.challenge.ttl_secs)
    }
}

impl From<ConfigError> for AuthError {
    fn from(error: ConfigError) -> Self {
        AuthError::Config(error.to_string())
    }
}
