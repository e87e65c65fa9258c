use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 44_100;
pub const DEFAULT_MAX_CLIP_SECS: f32 = 3.0;
pub const DEFAULT_THREAT_WEIGHT: f32 = 0.8;
pub const DEFAULT_EMOTION_WEIGHT: f32 = 0.2;
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_TRANSCRIPTION_API_KEY: &str = "RAPIDAPI_KEY";
pub const ENV_TWILIO_ACCOUNT_SID: &str = "TWILIO_ACCOUNT_SID";
pub const ENV_TWILIO_AUTH_TOKEN: &str = "TWILIO_AUTH_TOKEN";
pub const ENV_TWILIO_MESSAGING_SERVICE_SID: &str = "TWILIO_MESSAGING_SERVICE_SID";
pub const ENV_TWILIO_TO_PHONE_NUMBER: &str = "TWILIO_TO_PHONE_NUMBER";
pub const ENV_MODEL_PATH: &str = "MODEL_PATH";

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(Self(v))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(**redacted**)")
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKeys {
    pub threat: Option<ApiKey>,
    pub transcription: Option<ApiKey>,
}

/// Decode-time audio constraints: everything downstream assumes mono samples
/// at `sample_rate_hz`, truncated to `max_clip_secs`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct AudioConfig {
    pub sample_rate_hz: u32,
    pub max_clip_secs: f32,
}

impl AudioConfig {
    pub fn new(sample_rate_hz: u32, max_clip_secs: f32) -> Result<Self, ConfigError> {
        if sample_rate_hz == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if !(max_clip_secs > 0.0) {
            return Err(ConfigError::NonPositiveClipLength);
        }
        Ok(Self {
            sample_rate_hz,
            max_clip_secs,
        })
    }

    pub fn max_samples(&self) -> usize {
        (self.max_clip_secs * self.sample_rate_hz as f32) as usize
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            max_clip_secs: DEFAULT_MAX_CLIP_SECS,
        }
    }
}

/// Relative weight of the textual threat verdict vs. the emotion severity in
/// the fused risk score. Weights are non-negative and sum to at most 1, so
/// the fused score stays in [0, 1].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct FusionWeights {
    pub threat: f32,
    pub emotion: f32,
}

impl FusionWeights {
    pub fn new(threat: f32, emotion: f32) -> Result<Self, ConfigError> {
        if !threat.is_finite() || !emotion.is_finite() || threat < 0.0 || emotion < 0.0 {
            return Err(ConfigError::NegativeWeight);
        }
        if threat + emotion > 1.0 + f32::EPSILON {
            return Err(ConfigError::WeightSumExceedsOne);
        }
        Ok(Self { threat, emotion })
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            threat: DEFAULT_THREAT_WEIGHT,
            emotion: DEFAULT_EMOTION_WEIGHT,
        }
    }
}

/// Lower bounds of the four elevated alert tiers, strictly descending.
/// Scores below `caution` map to the safe tier.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct DangerThresholds {
    pub critical: f32,
    pub high_alert: f32,
    pub warning: f32,
    pub caution: f32,
}

impl DangerThresholds {
    pub fn new(
        critical: f32,
        high_alert: f32,
        warning: f32,
        caution: f32,
    ) -> Result<Self, ConfigError> {
        let ladder = [critical, high_alert, warning, caution];
        if ladder.iter().any(|t| !t.is_finite() || *t <= 0.0 || *t > 1.0) {
            return Err(ConfigError::ThresholdOutOfRange);
        }
        if !(critical > high_alert && high_alert > warning && warning > caution) {
            return Err(ConfigError::ThresholdsNotDescending);
        }
        Ok(Self {
            critical,
            high_alert,
            warning,
            caution,
        })
    }
}

impl Default for DangerThresholds {
    fn default() -> Self {
        Self {
            critical: 0.8,
            high_alert: 0.6,
            warning: 0.4,
            caution: 0.2,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SmsConfig {
    pub account_sid: String,
    pub auth_token: ApiKey,
    pub messaging_service_sid: String,
    pub to_number: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub weights: FusionWeights,
    pub thresholds: DangerThresholds,
    pub model_path: PathBuf,
    pub api_keys: ApiKeys,
    pub sms: Option<SmsConfig>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("api key must not be empty")]
    EmptyApiKey,
    #[error("sample rate must be > 0 Hz")]
    ZeroSampleRate,
    #[error("max clip length must be > 0 seconds")]
    NonPositiveClipLength,
    #[error("fusion weights must be non-negative")]
    NegativeWeight,
    #[error("fusion weights must sum to at most 1")]
    WeightSumExceedsOne,
    #[error("danger thresholds must lie in (0, 1]")]
    ThresholdOutOfRange,
    #[error("danger thresholds must be strictly descending")]
    ThresholdsNotDescending,
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_api_key(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<Option<ApiKey>, ConfigError> {
    match cli_value {
        Some(v) => Ok(Some(ApiKey::new(v)?)),
        None => match env.var(env_key) {
            Some(v) => Ok(Some(ApiKey::new(v)?)),
            None => Ok(None),
        },
    }
}

pub fn resolve_optional_string(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Option<String> {
    match cli_value {
        Some(v) => Some(v),
        None => env.var(env_key),
    }
}
