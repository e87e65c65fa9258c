#![deny(warnings)]

use anyhow::Context;
use clap::Parser;
use guardline_core::config::{
    resolve_api_key, resolve_optional_string, ApiKey, ApiKeys, AppConfig, AudioConfig,
    DangerThresholds, Env, FusionWeights, SmsConfig, StdEnv, DEFAULT_EMOTION_WEIGHT,
    DEFAULT_THREAT_WEIGHT, ENV_MODEL_PATH, ENV_OPENAI_API_KEY, ENV_TRANSCRIPTION_API_KEY,
    ENV_TWILIO_ACCOUNT_SID, ENV_TWILIO_AUTH_TOKEN, ENV_TWILIO_MESSAGING_SERVICE_SID,
    ENV_TWILIO_TO_PHONE_NUMBER,
};
use guardline_core::decode::AudioLoader;
use guardline_core::emotion::EmotionClassifier;
use guardline_core::features::FeatureExtractor;
use guardline_core::notify::{LogNotifier, Notifier, SmsNotifier};
use guardline_core::pipeline::Pipeline;
use guardline_core::threat::{ChatThreatClassifier, DummyThreatClassifier, ThreatClassifier};
use guardline_core::transcribe::{DummyTranscriber, TranscriptionService, WhisperApiTranscriber};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "guardline")]
#[command(about = "Assess a spoken clip for distress (emotion + threat fusion -> alert tier)")]
struct Args {
    /// Audio clip to assess
    #[arg(value_name = "AUDIO")]
    audio: PathBuf,

    /// Classifier artifact (scoring function + label encoder)
    #[arg(long, env = ENV_MODEL_PATH)]
    model: PathBuf,

    #[arg(long)]
    openai_api_key: Option<String>,

    #[arg(long)]
    transcription_api_key: Option<String>,

    #[arg(long, default_value_t = DEFAULT_THREAT_WEIGHT)]
    threat_weight: f32,

    #[arg(long, default_value_t = DEFAULT_EMOTION_WEIGHT)]
    emotion_weight: f32,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let env = StdEnv;
    let audio_path = args.audio.clone();
    let cfg = build_config(args, &env)?;

    tracing::info!(
        model = %cfg.model_path.display(),
        threat_weight = cfg.weights.threat,
        emotion_weight = cfg.weights.emotion,
        "config loaded"
    );

    // Loaded exactly once; every assessment shares this instance.
    let classifier = Arc::new(
        EmotionClassifier::load(&cfg.model_path)
            .with_context(|| format!("loading classifier from {}", cfg.model_path.display()))?,
    );

    let transcriber: Box<dyn TranscriptionService> = match cfg.api_keys.transcription.clone() {
        Some(key) => Box::new(WhisperApiTranscriber::new(key.expose().to_owned())),
        None => {
            tracing::warn!("no transcription api key, threat verdict will be unknown");
            Box::new(DummyTranscriber::unavailable())
        }
    };

    let threat: Box<dyn ThreatClassifier> = match cfg.api_keys.threat.clone() {
        Some(key) => Box::new(ChatThreatClassifier::new(key.expose().to_owned())),
        None => {
            tracing::warn!("no threat api key, threat verdict will be unknown");
            Box::new(DummyThreatClassifier::default())
        }
    };

    let notifier: Box<dyn Notifier> = match cfg.sms.clone() {
        Some(sms) => Box::new(SmsNotifier::new(sms)),
        None => {
            tracing::warn!("sms delivery not configured, alerts go to the log");
            Box::new(LogNotifier::new())
        }
    };

    let pipeline = Pipeline {
        loader: AudioLoader::new(cfg.audio),
        extractor: FeatureExtractor::default(),
        classifier,
        transcriber,
        threat,
        notifier,
        weights: cfg.weights,
        thresholds: cfg.thresholds,
    };

    let assessment = pipeline
        .assess_file(&audio_path)
        .await
        .with_context(|| format!("assessing {}", audio_path.display()))?;

    match (assessment.emotion, &assessment.scores) {
        (Some(emotion), Some(scores)) => println!(
            "Emotion: {} ({:.1}%), severity {}",
            emotion.display_name(),
            scores.get(emotion) * 100.0,
            assessment.severity
        ),
        _ => println!("Emotion: no opinion (classifier failed), severity 0"),
    }
    println!("Threat verdict: {:?}", assessment.verdict);
    println!("Risk score: {:.2}", assessment.risk.value());
    println!("Danger level: {:?}", assessment.level);
    println!("{}", assessment.message);

    Ok(())
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn build_config(args: Args, env: &impl Env) -> anyhow::Result<AppConfig> {
    let weights = FusionWeights::new(args.threat_weight, args.emotion_weight)?;
    let threat = resolve_api_key(args.openai_api_key, ENV_OPENAI_API_KEY, env)?;
    let transcription =
        resolve_api_key(args.transcription_api_key, ENV_TRANSCRIPTION_API_KEY, env)?;

    Ok(AppConfig {
        audio: AudioConfig::default(),
        weights,
        thresholds: DangerThresholds::default(),
        model_path: args.model,
        api_keys: ApiKeys {
            threat,
            transcription,
        },
        sms: resolve_sms_config(env)?,
    })
}

/// SMS delivery is configured entirely from the environment; it is only
/// enabled when all four settings are present.
fn resolve_sms_config(env: &impl Env) -> anyhow::Result<Option<SmsConfig>> {
    let account_sid = resolve_optional_string(None, ENV_TWILIO_ACCOUNT_SID, env);
    let auth_token = resolve_optional_string(None, ENV_TWILIO_AUTH_TOKEN, env);
    let messaging_service_sid = resolve_optional_string(None, ENV_TWILIO_MESSAGING_SERVICE_SID, env);
    let to_number = resolve_optional_string(None, ENV_TWILIO_TO_PHONE_NUMBER, env);

    match (account_sid, auth_token, messaging_service_sid, to_number) {
        (Some(account_sid), Some(auth_token), Some(messaging_service_sid), Some(to_number)) => {
            Ok(Some(SmsConfig {
                account_sid,
                auth_token: ApiKey::new(auth_token)?,
                messaging_service_sid,
                to_number,
            }))
        }
        (None, None, None, None) => Ok(None),
        _ => {
            tracing::warn!("incomplete sms settings, alerts go to the log");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardline_core::config::MapEnv;

    fn args() -> Args {
        Args {
            audio: PathBuf::from("clip.wav"),
            model: PathBuf::from("model.json"),
            openai_api_key: None,
            transcription_api_key: None,
            threat_weight: DEFAULT_THREAT_WEIGHT,
            emotion_weight: DEFAULT_EMOTION_WEIGHT,
            log_level: "info".to_owned(),
        }
    }

    #[test]
    fn keys_resolve_from_env() {
        let env = MapEnv::default()
            .with_var(ENV_OPENAI_API_KEY, "threat-key")
            .with_var(ENV_TRANSCRIPTION_API_KEY, "stt-key");
        let cfg = build_config(args(), &env).unwrap();
        assert_eq!(cfg.api_keys.threat.unwrap().expose(), "threat-key");
        assert_eq!(cfg.api_keys.transcription.unwrap().expose(), "stt-key");
    }

    #[test]
    fn sms_config_requires_all_settings() {
        let env = MapEnv::default().with_var(ENV_TWILIO_ACCOUNT_SID, "AC123");
        let cfg = build_config(args(), &env).unwrap();
        assert!(cfg.sms.is_none());

        let env = env
            .with_var(ENV_TWILIO_AUTH_TOKEN, "token")
            .with_var(ENV_TWILIO_MESSAGING_SERVICE_SID, "MG456")
            .with_var(ENV_TWILIO_TO_PHONE_NUMBER, "+15550001234");
        let cfg = build_config(args(), &env).unwrap();
        let sms = cfg.sms.unwrap();
        assert_eq!(sms.account_sid, "AC123");
        assert_eq!(sms.to_number, "+15550001234");
    }

    #[test]
    fn invalid_weights_are_rejected() {
        let mut bad = args();
        bad.threat_weight = 0.9;
        bad.emotion_weight = 0.5;
        assert!(build_config(bad, &MapEnv::default()).is_err());
    }
}
