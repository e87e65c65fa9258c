use crate::config::{DangerThresholds, FusionWeights};
use crate::decode::{AudioLoader, DecodeError, LoadedClip};
use crate::emotion::{EmotionClassifier, EmotionLabel, EmotionScores};
use crate::features::{FeatureError, FeatureExtractor};
use crate::notify::Notifier;
use crate::risk::{danger_level, fuse, DangerLevel, RiskScore, ThreatVerdict};
use crate::threat::ThreatClassifier;
use crate::transcribe::TranscriptionService;
use bytes::Bytes;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("audio decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("feature extraction failed: {0}")]
    Features(#[from] FeatureError),

    #[error("audio analysis task aborted")]
    TaskAborted,
}

/// Everything one invocation produces. `emotion` and `scores` are absent
/// when the classifier had no opinion (scoring failure); severity is 0 then
/// and the risk score rests on the threat verdict alone.
#[derive(Clone, Debug, Serialize)]
pub struct Assessment {
    pub emotion: Option<EmotionLabel>,
    pub scores: Option<EmotionScores>,
    pub severity: u8,
    pub verdict: ThreatVerdict,
    pub risk: RiskScore,
    pub level: DangerLevel,
    pub message: &'static str,
}

/// End-to-end assessment of one clip: the audio branch (features +
/// classification) overlaps the text branch (transcription + threat
/// judgement); fusion waits for both.
///
/// The classifier is shared read-only and loaded once per process; the
/// pipeline never reloads it between invocations.
pub struct Pipeline<T, C, N> {
    pub loader: AudioLoader,
    pub extractor: FeatureExtractor,
    pub classifier: Arc<EmotionClassifier>,
    pub transcriber: T,
    pub threat: C,
    pub notifier: N,
    pub weights: FusionWeights,
    pub thresholds: DangerThresholds,
}

impl<T, C, N> Pipeline<T, C, N>
where
    T: TranscriptionService,
    C: ThreatClassifier,
    N: Notifier,
{
    pub async fn assess_file(&self, path: &Path) -> Result<Assessment, PipelineError> {
        let clip = self.loader.load(path).await?;
        self.assess_clip(clip).await
    }

    pub async fn assess_clip(&self, clip: LoadedClip) -> Result<Assessment, PipelineError> {
        // DSP and inference are pure compute; move them off the async
        // scheduler while the collaborator calls are in flight.
        let extractor = self.extractor.clone();
        let classifier = Arc::clone(&self.classifier);
        let audio = clip.audio;
        let audio_task = tokio::task::spawn_blocking(move || {
            let features = extractor.extract(&audio)?;
            Ok::<_, FeatureError>(classifier.classify(&features))
        });

        let verdict = self.text_verdict(clip.encoded).await;

        let classified = audio_task
            .await
            .map_err(|_| PipelineError::TaskAborted)??;

        let (emotion, scores, severity) = match classified {
            Ok((label, scores)) => {
                tracing::debug!(
                    emotion = label.display_name(),
                    confidence = scores.get(label),
                    "dominant emotion"
                );
                (Some(label), Some(scores), label.severity())
            }
            Err(e) => {
                tracing::warn!(error = %e, "classification failed, treating emotion as no opinion");
                (None, None, 0)
            }
        };

        let risk = fuse(verdict, severity, &self.weights);
        let level = danger_level(risk, &self.thresholds);
        let message = level.message();
        tracing::info!(
            risk = risk.value(),
            level = ?level,
            verdict = ?verdict,
            severity,
            "assessment complete"
        );

        match self.notifier.send(message.to_owned()).await {
            Ok(receipt) => {
                tracing::debug!(id = receipt.id.as_deref().unwrap_or("-"), "alert dispatched")
            }
            Err(e) => tracing::warn!(error = %e, "alert delivery failed"),
        }

        Ok(Assessment {
            emotion,
            scores,
            severity,
            verdict,
            risk,
            level,
            message,
        })
    }

    /// Transcribes the clip and judges the text. Collaborator failures
    /// degrade to an unknown verdict, which fuses as negative.
    async fn text_verdict(&self, encoded: Bytes) -> ThreatVerdict {
        let transcript = match self.transcriber.transcribe(encoded).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "transcription unavailable, verdict unknown");
                return ThreatVerdict::Unknown;
            }
        };
        tracing::debug!(text = %transcript.text, "transcript");

        match self.threat.assess(transcript.text).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(error = %e, "threat judgement unavailable, verdict unknown");
                ThreatVerdict::Unknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::AudioBuffer;
    use crate::emotion::{ClassifyError, ScoringModel};
    use crate::notify::{DeliveryReceipt, LogNotifier, NotifyError};
    use crate::threat::DummyThreatClassifier;
    use crate::transcribe::DummyTranscriber;
    use futures::future::BoxFuture;
    use futures::FutureExt;

    /// Scoring model that always favors one encoder index.
    struct PeakModel {
        peak: usize,
    }

    impl ScoringModel for PeakModel {
        fn score(&self, _features: &[f32]) -> Result<Vec<f32>, ClassifyError> {
            let mut out = vec![0.0f32; 7];
            out[self.peak] = 10.0;
            Ok(out)
        }
    }

    struct BrokenModel;

    impl ScoringModel for BrokenModel {
        fn score(&self, _features: &[f32]) -> Result<Vec<f32>, ClassifyError> {
            Err(ClassifyError::NonFinite)
        }
    }

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn send(&self, _message: String) -> BoxFuture<'_, Result<DeliveryReceipt, NotifyError>> {
            async {
                Err(NotifyError::Api {
                    status: 500,
                    body: "boom".to_owned(),
                })
            }
            .boxed()
        }
    }

    fn encoder_order() -> Vec<EmotionLabel> {
        vec![
            EmotionLabel::Anger,
            EmotionLabel::Disgust,
            EmotionLabel::Fear,
            EmotionLabel::Happiness,
            EmotionLabel::Neutral,
            EmotionLabel::Sadness,
            EmotionLabel::Surprise,
        ]
    }

    fn clip() -> LoadedClip {
        LoadedClip {
            encoded: Bytes::from_static(b"not real audio"),
            audio: AudioBuffer {
                sample_rate_hz: 44_100,
                samples: (0..22_050)
                    .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44_100.0).sin())
                    .collect(),
            },
        }
    }

    fn pipeline<T, C, N>(
        model: Box<dyn ScoringModel>,
        transcriber: T,
        threat: C,
        notifier: N,
    ) -> Pipeline<T, C, N> {
        Pipeline {
            loader: AudioLoader::default(),
            extractor: FeatureExtractor::default(),
            classifier: Arc::new(EmotionClassifier::new(model, encoder_order()).unwrap()),
            transcriber,
            threat,
            notifier,
            weights: FusionWeights::default(),
            thresholds: DangerThresholds::default(),
        }
    }

    #[tokio::test]
    async fn affirmative_threat_and_fear_is_critical() {
        let p = pipeline(
            Box::new(PeakModel { peak: 2 }), // Fear
            DummyTranscriber::with_text("please save me"),
            DummyThreatClassifier::new(ThreatVerdict::Affirmative),
            LogNotifier::new(),
        );
        let a = p.assess_clip(clip()).await.unwrap();
        assert_eq!(a.emotion, Some(EmotionLabel::Fear));
        assert_eq!(a.severity, 3);
        assert!((a.risk.value() - 1.0).abs() < 1e-6);
        assert_eq!(a.level, DangerLevel::Critical);
        assert_eq!(a.message, "CRITICAL: Immediate danger detected!");
    }

    #[tokio::test]
    async fn negative_threat_and_benign_emotion_is_safe() {
        let p = pipeline(
            Box::new(PeakModel { peak: 3 }), // Happiness
            DummyTranscriber::with_text("lovely weather today"),
            DummyThreatClassifier::new(ThreatVerdict::Negative),
            LogNotifier::new(),
        );
        let a = p.assess_clip(clip()).await.unwrap();
        assert_eq!(a.emotion, Some(EmotionLabel::Happiness));
        assert_eq!(a.severity, 0);
        assert!(a.risk.value().abs() < 1e-6);
        assert_eq!(a.level, DangerLevel::Safe);
        assert_eq!(a.message, "I am safe");
    }

    #[tokio::test]
    async fn affirmative_threat_alone_hits_critical_boundary() {
        let p = pipeline(
            Box::new(PeakModel { peak: 4 }), // Neutral
            DummyTranscriber::with_text("he has a knife"),
            DummyThreatClassifier::new(ThreatVerdict::Affirmative),
            LogNotifier::new(),
        );
        let a = p.assess_clip(clip()).await.unwrap();
        assert_eq!(a.severity, 0);
        assert!((a.risk.value() - 0.8).abs() < 1e-6);
        assert_eq!(a.level, DangerLevel::Critical);
    }

    #[tokio::test]
    async fn classifier_failure_degrades_to_threat_only() {
        let p = pipeline(
            Box::new(BrokenModel),
            DummyTranscriber::with_text("please save me"),
            DummyThreatClassifier::new(ThreatVerdict::Affirmative),
            LogNotifier::new(),
        );
        let a = p.assess_clip(clip()).await.unwrap();
        assert_eq!(a.emotion, None);
        assert_eq!(a.scores, None);
        assert_eq!(a.severity, 0);
        assert!((a.risk.value() - 0.8).abs() < 1e-6);
        assert_eq!(a.level, DangerLevel::Critical);
    }

    #[tokio::test]
    async fn transcription_failure_yields_unknown_verdict() {
        let p = pipeline(
            Box::new(PeakModel { peak: 2 }), // Fear
            DummyTranscriber::unavailable(),
            DummyThreatClassifier::new(ThreatVerdict::Affirmative),
            LogNotifier::new(),
        );
        let a = p.assess_clip(clip()).await.unwrap();
        assert_eq!(a.verdict, ThreatVerdict::Unknown);
        // Risk rests on the emotion weight alone.
        assert!((a.risk.value() - 0.2).abs() < 1e-6);
        assert_eq!(a.level, DangerLevel::Caution);
    }

    #[tokio::test]
    async fn notifier_failure_does_not_alter_assessment() {
        let p = pipeline(
            Box::new(PeakModel { peak: 2 }), // Fear
            DummyTranscriber::with_text("please save me"),
            DummyThreatClassifier::new(ThreatVerdict::Affirmative),
            FailingNotifier,
        );
        let a = p.assess_clip(clip()).await.unwrap();
        assert_eq!(a.level, DangerLevel::Critical);
    }
}
