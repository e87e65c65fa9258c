mod model;

use crate::features::FeatureVector;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use model::MlpScoringModel;

pub const EMOTION_COUNT: usize = 7;

/// Highest severity any label carries; fusion normalizes against this.
pub const MAX_SEVERITY: u8 = 3;

/// Closed set of emotion categories the classifier can produce.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EmotionLabel {
    Fear,
    Sadness,
    Anger,
    Happiness,
    Disgust,
    Neutral,
    Surprise,
}

impl EmotionLabel {
    pub const ALL: [EmotionLabel; EMOTION_COUNT] = [
        EmotionLabel::Fear,
        EmotionLabel::Sadness,
        EmotionLabel::Anger,
        EmotionLabel::Happiness,
        EmotionLabel::Disgust,
        EmotionLabel::Neutral,
        EmotionLabel::Surprise,
    ];

    /// How dangerous this emotion is presumed to be, on a 0..=3 scale.
    /// The table is intentionally asymmetric: only fear, sadness and anger
    /// carry weight; the remaining labels are treated as benign.
    pub fn severity(self) -> u8 {
        match self {
            EmotionLabel::Fear => 3,
            EmotionLabel::Sadness => 2,
            EmotionLabel::Anger => 1,
            EmotionLabel::Happiness
            | EmotionLabel::Disgust
            | EmotionLabel::Neutral
            | EmotionLabel::Surprise => 0,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            EmotionLabel::Fear => "Fear",
            EmotionLabel::Sadness => "Sadness",
            EmotionLabel::Anger => "Anger",
            EmotionLabel::Happiness => "Happiness",
            EmotionLabel::Disgust => "Disgust",
            EmotionLabel::Neutral => "Neutral",
            EmotionLabel::Surprise => "Surprise",
        }
    }

    /// Three-letter code used by the persisted label encoder.
    pub fn code(self) -> &'static str {
        match self {
            EmotionLabel::Fear => "FEA",
            EmotionLabel::Sadness => "SAD",
            EmotionLabel::Anger => "ANG",
            EmotionLabel::Happiness => "HAP",
            EmotionLabel::Disgust => "DIS",
            EmotionLabel::Neutral => "NEU",
            EmotionLabel::Surprise => "SUR",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.code() == code)
    }

    fn index(self) -> usize {
        Self::ALL.iter().position(|&l| l == self).unwrap_or(0)
    }
}

/// One probability-like score per label; non-negative, summing to 1.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EmotionScores {
    scores: [f32; EMOTION_COUNT],
}

impl EmotionScores {
    pub fn get(&self, label: EmotionLabel) -> f32 {
        self.scores[label.index()]
    }

    pub fn dominant(&self) -> (EmotionLabel, f32) {
        let mut best = EmotionLabel::ALL[0];
        let mut best_score = self.scores[0];
        for (label, &score) in EmotionLabel::ALL.iter().zip(self.scores.iter()).skip(1) {
            if score > best_score {
                best = *label;
                best_score = score;
            }
        }
        (best, best_score)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, f32)> + '_ {
        EmotionLabel::ALL.iter().zip(self.scores.iter()).map(|(l, s)| (*l, *s))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ClassifyError {
    #[error("invalid classifier artifact: {0}")]
    Artifact(String),

    #[error("scoring function expected {expected} inputs, got {got}")]
    InputArity { expected: usize, got: usize },

    #[error("scoring function returned {got} scores for {expected} labels")]
    ScoreArity { expected: usize, got: usize },

    #[error("scoring function produced non-finite output")]
    NonFinite,
}

pub type Result<T> = std::result::Result<T, ClassifyError>;

/// The loaded scoring function: maps a feature vector to one raw score per
/// label-encoder class. Implementations must be safe to call concurrently;
/// the classifier is shared read-only for the process lifetime.
pub trait ScoringModel: Send + Sync {
    fn score(&self, features: &[f32]) -> Result<Vec<f32>>;
}

/// Pre-trained emotion classifier: a scoring function plus the label-encoder
/// order mapping score indices back onto the closed label set. Loaded once
/// per process and reused for every clip.
pub struct EmotionClassifier {
    model: Box<dyn ScoringModel>,
    labels: Vec<EmotionLabel>,
}

impl std::fmt::Debug for EmotionClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmotionClassifier")
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}

impl EmotionClassifier {
    pub fn new(model: Box<dyn ScoringModel>, labels: Vec<EmotionLabel>) -> Result<Self> {
        if labels.len() != EMOTION_COUNT {
            return Err(ClassifyError::Artifact(format!(
                "label encoder must cover all {EMOTION_COUNT} classes, got {}",
                labels.len()
            )));
        }
        for label in EmotionLabel::ALL {
            if !labels.contains(&label) {
                return Err(ClassifyError::Artifact(format!(
                    "label encoder is missing {}",
                    label.code()
                )));
            }
        }
        Ok(Self { model, labels })
    }

    /// Loads the persisted scoring function and label encoder from a JSON
    /// artifact.
    pub fn load(path: &Path) -> Result<Self> {
        let (model, labels) = MlpScoringModel::load(path)?;
        tracing::info!(
            path = %path.display(),
            classes = labels.len(),
            "classifier artifact loaded"
        );
        Self::new(Box::new(model), labels)
    }

    /// Runs the scoring function and returns the dominant label with the
    /// full score distribution. The returned scores are non-negative and
    /// sum to 1.
    pub fn classify(&self, features: &FeatureVector) -> Result<(EmotionLabel, EmotionScores)> {
        let raw = self.model.score(features.as_slice())?;
        if raw.len() != self.labels.len() {
            return Err(ClassifyError::ScoreArity {
                expected: self.labels.len(),
                got: raw.len(),
            });
        }
        if raw.iter().any(|v| !v.is_finite()) {
            return Err(ClassifyError::NonFinite);
        }

        let distribution = to_distribution(&raw);
        let mut scores = [0.0f32; EMOTION_COUNT];
        for (label, value) in self.labels.iter().zip(distribution.iter()) {
            scores[label.index()] = *value;
        }
        let scores = EmotionScores { scores };
        let (label, _) = scores.dominant();
        Ok((label, scores))
    }
}

/// Raw scores become a distribution: already-normalized outputs pass
/// through, anything else goes through a softmax.
fn to_distribution(raw: &[f32]) -> Vec<f32> {
    let sum: f32 = raw.iter().sum();
    if raw.iter().all(|&v| v >= 0.0) && (sum - 1.0).abs() <= 1e-4 {
        return raw.iter().map(|&v| v / sum).collect();
    }
    let max = raw.iter().fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let exp: Vec<f32> = raw.iter().map(|&v| (v - max).exp()).collect();
    let total: f32 = exp.iter().sum();
    exp.into_iter().map(|v| v / total).collect()
}
