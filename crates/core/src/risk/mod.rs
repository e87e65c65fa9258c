use crate::config::{DangerThresholds, FusionWeights};
use crate::emotion::MAX_SEVERITY;
use serde::{Deserialize, Serialize};

/// Outcome of the textual threat assessment. `Unknown` covers classifier
/// failures and unparseable replies; it fuses like `Negative` so an
/// infrastructure failure never biases the risk upward, but it stays
/// distinct in output and logs.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ThreatVerdict {
    Affirmative,
    Negative,
    Unknown,
}

impl ThreatVerdict {
    /// Normalizes a classifier reply token. Only an exact (case-insensitive)
    /// yes/no counts; every other token is an unknown verdict.
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        if token.eq_ignore_ascii_case("yes") {
            ThreatVerdict::Affirmative
        } else if token.eq_ignore_ascii_case("no") {
            ThreatVerdict::Negative
        } else {
            ThreatVerdict::Unknown
        }
    }

    pub fn is_affirmative(self) -> bool {
        matches!(self, ThreatVerdict::Affirmative)
    }
}

/// Fused risk scalar in [0, 1].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, PartialOrd)]
pub struct RiskScore(f32);

impl RiskScore {
    pub fn value(self) -> f32 {
        self.0
    }
}

/// Weighted combination of the binary threat verdict and the normalized
/// dominant-emotion severity. Total over its input domains; the weight
/// invariants (see `FusionWeights`) keep the result in [0, 1].
pub fn fuse(verdict: ThreatVerdict, severity: u8, weights: &FusionWeights) -> RiskScore {
    let threat_binary = if verdict.is_affirmative() { 1.0 } else { 0.0 };
    let normalized_emotion = f32::from(severity.min(MAX_SEVERITY)) / f32::from(MAX_SEVERITY);
    RiskScore(weights.threat * threat_binary + weights.emotion * normalized_emotion)
}

/// Discrete alert tier, ordered from benign to critical.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum DangerLevel {
    Safe,
    Caution,
    Warning,
    HighAlert,
    Critical,
}

impl DangerLevel {
    /// The alert text dispatched for this tier.
    pub fn message(self) -> &'static str {
        match self {
            DangerLevel::Critical => "CRITICAL: Immediate danger detected!",
            DangerLevel::HighAlert => "HIGH ALERT: I am in serious danger",
            DangerLevel::Warning => "WARNING: I might be in danger",
            DangerLevel::Caution => "CAUTION: Situation unclear but concerning",
            DangerLevel::Safe => "I am safe",
        }
    }
}

/// Maps a risk score onto the threshold ladder, highest tier first with
/// inclusive lower bounds.
pub fn danger_level(risk: RiskScore, thresholds: &DangerThresholds) -> DangerLevel {
    let value = risk.value();
    if value >= thresholds.critical {
        DangerLevel::Critical
    } else if value >= thresholds.high_alert {
        DangerLevel::HighAlert
    } else if value >= thresholds.warning {
        DangerLevel::Warning
    } else if value >= thresholds.caution {
        DangerLevel::Caution
    } else {
        DangerLevel::Safe
    }
}
