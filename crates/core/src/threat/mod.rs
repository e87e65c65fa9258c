mod chat;
mod dummy;

use crate::risk::ThreatVerdict;
use futures::future::BoxFuture;

pub use chat::ChatThreatClassifier;
pub use dummy::DummyThreatClassifier;

#[derive(thiserror::Error, Debug)]
pub enum ThreatError {
    #[error("threat request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("threat api error: HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected threat response: {0}")]
    InvalidResponse(String),
}

/// Remote judge of whether transcribed speech is threatening. Errors are
/// recovered by the pipeline as an unknown verdict; they never abort an
/// assessment.
pub trait ThreatClassifier: Send + Sync {
    fn assess(&self, text: String) -> BoxFuture<'_, Result<ThreatVerdict, ThreatError>>;
}

impl ThreatClassifier for Box<dyn ThreatClassifier> {
    fn assess(&self, text: String) -> BoxFuture<'_, Result<ThreatVerdict, ThreatError>> {
        (**self).assess(text)
    }
}
