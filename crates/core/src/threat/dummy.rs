use crate::risk::ThreatVerdict;
use crate::threat::{ThreatClassifier, ThreatError};
use futures::future::BoxFuture;
use futures::FutureExt;

/// Stand-in threat judge for keyless operation and tests: always returns
/// the configured verdict.
#[derive(Clone, Copy, Debug)]
pub struct DummyThreatClassifier {
    verdict: ThreatVerdict,
}

impl DummyThreatClassifier {
    pub fn new(verdict: ThreatVerdict) -> Self {
        Self { verdict }
    }
}

impl Default for DummyThreatClassifier {
    fn default() -> Self {
        Self::new(ThreatVerdict::Unknown)
    }
}

impl ThreatClassifier for DummyThreatClassifier {
    fn assess(&self, _text: String) -> BoxFuture<'_, Result<ThreatVerdict, ThreatError>> {
        let verdict = self.verdict;
        async move { Ok(verdict) }.boxed()
    }
}
