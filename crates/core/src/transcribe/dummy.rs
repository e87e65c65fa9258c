use crate::transcribe::{Transcript, TranscribeError, TranscriptionService};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;

/// Stand-in transcriber for keyless operation and tests: returns a fixed
/// transcript, or reports no speech when none was configured.
#[derive(Clone, Debug, Default)]
pub struct DummyTranscriber {
    text: Option<String>,
}

impl DummyTranscriber {
    pub fn with_text<S: Into<String>>(text: S) -> Self {
        Self {
            text: Some(text.into()),
        }
    }

    pub fn unavailable() -> Self {
        Self { text: None }
    }
}

impl TranscriptionService for DummyTranscriber {
    fn transcribe(&self, _audio: Bytes) -> BoxFuture<'_, Result<Transcript, TranscribeError>> {
        let text = self.text.clone();
        async move {
            match text {
                Some(text) => Ok(Transcript { text }),
                None => Err(TranscribeError::NoSpeech),
            }
        }
        .boxed()
    }
}
