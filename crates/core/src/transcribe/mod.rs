mod dummy;
mod whisper_api;

use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub use dummy::DummyTranscriber;
pub use whisper_api::WhisperApiTranscriber;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
}

#[derive(thiserror::Error, Debug)]
pub enum TranscribeError {
    #[error("no speech recognized in clip")]
    NoSpeech,

    #[error("transcription request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("transcription api error: HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected transcription response: {0}")]
    InvalidResponse(String),
}

/// Remote speech-to-text collaborator. Takes the encoded clip bytes as
/// recorded; decoding for the feature pipeline happens independently.
pub trait TranscriptionService: Send + Sync {
    fn transcribe(&self, audio: Bytes) -> BoxFuture<'_, Result<Transcript, TranscribeError>>;
}

impl TranscriptionService for Box<dyn TranscriptionService> {
    fn transcribe(&self, audio: Bytes) -> BoxFuture<'_, Result<Transcript, TranscribeError>> {
        (**self).transcribe(audio)
    }
}
