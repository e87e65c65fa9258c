use crate::transcribe::{Transcript, TranscribeError, TranscriptionService};
use crate::util::{is_http_retryable, retry_with_backoff, RetryConfig};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

const DEFAULT_ENDPOINT: &str =
    "https://openai-whisper-speech-to-text-api.p.rapidapi.com/transcribe";

/// Client for a hosted Whisper transcription API.
#[derive(Clone)]
pub struct WhisperApiTranscriber {
    client: Client,
    api_key: String,
    endpoint: String,
    retry: RetryConfig,
}

impl WhisperApiTranscriber {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }

    fn form_for(audio: &Bytes) -> Result<Form, reqwest::Error> {
        let file = Part::stream(audio.clone())
            .file_name("audio.wav")
            .mime_str("audio/wav")?;
        Ok(Form::new()
            .part("file", file)
            .text("type", "RAPID")
            .text("response_format", "JSON")
            .text("language", "en"))
    }

    async fn request_once(&self, audio: &Bytes) -> Result<Transcript, TranscribeError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-rapidapi-key", &self.api_key)
            .multipart(Self::form_for(audio)?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscribeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| TranscribeError::InvalidResponse(e.to_string()))?;

        let text = parsed
            .response
            .and_then(|inner| inner.text)
            .or(parsed.text)
            .ok_or_else(|| {
                TranscribeError::InvalidResponse("no text field in response".to_owned())
            })?;

        if text.trim().is_empty() {
            return Err(TranscribeError::NoSpeech);
        }
        Ok(Transcript { text })
    }
}

/// Both the nested and the flat response shape appear in the wild.
#[derive(Deserialize)]
struct ApiResponse {
    response: Option<InnerResponse>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct InnerResponse {
    text: Option<String>,
}

impl TranscriptionService for WhisperApiTranscriber {
    fn transcribe(&self, audio: Bytes) -> BoxFuture<'_, Result<Transcript, TranscribeError>> {
        async move {
            retry_with_backoff(
                &self.retry,
                || self.request_once(&audio),
                |e| match e {
                    TranscribeError::Network(_) => true,
                    TranscribeError::Api { status, .. } => is_http_retryable(*status),
                    _ => false,
                },
            )
            .await
        }
        .boxed()
    }
}
