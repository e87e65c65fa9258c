use crate::risk::ThreatVerdict;
use crate::threat::{ThreatClassifier, ThreatError};
use crate::util::{is_http_retryable, retry_with_backoff, RetryConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

const SYSTEM_PROMPT: &str = "You are an emergency call responder. Reply with exactly one \
word: 'Yes' if the text contains violent, threatening or dangerous language, or someone \
in distress asking to be saved or rescued, and 'No' if it describes a safe or normal \
situation. Do not explain.";

/// Threat judgement via a chat-completion endpoint: the model is prompted to
/// answer with a single yes/no token, which is then normalized into a
/// `ThreatVerdict`.
#[derive(Clone)]
pub struct ChatThreatClassifier {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryConfig,
}

impl ChatThreatClassifier {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    async fn request_once(&self, text: &str) -> Result<ThreatVerdict, ThreatError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_owned(),
                },
                ChatMessage {
                    role: "user",
                    content: format!("Analyze this text: {text}"),
                },
            ],
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ThreatError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ThreatError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ThreatError::InvalidResponse("no choices in response".to_owned()))?;

        let verdict = ThreatVerdict::parse(&content);
        if verdict == ThreatVerdict::Unknown {
            tracing::warn!(reply = %content.trim(), "threat judge returned a non yes/no token");
        }
        Ok(verdict)
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl ThreatClassifier for ChatThreatClassifier {
    fn assess(&self, text: String) -> BoxFuture<'_, Result<ThreatVerdict, ThreatError>> {
        async move {
            retry_with_backoff(
                &self.retry,
                || self.request_once(&text),
                |e| match e {
                    ThreatError::Network(_) => true,
                    ThreatError::Api { status, .. } => is_http_retryable(*status),
                    ThreatError::InvalidResponse(_) => false,
                },
            )
            .await
        }
        .boxed()
    }
}
