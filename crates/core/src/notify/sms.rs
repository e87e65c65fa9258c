use crate::config::SmsConfig;
use crate::notify::{DeliveryReceipt, Notifier, NotifyError};
use crate::util::{is_http_retryable, retry_with_backoff, RetryConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://api.twilio.com";

/// SMS delivery through a Twilio-style messaging API: form-encoded POST
/// against the account's message resource, basic auth with the account
/// credentials.
#[derive(Clone)]
pub struct SmsNotifier {
    client: Client,
    config: SmsConfig,
    base_url: String,
    retry: RetryConfig,
}

impl SmsNotifier {
    pub fn new(config: SmsConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    async fn request_once(&self, message: &str) -> Result<DeliveryReceipt, NotifyError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.config.account_sid
        );
        let params = [
            ("MessagingServiceSid", self.config.messaging_service_sid.as_str()),
            ("To", self.config.to_number.as_str()),
            ("Body", message),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.account_sid,
                Some(self.config.auth_token.expose()),
            )
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessageResponse = response.json().await.unwrap_or_default();
        Ok(DeliveryReceipt { id: parsed.sid })
    }
}

#[derive(Default, Deserialize)]
struct MessageResponse {
    sid: Option<String>,
}

impl Notifier for SmsNotifier {
    fn send(&self, message: String) -> BoxFuture<'_, Result<DeliveryReceipt, NotifyError>> {
        async move {
            retry_with_backoff(
                &self.retry,
                || self.request_once(&message),
                |e| match e {
                    NotifyError::Network(_) => true,
                    NotifyError::Api { status, .. } => is_http_retryable(*status),
                },
            )
            .await
        }
        .boxed()
    }
}
