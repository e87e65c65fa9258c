mod log;
mod sms;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub use log::LogNotifier;
pub use sms::SmsNotifier;

/// Outcome of a dispatched alert; `id` is the provider's message handle
/// when one was issued.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub id: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("notification api error: HTTP {status}: {body}")]
    Api { status: u16, body: String },
}

/// Alert delivery collaborator, invoked only with the danger-level message.
/// Failures are logged by the pipeline and never abort an assessment.
pub trait Notifier: Send + Sync {
    fn send(&self, message: String) -> BoxFuture<'_, Result<DeliveryReceipt, NotifyError>>;
}

impl Notifier for Box<dyn Notifier> {
    fn send(&self, message: String) -> BoxFuture<'_, Result<DeliveryReceipt, NotifyError>> {
        (**self).send(message)
    }
}
