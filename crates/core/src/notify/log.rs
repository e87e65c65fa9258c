use crate::notify::{DeliveryReceipt, Notifier, NotifyError};
use futures::future::BoxFuture;
use futures::FutureExt;

/// Stand-in notifier for keyless operation and tests: records the alert in
/// the log instead of dispatching it.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for LogNotifier {
    fn send(&self, message: String) -> BoxFuture<'_, Result<DeliveryReceipt, NotifyError>> {
        async move {
            tracing::info!(%message, "alert (log only)");
            Ok(DeliveryReceipt { id: None })
        }
        .boxed()
    }
}
