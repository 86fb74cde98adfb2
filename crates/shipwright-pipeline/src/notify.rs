//! Notification dispatch at phase transitions.
//!
//! Delivery mechanics belong to the dispatcher implementation; the pipeline
//! only hands over fully-formed status text. Delivery failures are logged
//! and never fail the surrounding operation.

use async_trait::async_trait;
use tracing::{info, warn};

use shipwright_core::error::Result;

/// Receives plain-text status messages at phase transitions.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<()>;
}

/// Default dispatcher: writes the status text to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        info!(message, "notification");
        Ok(())
    }
}

/// Send a phase-transition notification, swallowing delivery failures.
pub async fn send(notifier: &dyn Notifier, message: &str) {
    if let Err(e) = notifier.notify(message).await {
        warn!(error = %e, "notification delivery failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{CollectingNotifier, FailingNotifier};

    #[tokio::test]
    async fn test_send_delivers_message() {
        let notifier = CollectingNotifier::new();
        send(&notifier, "preparation ready").await;
        assert_eq!(notifier.messages(), vec!["preparation ready"]);
    }

    #[tokio::test]
    async fn test_send_swallows_delivery_failure() {
        // Must not panic or propagate.
        send(&FailingNotifier, "build failed").await;
    }
}
