//! Non-fatal user-facing notifications
//!
//! EPG failure must not disturb the pipeline state, so it surfaces through
//! this side channel instead. Delivery is fire-and-forget: sends without a
//! subscriber are dropped, and everything is mirrored to the log.

use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
}

/// Collaborator seam for surfacing non-fatal, user-visible conditions.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}

/// Notifier publishing on a broadcast channel so any number of observers
/// (UI surfaces, tests) can subscribe.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info => info!("{}", message),
            Severity::Warning => warn!("{}", message),
            Severity::Error => error!("{}", message),
        }

        let _ = self.tx.send(Notification {
            message: message.to_string(),
            severity,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_notifications() {
        let notifier = BroadcastNotifier::new();
        let mut rx = notifier.subscribe();

        notifier.notify("guide unavailable", Severity::Warning);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.message, "guide unavailable");
        assert_eq!(received.severity, Severity::Warning);
    }

    #[test]
    fn notify_without_subscribers_does_not_panic() {
        BroadcastNotifier::new().notify("nobody listening", Severity::Info);
    }
}
