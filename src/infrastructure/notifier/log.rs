use crate::domain::errors::WatchResult;
use crate::infrastructure::notifier::{Notification, NotificationLevel, Notifier};
use async_trait::async_trait;
use tracing::{error, info, warn};

/// Writes notifications into the structured log stream. Always
/// available; useful on its own for headless runs and as a fallback
/// when no transport channel is configured.
pub struct LogNotifier {
    enabled: bool,
}

impl LogNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send(&self, notification: &Notification) -> WatchResult<()> {
        match notification.level {
            NotificationLevel::Info => info!(
                kind = %notification.kind,
                id = %notification.id,
                title = %notification.title,
                "{}",
                notification.message
            ),
            NotificationLevel::Warning => warn!(
                kind = %notification.kind,
                id = %notification.id,
                title = %notification.title,
                "{}",
                notification.message
            ),
            NotificationLevel::Error | NotificationLevel::Critical => error!(
                kind = %notification.kind,
                id = %notification.id,
                title = %notification.title,
                "{}",
                notification.message
            ),
        }
        Ok(())
    }

    async fn close(&self) -> WatchResult<()> {
        Ok(())
    }
}
