pub mod log;

use crate::domain::errors::WatchResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

pub use log::LogNotifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    StrategySignal,
    PriceAlert,
    SystemAlert,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::StrategySignal => write!(f, "strategy-signal"),
            NotificationKind::PriceAlert => write!(f, "price-alert"),
            NotificationKind::SystemAlert => write!(f, "system-alert"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationLevel::Info => write!(f, "INFO"),
            NotificationLevel::Warning => write!(f, "WARNING"),
            NotificationLevel::Error => write!(f, "ERROR"),
            NotificationLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// One outbound message. The `data` map carries the structured
/// payload (all signals of a report, counts, dispatch reason) so
/// transports can render richer views than the plain-text `message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub level: NotificationLevel,
    pub asset: Option<String>,
    pub strategy: Option<String>,
    pub title: String,
    pub message: String,
    pub data: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotificationKind, level: NotificationLevel, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            level,
            asset: None,
            strategy: None,
            title: title.into(),
            message: String::new(),
            data: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.asset = Some(asset.into());
        self
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }
}

/// One delivery channel. Concrete transports (SMTP, webhooks) live
/// outside the core; the crate ships a tracing-backed notifier.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool;

    async fn send(&self, notification: &Notification) -> WatchResult<()>;

    /// Releases transport resources; further sends are undefined.
    async fn close(&self) -> WatchResult<()>;
}

/// Fans one notification out to every enabled channel.
pub struct NotifierManager {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotifierManager {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    pub fn channel_count(&self) -> usize {
        self.notifiers.iter().filter(|n| n.is_enabled()).count()
    }

    /// Sends to all enabled notifiers. Per-channel failures are
    /// logged and swallowed; a single warning marks a cycle in which
    /// every channel failed, so nothing is ever dropped silently.
    pub async fn send(&self, notification: &Notification) -> WatchResult<()> {
        let mut attempted = 0usize;
        let mut delivered = 0usize;

        for notifier in &self.notifiers {
            if !notifier.is_enabled() {
                continue;
            }
            attempted += 1;
            match notifier.send(notification).await {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(channel = notifier.name(), error = %err, "notifier send failed");
                }
            }
        }

        if attempted > 0 && delivered == 0 {
            warn!(
                notification = %notification.title,
                channels = attempted,
                "all notification channels failed this cycle"
            );
        }
        Ok(())
    }

    pub async fn close(&self) {
        for notifier in &self.notifiers {
            if let Err(err) = notifier.close().await {
                warn!(channel = notifier.name(), error = %err, "notifier close failed");
            }
        }
    }
}
