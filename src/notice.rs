//! User-facing notices and error monitoring
//!
//! Actions and watchers report outcomes here instead of rendering anything
//! themselves. A UI layer subscribes and shows each notice as a dismissible
//! message; without subscribers notices are only logged.

use crate::error::{ErrorKind, KiadisaError};
use serde::Serialize;
use tokio::sync::broadcast;

const NOTICE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub description: String,
}

impl Notice {
    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Where an error was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    GameAction,
    Realtime,
    Auth,
    Network,
}

/// A monitored error with free-form context
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    pub source: ErrorSource,
    pub message: String,
    pub context: serde_json::Value,
    pub timestamp: String,
}

impl ErrorEvent {
    pub fn new(source: ErrorSource, message: impl Into<String>) -> Self {
        Self {
            source,
            message: message.into(),
            context: serde_json::Value::Null,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    /// Classify an action failure by its error kind
    pub fn from_action_error(err: &KiadisaError) -> Self {
        let source = match err.kind() {
            ErrorKind::Network => ErrorSource::Network,
            ErrorKind::Authentication => ErrorSource::Auth,
            _ => ErrorSource::GameAction,
        };
        Self::new(source, err.to_string())
    }
}

/// Broadcast hub for notices
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notice>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    pub fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => tracing::info!("{}: {}", notice.title, notice.description),
            NoticeLevel::Error => tracing::warn!("{}: {}", notice.title, notice.description),
        }
        // Ignore send errors (nobody listening is fine)
        let _ = self.tx.send(notice);
    }

    /// Log a monitored error and show the matching notice
    pub fn report_error(&self, event: ErrorEvent) {
        tracing::error!(
            source = ?event.source,
            context = %event.context,
            timestamp = %event.timestamp,
            "{}",
            event.message
        );

        match event.source {
            ErrorSource::Network => self.notify(Notice::error(
                "Connection problem",
                "Check your internet connection",
            )),
            ErrorSource::GameAction => {
                self.notify(Notice::error("Action impossible", event.message))
            }
            ErrorSource::Auth => self.notify(Notice::error("Sign-in required", event.message)),
            ErrorSource::Realtime => {}
        }
    }

    /// Record a product event
    pub fn log_event(&self, event_type: &str, data: serde_json::Value) {
        tracing::info!(event = event_type, data = %data, "game event");
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
