//! Interception middleware in front of the platform notification primitive.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::classifier::{Classifier, Decision};
use crate::error::CoreError;
use crate::timer::SessionKind;

pub const STARTED_NOTIFICATION_ID: &str = "focus-mode-notification";
pub const COMPLETED_NOTIFICATION_ID: &str = "timer-completed-notification";
pub const STARTED_TITLE: &str = "Focus Mode Activated";

/// Source assumed for notifications that do not name one.
pub const SYSTEM_SOURCE: &str = "System";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interception {
    Allow,
    Block,
    /// Self-generated status notification, never classified.
    Exempt,
}

impl Interception {
    pub fn delivers(self) -> bool {
        !matches!(self, Interception::Block)
    }
}

/// A notification about to be shown on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
}

impl NotificationRequest {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            message: message.into(),
            source: None,
            sound: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_sound(mut self, sound: Option<String>) -> Self {
        self.sound = sound;
        self
    }

    pub fn session_started(minutes: u64) -> Self {
        Self::new(
            STARTED_TITLE,
            format!("Notifications will be filtered for the next {minutes} minutes."),
        )
        .with_id(STARTED_NOTIFICATION_ID)
    }

    pub fn session_completed(kind: SessionKind) -> Self {
        Self::new(format!("{kind} Completed!"), kind.completion_message())
            .with_id(COMPLETED_NOTIFICATION_ID)
    }

    /// True for the system's own status notifications.
    pub fn is_self_exempt(&self) -> bool {
        matches!(
            self.id.as_deref(),
            Some(STARTED_NOTIFICATION_ID | COMPLETED_NOTIFICATION_ID)
        ) || self.title == STARTED_TITLE
            || self.title.contains("Completed")
    }

    pub fn source_or_system(&self) -> &str {
        self.source.as_deref().unwrap_or(SYSTEM_SOURCE)
    }
}

/// The platform primitive that actually shows a notification.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, request: &NotificationRequest) -> Result<(), CoreError>;
}

/// Sink that writes delivered notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, request: &NotificationRequest) -> Result<(), CoreError> {
        info!(
            id = request.id.as_deref().unwrap_or(""),
            title = %request.title,
            message = %request.message,
            sound = request.sound.as_deref().unwrap_or(""),
            "notification"
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct Interceptor {
    classifier: Classifier,
}

impl Interceptor {
    pub fn new(classifier: Classifier) -> Self {
        Self { classifier }
    }

    pub async fn intercept(&self, request: &NotificationRequest) -> Interception {
        if request.is_self_exempt() {
            return Interception::Exempt;
        }
        match self.classifier.decide(request.source_or_system()).await {
            Decision::Allow => Interception::Allow,
            Decision::Block => Interception::Block,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_notifications_are_exempt() {
        assert!(NotificationRequest::session_started(25).is_self_exempt());
        assert!(NotificationRequest::session_completed(SessionKind::LongBreak).is_self_exempt());
        assert!(NotificationRequest::new("Focus Mode Activated", "").is_self_exempt());
        assert!(NotificationRequest::new("Build Completed", "").is_self_exempt());
        assert!(!NotificationRequest::new("New message", "hi").is_self_exempt());
    }

    #[test]
    fn self_notification_texts() {
        let started = NotificationRequest::session_started(25);
        assert_eq!(started.message, "Notifications will be filtered for the next 25 minutes.");
        let done = NotificationRequest::session_completed(SessionKind::Work);
        assert_eq!(done.title, "Work Completed!");
        assert_eq!(done.message, "Time for a break!");
        let done = NotificationRequest::session_completed(SessionKind::ShortBreak);
        assert_eq!(done.message, "Ready to focus again?");
    }

    #[test]
    fn unnamed_source_is_system() {
        assert_eq!(NotificationRequest::new("x", "y").source_or_system(), "System");
        assert_eq!(
            NotificationRequest::new("x", "y").with_source("Slack").source_or_system(),
            "Slack"
        );
    }
}
