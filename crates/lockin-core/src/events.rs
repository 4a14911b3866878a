use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::notify::Decision;
use crate::timer::{Remaining, SessionKind};

/// Every state change made by the Background Authority produces an Event.
/// Events are logged and broadcast to in-process observers; the shared store
/// remains the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        kind: SessionKind,
        task_id: Option<String>,
        end_time_epoch_ms: u64,
        at: DateTime<Utc>,
    },
    SessionPaused {
        remaining: Remaining,
        at: DateTime<Utc>,
    },
    SessionResumed {
        end_time_epoch_ms: u64,
        at: DateTime<Utc>,
    },
    SessionEnded {
        kind: SessionKind,
        at: DateTime<Utc>,
    },
    SessionCompleted {
        kind: SessionKind,
        task_id: Option<String>,
        at: DateTime<Utc>,
    },
    /// A START carried a revision that no longer matches the stored one.
    StartRejected {
        expected_revision: u64,
        actual_revision: u64,
        at: DateTime<Utc>,
    },
    NotificationClassified {
        source: String,
        message: String,
        decision: Decision,
        at: DateTime<Utc>,
    },
    NotificationsCleared {
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::SessionStarted { .. } => "session_started",
            Event::SessionPaused { .. } => "session_paused",
            Event::SessionResumed { .. } => "session_resumed",
            Event::SessionEnded { .. } => "session_ended",
            Event::SessionCompleted { .. } => "session_completed",
            Event::StartRejected { .. } => "start_rejected",
            Event::NotificationClassified { .. } => "notification_classified",
            Event::NotificationsCleared { .. } => "notifications_cleared",
        }
    }
}

pub(crate) fn at(now_ms: u64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(now_ms as i64).unwrap_or_else(Utc::now)
}
