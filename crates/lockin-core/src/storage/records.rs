//! Persisted record shapes.
//!
//! Field names are the camelCase keys other UI surfaces already read and
//! write, so every record here is `rename_all = "camelCase"` and tolerates
//! missing fields through `#[serde(default)]`.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::timer::{DurationTable, SessionKind};

/// Most recent completed sessions kept under `focusSessions`.
pub const HISTORY_CAP: usize = 500;

/// Color of the status indicator while a session runs.
pub const RUNNING_COLOR: &str = "#F87060";

/// Task ids arrive as strings from some surfaces and as numbers from others.
pub(crate) fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// ── Settings ─────────────────────────────────────────────────────────

/// User settings stored under `settings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub pomodoro_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub notification_sound: String,
    pub notification_volume: u32,
    pub enable_sounds: bool,
    pub auto_start_breaks: bool,
    pub auto_start_pomodoros: bool,
    pub long_break_interval: u32,
    pub weekly_goal: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pomodoro_minutes: DurationTable::DEFAULT_WORK_MINUTES,
            short_break_minutes: DurationTable::DEFAULT_SHORT_BREAK_MINUTES,
            long_break_minutes: DurationTable::DEFAULT_LONG_BREAK_MINUTES,
            notification_sound: "bell".into(),
            notification_volume: 70,
            enable_sounds: true,
            auto_start_breaks: false,
            auto_start_pomodoros: false,
            long_break_interval: 4,
            weekly_goal: 35,
        }
    }
}

impl Settings {
    pub fn duration_table(&self) -> DurationTable {
        DurationTable::new(
            self.pomodoro_minutes,
            self.short_break_minutes,
            self.long_break_minutes,
        )
    }

    /// Sound to attach to self-generated notifications, if sounds are on.
    pub fn sound(&self) -> Option<String> {
        self.enable_sounds.then(|| self.notification_sound.clone())
    }
}

/// Filtering preferences stored under `notificationSettings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    #[serde(alias = "allowFrom")]
    pub allowed_sources: Vec<String>,
    #[serde(alias = "enableDuringBreaks")]
    pub allow_during_breaks: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            allowed_sources: vec!["Gmail".into()],
            allow_during_breaks: true,
        }
    }
}

impl NotificationSettings {
    pub fn allows(&self, source: &str) -> bool {
        self.allowed_sources.iter().any(|s| s == source)
    }
}

// ── Notifications ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: String,
    pub source: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(alias = "time")]
    pub timestamp_epoch_ms: u64,
}

impl NotificationRecord {
    pub fn new(source: impl Into<String>, message: impl Into<String>, now_ms: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.into(),
            message: message.into(),
            details: None,
            link: None,
            timestamp_epoch_ms: now_ms,
        }
    }

    pub fn with_details(mut self, details: Option<String>) -> Self {
        self.details = details;
        self
    }

    pub fn with_link(mut self, link: Option<String>) -> Self {
        self.link = link;
        self
    }
}

/// Per-source counters of stored allowed notifications, keyed by the
/// lower-cased source id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationStats(pub BTreeMap<String, u64>);

impl Default for NotificationStats {
    fn default() -> Self {
        Self(BTreeMap::from([("gmail".into(), 0), ("calendar".into(), 0)]))
    }
}

impl NotificationStats {
    pub fn increment(&mut self, source: &str) {
        *self.0.entry(source.to_lowercase()).or_insert(0) += 1;
    }

    pub fn count(&self, source: &str) -> u64 {
        self.0.get(&source.to_lowercase()).copied().unwrap_or(0)
    }
}

// ── Tasks ────────────────────────────────────────────────────────────

/// One task card. Only `id` and `title` are interpreted; everything else is
/// carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: serde_json::Value,
    #[serde(default)]
    pub title: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Task {
    /// Task ids are written as numbers by some surfaces and strings by others.
    pub fn id_matches(&self, id: &str) -> bool {
        match &self.id {
            serde_json::Value::String(s) => s == id,
            serde_json::Value::Number(n) => n.to_string() == id,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskBoard {
    pub in_progress: Vec<Task>,
    pub to_do: Vec<Task>,
    pub completed: Vec<Task>,
    pub backlog: Vec<Task>,
}

impl TaskBoard {
    pub fn find(&self, id: &str) -> Option<&Task> {
        [&self.in_progress, &self.to_do, &self.completed, &self.backlog]
            .into_iter()
            .flatten()
            .find(|t| t.id_matches(id))
    }
}

// ── History ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusSessionRecord {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_id")]
    pub task_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: SessionKind,
    pub start_time: u64,
    pub end_time: u64,
    #[serde(alias = "duration")]
    pub duration_minutes: u64,
    #[serde(default)]
    pub completed: bool,
}

impl FocusSessionRecord {
    pub fn completed(
        task_id: Option<String>,
        kind: SessionKind,
        start_time: u64,
        end_time: u64,
        duration_minutes: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id,
            kind,
            start_time,
            end_time,
            duration_minutes,
            completed: true,
        }
    }
}

/// Append `record`, keeping only the [`HISTORY_CAP`] most recent entries.
pub fn append_capped(history: &mut Vec<FocusSessionRecord>, record: FocusSessionRecord) {
    history.push(record);
    if history.len() > HISTORY_CAP {
        let excess = history.len() - HISTORY_CAP;
        history.drain(..excess);
    }
}

// ── Status indicator ─────────────────────────────────────────────────

/// Short badge every UI renders: `ON` while running, `PAUSE` while paused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusIndicator {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl StatusIndicator {
    pub fn running() -> Self {
        Self {
            text: "ON".into(),
            color: Some(RUNNING_COLOR.into()),
        }
    }

    pub fn paused() -> Self {
        Self {
            text: "PAUSE".into(),
            color: None,
        }
    }

    pub fn cleared() -> Self {
        Self::default()
    }

    pub fn is_cleared(&self) -> bool {
        self.text.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults() {
        let s = Settings::default();
        assert_eq!(s.pomodoro_minutes, 25);
        assert_eq!(s.notification_sound, "bell");
        assert_eq!(s.notification_volume, 70);
        assert!(!s.auto_start_breaks);
        assert_eq!(s.sound().as_deref(), Some("bell"));
    }

    #[test]
    fn settings_zero_duration_uses_default() {
        let s: Settings = serde_json::from_str(r#"{"pomodoroMinutes":0,"shortBreakMinutes":3}"#).unwrap();
        let table = s.duration_table();
        assert_eq!(table.work_minutes, 25);
        assert_eq!(table.short_break_minutes, 3);
    }

    #[test]
    fn notification_settings_accept_legacy_names() {
        let s: NotificationSettings =
            serde_json::from_str(r#"{"allowFrom":["Calendar"],"enableDuringBreaks":false}"#).unwrap();
        assert_eq!(s.allowed_sources, vec!["Calendar".to_string()]);
        assert!(!s.allow_during_breaks);
        assert!(s.allows("Calendar"));
        assert!(!s.allows("Gmail"));
    }

    #[test]
    fn stats_are_keyed_lowercase() {
        let mut stats = NotificationStats::default();
        stats.increment("Gmail");
        stats.increment("Slack");
        assert_eq!(stats.count("gmail"), 1);
        assert_eq!(stats.count("Slack"), 1);
        assert_eq!(stats.count("Calendar"), 0);
    }

    #[test]
    fn task_board_finds_numeric_ids() {
        let board: TaskBoard = serde_json::from_str(
            r#"{"toDo":[{"id":1712345678901,"title":"Write","priority":"high"}],"inProgress":[{"id":"abc","title":"Read"}]}"#,
        )
        .unwrap();
        assert!(board.find("1712345678901").is_some());
        assert_eq!(board.find("abc").map(|t| t.title.as_str()), Some("Read"));
        assert!(board.find("missing").is_none());
        let json = serde_json::to_value(&board).unwrap();
        assert_eq!(json["toDo"][0]["priority"], "high");
    }

    #[test]
    fn history_is_capped() {
        let mut history = Vec::new();
        for i in 0..(HISTORY_CAP as u64 + 3) {
            append_capped(
                &mut history,
                FocusSessionRecord::completed(None, SessionKind::Work, i, i + 1, 25),
            );
        }
        assert_eq!(history.len(), HISTORY_CAP);
        assert_eq!(history[0].start_time, 3);
    }

    #[test]
    fn indicator_badges() {
        assert_eq!(StatusIndicator::running().text, "ON");
        assert_eq!(StatusIndicator::running().color.as_deref(), Some("#F87060"));
        assert_eq!(StatusIndicator::paused().text, "PAUSE");
        assert!(StatusIndicator::cleared().is_cleared());
    }
}
