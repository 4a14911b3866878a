//! The persisted timer record and the values derived from it.
//!
//! Exactly one [`TimerState`] lives in the shared store under `timerState`.
//! While a session runs only the absolute `end_time_epoch_ms` is meaningful;
//! while it is paused or idle only the `remaining` snapshot is.

use serde::{Deserialize, Serialize};

use super::kind::{DurationTable, SessionKind};

/// Observable phase of the timer, derived from the stored fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    /// No session running and none paused.
    Idle,
    Running,
    Paused,
}

/// A `{minutes, seconds}` remaining-time snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Remaining {
    pub minutes: u64,
    pub seconds: u64,
}

impl Remaining {
    /// Floor a millisecond count to whole seconds.
    pub fn from_millis(ms: u64) -> Self {
        Self::from_secs(ms / 1000)
    }

    pub fn from_secs(total: u64) -> Self {
        Self {
            minutes: total / 60,
            seconds: total % 60,
        }
    }

    pub fn total_secs(&self) -> u64 {
        self.minutes.saturating_mul(60).saturating_add(self.seconds)
    }

    pub fn as_millis(&self) -> u64 {
        self.total_secs().saturating_mul(1000)
    }

    pub fn is_zero(&self) -> bool {
        self.total_secs() == 0
    }
}

impl std::fmt::Display for Remaining {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.minutes, self.seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    #[serde(rename = "type")]
    pub kind: SessionKind,
    pub duration_plan_seconds: u64,
    pub is_active: bool,
    #[serde(default)]
    pub end_time_epoch_ms: Option<u64>,
    #[serde(rename = "remainingSecondsSnapshot", default)]
    pub remaining: Remaining,
    #[serde(default)]
    pub paused_at_epoch_ms: Option<u64>,
    #[serde(
        rename = "associatedTaskId",
        alias = "taskId",
        default,
        deserialize_with = "crate::storage::records::lenient_id"
    )]
    pub task_id: Option<String>,
    #[serde(default)]
    pub started_at_epoch_ms: Option<u64>,
    /// Incremented on every transition applied by the Background Authority.
    #[serde(default)]
    pub revision: u64,
}

impl TimerState {
    /// Idle, full-plan state for `kind`.
    pub fn idle(kind: SessionKind, table: &DurationTable) -> Self {
        let plan = table.seconds(kind);
        Self {
            kind,
            duration_plan_seconds: plan,
            is_active: false,
            end_time_epoch_ms: None,
            remaining: Remaining::from_secs(plan),
            paused_at_epoch_ms: None,
            task_id: None,
            started_at_epoch_ms: None,
            revision: 0,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        if self.is_active {
            TimerPhase::Running
        } else if self.paused_at_epoch_ms.is_some() {
            TimerPhase::Paused
        } else {
            TimerPhase::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase() == TimerPhase::Running
    }

    /// Milliseconds left at `now`, always derived from the absolute deadline
    /// while running. Clock skew past the deadline clamps to zero.
    pub fn remaining_ms_at(&self, now_ms: u64) -> u64 {
        match (self.is_active, self.end_time_epoch_ms) {
            (true, Some(end)) => end.saturating_sub(now_ms),
            _ => self.remaining.as_millis(),
        }
    }

    pub fn remaining_at(&self, now_ms: u64) -> Remaining {
        Remaining::from_millis(self.remaining_ms_at(now_ms))
    }

    /// True once a running session has reached its deadline.
    pub fn is_due(&self, now_ms: u64) -> bool {
        self.is_running() && self.remaining_ms_at(now_ms) == 0
    }

    /// Due while running, or frozen with nothing left while paused.
    pub fn is_spent(&self, now_ms: u64) -> bool {
        match self.phase() {
            TimerPhase::Running => self.is_due(now_ms),
            TimerPhase::Paused => self.remaining.is_zero(),
            TimerPhase::Idle => false,
        }
    }

    /// Repair a record that violates the active/inactive invariant.
    ///
    /// Returns `None` when the record is unusable and must be replaced with
    /// the idle default.
    pub fn normalized(mut self) -> Option<Self> {
        if self.is_active {
            self.end_time_epoch_ms?;
            self.paused_at_epoch_ms = None;
        } else {
            self.end_time_epoch_ms = None;
        }
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_floors_to_seconds() {
        let r = Remaining::from_millis(899_999);
        assert_eq!(r, Remaining { minutes: 14, seconds: 59 });
        assert_eq!(r.to_string(), "14:59");
    }

    #[test]
    fn idle_state_has_full_plan() {
        let state = TimerState::idle(SessionKind::Work, &DurationTable::default());
        assert_eq!(state.phase(), TimerPhase::Idle);
        assert_eq!(state.remaining, Remaining { minutes: 25, seconds: 0 });
        assert_eq!(state.duration_plan_seconds, 1500);
    }

    #[test]
    fn running_remaining_comes_from_deadline() {
        let mut state = TimerState::idle(SessionKind::Work, &DurationTable::default());
        state.is_active = true;
        state.end_time_epoch_ms = Some(1_500_000);
        assert_eq!(state.remaining_at(5_000).to_string(), "24:55");
        assert_eq!(state.remaining_ms_at(2_000_000), 0);
        assert!(state.is_due(1_500_000));
    }

    #[test]
    fn active_without_deadline_is_unusable() {
        let mut state = TimerState::idle(SessionKind::Work, &DurationTable::default());
        state.is_active = true;
        assert!(state.normalized().is_none());
    }

    #[test]
    fn inactive_state_drops_stale_deadline() {
        let mut state = TimerState::idle(SessionKind::Work, &DurationTable::default());
        state.end_time_epoch_ms = Some(10);
        let state = state.normalized().unwrap();
        assert!(state.end_time_epoch_ms.is_none());
    }

    #[test]
    fn wire_names_are_camel_case() {
        let state = TimerState::idle(SessionKind::ShortBreak, &DurationTable::default());
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["type"], "SHORT_BREAK");
        assert_eq!(json["isActive"], false);
        assert_eq!(json["remainingSecondsSnapshot"]["minutes"], 5);
        assert!(json.get("associatedTaskId").is_some());
    }
}
