//! Timer state machine.
//!
//! Pure transitions over [`TimerState`]: every command takes the current
//! record and the wall-clock time and returns the next record plus the side
//! effects the Background Authority must perform. Nothing here touches the
//! store, the scheduler or the platform.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> Paused -> Running -> (Completed ->) Idle
//!           \______________ END ______________/
//! ```
//!
//! Remaining time is derived from the absolute deadline, never decremented.

use serde::{Deserialize, Serialize};

use super::kind::{DurationTable, SessionKind};
use super::state::{Remaining, TimerPhase, TimerState};
use crate::events::{self, Event};
use crate::storage::records::{FocusSessionRecord, StatusIndicator};

/// Self-generated notification the authority must emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelfNotice {
    Started { minutes: u64 },
    Completed { kind: SessionKind },
}

/// Side effect requested by a transition, applied in order after the new
/// state is written.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ArmWake { at_epoch_ms: u64 },
    ClearWake,
    Indicator(StatusIndicator),
    SetActiveTimer(Option<String>),
    Notify(SelfNotice),
    RecordSession(FocusSessionRecord),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: TimerState,
    pub effects: Vec<Effect>,
    pub event: Event,
}

#[derive(Debug, Clone, Default)]
pub struct TimerMachine {
    table: DurationTable,
}

impl TimerMachine {
    pub fn new(table: DurationTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &DurationTable {
        &self.table
    }

    /// Idle record used when nothing (or nothing valid) is stored.
    pub fn default_state(&self) -> TimerState {
        TimerState::idle(SessionKind::Work, &self.table)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a fresh session, unconditionally replacing `current`.
    pub fn start(
        &self,
        current: &TimerState,
        kind: SessionKind,
        task_id: Option<String>,
        now_ms: u64,
    ) -> Transition {
        let plan = self.table.seconds(kind);
        let end = now_ms.saturating_add(plan.saturating_mul(1000));
        let state = TimerState {
            kind,
            duration_plan_seconds: plan,
            is_active: true,
            end_time_epoch_ms: Some(end),
            remaining: Remaining::from_secs(plan),
            paused_at_epoch_ms: None,
            task_id: task_id.clone(),
            started_at_epoch_ms: Some(now_ms),
            revision: current.revision.wrapping_add(1),
        };
        Transition {
            state,
            effects: vec![
                Effect::ArmWake { at_epoch_ms: end },
                Effect::SetActiveTimer(task_id.clone()),
                Effect::Notify(SelfNotice::Started { minutes: plan / 60 }),
                Effect::Indicator(StatusIndicator::running()),
            ],
            event: Event::SessionStarted {
                kind,
                task_id,
                end_time_epoch_ms: end,
                at: events::at(now_ms),
            },
        }
    }

    /// Freeze the remaining time. Only a running session with at least one
    /// whole second left can be paused; anything less is left to
    /// [`complete`](Self::complete).
    pub fn pause(&self, current: &TimerState, now_ms: u64) -> Option<Transition> {
        if current.phase() != TimerPhase::Running {
            return None;
        }
        let remaining = current.remaining_at(now_ms);
        if remaining.is_zero() {
            return None;
        }
        let state = TimerState {
            is_active: false,
            end_time_epoch_ms: None,
            remaining,
            paused_at_epoch_ms: Some(now_ms),
            revision: current.revision.wrapping_add(1),
            ..current.clone()
        };
        Some(Transition {
            state,
            effects: vec![Effect::ClearWake, Effect::Indicator(StatusIndicator::paused())],
            event: Event::SessionPaused {
                remaining,
                at: events::at(now_ms),
            },
        })
    }

    /// Re-anchor the deadline from the frozen snapshot. Only a paused
    /// session with time left can be resumed.
    pub fn resume(&self, current: &TimerState, now_ms: u64) -> Option<Transition> {
        if current.phase() != TimerPhase::Paused || current.remaining.is_zero() {
            return None;
        }
        let end = now_ms.saturating_add(current.remaining.as_millis());
        let state = TimerState {
            is_active: true,
            end_time_epoch_ms: Some(end),
            paused_at_epoch_ms: None,
            revision: current.revision.wrapping_add(1),
            ..current.clone()
        };
        Some(Transition {
            state,
            effects: vec![
                Effect::ArmWake { at_epoch_ms: end },
                Effect::Indicator(StatusIndicator::running()),
            ],
            event: Event::SessionResumed {
                end_time_epoch_ms: end,
                at: events::at(now_ms),
            },
        })
    }

    /// Reset to the full-plan idle state for the current kind.
    ///
    /// Returns `None` when the stored record already is that state.
    pub fn end(&self, current: &TimerState, now_ms: u64) -> Option<Transition> {
        let state = self.reset_for(current);
        if Self::same_ignoring_revision(current, &state) {
            return None;
        }
        Some(Transition {
            state,
            effects: vec![Effect::ClearWake, Effect::Indicator(StatusIndicator::cleared())],
            event: Event::SessionEnded {
                kind: current.kind,
                at: events::at(now_ms),
            },
        })
    }

    /// Fold a session with no time left into idle: a running one whose
    /// deadline has passed, or a paused one frozen at 00:00.
    ///
    /// Returns `None` for anything else, which is what makes completion
    /// exactly-once.
    pub fn complete(&self, current: &TimerState, now_ms: u64) -> Option<Transition> {
        if !current.is_spent(now_ms) {
            return None;
        }
        let mut effects = vec![
            Effect::ClearWake,
            Effect::Indicator(StatusIndicator::cleared()),
            Effect::Notify(SelfNotice::Completed { kind: current.kind }),
        ];
        if current.kind == SessionKind::Work {
            let started = current.started_at_epoch_ms.unwrap_or_else(|| {
                current
                    .end_time_epoch_ms
                    .unwrap_or(now_ms)
                    .saturating_sub(current.duration_plan_seconds.saturating_mul(1000))
            });
            effects.push(Effect::RecordSession(FocusSessionRecord::completed(
                current.task_id.clone(),
                current.kind,
                started,
                now_ms,
                current.duration_plan_seconds / 60,
            )));
        }
        Some(Transition {
            state: self.reset_for(current),
            effects,
            event: Event::SessionCompleted {
                kind: current.kind,
                task_id: current.task_id.clone(),
                at: events::at(now_ms),
            },
        })
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn reset_for(&self, current: &TimerState) -> TimerState {
        TimerState {
            task_id: current.task_id.clone(),
            revision: current.revision.wrapping_add(1),
            ..TimerState::idle(current.kind, &self.table)
        }
    }

    fn same_ignoring_revision(a: &TimerState, b: &TimerState) -> bool {
        let mut b = b.clone();
        b.revision = a.revision;
        b.started_at_epoch_ms = a.started_at_epoch_ms;
        *a == b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000_000;

    fn machine() -> TimerMachine {
        TimerMachine::new(DurationTable::default())
    }

    #[test]
    fn start_sets_absolute_deadline() {
        let m = machine();
        let t = m.start(&m.default_state(), SessionKind::Work, None, T0);
        assert_eq!(t.state.end_time_epoch_ms, Some(T0 + 1_500_000));
        assert!(t.state.is_active);
        assert_eq!(t.state.revision, 1);
        assert!(t.effects.contains(&Effect::ArmWake { at_epoch_ms: T0 + 1_500_000 }));
        assert!(t
            .effects
            .contains(&Effect::Notify(SelfNotice::Started { minutes: 25 })));
    }

    #[test]
    fn start_overwrites_running_session() {
        let m = machine();
        let first = m.start(&m.default_state(), SessionKind::Work, Some("a".into()), T0);
        let second = m.start(&first.state, SessionKind::LongBreak, None, T0 + 60_000);
        assert_eq!(second.state.kind, SessionKind::LongBreak);
        assert_eq!(second.state.task_id, None);
        assert_eq!(second.state.end_time_epoch_ms, Some(T0 + 60_000 + 900_000));
    }

    #[test]
    fn pause_after_ten_minutes_snapshots_fifteen() {
        let m = machine();
        let started = m.start(&m.default_state(), SessionKind::Work, None, T0);
        let paused = m.pause(&started.state, T0 + 600_000).unwrap();
        assert_eq!(paused.state.remaining, Remaining { minutes: 15, seconds: 0 });
        assert_eq!(paused.state.end_time_epoch_ms, None);
        assert_eq!(paused.state.paused_at_epoch_ms, Some(T0 + 600_000));
        assert_eq!(paused.state.phase(), TimerPhase::Paused);
    }

    #[test]
    fn second_pause_is_noop() {
        let m = machine();
        let started = m.start(&m.default_state(), SessionKind::Work, None, T0);
        let paused = m.pause(&started.state, T0 + 1_000).unwrap();
        assert!(m.pause(&paused.state, T0 + 2_000).is_none());
    }

    #[test]
    fn resume_reanchors_deadline() {
        let m = machine();
        let started = m.start(&m.default_state(), SessionKind::Work, None, T0);
        let paused = m.pause(&started.state, T0 + 600_000).unwrap();
        let t1 = T0 + 3_600_000;
        let resumed = m.resume(&paused.state, t1).unwrap();
        assert_eq!(resumed.state.end_time_epoch_ms, Some(t1 + 900_000));
        assert_eq!(resumed.state.paused_at_epoch_ms, None);
    }

    #[test]
    fn resume_requires_pause() {
        let m = machine();
        assert!(m.resume(&m.default_state(), T0).is_none());
        let started = m.start(&m.default_state(), SessionKind::Work, None, T0);
        assert!(m.resume(&started.state, T0).is_none());
    }

    #[test]
    fn pause_past_deadline_is_refused() {
        let m = machine();
        let started = m.start(&m.default_state(), SessionKind::ShortBreak, None, T0);
        assert!(m.pause(&started.state, T0 + 10_000_000).is_none());
        // Under a second left floors to 00:00, so it is not pausable either.
        assert!(m.pause(&started.state, T0 + 299_500).is_none());

        let done = m.complete(&started.state, T0 + 10_000_000).unwrap();
        assert_eq!(done.state.phase(), TimerPhase::Idle);
    }

    #[test]
    fn paused_at_zero_completes_instead_of_resuming() {
        let m = machine();
        let started = m.start(&m.default_state(), SessionKind::Work, None, T0);
        let mut frozen = m.pause(&started.state, T0 + 600_000).unwrap().state;
        frozen.remaining = Remaining { minutes: 0, seconds: 0 };

        assert!(m.resume(&frozen, T0 + 700_000).is_none());
        let done = m.complete(&frozen, T0 + 700_000).unwrap();
        assert_eq!(done.state.phase(), TimerPhase::Idle);
        assert!(done
            .effects
            .iter()
            .any(|e| matches!(e, Effect::RecordSession(_))));
        assert!(m.complete(&done.state, T0 + 700_000).is_none());
    }

    #[test]
    fn end_resets_to_full_plan_and_keeps_task() {
        let m = machine();
        let started = m.start(&m.default_state(), SessionKind::LongBreak, Some("t".into()), T0);
        let ended = m.end(&started.state, T0 + 5_000).unwrap();
        assert_eq!(ended.state.phase(), TimerPhase::Idle);
        assert_eq!(ended.state.remaining, Remaining { minutes: 15, seconds: 0 });
        assert_eq!(ended.state.task_id.as_deref(), Some("t"));
        assert!(ended.effects.contains(&Effect::ClearWake));
        assert!(m.end(&ended.state, T0 + 6_000).is_none());
    }

    #[test]
    fn complete_only_when_due() {
        let m = machine();
        let started = m.start(&m.default_state(), SessionKind::Work, None, T0);
        assert!(m.complete(&started.state, T0 + 1_499_999).is_none());
        let done = m.complete(&started.state, T0 + 1_500_000).unwrap();
        assert_eq!(done.state.phase(), TimerPhase::Idle);
        assert!(m.complete(&done.state, T0 + 1_600_000).is_none());
    }

    #[test]
    fn work_completion_records_history() {
        let m = machine();
        let started = m.start(&m.default_state(), SessionKind::Work, Some("x".into()), T0);
        let done = m.complete(&started.state, T0 + 1_500_000).unwrap();
        let recorded = done.effects.iter().find_map(|e| match e {
            Effect::RecordSession(r) => Some(r),
            _ => None,
        });
        let record = recorded.expect("history record");
        assert_eq!(record.duration_minutes, 25);
        assert_eq!(record.start_time, T0);
        assert_eq!(record.task_id.as_deref(), Some("x"));
    }

    #[test]
    fn break_completion_does_not_record_history() {
        let m = machine();
        let started = m.start(&m.default_state(), SessionKind::ShortBreak, None, T0);
        let done = m.complete(&started.state, T0 + 300_000).unwrap();
        assert!(!done
            .effects
            .iter()
            .any(|e| matches!(e, Effect::RecordSession(_))));
        assert!(done.effects.contains(&Effect::Notify(SelfNotice::Completed {
            kind: SessionKind::ShortBreak
        })));
    }
}
