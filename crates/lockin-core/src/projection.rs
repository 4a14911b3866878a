//! Timer Projection: the read-only countdown a UI process renders.
//!
//! A projection never writes timer state. It caches the last `timerState` it
//! read, recomputes the remaining time from the absolute deadline on every
//! tick, and re-reads the store whenever the store reports a change.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::storage::records::{Settings, TaskBoard};
use crate::storage::{SharedStore, StoreExt, StoreKey};
use crate::timer::{DurationTable, Remaining, SessionKind, TimerPhase, TimerState};

const TICK: Duration = Duration::from_secs(1);

/// What a UI shows for one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerView {
    #[serde(rename = "type")]
    pub kind: SessionKind,
    /// `MM:SS`.
    pub remaining: String,
    pub remaining_secs: u64,
    pub is_active: bool,
    pub phase: TimerPhase,
    /// Whether the stored session belongs to this projection's scope.
    pub relevant: bool,
    pub progress_pct: u8,
    pub task_id: Option<String>,
    pub revision: u64,
}

pub struct Projection {
    store: Arc<dyn SharedStore>,
    clock: Arc<dyn Clock>,
    /// Task this projection is scoped to; `None` for the dashboard.
    scope: Option<String>,
    local_kind: SessionKind,
    table: DurationTable,
    cached: Option<TimerState>,
}

impl Projection {
    pub fn new(store: Arc<dyn SharedStore>, clock: Arc<dyn Clock>, scope: Option<String>) -> Self {
        Self {
            store,
            clock,
            scope,
            local_kind: SessionKind::Work,
            table: DurationTable::default(),
            cached: None,
        }
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn cached(&self) -> Option<&TimerState> {
        self.cached.as_ref()
    }

    /// Change the kind shown while idle. Local only; shared state is not
    /// touched.
    pub fn select_kind(&mut self, kind: SessionKind) {
        self.local_kind = kind;
    }

    /// Re-read everything the view depends on.
    pub async fn resync(&mut self) {
        let settings: Settings = self.store.get_or_default(StoreKey::Settings).await;
        self.table = settings.duration_table();

        self.cached = match self.store.get::<TimerState>(StoreKey::TimerState).await {
            Ok(state) => state.and_then(TimerState::normalized),
            Err(e) => {
                warn!(error = %e, "timer state unreadable, showing idle");
                None
            }
        };
        if let Some(state) = self.cached.as_ref().filter(|s| self.is_relevant(s)) {
            self.local_kind = state.kind;
        }

        self.heal_active_timer().await;
        debug!(scope = ?self.scope, revision = self.cached.as_ref().map(|s| s.revision), "projection resynced");
    }

    /// Clear an `activeTimer` that points at a task that no longer exists.
    async fn heal_active_timer(&self) {
        let active = match self.store.get_raw(StoreKey::ActiveTimer).await {
            Ok(Some(value)) => value,
            _ => return,
        };
        let id = match active {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            _ => return,
        };
        let board: TaskBoard = self.store.get_or_default(StoreKey::Tasks).await;
        if board.find(&id).is_none() {
            info!(task_id = %id, "clearing dangling active timer");
            if let Err(e) = self.store.remove(StoreKey::ActiveTimer).await {
                warn!(error = %e, "failed to clear active timer");
            }
        }
    }

    fn is_relevant(&self, state: &TimerState) -> bool {
        state.task_id.as_deref() == self.scope.as_deref()
    }

    /// Pure view of the cached state at `now_ms`.
    pub fn view_at(&self, now_ms: u64) -> TimerView {
        match self.cached.as_ref().filter(|s| self.is_relevant(s)) {
            Some(state) => {
                let remaining = state.remaining_at(now_ms);
                TimerView {
                    kind: state.kind,
                    remaining: remaining.to_string(),
                    remaining_secs: remaining.total_secs(),
                    is_active: state.is_active,
                    phase: state.phase(),
                    relevant: true,
                    progress_pct: progress(state.duration_plan_seconds, remaining.total_secs()),
                    task_id: state.task_id.clone(),
                    revision: state.revision,
                }
            }
            None => {
                let remaining = Remaining::from_secs(self.table.seconds(self.local_kind));
                TimerView {
                    kind: self.local_kind,
                    remaining: remaining.to_string(),
                    remaining_secs: remaining.total_secs(),
                    is_active: false,
                    phase: TimerPhase::Idle,
                    relevant: false,
                    progress_pct: 0,
                    task_id: self.scope.clone(),
                    revision: self.cached.as_ref().map_or(0, |s| s.revision),
                }
            }
        }
    }

    /// Recompute for the current instant.
    ///
    /// Reaching zero while the cache still says "running" triggers a
    /// re-fetch: only the authority decides that a session completed.
    pub async fn tick(&mut self) -> TimerView {
        let now = self.clock.now_ms();
        let expired = self
            .cached
            .as_ref()
            .is_some_and(|s| self.is_relevant(s) && s.is_due(now));
        if expired {
            debug!("local countdown reached zero, re-fetching");
            self.resync().await;
        }
        self.view_at(self.clock.now_ms())
    }

    /// Publish a view every second and immediately after relevant store
    /// changes, until `shutdown` flips to true.
    pub async fn run(mut self, views: watch::Sender<TimerView>, mut shutdown: watch::Receiver<bool>) {
        let mut changes = self.store.subscribe();
        self.resync().await;
        views.send_replace(self.view_at(self.clock.now_ms()));

        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                change = changes.recv() => {
                    match change {
                        Ok(change) if affects_view(change.key) => {
                            self.resync().await;
                            views.send_replace(self.view_at(self.clock.now_ms()));
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            debug!(missed, "store changes lagged, resyncing");
                            self.resync().await;
                            views.send_replace(self.view_at(self.clock.now_ms()));
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = ticker.tick() => {
                    let view = self.tick().await;
                    views.send_replace(view);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

fn affects_view(key: StoreKey) -> bool {
    matches!(
        key,
        StoreKey::TimerState | StoreKey::Settings | StoreKey::ActiveTimer | StoreKey::Tasks
    )
}

fn progress(plan_secs: u64, remaining_secs: u64) -> u8 {
    if plan_secs == 0 {
        return 0;
    }
    let done = plan_secs.saturating_sub(remaining_secs);
    (done.saturating_mul(100) / plan_secs).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::SqliteStore;
    use crate::timer::TimerMachine;

    const T0: u64 = 1_700_000_000_000;

    async fn running_store(task: Option<&str>) -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let machine = TimerMachine::default();
        let t = machine.start(&machine.default_state(), SessionKind::Work, task.map(String::from), T0);
        store.set(StoreKey::TimerState, &t.state).await.unwrap();
        store
    }

    #[tokio::test]
    async fn view_derives_from_deadline() {
        let store = running_store(None).await;
        let clock = Arc::new(ManualClock::new(T0));
        let mut p = Projection::new(store, clock, None);
        p.resync().await;
        let view = p.view_at(T0 + 5_000);
        assert_eq!(view.remaining, "24:55");
        assert!(view.is_active);
        assert!(view.relevant);
        assert_eq!(view.progress_pct, 0);
        assert_eq!(p.view_at(T0 + 750_000).progress_pct, 50);
    }

    #[tokio::test]
    async fn other_scope_sees_idle_default() {
        let store = running_store(Some("task-a")).await;
        let clock = Arc::new(ManualClock::new(T0));
        let mut p = Projection::new(store, clock, Some("task-b".into()));
        p.select_kind(SessionKind::LongBreak);
        p.resync().await;
        let view = p.view_at(T0 + 5_000);
        assert!(!view.relevant);
        assert!(!view.is_active);
        assert_eq!(view.kind, SessionKind::LongBreak);
        assert_eq!(view.remaining, "15:00");
    }

    #[tokio::test]
    async fn missing_state_is_idle_work() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(T0));
        let mut p = Projection::new(store, clock, None);
        p.resync().await;
        let view = p.view_at(T0);
        assert_eq!(view.kind, SessionKind::Work);
        assert_eq!(view.remaining, "25:00");
        assert_eq!(view.phase, TimerPhase::Idle);
    }

    #[tokio::test]
    async fn tick_at_zero_refetches_instead_of_completing() {
        let store = running_store(None).await;
        let clock = Arc::new(ManualClock::new(T0));
        let mut p = Projection::new(store.clone(), clock.clone(), None);
        p.resync().await;
        clock.set(T0 + 1_500_000);
        let view = p.tick().await;
        // Authority has not completed it yet: still running, clamped at zero.
        assert!(view.is_active);
        assert_eq!(view.remaining, "00:00");
    }

    #[tokio::test]
    async fn dangling_active_timer_is_cleared() {
        let store = running_store(Some("gone")).await;
        store.set(StoreKey::ActiveTimer, "gone").await.unwrap();
        let clock = Arc::new(ManualClock::new(T0));
        let mut p = Projection::new(store.clone(), clock, Some("gone".into()));
        p.resync().await;
        assert!(store.get_raw(StoreKey::ActiveTimer).await.unwrap().is_none());
        // The session itself is untouched.
        assert!(p.view_at(T0).is_active);
    }
}
