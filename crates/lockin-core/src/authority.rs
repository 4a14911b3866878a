//! Background Authority.
//!
//! The only component that writes timer state. Commands and wake events are
//! drained from one queue and handled strictly one at a time, and every
//! handler starts by re-reading `timerState` from the store: nothing held in
//! memory is trusted across activations.
//!
//! ## Entry points
//!
//! - [`Authority::install`] seeds missing records on first run
//! - [`Authority::recover`] re-arms or completes the stored session on startup
//! - [`Authority::handle`] applies one [`Command`]
//! - [`Authority::on_wake`] reacts to the session deadline firing
//! - [`Authority::run`] drives all of the above from the bus and scheduler

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::bus::{BusReceiver, Command, Reply};
use crate::clock::Clock;
use crate::error::StoreError;
use crate::events::{self, Event};
use crate::notify::{NotificationCenter, NotificationRequest, NotificationSink};
use crate::scheduler::{WakeEvent, WakeScheduler, SESSION_END};
use crate::storage::records::{
    append_capped, FocusSessionRecord, NotificationRecord, NotificationSettings,
    NotificationStats, Settings, StatusIndicator, TaskBoard,
};
use crate::storage::{Config, SharedStore, StoreExt, StoreKey};
use crate::timer::{Effect, SelfNotice, SessionKind, TimerMachine, TimerPhase, TimerState, Transition};

const EVENT_CAPACITY: usize = 64;

pub struct Authority {
    store: Arc<dyn SharedStore>,
    scheduler: Arc<dyn WakeScheduler>,
    notifications: NotificationCenter,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<Event>,
    /// Last state read from or written to the store. Only used when the
    /// store cannot be read.
    cache: Option<TimerState>,
    seed_settings: Settings,
    seed_notification_settings: NotificationSettings,
}

impl Authority {
    pub fn new(
        store: Arc<dyn SharedStore>,
        scheduler: Arc<dyn WakeScheduler>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let notifications = NotificationCenter::new(Arc::clone(&store), sink, Arc::clone(&clock));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            scheduler,
            notifications,
            clock,
            events,
            cache: None,
            seed_settings: Settings::default(),
            seed_notification_settings: NotificationSettings::default(),
        }
    }

    /// Use `config` for the records seeded by [`install`](Self::install).
    pub fn with_config(mut self, config: &Config) -> Self {
        self.seed_settings = config.seed_settings();
        self.seed_notification_settings = config.seed_notification_settings();
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Seed every record that does not exist yet. Existing records are never
    /// overwritten.
    pub async fn install(&mut self) -> Result<(), StoreError> {
        let empty: Vec<NotificationRecord> = Vec::new();
        if self.is_absent(StoreKey::NotificationSettings).await? {
            self.store
                .set(StoreKey::NotificationSettings, &self.seed_notification_settings)
                .await?;
        }
        if self.is_absent(StoreKey::Notifications).await? {
            self.store.set(StoreKey::Notifications, &empty).await?;
        }
        if self.is_absent(StoreKey::BlockedNotifications).await? {
            self.store.set(StoreKey::BlockedNotifications, &empty).await?;
        }
        if self.is_absent(StoreKey::NotificationStats).await? {
            self.store
                .set(StoreKey::NotificationStats, &NotificationStats::default())
                .await?;
        }
        if self.is_absent(StoreKey::Settings).await? {
            self.store.set(StoreKey::Settings, &self.seed_settings).await?;
        }
        if self.is_absent(StoreKey::Tasks).await? {
            let history: Vec<FocusSessionRecord> = Vec::new();
            self.store.set(StoreKey::Tasks, &TaskBoard::default()).await?;
            self.store.set(StoreKey::FocusSessions, &history).await?;
        }
        if self.is_absent(StoreKey::TimerState).await? {
            let settings: Settings = self.store.get_or_default(StoreKey::Settings).await;
            let state = TimerMachine::new(settings.duration_table()).default_state();
            self.store.set(StoreKey::TimerState, &state).await?;
        }
        info!("store installed");
        Ok(())
    }

    async fn is_absent(&self, key: StoreKey) -> Result<bool, StoreError> {
        Ok(self.store.get_raw(key).await?.is_none())
    }

    /// Bring the wake registration and indicator in line with the stored
    /// session. A deadline that passed while nothing was running completes
    /// the session now.
    pub async fn recover(&mut self) {
        let (state, _settings) = self.load_state().await;
        let now = self.clock.now_ms();
        match state.phase() {
            _ if state.is_spent(now) => {
                info!(kind = %state.kind, "deadline passed while inactive, completing");
                self.complete_if_due().await;
            }
            TimerPhase::Running => {
                if let Some(end) = state.end_time_epoch_ms {
                    self.scheduler.arm(SESSION_END, end);
                    info!(kind = %state.kind, end_time_epoch_ms = end, "re-armed session wake");
                }
                self.write_indicator(&StatusIndicator::running()).await;
            }
            TimerPhase::Paused => {
                self.scheduler.clear(SESSION_END);
                self.write_indicator(&StatusIndicator::paused()).await;
            }
            TimerPhase::Idle => {
                self.scheduler.clear(SESSION_END);
                self.write_indicator(&StatusIndicator::cleared()).await;
            }
        }
    }

    /// Drain commands and wake events until the bus closes or `shutdown`
    /// flips to true.
    pub async fn run(
        mut self,
        mut bus: BusReceiver,
        mut wakes: mpsc::Receiver<WakeEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("background authority running");
        loop {
            tokio::select! {
                envelope = bus.recv() => {
                    let Some(envelope) = envelope else {
                        info!("command bus closed");
                        break;
                    };
                    let reply = self.handle(envelope.command).await;
                    if let Some(tx) = envelope.reply {
                        let _ = tx.send(reply);
                    }
                }
                Some(wake) = wakes.recv() => {
                    self.on_wake(wake).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("background authority stopping");
                        break;
                    }
                }
            }
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Apply one command. Never fails: problems are logged and the stored
    /// state is left as it was or degraded to idle.
    pub async fn handle(&mut self, command: Command) -> Option<Reply> {
        debug!(action = command.action(), "command received");
        match command {
            Command::StartSession {
                kind,
                task_id,
                expected_revision,
            } => {
                self.start(kind, task_id, expected_revision).await;
                None
            }
            Command::PauseSession {} => {
                let (state, settings) = self.load_state().await;
                let machine = TimerMachine::new(settings.duration_table());
                match machine.pause(&state, self.clock.now_ms()) {
                    Some(t) => self.apply(t, &settings).await,
                    None if state.is_running() => {
                        debug!("nothing left to pause, completing instead");
                        self.complete_if_due().await;
                    }
                    None => debug!(phase = ?state.phase(), "pause ignored"),
                }
                None
            }
            Command::ResumeSession {} => {
                let (state, settings) = self.load_state().await;
                let machine = TimerMachine::new(settings.duration_table());
                match machine.resume(&state, self.clock.now_ms()) {
                    Some(t) => self.apply(t, &settings).await,
                    None if state.phase() == TimerPhase::Paused => {
                        debug!("paused at 00:00, completing instead of resuming");
                        self.complete_if_due().await;
                    }
                    None => debug!(phase = ?state.phase(), "resume ignored"),
                }
                None
            }
            Command::EndSession {} => {
                let (state, settings) = self.load_state().await;
                let machine = TimerMachine::new(settings.duration_table());
                match machine.end(&state, self.clock.now_ms()) {
                    Some(t) => self.apply(t, &settings).await,
                    None => debug!("end ignored, already idle"),
                }
                None
            }
            Command::SessionCompleted { kind, .. } => {
                debug!(%kind, "completion reported by a UI");
                self.complete_if_due().await;
                None
            }
            Command::ClearNotifications {} => {
                match self.notifications.log().clear().await {
                    Ok(()) => self.emit(Event::NotificationsCleared {
                        at: events::at(self.clock.now_ms()),
                    }),
                    Err(e) => error!(error = %e, "failed to clear notifications"),
                }
                None
            }
            Command::CheckFocusMode { source } => {
                let is_blocking = self.notifications.classifier().should_block(&source).await;
                Some(Reply::FocusMode { is_blocking })
            }
            Command::ObserveEvent { url, title } => {
                let observation = self.notifications.observe(&url, title.as_deref()).await;
                let decision = observation.map(|o| {
                    self.emit(Event::NotificationClassified {
                        source: o.detected.source,
                        message: o.detected.message,
                        decision: o.decision,
                        at: events::at(self.clock.now_ms()),
                    });
                    o.decision
                });
                Some(Reply::Classified { decision })
            }
            Command::CreateNotification(request) => {
                let interception = self.notifications.create(request).await;
                Some(Reply::Intercepted { interception })
            }
            Command::GetState {} => {
                let (state, _) = self.load_state().await;
                Some(Reply::State(state))
            }
        }
    }

    /// React to a wake registration firing.
    pub async fn on_wake(&mut self, wake: WakeEvent) {
        if wake.name != SESSION_END {
            debug!(name = %wake.name, "ignoring unknown wake");
            return;
        }
        debug!(scheduled_for_ms = wake.scheduled_for_ms, "session wake fired");
        self.complete_if_due().await;
    }

    async fn start(&mut self, kind: SessionKind, task_id: Option<String>, expected: Option<u64>) {
        let (state, settings) = self.load_state().await;
        let now = self.clock.now_ms();
        if let Some(expected) = expected {
            if expected != state.revision {
                warn!(
                    expected_revision = expected,
                    actual_revision = state.revision,
                    "rejecting stale start"
                );
                self.emit(Event::StartRejected {
                    expected_revision: expected,
                    actual_revision: state.revision,
                    at: events::at(now),
                });
                return;
            }
        }
        if state.is_running() {
            info!(previous = %state.kind, "start replaces running session");
        }
        let machine = TimerMachine::new(settings.duration_table());
        let transition = machine.start(&state, kind, task_id, now);
        self.apply(transition, &settings).await;
    }

    /// Complete the stored session if it has no time left; re-arm the wake
    /// if it is running but the deadline is still ahead.
    async fn complete_if_due(&mut self) {
        let (state, settings) = self.load_state().await;
        let now = self.clock.now_ms();
        let machine = TimerMachine::new(settings.duration_table());
        match machine.complete(&state, now) {
            Some(transition) => {
                let kind = state.kind;
                let task_id = state.task_id.clone();
                self.apply(transition, &settings).await;
                self.auto_start(kind, task_id, &settings).await;
            }
            None if state.is_running() => {
                if let Some(end) = state.end_time_epoch_ms {
                    debug!(remaining_ms = end.saturating_sub(now), "not due yet, re-arming");
                    self.scheduler.arm(SESSION_END, end);
                }
            }
            None => debug!("no running session to complete"),
        }
    }

    async fn auto_start(&mut self, completed: SessionKind, task_id: Option<String>, settings: &Settings) {
        let next = match completed {
            SessionKind::Work if settings.auto_start_breaks => {
                let history: Vec<FocusSessionRecord> =
                    self.store.get_or_default(StoreKey::FocusSessions).await;
                let done = history.iter().filter(|r| r.kind == SessionKind::Work).count() as u32;
                if settings.long_break_interval > 0 && done % settings.long_break_interval == 0 {
                    SessionKind::LongBreak
                } else {
                    SessionKind::ShortBreak
                }
            }
            SessionKind::ShortBreak | SessionKind::LongBreak if settings.auto_start_pomodoros => {
                SessionKind::Work
            }
            _ => return,
        };
        info!(%next, "auto-starting next session");
        self.start(next, task_id, None).await;
    }

    // ── State ────────────────────────────────────────────────────────

    /// Fresh read of the stored timer state and settings.
    ///
    /// Missing or unusable records degrade to the idle Work default.
    async fn load_state(&mut self) -> (TimerState, Settings) {
        let settings: Settings = self.store.get_or_default(StoreKey::Settings).await;
        let machine = TimerMachine::new(settings.duration_table());
        let state = match self.store.get::<TimerState>(StoreKey::TimerState).await {
            Ok(Some(stored)) => match stored.normalized() {
                Some(state) => state,
                None => {
                    warn!("stored timer state is active without a deadline, resetting");
                    machine.default_state()
                }
            },
            Ok(None) => machine.default_state(),
            Err(e) => {
                warn!(error = %e, "timer state unreadable");
                self.cache.clone().unwrap_or_else(|| machine.default_state())
            }
        };
        self.cache = Some(state.clone());
        (state, settings)
    }

    async fn apply(&mut self, transition: Transition, settings: &Settings) {
        let Transition {
            state,
            effects,
            event,
        } = transition;
        if let Err(e) = self.store.set(StoreKey::TimerState, &state).await {
            error!(event = event.name(), error = %e, "failed to write timer state");
            return;
        }
        self.cache = Some(state.clone());

        for effect in effects {
            match effect {
                Effect::ArmWake { at_epoch_ms } => self.scheduler.arm(SESSION_END, at_epoch_ms),
                Effect::ClearWake => self.scheduler.clear(SESSION_END),
                Effect::Indicator(indicator) => self.write_indicator(&indicator).await,
                Effect::SetActiveTimer(task_id) => {
                    let result = match &task_id {
                        Some(id) => self.store.set(StoreKey::ActiveTimer, id).await,
                        None => self.store.remove(StoreKey::ActiveTimer).await,
                    };
                    if let Err(e) = result {
                        error!(error = %e, "failed to write active timer");
                    }
                }
                Effect::Notify(notice) => {
                    let request = match notice {
                        SelfNotice::Started { minutes } => NotificationRequest::session_started(minutes),
                        SelfNotice::Completed { kind } => {
                            NotificationRequest::session_completed(kind).with_sound(settings.sound())
                        }
                    };
                    self.notifications.create(request).await;
                }
                Effect::RecordSession(record) => self.record_session(record).await,
            }
        }

        info!(
            event = event.name(),
            kind = %state.kind,
            phase = ?state.phase(),
            revision = state.revision,
            "timer transition"
        );
        self.emit(event);
    }

    async fn write_indicator(&self, indicator: &StatusIndicator) {
        if let Err(e) = self.store.set(StoreKey::StatusIndicator, indicator).await {
            error!(error = %e, "failed to write status indicator");
        }
    }

    async fn record_session(&self, record: FocusSessionRecord) {
        let mut history: Vec<FocusSessionRecord> =
            self.store.get_or_default(StoreKey::FocusSessions).await;
        append_capped(&mut history, record);
        if let Err(e) = self.store.set(StoreKey::FocusSessions, &history).await {
            error!(error = %e, "failed to append focus session");
        }
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
