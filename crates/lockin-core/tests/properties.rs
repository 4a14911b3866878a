//! Property tests for timer arithmetic and notification gating.

use std::sync::Arc;

use lockin_core::notify::{classify, Classifier, Interception, Interceptor, NotificationRequest};
use lockin_core::storage::records::{NotificationRecord, NotificationSettings};
use lockin_core::{
    ManualClock, NotificationLog, Projection, SessionKind, SqliteStore, StoreExt, StoreKey,
    TimerMachine, TimerState,
};
use proptest::prelude::*;

const T0: u64 = 1_700_000_000_000;

fn kind() -> impl Strategy<Value = SessionKind> {
    prop_oneof![
        Just(SessionKind::Work),
        Just(SessionKind::ShortBreak),
        Just(SessionKind::LongBreak),
    ]
}

fn settings() -> impl Strategy<Value = NotificationSettings> {
    (
        prop::collection::vec(prop_oneof![Just("Gmail"), Just("Calendar"), Just("Slack")], 0..3),
        any::<bool>(),
    )
        .prop_map(|(sources, allow_during_breaks)| NotificationSettings {
            allowed_sources: sources.into_iter().map(String::from).collect(),
            allow_during_breaks,
        })
}

#[derive(Debug, Clone)]
enum Op {
    Start(SessionKind),
    Pause,
    Resume,
    Wait(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        kind().prop_map(Op::Start),
        Just(Op::Pause),
        Just(Op::Resume),
        (0u64..900_000).prop_map(Op::Wait),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn test_pause_resume_preserves_remaining(
        kind in kind(),
        elapsed in 0u64..900_000,
        paused_for in 0u64..10_000_000,
    ) {
        let machine = TimerMachine::default();
        let running = machine.start(&machine.default_state(), kind, None, T0).state;
        let end = running.end_time_epoch_ms.unwrap();

        let pause_at = T0 + elapsed % (end - T0 - 1_000);
        let paused = machine.pause(&running, pause_at).unwrap().state;
        let resume_at = pause_at + paused_for;
        let resumed = machine.resume(&paused, resume_at).unwrap().state;

        let before = end - pause_at;
        let after = resumed.end_time_epoch_ms.unwrap() - resume_at;
        prop_assert_eq!(after, before / 1000 * 1000);
    }

    #[test]
    fn test_inactive_session_never_blocks(
        kind in kind(),
        settings in settings(),
        source in "[A-Za-z]{0,12}",
    ) {
        let state = TimerState::idle(kind, &Default::default());
        prop_assert!(!classify(&state, &settings, &source).is_block());
    }

    #[test]
    fn test_self_notifications_never_blocked(
        kind in kind(),
        settings in settings(),
        minutes in 1u64..120,
    ) {
        runtime().block_on(async {
            let store = Arc::new(SqliteStore::in_memory().unwrap());
            let machine = TimerMachine::default();
            let running = machine.start(&machine.default_state(), kind, None, T0).state;
            store.set(StoreKey::TimerState, &running).await.unwrap();
            store.set(StoreKey::NotificationSettings, &settings).await.unwrap();

            let interceptor = Interceptor::new(Classifier::new(store));
            for request in [
                NotificationRequest::session_started(minutes),
                NotificationRequest::session_completed(kind),
            ] {
                assert_eq!(interceptor.intercept(&request).await, Interception::Exempt);
            }
        });
    }

    #[test]
    fn test_duplicate_allowed_records_collapse(gap in 0u64..20_000) {
        let stored = runtime().block_on(async {
            let log = NotificationLog::new(Arc::new(SqliteStore::in_memory().unwrap()));
            log.record_allowed(NotificationRecord::new("Calendar", "Standup", T0)).await.unwrap();
            log.record_allowed(NotificationRecord::new("Calendar", "Standup", T0 + gap)).await.unwrap();
            log.allowed().await.len()
        });
        prop_assert_eq!(stored, if gap < 10_000 { 1 } else { 2 });
    }

    #[test]
    fn test_projections_agree_after_any_interleaving(
        ops in prop::collection::vec(op(), 1..12),
        offset in 0u64..1_000,
    ) {
        let machine = TimerMachine::default();
        let mut state = machine.default_state();
        let mut now = T0;
        for op in ops {
            match op {
                Op::Start(kind) => state = machine.start(&state, kind, None, now).state,
                Op::Pause => {
                    if let Some(t) = machine.pause(&state, now) {
                        state = t.state;
                    }
                }
                Op::Resume => {
                    if let Some(t) = machine.resume(&state, now) {
                        state = t.state;
                    }
                }
                Op::Wait(ms) => now += ms,
            }
        }

        let (a, b) = runtime().block_on(async {
            let store = Arc::new(SqliteStore::in_memory().unwrap());
            store.set(StoreKey::TimerState, &state).await.unwrap();
            let clock = Arc::new(ManualClock::new(now));
            let mut first = Projection::new(store.clone(), clock.clone(), None);
            let mut second = Projection::new(store, clock, None);
            first.resync().await;
            second.resync().await;
            (first.view_at(now), second.view_at(now + offset))
        });

        prop_assert_eq!(a.is_active, b.is_active);
        prop_assert_eq!(a.kind, b.kind);
        // Independent tick phases differ by at most one second.
        prop_assert!(a.remaining_secs.abs_diff(b.remaining_secs) <= 1);
    }
}
