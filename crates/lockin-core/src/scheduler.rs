//! Wake scheduler: fires a named callback at an absolute timestamp.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::clock::Clock;

/// The single registration used for session deadlines.
pub const SESSION_END: &str = "session-end";

/// Longest single sleep before the wall clock is consulted again. The
/// monotonic clock stands still while the host is suspended.
const MAX_WAKE_SLEEP: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeEvent {
    pub name: String,
    pub scheduled_for_ms: u64,
}

/// One registration per name; arming a name again replaces it.
pub trait WakeScheduler: Send + Sync {
    fn arm(&self, name: &str, at_epoch_ms: u64);
    fn clear(&self, name: &str);
    /// Deadline of the pending registration, if any.
    fn armed_at(&self, name: &str) -> Option<u64>;
}

struct Armed {
    at_epoch_ms: u64,
    task: JoinHandle<()>,
}

/// [`WakeScheduler`] backed by one sleeping tokio task per name.
///
/// A registration fires once either the wall clock reaches the deadline or
/// the delay measured at arm time has elapsed on the monotonic clock,
/// whichever comes first. Must be used from within a tokio runtime.
pub struct TokioWakeScheduler {
    clock: Arc<dyn Clock>,
    tx: mpsc::Sender<WakeEvent>,
    armed: Mutex<HashMap<String, Armed>>,
}

impl TokioWakeScheduler {
    pub fn new(clock: Arc<dyn Clock>, capacity: usize) -> (Self, mpsc::Receiver<WakeEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let scheduler = Self {
            clock,
            tx,
            armed: Mutex::new(HashMap::new()),
        };
        (scheduler, rx)
    }

    fn armed(&self) -> std::sync::MutexGuard<'_, HashMap<String, Armed>> {
        self.armed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl WakeScheduler for TokioWakeScheduler {
    fn arm(&self, name: &str, at_epoch_ms: u64) {
        let delay = at_epoch_ms.saturating_sub(self.clock.now_ms());
        let deadline = Instant::now() + Duration::from_millis(delay);
        let clock = self.clock.clone();
        let tx = self.tx.clone();
        let event = WakeEvent {
            name: name.to_string(),
            scheduled_for_ms: at_epoch_ms,
        };
        let task = tokio::spawn(async move {
            loop {
                let wall = Duration::from_millis(at_epoch_ms.saturating_sub(clock.now_ms()));
                let left = wall.min(deadline.saturating_duration_since(Instant::now()));
                if left.is_zero() {
                    break;
                }
                tokio::time::sleep(left.min(MAX_WAKE_SLEEP)).await;
            }
            if tx.send(event).await.is_err() {
                warn!("wake fired after receiver closed");
            }
        });
        debug!(name, at_epoch_ms, delay_ms = delay, "wake armed");
        if let Some(previous) = self.armed().insert(name.to_string(), Armed { at_epoch_ms, task }) {
            previous.task.abort();
        }
    }

    fn clear(&self, name: &str) {
        if let Some(previous) = self.armed().remove(name) {
            previous.task.abort();
            debug!(name, "wake cleared");
        }
    }

    fn armed_at(&self, name: &str) -> Option<u64> {
        self.armed()
            .get(name)
            .filter(|a| !a.task.is_finished())
            .map(|a| a.at_epoch_ms)
    }
}

impl Drop for TokioWakeScheduler {
    fn drop(&mut self) {
        for (_, armed) in self.armed().drain() {
            armed.task.abort();
        }
    }
}
