use std::sync::Arc;

use tracing::{debug, error, info};

use super::classifier::{Classifier, Decision};
use super::interceptor::{Interception, Interceptor, NotificationRequest, NotificationSink};
use super::log::NotificationLog;
use super::sources::{self, Detected};
use crate::clock::Clock;
use crate::storage::records::NotificationRecord;
use crate::storage::{SharedStore, StoreExt, StoreKey};
use crate::timer::TimerState;

/// An ambient event that was attributed and classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub detected: Detected,
    pub decision: Decision,
}

/// Interceptor, platform sink and notification log wired together.
#[derive(Clone)]
pub struct NotificationCenter {
    store: Arc<dyn SharedStore>,
    interceptor: Interceptor,
    classifier: Classifier,
    sink: Arc<dyn NotificationSink>,
    log: NotificationLog,
    clock: Arc<dyn Clock>,
}

impl NotificationCenter {
    pub fn new(
        store: Arc<dyn SharedStore>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let classifier = Classifier::new(Arc::clone(&store));
        Self {
            interceptor: Interceptor::new(classifier.clone()),
            classifier,
            log: NotificationLog::new(Arc::clone(&store)),
            store,
            sink,
            clock,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn log(&self) -> &NotificationLog {
        &self.log
    }

    /// Route a platform notification through the interceptor.
    ///
    /// Allowed and exempt requests are delivered; blocked ones are recorded.
    /// Delivery failures are logged and otherwise ignored.
    pub async fn create(&self, request: NotificationRequest) -> Interception {
        let outcome = self.interceptor.intercept(&request).await;
        match outcome {
            Interception::Allow | Interception::Exempt => {
                if let Err(e) = self.sink.deliver(&request).await {
                    error!(title = %request.title, error = %e, "notification delivery failed");
                }
            }
            Interception::Block => {
                info!(title = %request.title, source = request.source_or_system(), "blocking notification");
                let message = if request.title.is_empty() {
                    "Notification blocked".to_string()
                } else {
                    request.title.clone()
                };
                let record = NotificationRecord::new(request.source_or_system(), message, self.clock.now_ms())
                    .with_details(Some(request.message.clone()));
                if let Err(e) = self.log.record_blocked(record).await {
                    error!(error = %e, "failed to record blocked notification");
                }
            }
        }
        outcome
    }

    /// Classify an ambient event observed in the background.
    ///
    /// Returns `None` when the URL is not attributable or no session is
    /// running.
    pub async fn observe(&self, url: &str, title: Option<&str>) -> Option<Observation> {
        let detected = sources::detect(url, title)?;
        let running = matches!(
            self.store.get::<TimerState>(StoreKey::TimerState).await,
            Ok(Some(state)) if state.is_active
        );
        if !running {
            debug!(url, "ignoring ambient event while idle");
            return None;
        }

        let decision = self.classifier.decide(&detected.source).await;
        let record = NotificationRecord::new(
            detected.source.clone(),
            detected.message.clone(),
            self.clock.now_ms(),
        )
        .with_link(Some(detected.link.clone()));
        let stored = match decision {
            Decision::Block => self.log.record_blocked(record).await,
            Decision::Allow => self.log.record_allowed(record).await.map(|_| ()),
        };
        if let Err(e) = stored {
            error!(error = %e, "failed to record ambient notification");
        }
        Some(Observation { detected, decision })
    }
}
