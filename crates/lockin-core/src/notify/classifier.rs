use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::storage::records::NotificationSettings;
use crate::storage::{SharedStore, StoreExt, StoreKey};
use crate::timer::TimerState;

/// Outcome of classifying a third-party notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Block,
}

impl Decision {
    pub fn is_block(self) -> bool {
        self == Decision::Block
    }
}

/// Decide whether a notification from `source` is shown.
///
/// Inactive sessions never block. Breaks allow everything when
/// `allow_during_breaks` is set. Otherwise only allowed sources get through.
pub fn classify(state: &TimerState, settings: &NotificationSettings, source: &str) -> Decision {
    if !state.is_active {
        return Decision::Allow;
    }
    if state.kind.is_break() && settings.allow_during_breaks {
        return Decision::Allow;
    }
    if settings.allows(source) {
        Decision::Allow
    } else {
        Decision::Block
    }
}

/// Store-backed classifier. Always reads current state; nothing is cached.
#[derive(Clone)]
pub struct Classifier {
    store: Arc<dyn SharedStore>,
}

impl Classifier {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    pub async fn decide(&self, source: &str) -> Decision {
        let state = match self.store.get::<TimerState>(StoreKey::TimerState).await {
            Ok(Some(state)) => state,
            Ok(None) => return Decision::Allow,
            Err(e) => {
                debug!(error = %e, "unreadable timer state, treating as idle");
                return Decision::Allow;
            }
        };
        // Fast path: no settings read while idle or paused.
        if !state.is_active {
            return Decision::Allow;
        }
        let settings: NotificationSettings = self
            .store
            .get_or_default(StoreKey::NotificationSettings)
            .await;
        classify(&state, &settings, source)
    }

    pub async fn should_block(&self, source: &str) -> bool {
        self.decide(source).await.is_block()
    }
}
