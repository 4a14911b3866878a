//! Persisted blocked/allowed notification lists and per-source stats.

use std::sync::Arc;

use crate::error::StoreError;
use crate::storage::records::{NotificationRecord, NotificationStats};
use crate::storage::{SharedStore, StoreExt, StoreKey};

/// Allowed records with the same source and message inside this window
/// collapse into one.
pub const DEDUP_WINDOW_MS: u64 = 10_000;

#[derive(Clone)]
pub struct NotificationLog {
    store: Arc<dyn SharedStore>,
}

impl NotificationLog {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    pub async fn record_blocked(&self, record: NotificationRecord) -> Result<(), StoreError> {
        let mut blocked: Vec<NotificationRecord> =
            self.store.get_or_default(StoreKey::BlockedNotifications).await;
        blocked.push(record);
        self.store.set(StoreKey::BlockedNotifications, &blocked).await?;
        Ok(())
    }

    /// Append an allowed record unless it duplicates a recent one.
    ///
    /// Returns `false` when the record was discarded as a duplicate.
    pub async fn record_allowed(&self, record: NotificationRecord) -> Result<bool, StoreError> {
        let mut allowed: Vec<NotificationRecord> =
            self.store.get_or_default(StoreKey::Notifications).await;
        if is_duplicate(&allowed, &record) {
            return Ok(false);
        }
        let source = record.source.clone();
        allowed.push(record);
        self.store.set(StoreKey::Notifications, &allowed).await?;

        let mut stats: NotificationStats = self.store.get_or_default(StoreKey::NotificationStats).await;
        stats.increment(&source);
        self.store.set(StoreKey::NotificationStats, &stats).await?;
        Ok(true)
    }

    /// Empty both lists and reset the counters.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let empty: Vec<NotificationRecord> = Vec::new();
        self.store.set(StoreKey::Notifications, &empty).await?;
        self.store.set(StoreKey::BlockedNotifications, &empty).await?;
        self.store
            .set(StoreKey::NotificationStats, &NotificationStats::default())
            .await?;
        Ok(())
    }

    pub async fn allowed(&self) -> Vec<NotificationRecord> {
        self.store.get_or_default(StoreKey::Notifications).await
    }

    pub async fn blocked(&self) -> Vec<NotificationRecord> {
        self.store.get_or_default(StoreKey::BlockedNotifications).await
    }

    pub async fn stats(&self) -> NotificationStats {
        self.store.get_or_default(StoreKey::NotificationStats).await
    }
}

fn is_duplicate(existing: &[NotificationRecord], record: &NotificationRecord) -> bool {
    existing.iter().any(|n| {
        n.source == record.source
            && n.message == record.message
            && record.timestamp_epoch_ms.saturating_sub(n.timestamp_epoch_ms) < DEDUP_WINDOW_MS
    })
}
