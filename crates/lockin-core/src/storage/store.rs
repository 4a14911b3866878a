//! The Shared State Store.
//!
//! [`SharedStore`] is the async seam every component reads and writes
//! through. [`SqliteStore`] implements it over [`Database`]; every query runs
//! on the blocking pool so a store call is always an await point.
//!
//! Change notification is uniform: writes made through this handle are
//! published immediately, writes made by other processes are published by
//! the watcher following the revision sequence.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::database::Database;
use super::StoreKey;
use crate::error::StoreError;

const CHANGE_CAPACITY: usize = 256;

/// A key changed at `revision`. `local` is true when this handle wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: StoreKey,
    pub revision: u64,
    pub local: bool,
}

#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get_raw(&self, key: StoreKey) -> Result<Option<serde_json::Value>, StoreError>;

    /// Write `value` and return the revision assigned to it.
    async fn set_raw(&self, key: StoreKey, value: serde_json::Value) -> Result<u64, StoreError>;

    async fn remove(&self, key: StoreKey) -> Result<u64, StoreError>;

    /// Highest revision currently stored.
    async fn revision(&self) -> Result<u64, StoreError>;

    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// Typed access on top of [`SharedStore`].
#[async_trait]
pub trait StoreExt: SharedStore {
    async fn get<T>(&self, key: StoreKey) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        match self.get_raw(key).await? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| StoreError::Decode {
                    key: key.to_string(),
                    source,
                }),
        }
    }

    /// Read `key`, degrading to `T::default()` when it is missing or
    /// unreadable.
    async fn get_or_default<T>(&self, key: StoreKey) -> T
    where
        T: DeserializeOwned + Default + Send,
    {
        match self.get::<T>(key).await {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(e) => {
                warn!(%key, error = %e, "store read failed, using default");
                T::default()
            }
        }
    }

    async fn set<T>(&self, key: StoreKey, value: &T) -> Result<u64, StoreError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let json = serde_json::to_value(value)
            .map_err(|e| StoreError::QueryFailed(format!("cannot encode {key}: {e}")))?;
        self.set_raw(key, json).await
    }
}

impl<S: SharedStore + ?Sized> StoreExt for S {}

/// [`SharedStore`] over a SQLite file that several processes may open.
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
    origin: String,
    changes: broadcast::Sender<StoreChange>,
    seen: AtomicU64,
}

impl SqliteStore {
    /// Open the store in the data directory.
    pub fn open_default() -> Result<Self, StoreError> {
        Self::from_database(Database::open()?)
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::from_database(Database::open_at(path)?)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_database(Database::open_in_memory()?)
    }

    fn from_database(db: Database) -> Result<Self, StoreError> {
        let seen = db.revision()?;
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            origin: uuid::Uuid::new_v4().to_string(),
            changes,
            seen: AtomicU64::new(seen),
        })
    }

    /// Id stamped on every row this handle writes.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    async fn with_db<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Database) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|_| StoreError::Join("store mutex poisoned".into()))?;
            f(&guard)
        })
        .await?
    }

    fn publish(&self, key: StoreKey, revision: u64, local: bool) {
        // No receivers is fine.
        let _ = self.changes.send(StoreChange {
            key,
            revision,
            local,
        });
    }

    /// Publish keys written by other processes since the last poll.
    ///
    /// Returns how many changes were published.
    pub async fn poll_changes(&self) -> Result<usize, StoreError> {
        let since = self.seen.load(Ordering::Acquire);
        let changes = self.with_db(move |db| db.changes_since(since)).await?;
        let mut published = 0;
        let mut highest = since;
        for change in changes {
            highest = highest.max(change.revision);
            if change.origin == self.origin {
                continue;
            }
            match StoreKey::parse(&change.key) {
                Some(key) => {
                    self.publish(key, change.revision, false);
                    published += 1;
                }
                None => debug!(key = %change.key, "ignoring change to unknown key"),
            }
        }
        self.seen.fetch_max(highest, Ordering::AcqRel);
        Ok(published)
    }

    /// Poll for foreign writes every `every` until the handle is aborted.
    pub fn spawn_watcher(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = store.poll_changes().await {
                    warn!(error = %e, "store watcher poll failed");
                }
            }
        })
    }

    /// Every key that currently holds a value.
    pub async fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.with_db(|db| db.keys()).await
    }
}

#[async_trait]
impl SharedStore for SqliteStore {
    async fn get_raw(&self, key: StoreKey) -> Result<Option<serde_json::Value>, StoreError> {
        let raw = self.with_db(move |db| db.kv_get(key.as_str())).await?;
        match raw {
            None => Ok(None),
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|source| StoreError::Decode {
                    key: key.to_string(),
                    source,
                }),
        }
    }

    async fn set_raw(&self, key: StoreKey, value: serde_json::Value) -> Result<u64, StoreError> {
        let text = value.to_string();
        let origin = self.origin.clone();
        let revision = self
            .with_db(move |db| db.kv_set(key.as_str(), &text, &origin))
            .await?;
        self.publish(key, revision, true);
        Ok(revision)
    }

    async fn remove(&self, key: StoreKey) -> Result<u64, StoreError> {
        let origin = self.origin.clone();
        let revision = self
            .with_db(move |db| db.kv_remove(key.as_str(), &origin))
            .await?;
        self.publish(key, revision, true);
        Ok(revision)
    }

    async fn revision(&self) -> Result<u64, StoreError> {
        self.with_db(|db| db.revision()).await
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::records::NotificationSettings;

    #[tokio::test]
    async fn typed_get_and_set() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store
            .get::<NotificationSettings>(StoreKey::NotificationSettings)
            .await
            .unwrap()
            .is_none());
        let settings = NotificationSettings {
            allowed_sources: vec![],
            allow_during_breaks: false,
        };
        store.set(StoreKey::NotificationSettings, &settings).await.unwrap();
        let read: NotificationSettings = store
            .get_or_default(StoreKey::NotificationSettings)
            .await;
        assert_eq!(read, settings);
    }

    #[tokio::test]
    async fn undecodable_value_degrades_to_default() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .set_raw(StoreKey::NotificationSettings, serde_json::json!("garbage"))
            .await
            .unwrap();
        assert!(store
            .get::<NotificationSettings>(StoreKey::NotificationSettings)
            .await
            .is_err());
        let read: NotificationSettings = store
            .get_or_default(StoreKey::NotificationSettings)
            .await;
        assert_eq!(read, NotificationSettings::default());
    }

    #[tokio::test]
    async fn local_writes_are_published() {
        let store = SqliteStore::in_memory().unwrap();
        let mut rx = store.subscribe();
        let rev = store
            .set_raw(StoreKey::ActiveTimer, serde_json::json!("task-1"))
            .await
            .unwrap();
        let change = rx.recv().await.unwrap();
        assert_eq!(change, StoreChange { key: StoreKey::ActiveTimer, revision: rev, local: true });
    }

    #[tokio::test]
    async fn remove_reads_as_missing() {
        let store = SqliteStore::in_memory().unwrap();
        store.set_raw(StoreKey::ActiveTimer, serde_json::json!("t")).await.unwrap();
        store.remove(StoreKey::ActiveTimer).await.unwrap();
        assert!(store.get_raw(StoreKey::ActiveTimer).await.unwrap().is_none());
        assert_eq!(store.revision().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn poll_skips_own_writes() {
        let store = SqliteStore::in_memory().unwrap();
        store.set_raw(StoreKey::Tasks, serde_json::json!({})).await.unwrap();
        assert_eq!(store.poll_changes().await.unwrap(), 0);
    }
}
