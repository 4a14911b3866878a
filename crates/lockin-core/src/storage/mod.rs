mod config;
pub mod database;
pub mod records;
mod store;

pub use config::{get_by_path, set_by_path, Config, DaemonConfig, LogConfig, NotificationsConfig, TimerConfig};
pub use database::{Database, KvChange};
pub use store::{SharedStore, SqliteStore, StoreChange, StoreExt};

use std::path::PathBuf;

/// Every key persisted in the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    TimerState,
    NotificationSettings,
    Notifications,
    BlockedNotifications,
    NotificationStats,
    Settings,
    Tasks,
    FocusSessions,
    ActiveTab,
    ActiveTimer,
    StatusIndicator,
}

impl StoreKey {
    pub const ALL: [StoreKey; 11] = [
        Self::TimerState,
        Self::NotificationSettings,
        Self::Notifications,
        Self::BlockedNotifications,
        Self::NotificationStats,
        Self::Settings,
        Self::Tasks,
        Self::FocusSessions,
        Self::ActiveTab,
        Self::ActiveTimer,
        Self::StatusIndicator,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TimerState => "timerState",
            Self::NotificationSettings => "notificationSettings",
            Self::Notifications => "notifications",
            Self::BlockedNotifications => "blockedNotifications",
            Self::NotificationStats => "notificationStats",
            Self::Settings => "settings",
            Self::Tasks => "tasks",
            Self::FocusSessions => "focusSessions",
            Self::ActiveTab => "activeTab",
            Self::ActiveTimer => "activeTimer",
            Self::StatusIndicator => "statusIndicator",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the data directory, creating it if needed.
///
/// `$LOCKIN_HOME` wins when set; otherwise `~/.config/lockin`, or
/// `~/.config/lockin-dev` when `LOCKIN_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let dir = match std::env::var_os("LOCKIN_HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("LOCKIN_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("lockin-dev")
            } else {
                base_dir.join("lockin")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names_round_trip() {
        for key in StoreKey::ALL {
            assert_eq!(StoreKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(StoreKey::parse("currentSession"), None);
        assert_eq!(StoreKey::BlockedNotifications.to_string(), "blockedNotifications");
    }
}
