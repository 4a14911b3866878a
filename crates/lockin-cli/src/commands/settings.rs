//! Runtime settings live in the shared store, not in `config.toml`, so every
//! process sees an edit immediately. Keys are `settings.<field>` or
//! `notificationSettings.<field>`.

use clap::Subcommand;
use lockin_core::storage::records::{NotificationSettings, Settings};
use lockin_core::storage::{get_by_path, set_by_path};
use lockin_core::{SqliteStore, StoreExt, StoreKey};

use super::{open_store, print_json, CliResult};

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Get a setting (e.g. "settings.pomodoroMinutes")
    Get { key: String },
    /// Set a setting
    Set { key: String, value: String },
    /// List all settings
    List,
}

pub async fn run(action: SettingsAction) -> CliResult {
    let store = open_store()?;
    match action {
        SettingsAction::Get { key } => {
            let tree = load(&store).await?;
            match get_by_path(&tree, &key) {
                Some(serde_json::Value::String(s)) => println!("{s}"),
                Some(other) => println!("{other}"),
                None => return Err(format!("unknown key: {key}").into()),
            }
        }
        SettingsAction::Set { key, value } => {
            let mut tree = load(&store).await?;
            set_by_path(&mut tree, &key, &value)?;
            let settings: Settings = serde_json::from_value(tree["settings"].take())?;
            let notifications: NotificationSettings =
                serde_json::from_value(tree["notificationSettings"].take())?;
            store.set(StoreKey::Settings, &settings).await?;
            store.set(StoreKey::NotificationSettings, &notifications).await?;
            println!("ok");
        }
        SettingsAction::List => print_json(&load(&store).await?)?,
    }
    Ok(())
}

async fn load(store: &SqliteStore) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let settings: Settings = store.get_or_default(StoreKey::Settings).await;
    let notifications: NotificationSettings =
        store.get_or_default(StoreKey::NotificationSettings).await;
    Ok(serde_json::json!({
        "settings": settings,
        "notificationSettings": notifications,
    }))
}
