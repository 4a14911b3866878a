pub mod completions;
pub mod config;
pub mod daemon;
pub mod history;
pub mod notify;
pub mod settings;
pub mod timer;

use std::sync::Arc;

use lockin_core::{Command, Config, Reply, SqliteStore};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Open the shared store in the data directory.
pub fn open_store() -> Result<Arc<SqliteStore>, Box<dyn std::error::Error>> {
    Ok(Arc::new(SqliteStore::open_default()?))
}

/// Send one command to the running daemon.
#[cfg(unix)]
pub async fn send(config: &Config, command: Command) -> Result<Option<Reply>, Box<dyn std::error::Error>> {
    let path = config.socket_path()?;
    lockin_core::bus::socket::send_command(&path, &command)
        .await
        .map_err(|e| format!("daemon at {} unavailable: {e}", path.display()).into())
}

#[cfg(not(unix))]
pub async fn send(_config: &Config, _command: Command) -> Result<Option<Reply>, Box<dyn std::error::Error>> {
    Err("the daemon socket is only supported on unix".into())
}

/// Print `value` as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
