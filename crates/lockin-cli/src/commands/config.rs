use clap::Subcommand;
use lockin_core::Config;

use super::CliResult;

/// Local `config.toml` for this machine: durations the daemon falls back
/// to, socket and watch settings, log filter. Shared session settings live
/// in the store; see `lockin settings`.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one value by dotted path
    Get {
        /// Dotted path into config.toml, e.g. "timer.work_minutes" or "daemon.socket_path"
        key: String,
    },
    /// Change one value and write config.toml
    Set {
        /// Dotted path into config.toml
        key: String,
        /// Parsed to the type already stored at that path
        value: String,
    },
    /// Print the whole file as JSON
    List,
    /// Overwrite config.toml with built-in defaults
    Reset,
}

pub fn run(action: ConfigAction) -> CliResult {
    let mut config = match action {
        ConfigAction::Reset => Config::default(),
        _ => Config::load()?,
    };
    match action {
        ConfigAction::Get { key } => {
            let value = config
                .get(&key)
                .ok_or_else(|| format!("no config entry at '{key}' (try `lockin config list`)"))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            println!("{key} = {value}");
        }
        ConfigAction::List => println!("{}", serde_json::to_string_pretty(&config)?),
        ConfigAction::Reset => {
            config.save()?;
            println!("config.toml restored to defaults");
        }
    }
    Ok(())
}
