use clap::Subcommand;
use lockin_core::{Command, Config, NotificationLog, NotificationRequest, Reply};

use super::{open_store, print_json, send, CliResult};

#[derive(Subcommand)]
pub enum NotifyAction {
    /// Ask whether notifications from SOURCE are blocked right now
    Check { source: String },
    /// Classify a page the user has open, e.g. a webmail inbox
    Observe {
        url: String,
        #[arg(long)]
        title: Option<String>,
    },
    /// Route a notification through the filter
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        message: String,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        id: Option<String>,
    },
    /// Clear stored notifications and counters
    Clear,
    /// List stored notifications
    List {
        /// Show blocked instead of allowed notifications
        #[arg(long)]
        blocked: bool,
    },
    /// Per-source counters of allowed notifications
    Stats,
}

pub async fn run(action: NotifyAction, config: &Config) -> CliResult {
    match action {
        NotifyAction::Check { source } => {
            match send(config, Command::CheckFocusMode { source }).await? {
                Some(reply @ Reply::FocusMode { .. }) => print_json(&reply)?,
                other => return Err(format!("unexpected reply: {other:?}").into()),
            }
        }
        NotifyAction::Observe { url, title } => {
            match send(config, Command::ObserveEvent { url, title }).await? {
                Some(reply @ Reply::Classified { .. }) => print_json(&reply)?,
                other => return Err(format!("unexpected reply: {other:?}").into()),
            }
        }
        NotifyAction::Create {
            title,
            message,
            source,
            id,
        } => {
            let mut request = NotificationRequest::new(title, message);
            if let Some(source) = source {
                request = request.with_source(source);
            }
            if let Some(id) = id {
                request = request.with_id(id);
            }
            match send(config, Command::CreateNotification(request)).await? {
                Some(reply @ Reply::Intercepted { .. }) => print_json(&reply)?,
                other => return Err(format!("unexpected reply: {other:?}").into()),
            }
        }
        NotifyAction::Clear => {
            send(config, Command::ClearNotifications {}).await?;
            println!("notifications cleared");
        }
        NotifyAction::List { blocked } => {
            let log = NotificationLog::new(open_store()?);
            let records = if blocked {
                log.blocked().await
            } else {
                log.allowed().await
            };
            print_json(&records)?;
        }
        NotifyAction::Stats => {
            let log = NotificationLog::new(open_store()?);
            print_json(&log.stats().await)?;
        }
    }
    Ok(())
}
