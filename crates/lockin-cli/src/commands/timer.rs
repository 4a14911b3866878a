use std::sync::Arc;

use clap::{Subcommand, ValueEnum};
use lockin_core::{Clock, Command, Config, Projection, Reply, SessionKind, SystemClock};
use tokio::sync::watch;

use super::{open_store, print_json, send, CliResult};

#[derive(Clone, Copy, ValueEnum)]
pub enum KindArg {
    Work,
    ShortBreak,
    LongBreak,
}

impl From<KindArg> for SessionKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Work => SessionKind::Work,
            KindArg::ShortBreak => SessionKind::ShortBreak,
            KindArg::LongBreak => SessionKind::LongBreak,
        }
    }
}

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start a session, replacing any running one
    Start {
        #[arg(long = "type", value_enum, default_value = "work")]
        kind: KindArg,
        /// Task the session is for
        #[arg(long)]
        task: Option<String>,
        /// Only start if the stored state is still at this revision
        #[arg(long)]
        expect_revision: Option<u64>,
    },
    /// Pause the running session
    Pause,
    /// Resume the paused session
    Resume,
    /// End the session and reset to the full duration
    End,
    /// Print the countdown as JSON
    Status {
        #[arg(long)]
        task: Option<String>,
    },
    /// Print the countdown every second until Ctrl-C
    Watch {
        #[arg(long)]
        task: Option<String>,
    },
    /// Print the daemon's stored timer state as JSON
    State,
}

pub async fn run(action: TimerAction, config: &Config) -> CliResult {
    match action {
        TimerAction::Start {
            kind,
            task,
            expect_revision,
        } => {
            let command = Command::StartSession {
                kind: kind.into(),
                task_id: task.clone(),
                expected_revision: expect_revision,
            };
            send(config, command).await?;
            status(task).await?;
        }
        TimerAction::Pause => {
            send(config, Command::PauseSession {}).await?;
            println!("ok");
        }
        TimerAction::Resume => {
            send(config, Command::ResumeSession {}).await?;
            println!("ok");
        }
        TimerAction::End => {
            send(config, Command::EndSession {}).await?;
            println!("ok");
        }
        TimerAction::Status { task } => status(task).await?,
        TimerAction::Watch { task } => follow(task, config).await?,
        TimerAction::State => match send(config, Command::GetState {}).await? {
            Some(Reply::State(state)) => print_json(&state)?,
            other => return Err(format!("unexpected reply: {other:?}").into()),
        },
    }
    Ok(())
}

async fn status(task: Option<String>) -> CliResult {
    let store = open_store()?;
    let clock = Arc::new(SystemClock);
    let mut projection = Projection::new(store, clock, task);
    projection.resync().await;
    print_json(&projection.tick().await)
}

async fn follow(task: Option<String>, config: &Config) -> CliResult {
    let store = open_store()?;
    let watcher = store.spawn_watcher(config.watch_interval());
    let projection = Projection::new(store, Arc::new(SystemClock), task);
    let initial = projection.view_at(SystemClock.now_ms());
    let (views_tx, mut views) = watch::channel(initial);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = tokio::spawn(projection.run(views_tx, shutdown_rx));

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                println!("{}", serde_json::to_string(&view)?);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = runner.await;
    watcher.abort();
    Ok(())
}
