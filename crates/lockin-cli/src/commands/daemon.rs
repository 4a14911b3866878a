use std::sync::Arc;

use lockin_core::bus;
use lockin_core::notify::LogSink;
use lockin_core::{Authority, Config, SystemClock, TokioWakeScheduler};
use tokio::sync::watch;
use tracing::{error, info};

use super::{open_store, CliResult};

/// Host the background authority: install, recover, then serve the command
/// socket and wake events until Ctrl-C.
#[cfg(unix)]
pub async fn run(config: Config) -> CliResult {
    let store = open_store()?;
    let watcher = store.spawn_watcher(config.watch_interval());
    let clock = Arc::new(SystemClock);
    let capacity = config.daemon.queue_capacity;

    let (scheduler, wakes) = TokioWakeScheduler::new(clock.clone(), capacity);
    let mut authority =
        Authority::new(store.clone(), Arc::new(scheduler), Arc::new(LogSink), clock).with_config(&config);
    authority.install().await?;
    authority.recover().await;

    let socket_path = config.socket_path()?;
    let listener = bus::socket::bind(&socket_path)?;
    info!(socket = %socket_path.display(), "daemon listening");

    let (handle, receiver) = bus::channel(capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(bus::socket::serve(listener, handle, shutdown_rx.clone()));
    let authority = tokio::spawn(authority.run(receiver, wakes, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    let _ = shutdown_tx.send(true);

    match server.await {
        Ok(Err(e)) => error!(error = %e, "socket server failed"),
        Err(e) => error!(error = %e, "socket server panicked"),
        Ok(Ok(())) => {}
    }
    if let Err(e) = authority.await {
        error!(error = %e, "authority task panicked");
    }
    watcher.abort();
    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}

#[cfg(not(unix))]
pub async fn run(_config: Config) -> CliResult {
    Err("the daemon is only supported on unix".into())
}
