//! Newline-delimited JSON over a Unix domain socket.
//!
//! Each request line gets exactly one reply line: the [`Reply`] JSON, `null`
//! for commands without a reply (or ignored ones), or `{"error": "..."}`.

use std::path::Path;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{BusHandle, Command, Reply};
use crate::error::BusError;

/// Largest request line accepted.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Bind the daemon socket, replacing a stale socket file.
pub fn bind(path: &Path) -> Result<UnixListener, BusError> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = UnixListener::bind(path)?;
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(listener)
}

/// Accept clients and forward their commands to `bus` until `shutdown`
/// flips to true.
pub async fn serve(
    listener: UnixListener,
    bus: BusHandle,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), BusError> {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let bus = bus.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(stream, bus).await {
                                debug!(error = %e, "client connection ended with error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("socket server stopping");
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_client(mut stream: UnixStream, bus: BusHandle) -> Result<(), BusError> {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let mut frame = Vec::new();

    loop {
        frame.clear();
        let limit = MAX_FRAME_BYTES as u64 + 1;
        if (&mut reader).take(limit).read_until(b'\n', &mut frame).await? == 0 {
            return Ok(());
        }
        if frame.len() > MAX_FRAME_BYTES && frame.last() != Some(&b'\n') {
            warn!(limit = MAX_FRAME_BYTES, "request line too large, dropping client");
            let response = error_line(&format!("request exceeds {MAX_FRAME_BYTES} bytes"));
            writer.write_all(response.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            return Ok(());
        }
        let response = respond(&String::from_utf8_lossy(&frame), &bus).await;
        writer.write_all(response.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
}

async fn respond(line: &str, bus: &BusHandle) -> String {
    let command = match Command::parse(line.trim()) {
        Ok(Some(command)) => command,
        Ok(None) => {
            debug!(line = line.trim(), "ignoring unknown action");
            return "null".into();
        }
        Err(e) => return error_line(&e.to_string()),
    };
    match bus.request(command).await {
        Ok(Some(reply)) => {
            serde_json::to_string(&reply).unwrap_or_else(|e| error_line(&e.to_string()))
        }
        Ok(None) => "null".into(),
        Err(e) => error_line(&e.to_string()),
    }
}

fn error_line(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

/// Send one command to the daemon at `path` and wait for its reply line.
pub async fn send_command(path: &Path, command: &Command) -> Result<Option<Reply>, BusError> {
    let mut stream = UnixStream::connect(path).await?;
    let mut payload =
        serde_json::to_string(command).map_err(|e| BusError::Protocol(e.to_string()))?;
    payload.push('\n');
    stream.write_all(payload.as_bytes()).await?;
    stream.flush().await?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(BusError::NoReply(command.action().to_string()));
    }
    let value: serde_json::Value =
        serde_json::from_str(line.trim()).map_err(|e| BusError::Protocol(e.to_string()))?;
    if value.is_null() {
        return Ok(None);
    }
    if let Some(message) = value.get("error").and_then(|m| m.as_str()) {
        return Err(BusError::Protocol(message.to_string()));
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| BusError::Protocol(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus;

    #[tokio::test]
    async fn round_trip_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lockin.sock");
        let listener = bind(&path).unwrap();
        let (handle, mut rx) = bus::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(serve(listener, handle, shutdown_rx));

        let authority = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let reply = match envelope.command {
                    Command::CheckFocusMode { .. } => Some(Reply::FocusMode { is_blocking: true }),
                    _ => None,
                };
                if let Some(tx) = envelope.reply {
                    let _ = tx.send(reply);
                }
            }
        });

        let reply = send_command(&path, &Command::CheckFocusMode { source: "Slack".into() })
            .await
            .unwrap();
        assert_eq!(reply, Some(Reply::FocusMode { is_blocking: true }));
        let reply = send_command(&path, &Command::PauseSession {}).await.unwrap();
        assert_eq!(reply, None);

        shutdown_tx.send(true).unwrap();
        server.await.unwrap().unwrap();
        authority.abort();
    }

    #[tokio::test]
    async fn oversized_request_line_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lockin.sock");
        let listener = bind(&path).unwrap();
        let (handle, _rx) = bus::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(serve(listener, handle, shutdown_rx));

        let mut stream = UnixStream::connect(&path).await.unwrap();
        let (reader, mut writer) = stream.split();
        let body = vec![b'x'; MAX_FRAME_BYTES * 2];
        // The server hangs up partway, so a failed write is expected.
        let _ = writer.write_all(&body).await;

        let mut reply = String::new();
        BufReader::new(reader).read_line(&mut reply).await.unwrap();
        assert!(reply.contains("error"));
        assert!(reply.contains(&MAX_FRAME_BYTES.to_string()));

        shutdown_tx.send(true).unwrap();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unknown_and_malformed_lines() {
        let (handle, _rx) = bus::channel(1);
        assert_eq!(respond(r#"{"action":"SOMETHING_NEW"}"#, &handle).await, "null");
        let line = respond(r#"{"action":"OBSERVE_EVENT"}"#, &handle).await;
        assert!(line.contains("error"));
    }
}
