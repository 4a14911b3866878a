//! Command Bus between UI processes and the Background Authority.
//!
//! Commands travel as JSON objects tagged by `action`. In-process callers use
//! [`BusHandle`]; other processes use the socket transport in [`socket`].

#[cfg(unix)]
pub mod socket;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::error::BusError;
use crate::notify::{Decision, Interception, NotificationRequest};
use crate::storage::records::lenient_id;
use crate::timer::{SessionKind, TimerState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    #[serde(rename_all = "camelCase", alias = "START_POMODORO")]
    StartSession {
        #[serde(rename = "type", alias = "timerType", default)]
        kind: SessionKind,
        #[serde(default, deserialize_with = "lenient_id")]
        task_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_revision: Option<u64>,
    },
    #[serde(alias = "PAUSE_POMODORO")]
    PauseSession {},
    #[serde(alias = "RESUME_POMODORO")]
    ResumeSession {},
    #[serde(alias = "END_POMODORO")]
    EndSession {},
    #[serde(rename_all = "camelCase", alias = "TIMER_COMPLETED")]
    SessionCompleted {
        #[serde(rename = "type", alias = "timerType", default)]
        kind: SessionKind,
        #[serde(default, deserialize_with = "lenient_id")]
        task_id: Option<String>,
    },
    ClearNotifications {},
    CheckFocusMode {
        source: String,
    },
    ObserveEvent {
        url: String,
        #[serde(default)]
        title: Option<String>,
    },
    CreateNotification(NotificationRequest),
    GetState {},
}

/// Every action name accepted on the wire, aliases included.
const KNOWN_ACTIONS: [&str; 15] = [
    "START_SESSION",
    "START_POMODORO",
    "PAUSE_SESSION",
    "PAUSE_POMODORO",
    "RESUME_SESSION",
    "RESUME_POMODORO",
    "END_SESSION",
    "END_POMODORO",
    "SESSION_COMPLETED",
    "TIMER_COMPLETED",
    "CLEAR_NOTIFICATIONS",
    "CHECK_FOCUS_MODE",
    "OBSERVE_EVENT",
    "CREATE_NOTIFICATION",
    "GET_STATE",
];

impl Command {
    /// Decode a wire message.
    ///
    /// Unknown actions yield `Ok(None)` so newer senders do not break older
    /// authorities; a known action with a malformed payload is an error.
    pub fn parse(json: &str) -> Result<Option<Self>, BusError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| BusError::Protocol(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Option<Self>, BusError> {
        let action = value
            .get("action")
            .and_then(|a| a.as_str())
            .ok_or_else(|| BusError::Protocol("message has no action".into()))?;
        if !KNOWN_ACTIONS.contains(&action) {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| BusError::Protocol(e.to_string()))
    }

    pub fn action(&self) -> &'static str {
        match self {
            Command::StartSession { .. } => "START_SESSION",
            Command::PauseSession {} => "PAUSE_SESSION",
            Command::ResumeSession {} => "RESUME_SESSION",
            Command::EndSession {} => "END_SESSION",
            Command::SessionCompleted { .. } => "SESSION_COMPLETED",
            Command::ClearNotifications {} => "CLEAR_NOTIFICATIONS",
            Command::CheckFocusMode { .. } => "CHECK_FOCUS_MODE",
            Command::ObserveEvent { .. } => "OBSERVE_EVENT",
            Command::CreateNotification(_) => "CREATE_NOTIFICATION",
            Command::GetState {} => "GET_STATE",
        }
    }

    /// Whether the sender should wait for a [`Reply`].
    pub fn expects_reply(&self) -> bool {
        matches!(
            self,
            Command::CheckFocusMode { .. }
                | Command::ObserveEvent { .. }
                | Command::CreateNotification(_)
                | Command::GetState {}
        )
    }
}

/// Reply to a request/response command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    FocusMode {
        #[serde(rename = "isBlocking")]
        is_blocking: bool,
    },
    Intercepted {
        interception: Interception,
    },
    State(TimerState),
    /// `decision` is `null` when the event was ignored.
    Classified {
        decision: Option<Decision>,
    },
}

/// A command plus the channel its reply goes back on.
#[derive(Debug)]
pub struct Envelope {
    pub command: Command,
    pub reply: Option<oneshot::Sender<Option<Reply>>>,
}

/// Create a bounded in-process bus.
pub fn channel(capacity: usize) -> (BusHandle, BusReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (BusHandle { tx }, BusReceiver { rx })
}

/// Sending side, cheap to clone into every UI surface.
#[derive(Debug, Clone)]
pub struct BusHandle {
    tx: mpsc::Sender<Envelope>,
}

impl BusHandle {
    /// Fire-and-forget.
    pub async fn send(&self, command: Command) -> Result<(), BusError> {
        self.tx
            .send(Envelope {
                command,
                reply: None,
            })
            .await
            .map_err(|_| BusError::Closed)
    }

    /// Send and wait until the authority has handled the command.
    ///
    /// Commands without a reply resolve to `Ok(None)` once applied.
    pub async fn request(&self, command: Command) -> Result<Option<Reply>, BusError> {
        let action = command.action();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                command,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| BusError::Closed)?;
        reply_rx
            .await
            .map_err(|_| BusError::NoReply(action.to_string()))
    }
}

/// Receiving side, owned by the Background Authority.
#[derive(Debug)]
pub struct BusReceiver {
    rx: mpsc::Receiver<Envelope>,
}

impl BusReceiver {
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_session_wire_shape() {
        let cmd = Command::parse(r#"{"action":"START_SESSION","type":"WORK","taskId":"t1"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            cmd,
            Command::StartSession {
                kind: SessionKind::Work,
                task_id: Some("t1".into()),
                expected_revision: None
            }
        );
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["action"], "START_SESSION");
        assert_eq!(json["type"], "WORK");
        assert_eq!(json["taskId"], "t1");
    }

    #[test]
    fn numeric_task_ids_are_accepted() {
        let cmd = Command::parse(r#"{"action":"START_SESSION","type":"WORK","taskId":1712345678901}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(cmd, Command::StartSession { task_id: Some(ref id), .. } if id == "1712345678901"));
    }

    #[test]
    fn legacy_actions_are_accepted() {
        let cmd = Command::parse(r#"{"action":"START_POMODORO","timerType":"SHORT_BREAK"}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(cmd, Command::StartSession { kind: SessionKind::ShortBreak, .. }));
        let cmd = Command::parse(r#"{"action":"TIMER_COMPLETED","timerType":"POMODORO"}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(cmd, Command::SessionCompleted { kind: SessionKind::Work, .. }));
    }

    #[test]
    fn empty_payload_commands() {
        let cmd = Command::parse(r#"{"action":"PAUSE_SESSION"}"#).unwrap().unwrap();
        assert_eq!(cmd, Command::PauseSession {});
        assert_eq!(
            serde_json::to_string(&Command::EndSession {}).unwrap(),
            r#"{"action":"END_SESSION"}"#
        );
    }

    #[test]
    fn unknown_action_is_ignored() {
        assert_eq!(Command::parse(r#"{"action":"OPEN_POPOUT"}"#).unwrap(), None);
    }

    #[test]
    fn malformed_known_action_is_an_error() {
        assert!(Command::parse(r#"{"action":"CHECK_FOCUS_MODE"}"#).is_err());
        assert!(Command::parse("not json").is_err());
        assert!(Command::parse(r#"{"type":"WORK"}"#).is_err());
    }

    #[test]
    fn create_notification_is_inline() {
        let cmd = Command::parse(
            r#"{"action":"CREATE_NOTIFICATION","title":"Hi","message":"there","source":"Slack"}"#,
        )
        .unwrap()
        .unwrap();
        match cmd {
            Command::CreateNotification(req) => {
                assert_eq!(req.title, "Hi");
                assert_eq!(req.source.as_deref(), Some("Slack"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reply_shapes() {
        let json = serde_json::to_string(&Reply::FocusMode { is_blocking: true }).unwrap();
        assert_eq!(json, r#"{"isBlocking":true}"#);
        let back: Reply = serde_json::from_str(r#"{"interception":"exempt"}"#).unwrap();
        assert_eq!(back, Reply::Intercepted { interception: Interception::Exempt });
        let back: Reply = serde_json::from_str(r#"{"decision":null}"#).unwrap();
        assert_eq!(back, Reply::Classified { decision: None });
    }

    #[tokio::test]
    async fn request_waits_for_reply() {
        let (handle, mut rx) = channel(4);
        let responder = tokio::spawn(async move {
            let envelope = rx.recv().await.unwrap();
            assert!(envelope.command.expects_reply());
            let _ = envelope
                .reply
                .unwrap()
                .send(Some(Reply::FocusMode { is_blocking: false }));
        });
        let reply = handle
            .request(Command::CheckFocusMode { source: "Gmail".into() })
            .await
            .unwrap();
        assert_eq!(reply, Some(Reply::FocusMode { is_blocking: false }));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_receiver_closes_bus() {
        let (handle, rx) = channel(1);
        drop(rx);
        assert!(matches!(handle.send(Command::PauseSession {}).await, Err(BusError::Closed)));
    }
}
