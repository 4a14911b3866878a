//! # Lockin Core Library
//!
//! Core logic for Lockin, a focus-session timer that silences distracting
//! notifications while a session runs. Every operation is reachable from the
//! `lockin` CLI; other UI surfaces are thin layers over the same library.
//!
//! ## Architecture
//!
//! - **Background Authority**: the single process that applies timer
//!   transitions, owns the wake alarm and filters notifications
//! - **Shared State Store**: SQLite key-value store shared by every process,
//!   with change subscriptions that cover writes from other processes
//! - **Command Bus**: JSON commands from UI processes to the authority, over
//!   an in-process channel or a Unix socket
//! - **Timer Projection**: the read-only countdown each UI renders
//!
//! ## Key Components
//!
//! - [`TimerMachine`]: pure timer transitions
//! - [`Authority`]: the command loop around it
//! - [`SqliteStore`]: persisted shared state
//! - [`Projection`]: derived per-UI view
//! - [`NotificationCenter`]: classification and interception

pub mod authority;
pub mod bus;
pub mod clock;
pub mod error;
pub mod events;
pub mod logging;
pub mod notify;
pub mod projection;
pub mod scheduler;
pub mod storage;
pub mod timer;

pub use authority::Authority;
pub use bus::{BusHandle, BusReceiver, Command, Reply};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{BusError, ConfigError, CoreError, Result, StoreError};
pub use events::Event;
pub use notify::{
    Classifier, Decision, Interception, NotificationCenter, NotificationLog, NotificationRequest,
    NotificationSink,
};
pub use projection::{Projection, TimerView};
pub use scheduler::{TokioWakeScheduler, WakeEvent, WakeScheduler};
pub use storage::{Config, SharedStore, SqliteStore, StoreExt, StoreKey};
pub use timer::{DurationTable, SessionKind, TimerMachine, TimerPhase, TimerState};
