mod kind;
mod machine;
mod state;

pub use kind::{DurationTable, SessionKind};
pub use machine::{Effect, SelfNotice, TimerMachine, Transition};
pub use state::{Remaining, TimerPhase, TimerState};
