use serde::{Deserialize, Serialize};

/// The three kinds of focus session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionKind {
    #[default]
    #[serde(alias = "POMODORO")]
    Work,
    ShortBreak,
    LongBreak,
}

impl SessionKind {
    pub const ALL: [SessionKind; 3] = [Self::Work, Self::ShortBreak, Self::LongBreak];

    pub fn is_break(self) -> bool {
        matches!(self, Self::ShortBreak | Self::LongBreak)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Work => "Work",
            Self::ShortBreak => "Short Break",
            Self::LongBreak => "Long Break",
        }
    }

    /// Body of the notification shown when a session of this kind completes.
    pub fn completion_message(self) -> &'static str {
        match self {
            Self::Work => "Time for a break!",
            Self::ShortBreak | Self::LongBreak => "Ready to focus again?",
        }
    }

    /// Parse user input such as `work`, `short-break`, `lb`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "work" | "pomodoro" | "pomo" | "focus" | "w" => Some(Self::Work),
            "short-break" | "short" | "sb" => Some(Self::ShortBreak),
            "long-break" | "long" | "lb" => Some(Self::LongBreak),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Planned duration per session kind, in minutes.
///
/// This is the only place default durations live; every call site asks the
/// table instead of hard-coding minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationTable {
    pub work_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
}

impl DurationTable {
    pub const DEFAULT_WORK_MINUTES: u32 = 25;
    pub const DEFAULT_SHORT_BREAK_MINUTES: u32 = 5;
    pub const DEFAULT_LONG_BREAK_MINUTES: u32 = 15;

    /// Build a table, replacing zero entries with the defaults.
    pub fn new(work_minutes: u32, short_break_minutes: u32, long_break_minutes: u32) -> Self {
        fn or_default(value: u32, default: u32) -> u32 {
            if value == 0 {
                default
            } else {
                value
            }
        }
        Self {
            work_minutes: or_default(work_minutes, Self::DEFAULT_WORK_MINUTES),
            short_break_minutes: or_default(short_break_minutes, Self::DEFAULT_SHORT_BREAK_MINUTES),
            long_break_minutes: or_default(long_break_minutes, Self::DEFAULT_LONG_BREAK_MINUTES),
        }
    }

    pub fn minutes(&self, kind: SessionKind) -> u32 {
        match kind {
            SessionKind::Work => self.work_minutes,
            SessionKind::ShortBreak => self.short_break_minutes,
            SessionKind::LongBreak => self.long_break_minutes,
        }
    }

    pub fn seconds(&self, kind: SessionKind) -> u64 {
        u64::from(self.minutes(kind)).saturating_mul(60)
    }

    pub fn millis(&self, kind: SessionKind) -> u64 {
        self.seconds(kind).saturating_mul(1000)
    }
}

impl Default for DurationTable {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_WORK_MINUTES,
            Self::DEFAULT_SHORT_BREAK_MINUTES,
            Self::DEFAULT_LONG_BREAK_MINUTES,
        )
    }
}
