//! Notification classification and interception.

mod center;
mod classifier;
mod interceptor;
mod log;
pub mod sources;

pub use center::{NotificationCenter, Observation};
pub use classifier::{classify, Classifier, Decision};
pub use interceptor::{
    Interception, Interceptor, LogSink, NotificationRequest, NotificationSink,
    COMPLETED_NOTIFICATION_ID, STARTED_NOTIFICATION_ID, STARTED_TITLE, SYSTEM_SOURCE,
};
pub use log::{NotificationLog, DEDUP_WINDOW_MS};
