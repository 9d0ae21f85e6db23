use serde::Serialize;

/// Message shown when a background mutation fails.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong, please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackLevel {
    Info,
    Warning,
    Error,
}

/// Transient user-facing messages (the toast/snackbar of the client).
pub trait Feedback: Send + Sync {
    fn notify(&self, level: FeedbackLevel, message: &str);
}

/// Feedback sink for server-side callers: the message goes to the log and the
/// caller relays the returned error to the client.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFeedback;

impl Feedback for TracingFeedback {
    fn notify(&self, level: FeedbackLevel, message: &str) {
        match level {
            FeedbackLevel::Info => tracing::info!("{}", message),
            FeedbackLevel::Warning => tracing::warn!("{}", message),
            FeedbackLevel::Error => tracing::error!("{}", message),
        }
    }
}
