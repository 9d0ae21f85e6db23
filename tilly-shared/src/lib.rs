pub mod models;
pub mod pii;

pub use models::events::{NotificationEvent, NotificationJob, NOTIFY_JOB};
pub use models::notifications::{NotificationChannel, NotificationType, PreferenceConfig};
pub use pii::Masked;
