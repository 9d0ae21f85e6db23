//! Notification records and preference-gated fan-out.
//!
//! A notification event reaches a user through two independent channels: an
//! in-app record pushed to the user's live connections, and a chat direct
//! message. Each channel consults the user's preference at dispatch time and
//! a failure in one never blocks the other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tilly_shared::{NotificationEvent, NotificationJob, NotificationType};
use uuid::Uuid;

use crate::preferences::PreferenceService;
use crate::repository::{NotificationRepository, RepoResult};

/// Delay applied to deferred notification jobs.
pub const NOTIFY_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub recipient_id: i64,
    pub workspace_id: i64,
    pub related_resource_id: String,
    pub related_resource_type: String,
    pub message: String,
    #[serde(default)]
    pub color: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub recipient_id: i64,
    pub workspace_id: i64,
    pub related_resource_id: String,
    pub related_resource_type: String,
    pub message: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationQuery {
    pub recipient_id: i64,
    pub workspace_id: i64,
    pub is_read: Option<bool>,
}

/// The only mutable parts of a notification.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationUpdate {
    #[serde(default)]
    pub is_read: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

/// One notification addressed to one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserNotification {
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub recipient_id: i64,
    pub workspace_id: i64,
    pub related_resource_id: String,
    pub related_resource_type: String,
    pub message: String,
    pub title: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl UserNotification {
    pub fn from_event(notification_type: NotificationType, event: &NotificationEvent, recipient_id: i64) -> Self {
        Self {
            notification_type,
            recipient_id,
            workspace_id: event.workspace_id,
            related_resource_id: event.related_resource_id.clone(),
            related_resource_type: event.related_resource_type.clone(),
            message: event.message.clone(),
            title: event.title.clone(),
            color: event.color.clone(),
            url: event.url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub user_id: i64,
    pub channel_id: Option<String>,
    pub title: String,
    pub message: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeliveryError {
    #[error("Delivery channel unavailable: {0}")]
    Unavailable(String),
    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

/// Real-time push to a user's active connections.
pub trait NotificationPush: Send + Sync {
    /// Returns how many live connections received the notification.
    fn push(&self, recipient_id: i64, notification: &Notification) -> usize;
}

/// External chat integration (direct messages).
#[async_trait]
pub trait ChatMessenger: Send + Sync {
    async fn send_dm(&self, message: &DirectMessage) -> Result<(), DeliveryError>;
}

/// Delayed background queue for deferred notification processing.
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    async fn enqueue(&self, job: &NotificationJob, delay: Duration) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum ChannelOutcome {
    Delivered,
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub recipient_id: i64,
    pub in_app: ChannelOutcome,
    pub chat: ChannelOutcome,
}

pub struct NotificationService {
    repo: Arc<dyn NotificationRepository>,
    preferences: PreferenceService,
    push: Arc<dyn NotificationPush>,
    chat: Arc<dyn ChatMessenger>,
    queue: Option<Arc<dyn NotificationQueue>>,
}

impl NotificationService {
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        preferences: PreferenceService,
        push: Arc<dyn NotificationPush>,
        chat: Arc<dyn ChatMessenger>,
    ) -> Self {
        Self {
            repo,
            preferences,
            push,
            chat,
            queue: None,
        }
    }

    pub fn with_queue(mut self, queue: Arc<dyn NotificationQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn preferences(&self) -> &PreferenceService {
        &self.preferences
    }

    /// Persists a notification and pushes it to the recipient's connections.
    pub async fn create(&self, data: &NewNotification) -> RepoResult<Notification> {
        let notification = self.repo.insert(data).await?;
        let reached = self.push.push(notification.recipient_id, &notification);
        tracing::debug!(
            "Notification {} pushed to {} connection(s) of user {}",
            notification.id,
            reached,
            notification.recipient_id
        );
        Ok(notification)
    }

    /// Defers processing of `event` onto the background queue.
    ///
    /// Without a configured queue the job is processed inline.
    pub async fn add_to_queue(
        &self,
        notification_type: NotificationType,
        event: NotificationEvent,
    ) -> Result<(), DeliveryError> {
        let job = NotificationJob {
            notification_type,
            event,
        };
        match &self.queue {
            Some(queue) => queue.enqueue(&job, NOTIFY_DELAY).await,
            None => {
                tracing::debug!("No notification queue configured, processing job inline");
                self.process_job(&job).await;
                Ok(())
            }
        }
    }

    /// Fans a queued job out to every recipient of its event.
    pub async fn process_job(&self, job: &NotificationJob) -> Vec<DispatchReport> {
        let mut reports = Vec::new();
        for recipient_id in job.event.effective_recipients() {
            let notification = UserNotification::from_event(job.notification_type, &job.event, recipient_id);
            reports.push(self.send_user_notification(&notification).await);
        }
        reports
    }

    pub async fn find_all(&self, query: &NotificationQuery) -> RepoResult<Vec<Notification>> {
        self.repo.find_all(query).await
    }

    pub async fn find_one(&self, id: Uuid) -> RepoResult<Option<Notification>> {
        self.repo.find_one(id).await
    }

    pub async fn update(&self, id: Uuid, update: &NotificationUpdate) -> RepoResult<Option<Notification>> {
        self.repo.update(id, update).await
    }

    pub async fn mark_all_as_read(&self, recipient_id: i64) -> RepoResult<u64> {
        let changed = self.repo.mark_all_as_read(recipient_id).await?;
        tracing::debug!("Marked {} notification(s) read for user {}", changed, recipient_id);
        Ok(changed)
    }

    pub async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        self.repo.delete(id).await
    }

    /// Dispatches one notification over every channel the recipient allows.
    pub async fn send_user_notification(&self, notification: &UserNotification) -> DispatchReport {
        let (in_app, chat) = tokio::join!(self.deliver_in_app(notification), self.deliver_chat(notification));
        DispatchReport {
            recipient_id: notification.recipient_id,
            in_app,
            chat,
        }
    }

    async fn deliver_in_app(&self, n: &UserNotification) -> ChannelOutcome {
        match self.preferences.is_in_app_enabled(n.recipient_id).await {
            Ok(true) => {}
            Ok(false) => return ChannelOutcome::Skipped,
            Err(e) => {
                tracing::warn!("In-app preference lookup failed for user {}: {}", n.recipient_id, e);
                return ChannelOutcome::Failed(e.to_string());
            }
        }

        let record = NewNotification {
            notification_type: n.notification_type,
            recipient_id: n.recipient_id,
            workspace_id: n.workspace_id,
            related_resource_id: n.related_resource_id.clone(),
            related_resource_type: n.related_resource_type.clone(),
            message: n.message.clone(),
            color: n.color.clone(),
            is_read: false,
        };
        match self.create(&record).await {
            Ok(_) => ChannelOutcome::Delivered,
            Err(e) => {
                tracing::warn!("In-app notification for user {} failed: {}", n.recipient_id, e);
                ChannelOutcome::Failed(e.to_string())
            }
        }
    }

    async fn deliver_chat(&self, n: &UserNotification) -> ChannelOutcome {
        let settings = match self.preferences.chat_settings(n.recipient_id).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Chat preference lookup failed for user {}: {}", n.recipient_id, e);
                return ChannelOutcome::Failed(e.to_string());
            }
        };
        if !settings.is_dm_enabled {
            return ChannelOutcome::Skipped;
        }

        let dm = DirectMessage {
            user_id: n.recipient_id,
            channel_id: settings.channel_id,
            title: n.title.clone(),
            message: n.message.clone(),
            url: n.url.clone(),
        };
        match self.chat.send_dm(&dm).await {
            Ok(()) => ChannelOutcome::Delivered,
            Err(e) => {
                tracing::warn!("Chat DM to user {} failed: {}", n.recipient_id, e);
                ChannelOutcome::Failed(e.to_string())
            }
        }
    }
}
