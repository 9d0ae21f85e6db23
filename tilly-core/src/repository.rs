use async_trait::async_trait;
use serde_json::{Map, Value};
use tilly_shared::NotificationChannel;
use uuid::Uuid;

use crate::cards::{Card, CardList, CardListUpdate};
use crate::fields::Field;
use crate::lists::{List, ListGroup, View};
use crate::notifications::{NewNotification, Notification, NotificationQuery, NotificationUpdate};
use crate::preferences::{NotificationPreference, PreferenceUpsert};
use crate::projects::{NewProject, Project, ProjectUpdate};

/// Failure reported by a persistence backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepoError {
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Constraint violated: {0}")]
    Conflict(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository trait for card data access
#[async_trait]
pub trait CardRepository: Send + Sync {
    async fn get_card(&self, id: i64) -> RepoResult<Option<Card>>;

    /// Every card with a membership in `list_id`, memberships included.
    async fn list_cards_in_list(&self, list_id: i64) -> RepoResult<Vec<Card>>;

    async fn update_card_data(&self, id: i64, data: &Map<String, Value>) -> RepoResult<Option<Card>>;
}

/// Repository trait for card/list membership rows (stage and order)
#[async_trait]
pub trait CardListRepository: Send + Sync {
    async fn get_card_list(&self, id: i64) -> RepoResult<Option<CardList>>;

    /// Applies only the fields present in `update`.
    async fn update_card_list(&self, id: i64, update: &CardListUpdate) -> RepoResult<Option<CardList>>;
}

/// Repository trait for lists, their stages, groups, views and fields
#[async_trait]
pub trait ListRepository: Send + Sync {
    async fn get_list(&self, id: i64) -> RepoResult<Option<List>>;

    async fn get_group(&self, id: i64) -> RepoResult<Option<ListGroup>>;

    async fn set_group_expanded(&self, id: i64, is_expanded: bool) -> RepoResult<Option<ListGroup>>;

    async fn get_view(&self, id: i64) -> RepoResult<Option<View>>;

    async fn get_field(&self, id: i64) -> RepoResult<Option<Field>>;
}

/// Repository trait for notification records
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert(&self, notification: &NewNotification) -> RepoResult<Notification>;

    /// Newest first.
    async fn find_all(&self, query: &NotificationQuery) -> RepoResult<Vec<Notification>>;

    async fn find_one(&self, id: Uuid) -> RepoResult<Option<Notification>>;

    async fn update(&self, id: Uuid, update: &NotificationUpdate) -> RepoResult<Option<Notification>>;

    /// Marks the recipient's unread notifications as read, returning how many changed.
    async fn mark_all_as_read(&self, recipient_id: i64) -> RepoResult<u64>;

    async fn delete(&self, id: Uuid) -> RepoResult<bool>;
}

/// Repository trait for per-user, per-channel notification preferences
#[async_trait]
pub trait PreferenceRepository: Send + Sync {
    async fn find(&self, user_id: i64, channel: NotificationChannel) -> RepoResult<Option<NotificationPreference>>;

    async fn list_for_user(&self, user_id: i64) -> RepoResult<Vec<NotificationPreference>>;

    async fn upsert(&self, preference: &PreferenceUpsert) -> RepoResult<NotificationPreference>;
}

/// Repository trait for projects (tenants)
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn list_for_user(&self, user_id: i64) -> RepoResult<Vec<Project>>;

    async fn get(&self, id: i64) -> RepoResult<Option<Project>>;

    async fn find_by_invite_code(&self, invite_code: &str) -> RepoResult<Option<Project>>;

    async fn create(&self, project: &NewProject) -> RepoResult<Project>;

    async fn update(&self, id: i64, update: &ProjectUpdate) -> RepoResult<Option<Project>>;

    async fn delete(&self, id: i64) -> RepoResult<bool>;
}
