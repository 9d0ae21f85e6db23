use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tilly_core::notifications::{NewNotification, Notification, NotificationQuery, NotificationUpdate};
use tilly_core::repository::{NotificationRepository, RepoResult};
use uuid::Uuid;

use crate::database::{db_error, decode_text, encode_text};

pub struct PgNotificationRepository {
    pool: PgPool,
}

impl PgNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    #[sqlx(rename = "type")]
    notification_type: String,
    recipient_id: i64,
    workspace_id: i64,
    related_resource_id: String,
    related_resource_type: String,
    message: String,
    color: Option<String>,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl NotificationRow {
    fn into_notification(self) -> RepoResult<Notification> {
        Ok(Notification {
            id: self.id,
            notification_type: decode_text("notification type", &self.notification_type)?,
            recipient_id: self.recipient_id,
            workspace_id: self.workspace_id,
            related_resource_id: self.related_resource_id,
            related_resource_type: self.related_resource_type,
            message: self.message,
            color: self.color,
            is_read: self.is_read,
            created_at: self.created_at,
        })
    }
}

const COLUMNS: &str = "id, type, recipient_id, workspace_id, related_resource_id, related_resource_type, \
                       message, color, is_read, created_at";

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn insert(&self, data: &NewNotification) -> RepoResult<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            INSERT INTO notifications (id, type, recipient_id, workspace_id, related_resource_id,
                                       related_resource_type, message, color, is_read)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(encode_text(&data.notification_type)?)
        .bind(data.recipient_id)
        .bind(data.workspace_id)
        .bind(&data.related_resource_id)
        .bind(&data.related_resource_type)
        .bind(&data.message)
        .bind(&data.color)
        .bind(data.is_read)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        row.into_notification()
    }

    async fn find_all(&self, query: &NotificationQuery) -> RepoResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            SELECT {}
            FROM notifications
            WHERE recipient_id = $1
              AND workspace_id = $2
              AND ($3::boolean IS NULL OR is_read = $3)
            ORDER BY created_at DESC
            "#,
            COLUMNS
        ))
        .bind(query.recipient_id)
        .bind(query.workspace_id)
        .bind(query.is_read)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(NotificationRow::into_notification).collect()
    }

    async fn find_one(&self, id: Uuid) -> RepoResult<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!("SELECT {} FROM notifications WHERE id = $1", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(NotificationRow::into_notification).transpose()
    }

    async fn update(&self, id: Uuid, update: &NotificationUpdate) -> RepoResult<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            UPDATE notifications
            SET is_read = COALESCE($2, is_read),
                message = COALESCE($3, message)
            WHERE id = $1
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(id)
        .bind(update.is_read)
        .bind(&update.message)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(NotificationRow::into_notification).transpose()
    }

    async fn mark_all_as_read(&self, recipient_id: i64) -> RepoResult<u64> {
        let result = sqlx::query("UPDATE notifications SET is_read = true WHERE recipient_id = $1 AND is_read = false")
            .bind(recipient_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }
}
