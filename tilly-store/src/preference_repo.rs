use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tilly_core::preferences::{NotificationPreference, PreferenceUpsert};
use tilly_core::repository::{PreferenceRepository, RepoResult};
use tilly_shared::{NotificationChannel, PreferenceConfig};
use uuid::Uuid;

use crate::database::{db_error, decode_text};

pub struct PgPreferenceRepository {
    pool: PgPool,
}

impl PgPreferenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PreferenceRow {
    id: Uuid,
    user_id: i64,
    channel: String,
    enabled: bool,
    config: Json<PreferenceConfig>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PreferenceRow {
    fn into_preference(self) -> RepoResult<NotificationPreference> {
        Ok(NotificationPreference {
            id: self.id,
            user_id: self.user_id,
            channel: decode_text("channel", &self.channel)?,
            enabled: self.enabled,
            config: self.config.0,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl PreferenceRepository for PgPreferenceRepository {
    async fn find(&self, user_id: i64, channel: NotificationChannel) -> RepoResult<Option<NotificationPreference>> {
        let row = sqlx::query_as::<_, PreferenceRow>(
            r#"
            SELECT id, user_id, channel, enabled, config, created_at, updated_at
            FROM notification_preferences
            WHERE user_id = $1 AND channel = $2
            "#,
        )
        .bind(user_id)
        .bind(channel.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(PreferenceRow::into_preference).transpose()
    }

    async fn list_for_user(&self, user_id: i64) -> RepoResult<Vec<NotificationPreference>> {
        let rows = sqlx::query_as::<_, PreferenceRow>(
            r#"
            SELECT id, user_id, channel, enabled, config, created_at, updated_at
            FROM notification_preferences
            WHERE user_id = $1
            ORDER BY channel
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(PreferenceRow::into_preference).collect()
    }

    async fn upsert(&self, preference: &PreferenceUpsert) -> RepoResult<NotificationPreference> {
        let row = sqlx::query_as::<_, PreferenceRow>(
            r#"
            INSERT INTO notification_preferences (id, user_id, channel, enabled, config)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, channel)
            DO UPDATE SET enabled = EXCLUDED.enabled, config = EXCLUDED.config, updated_at = now()
            RETURNING id, user_id, channel, enabled, config, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(preference.user_id)
        .bind(preference.channel.as_str())
        .bind(preference.enabled)
        .bind(Json(&preference.config))
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        row.into_preference()
    }
}
