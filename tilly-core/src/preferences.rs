use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tilly_shared::{NotificationChannel, PreferenceConfig};
use uuid::Uuid;

use crate::repository::{PreferenceRepository, RepoResult};

/// Whether one class of notifications reaches one delivery channel for a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreference {
    pub id: Uuid,
    pub user_id: i64,
    pub channel: NotificationChannel,
    pub enabled: bool,
    #[serde(default)]
    pub config: PreferenceConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceUpsert {
    pub user_id: i64,
    pub channel: NotificationChannel,
    pub enabled: bool,
    #[serde(default)]
    pub config: PreferenceConfig,
}

/// Effective chat settings for a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSettings {
    pub is_dm_enabled: bool,
    /// Chat-side conversation the user's direct messages go to.
    pub channel_id: Option<String>,
}

/// Reads preferences at dispatch time.
///
/// A user without an in-app row receives in-app notifications. A user without
/// a chat row has no chat integration and receives no direct messages.
#[derive(Clone)]
pub struct PreferenceService {
    repo: Arc<dyn PreferenceRepository>,
}

impl PreferenceService {
    pub fn new(repo: Arc<dyn PreferenceRepository>) -> Self {
        Self { repo }
    }

    pub async fn is_in_app_enabled(&self, user_id: i64) -> RepoResult<bool> {
        let pref = self.repo.find(user_id, NotificationChannel::InApp).await?;
        Ok(pref.map(|p| p.enabled).unwrap_or(true))
    }

    pub async fn chat_settings(&self, user_id: i64) -> RepoResult<ChatSettings> {
        let pref = self.repo.find(user_id, NotificationChannel::Slack).await?;
        Ok(match pref {
            Some(p) if p.enabled => ChatSettings {
                is_dm_enabled: p.config.is_dm_enabled,
                channel_id: p.config.channel_id,
            },
            _ => ChatSettings::default(),
        })
    }

    pub async fn list(&self, user_id: i64) -> RepoResult<Vec<NotificationPreference>> {
        self.repo.list_for_user(user_id).await
    }

    pub async fn upsert(&self, preference: &PreferenceUpsert) -> RepoResult<NotificationPreference> {
        let saved = self.repo.upsert(preference).await?;
        tracing::info!(
            "Preference {} for user {} set to enabled={}",
            saved.channel,
            saved.user_id,
            saved.enabled
        );
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn test_defaults_without_rows() {
        let service = PreferenceService::new(Arc::new(MemoryStore::new()));
        assert!(service.is_in_app_enabled(1).await.unwrap());
        assert_eq!(service.chat_settings(1).await.unwrap(), ChatSettings::default());
    }

    #[tokio::test]
    async fn test_disabled_chat_channel_overrides_dm_flag() {
        let service = PreferenceService::new(Arc::new(MemoryStore::new()));
        service
            .upsert(&PreferenceUpsert {
                user_id: 1,
                channel: NotificationChannel::Slack,
                enabled: false,
                config: PreferenceConfig { is_dm_enabled: true, channel_id: None },
            })
            .await
            .unwrap();
        assert!(!service.chat_settings(1).await.unwrap().is_dm_enabled);

        service
            .upsert(&PreferenceUpsert {
                user_id: 1,
                channel: NotificationChannel::Slack,
                enabled: true,
                config: PreferenceConfig { is_dm_enabled: true, channel_id: Some("D024BE91L".into()) },
            })
            .await
            .unwrap();
        let settings = service.chat_settings(1).await.unwrap();
        assert!(settings.is_dm_enabled);
        assert_eq!(settings.channel_id.as_deref(), Some("D024BE91L"));
        assert_eq!(service.list(1).await.unwrap().len(), 1);
    }
}
