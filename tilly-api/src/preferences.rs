use axum::{
    extract::{Path, State},
    routing::{get, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use tilly_core::preferences::{NotificationPreference, PreferenceUpsert};
use tilly_shared::{NotificationChannel, PreferenceConfig};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PreferenceRequest {
    pub enabled: bool,
    #[serde(default)]
    pub config: PreferenceConfig,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/notifications/preferences", get(list_preferences))
        .route("/v1/notifications/preferences/{channel}", put(upsert_preference))
}

async fn list_preferences(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<NotificationPreference>>, AppError> {
    Ok(Json(state.notifications.preferences().list(user.id).await?))
}

async fn upsert_preference(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(channel): Path<String>,
    Json(req): Json<PreferenceRequest>,
) -> Result<Json<NotificationPreference>, AppError> {
    let channel = NotificationChannel::parse(&channel)
        .ok_or_else(|| AppError::ValidationError(format!("Unknown notification channel: {}", channel)))?;

    let saved = state
        .notifications
        .preferences()
        .upsert(&PreferenceUpsert {
            user_id: user.id,
            channel,
            enabled: req.enabled,
            config: req.config,
        })
        .await?;
    Ok(Json(saved))
}
