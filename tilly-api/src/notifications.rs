use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, patch, post},
    Extension, Json, Router,
};
use futures_util::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use tilly_core::notifications::{Notification, NotificationQuery, NotificationUpdate};
use tilly_shared::{NotificationEvent, NotificationType};
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationParams {
    pub workspace_id: i64,
    #[serde(default)]
    pub is_read: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub event: NotificationEvent,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/notifications", get(list_notifications))
        .route("/v1/notifications/read", post(mark_all_as_read))
        .route("/v1/notifications/stream", get(stream_notifications))
        .route("/v1/notifications/events", post(queue_event))
        .route(
            "/v1/notifications/{id}",
            patch(update_notification).delete(delete_notification),
        )
}

async fn owned_notification(state: &AppState, id: Uuid, user: CurrentUser) -> Result<Notification, AppError> {
    state
        .notifications
        .find_one(id)
        .await?
        .filter(|n| n.recipient_id == user.id)
        .ok_or_else(|| AppError::NotFoundError(format!("Notification {} not found", id)))
}

async fn list_notifications(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(params): Query<NotificationParams>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let query = NotificationQuery {
        recipient_id: user.id,
        workspace_id: params.workspace_id,
        is_read: params.is_read,
    };
    Ok(Json(state.notifications.find_all(&query).await?))
}

async fn update_notification(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(update): Json<NotificationUpdate>,
) -> Result<Json<Notification>, AppError> {
    owned_notification(&state, id, user).await?;
    let notification = state
        .notifications
        .update(id, &update)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Notification {} not found", id)))?;
    Ok(Json(notification))
}

async fn delete_notification(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    owned_notification(&state, id, user).await?;
    state.notifications.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mark_all_as_read(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Value>, AppError> {
    let updated = state.notifications.mark_all_as_read(user.id).await?;
    tracing::debug!("Marked {} notifications read for user {}", updated, user.id);
    Ok(Json(json!({ "updated": updated })))
}

/// Server-sent events carrying the caller's new notifications.
async fn stream_notifications(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (rx, guard) = state.gateway.subscribe(user.id).into_parts();

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let _connection = &guard;
        let event = match result {
            Ok(pushed) if pushed.recipient_id == user.id => {
                match Event::default().event("notification").json_data(&pushed.notification) {
                    Ok(event) => Some(Ok(event)),
                    Err(e) => {
                        tracing::error!("Failed to encode notification {}: {}", pushed.notification.id, e);
                        None
                    }
                }
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Notification stream for user {} lagged: {}", user.id, e);
                None
            }
        };
        async move { event }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Queues an event for fan-out. The caller is recorded as the actor.
async fn queue_event(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<EventRequest>,
) -> Result<StatusCode, AppError> {
    let mut event = req.event;
    event.actor_id = Some(user.id);
    if event.recipient_ids.is_empty() {
        return Err(AppError::ValidationError("At least one recipient is required".to_string()));
    }

    state
        .notifications
        .add_to_queue(req.notification_type, event)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    Ok(StatusCode::ACCEPTED)
}
