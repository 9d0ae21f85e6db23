use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;
use tilly_core::cards::Card;
use tilly_core::drag::DropDestination;
use tilly_core::grouping::CardPrefill;
use tilly_core::lists::ListGroup;
use tilly_core::reorder::{DropOutcome, DropRequest};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropBody {
    pub view_id: i64,
    pub card_id: i64,
    pub new_index: usize,
    pub destination: DropDestination,
    /// Client UTC offset; relative date groups resolve against the client's day.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientClock {
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCardsParams {
    pub view_id: i64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/lists/{list_id}/groups/{group_id}/drop", post(drop_card))
        .route("/v1/lists/{list_id}/groups/{group_id}/prefill", get(prefill_card))
        .route("/v1/lists/{list_id}/groups/{group_id}/cards", get(group_cards))
        .route("/v1/lists/{list_id}/groups/{group_id}/toggle", post(toggle_group))
}

fn client_now(utc_offset_minutes: Option<i32>) -> Result<DateTime<FixedOffset>, AppError> {
    let minutes = utc_offset_minutes.unwrap_or(0);
    let offset = FixedOffset::east_opt(minutes.saturating_mul(60))
        .ok_or_else(|| AppError::ValidationError(format!("Invalid UTC offset: {} minutes", minutes)))?;
    Ok(Utc::now().with_timezone(&offset))
}

async fn drop_card(
    State(state): State<AppState>,
    Path((list_id, group_id)): Path<(i64, i64)>,
    Json(body): Json<DropBody>,
) -> Result<Json<DropOutcome>, AppError> {
    let now = client_now(body.utc_offset_minutes)?;
    let request = DropRequest {
        list_id,
        group_id,
        view_id: body.view_id,
        card_id: body.card_id,
        new_index: body.new_index,
        destination: body.destination,
    };

    let outcome = state.reorder.handle_drop(request, &now).await?;
    tracing::info!(
        "Card {} dropped at {} in group {} of list {}",
        body.card_id,
        body.new_index,
        group_id,
        list_id
    );
    Ok(Json(outcome))
}

async fn prefill_card(
    State(state): State<AppState>,
    Path((list_id, group_id)): Path<(i64, i64)>,
    Query(clock): Query<ClientClock>,
) -> Result<Json<CardPrefill>, AppError> {
    let now = client_now(clock.utc_offset_minutes)?;
    Ok(Json(state.reorder.prefill(list_id, group_id, &now).await?))
}

async fn group_cards(
    State(state): State<AppState>,
    Path((list_id, group_id)): Path<(i64, i64)>,
    Query(params): Query<GroupCardsParams>,
) -> Result<Json<Vec<Card>>, AppError> {
    Ok(Json(state.reorder.group_cards(list_id, group_id, params.view_id).await?))
}

async fn toggle_group(
    State(state): State<AppState>,
    Path((list_id, group_id)): Path<(i64, i64)>,
) -> Result<Json<ListGroup>, AppError> {
    Ok(Json(state.reorder.toggle_group(list_id, group_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_now_applies_offset() {
        let now = client_now(Some(-300)).unwrap();
        assert_eq!(now.offset().local_minus_utc(), -300 * 60);
        assert!(client_now(Some(24 * 60)).is_err());
    }
}
