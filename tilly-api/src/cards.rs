use axum::{
    extract::{Path, State},
    routing::put,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use tilly_core::cards::{Card, CardList, CardListUpdate};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FieldValueRequest {
    pub value: Value,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/cards/{card_id}/lists/{card_list_id}", put(update_card_list))
        .route("/v1/cards/{card_id}/fields/{field_id}", put(update_field_value))
}

async fn update_card_list(
    State(state): State<AppState>,
    Path((card_id, card_list_id)): Path<(i64, i64)>,
    Json(update): Json<CardListUpdate>,
) -> Result<Json<CardList>, AppError> {
    if update.list_stage_id.is_none() && update.order.is_none() {
        return Err(AppError::ValidationError("Nothing to update".to_string()));
    }
    if update.order.is_some_and(|o| !o.is_finite()) {
        return Err(AppError::ValidationError("Order must be a finite number".to_string()));
    }

    let card_list = state
        .reorder
        .update_card_membership(card_id, card_list_id, &update)
        .await?;
    Ok(Json(card_list))
}

async fn update_field_value(
    State(state): State<AppState>,
    Path((card_id, field_id)): Path<(i64, i64)>,
    Json(req): Json<FieldValueRequest>,
) -> Result<Json<Card>, AppError> {
    let field = state.reorder.load_field(field_id).await?;
    let card = state.reorder.update_field_value(card_id, &field, &req.value).await?;
    Ok(Json(card))
}
