use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;
use tilly_core::cards::{Card, CardList, CardListUpdate};
use tilly_core::repository::{CardListRepository, CardRepository, RepoResult};

use crate::database::db_error;

pub struct PgCardRepository {
    pool: PgPool,
}

impl PgCardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn memberships(&self, card_ids: &[i64]) -> RepoResult<HashMap<i64, Vec<CardList>>> {
        let rows = sqlx::query_as::<_, CardListRow>(
            r#"
            SELECT id, card_id, list_id, list_stage_id, "order"
            FROM card_lists
            WHERE card_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(card_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut by_card: HashMap<i64, Vec<CardList>> = HashMap::new();
        for row in rows {
            by_card.entry(row.card_id).or_default().push(row.into());
        }
        Ok(by_card)
    }

    async fn with_memberships(&self, rows: Vec<CardRow>) -> RepoResult<Vec<Card>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut memberships = self.memberships(&ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let card_lists = memberships.remove(&row.id).unwrap_or_default();
                row.into_card(card_lists)
            })
            .collect())
    }
}

#[derive(sqlx::FromRow)]
struct CardRow {
    id: i64,
    workspace_id: i64,
    type_id: Option<i64>,
    parent_id: Option<i64>,
    data: Json<Map<String, Value>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CardRow {
    fn into_card(self, card_lists: Vec<CardList>) -> Card {
        Card {
            id: self.id,
            workspace_id: self.workspace_id,
            type_id: self.type_id,
            parent_id: self.parent_id,
            data: self.data.0,
            card_lists,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CardListRow {
    id: i64,
    card_id: i64,
    list_id: i64,
    list_stage_id: i64,
    order: f64,
}

impl From<CardListRow> for CardList {
    fn from(row: CardListRow) -> Self {
        CardList {
            id: row.id,
            card_id: row.card_id,
            list_id: row.list_id,
            list_stage_id: row.list_stage_id,
            order: row.order,
        }
    }
}

#[async_trait]
impl CardRepository for PgCardRepository {
    async fn get_card(&self, id: i64) -> RepoResult<Option<Card>> {
        let row = sqlx::query_as::<_, CardRow>(
            "SELECT id, workspace_id, type_id, parent_id, data, created_at, updated_at FROM cards WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        match row {
            Some(row) => Ok(self.with_memberships(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_cards_in_list(&self, list_id: i64) -> RepoResult<Vec<Card>> {
        let rows = sqlx::query_as::<_, CardRow>(
            r#"
            SELECT c.id, c.workspace_id, c.type_id, c.parent_id, c.data, c.created_at, c.updated_at
            FROM cards c
            JOIN card_lists cl ON cl.card_id = c.id
            WHERE cl.list_id = $1
            ORDER BY cl."order", c.id
            "#,
        )
        .bind(list_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        self.with_memberships(rows).await
    }

    async fn update_card_data(&self, id: i64, data: &Map<String, Value>) -> RepoResult<Option<Card>> {
        let row = sqlx::query_as::<_, CardRow>(
            r#"
            UPDATE cards SET data = $2, updated_at = now()
            WHERE id = $1
            RETURNING id, workspace_id, type_id, parent_id, data, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(Json(data))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        match row {
            Some(row) => Ok(self.with_memberships(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CardListRepository for PgCardRepository {
    async fn get_card_list(&self, id: i64) -> RepoResult<Option<CardList>> {
        let row = sqlx::query_as::<_, CardListRow>(
            r#"SELECT id, card_id, list_id, list_stage_id, "order" FROM card_lists WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(CardList::from))
    }

    async fn update_card_list(&self, id: i64, update: &CardListUpdate) -> RepoResult<Option<CardList>> {
        let row = sqlx::query_as::<_, CardListRow>(
            r#"
            UPDATE card_lists
            SET list_stage_id = COALESCE($2, list_stage_id),
                "order" = COALESCE($3, "order")
            WHERE id = $1
            RETURNING id, card_id, list_id, list_stage_id, "order"
            "#,
        )
        .bind(id)
        .bind(update.list_stage_id)
        .bind(update.order)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        if let Some(row) = &row {
            tracing::debug!("Card list {} now at stage {} order {}", row.id, row.list_stage_id, row.order);
        }
        Ok(row.map(CardList::from))
    }
}
