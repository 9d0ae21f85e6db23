use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tilly_core::fields::{Field, FieldItem, FieldType};
use tilly_core::filters::{QueryFilter, ViewFilter};
use tilly_core::lists::{List, ListGroup, ListGroupOption, ListStage, View, ViewOptions};
use tilly_core::repository::{ListRepository, RepoResult};

use crate::database::{db_error, decode_text};

pub struct PgListRepository {
    pool: PgPool,
}

impl PgListRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ListRow {
    id: i64,
    workspace_id: i64,
    name: String,
    default_card_type_id: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct StageRow {
    id: i64,
    list_id: i64,
    name: String,
    color: Option<String>,
    order: f64,
    is_completed: bool,
}

#[derive(sqlx::FromRow)]
struct FieldRow {
    id: i64,
    slug: String,
    name: String,
    #[sqlx(rename = "type")]
    field_type: String,
    items: Json<Vec<FieldItem>>,
}

impl FieldRow {
    fn into_field(self) -> RepoResult<Field> {
        Ok(Field {
            id: self.id,
            slug: self.slug,
            name: self.name,
            field_type: decode_text::<FieldType>("field type", &self.field_type)?,
            items: self.items.0,
        })
    }
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: i64,
    list_id: i64,
    name: String,
    #[sqlx(rename = "type")]
    group_type: String,
    entity_id: Option<i64>,
    entity_type: Option<String>,
    field_id: Option<i64>,
    filter: Option<Json<QueryFilter>>,
    is_expanded: bool,
    order: f64,
}

#[derive(sqlx::FromRow)]
struct ViewRow {
    id: i64,
    list_id: i64,
    name: String,
    options: Json<ViewOptions>,
    filters: Option<Json<ViewFilter>>,
}

const GROUP_COLUMNS: &str =
    r#"id, list_id, name, type, entity_id, entity_type, field_id, filter, is_expanded, "order""#;

impl PgListRepository {
    async fn group_from_row(&self, row: GroupRow) -> RepoResult<ListGroup> {
        let field = match row.field_id {
            Some(field_id) => self.get_field(field_id).await?,
            None => None,
        };
        Ok(ListGroup {
            id: row.id,
            list_id: row.list_id,
            name: row.name,
            group_type: decode_text::<ListGroupOption>("group type", &row.group_type)?,
            entity_id: row.entity_id,
            entity_type: row.entity_type,
            field,
            filter: row.filter.map(|f| f.0),
            is_expanded: row.is_expanded,
            order: row.order,
        })
    }
}

#[async_trait]
impl ListRepository for PgListRepository {
    async fn get_list(&self, id: i64) -> RepoResult<Option<List>> {
        let Some(list) = sqlx::query_as::<_, ListRow>(
            "SELECT id, workspace_id, name, default_card_type_id FROM lists WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        else {
            return Ok(None);
        };

        let stages = sqlx::query_as::<_, StageRow>(
            r#"
            SELECT id, list_id, name, color, "order", is_completed
            FROM list_stages
            WHERE list_id = $1
            ORDER BY "order", id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(Some(List {
            id: list.id,
            workspace_id: list.workspace_id,
            name: list.name,
            default_card_type_id: list.default_card_type_id,
            list_stages: stages
                .into_iter()
                .map(|s| ListStage {
                    id: s.id,
                    list_id: s.list_id,
                    name: s.name,
                    color: s.color,
                    order: s.order,
                    is_completed: s.is_completed,
                })
                .collect(),
        }))
    }

    async fn get_group(&self, id: i64) -> RepoResult<Option<ListGroup>> {
        let row = sqlx::query_as::<_, GroupRow>(&format!("SELECT {} FROM list_groups WHERE id = $1", GROUP_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        match row {
            Some(row) => Ok(Some(self.group_from_row(row).await?)),
            None => Ok(None),
        }
    }

    async fn set_group_expanded(&self, id: i64, is_expanded: bool) -> RepoResult<Option<ListGroup>> {
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            "UPDATE list_groups SET is_expanded = $2 WHERE id = $1 RETURNING {}",
            GROUP_COLUMNS
        ))
        .bind(id)
        .bind(is_expanded)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        match row {
            Some(row) => Ok(Some(self.group_from_row(row).await?)),
            None => Ok(None),
        }
    }

    async fn get_view(&self, id: i64) -> RepoResult<Option<View>> {
        let row = sqlx::query_as::<_, ViewRow>("SELECT id, list_id, name, options, filters FROM views WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(row.map(|v| View {
            id: v.id,
            list_id: v.list_id,
            name: v.name,
            options: v.options.0,
            filters: v.filters.map(|f| f.0),
        }))
    }

    async fn get_field(&self, id: i64) -> RepoResult<Option<Field>> {
        let row = sqlx::query_as::<_, FieldRow>("SELECT id, slug, name, type, items FROM fields WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(FieldRow::into_field).transpose()
    }
}
