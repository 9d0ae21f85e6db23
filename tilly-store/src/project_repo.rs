use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use tilly_core::projects::{NewProject, Project, ProjectRole, ProjectUpdate, ProjectUser};
use tilly_core::repository::{ProjectRepository, RepoError, RepoResult};

use crate::database::db_error;

pub struct PgProjectRepository {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: i64,
    name: String,
    owner_id: i64,
    invite_code: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ProjectUserRow {
    project_id: i64,
    user_id: i64,
    role: String,
}

const COLUMNS: &str = "id, name, owner_id, invite_code, created_at, updated_at";

impl PgProjectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn with_users(&self, rows: Vec<ProjectRow>) -> RepoResult<Vec<Project>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let members = sqlx::query_as::<_, ProjectUserRow>(
            "SELECT project_id, user_id, role FROM project_users WHERE project_id = ANY($1) ORDER BY user_id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut by_project: HashMap<i64, Vec<ProjectUser>> = HashMap::new();
        for m in members {
            let role = ProjectRole::parse(&m.role)
                .ok_or_else(|| RepoError::Backend(format!("Unexpected project role {:?}", m.role)))?;
            by_project.entry(m.project_id).or_default().push(ProjectUser {
                user_id: m.user_id,
                role,
            });
        }

        Ok(rows
            .into_iter()
            .map(|r| Project {
                users: by_project.remove(&r.id).unwrap_or_default(),
                id: r.id,
                name: r.name,
                owner_id: r.owner_id,
                invite_code: r.invite_code,
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
            .collect())
    }

    async fn one(&self, row: Option<ProjectRow>) -> RepoResult<Option<Project>> {
        match row {
            Some(row) => Ok(self.with_users(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ProjectRepository for PgProjectRepository {
    async fn list_for_user(&self, user_id: i64) -> RepoResult<Vec<Project>> {
        let rows = sqlx::query_as::<_, ProjectRow>(&format!(
            r#"
            SELECT {}
            FROM projects
            WHERE id IN (SELECT project_id FROM project_users WHERE user_id = $1)
            ORDER BY id
            "#,
            COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        self.with_users(rows).await
    }

    async fn get(&self, id: i64) -> RepoResult<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!("SELECT {} FROM projects WHERE id = $1", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        self.one(row).await
    }

    async fn find_by_invite_code(&self, invite_code: &str) -> RepoResult<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!("SELECT {} FROM projects WHERE invite_code = $1", COLUMNS))
            .bind(invite_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        self.one(row).await
    }

    async fn create(&self, project: &NewProject) -> RepoResult<Project> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "INSERT INTO projects (name, owner_id, invite_code) VALUES ($1, $2, $3) RETURNING {}",
            COLUMNS
        ))
        .bind(&project.name)
        .bind(project.owner_id)
        .bind(&project.invite_code)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;

        for user in &project.users {
            sqlx::query("INSERT INTO project_users (project_id, user_id, role) VALUES ($1, $2, $3)")
                .bind(row.id)
                .bind(user.user_id)
                .bind(user.role.as_str())
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }

        tx.commit().await.map_err(db_error)?;
        tracing::info!("Project {} created for user {}", row.id, project.owner_id);

        self.one(Some(row))
            .await?
            .ok_or_else(|| RepoError::Backend("Created project vanished".to_string()))
    }

    async fn update(&self, id: i64, update: &ProjectUpdate) -> RepoResult<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "UPDATE projects SET name = COALESCE($2, name), updated_at = now() WHERE id = $1 RETURNING {}",
            COLUMNS
        ))
        .bind(id)
        .bind(&update.name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        self.one(row).await
    }

    async fn delete(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }
}
