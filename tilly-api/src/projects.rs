use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use tilly_core::projects::{NewProject, Project, ProjectUpdate};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/projects", get(list_projects).post(create_project))
        .route(
            "/v1/projects/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
}

/// Routes reachable without a token.
pub fn public_routes() -> Router<AppState> {
    Router::new().route("/v1/projects/invite/{code}", get(find_by_invite_code))
}

async fn member_project(state: &AppState, id: i64, user: CurrentUser) -> Result<Project, AppError> {
    let project = state
        .projects
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Project {} not found", id)))?;
    if !project.is_member(user.id) {
        return Err(AppError::AuthorizationError("Not a member of this project".to_string()));
    }
    Ok(project)
}

async fn list_projects(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<Project>>, AppError> {
    Ok(Json(state.projects.list_for_user(user.id).await?))
}

async fn get_project(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<Project>, AppError> {
    Ok(Json(member_project(&state, id, user).await?))
}

async fn create_project(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::ValidationError("Project name is required".to_string()));
    }

    let project = state.projects.create(&NewProject::owned_by(name.to_string(), user.id)).await?;
    tracing::info!("User {} created project {}", user.id, project.id);
    Ok((StatusCode::CREATED, Json(project)))
}

async fn update_project(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(update): Json<ProjectUpdate>,
) -> Result<Json<Project>, AppError> {
    member_project(&state, id, user).await?;
    let project = state
        .projects
        .update(id, &update)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Project {} not found", id)))?;
    Ok(Json(project))
}

async fn delete_project(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let project = member_project(&state, id, user).await?;
    if project.owner_id != user.id {
        return Err(AppError::AuthorizationError("Only the owner can delete a project".to_string()));
    }

    if state.projects.delete(id).await? {
        tracing::info!("Project {} deleted by user {}", id, user.id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFoundError(format!("Project {} not found", id)))
    }
}

async fn find_by_invite_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Project>, AppError> {
    let project = state
        .projects
        .find_by_invite_code(&code)
        .await?
        .ok_or_else(|| AppError::NotFoundError("Invite code not found".to_string()))?;
    Ok(Json(project))
}
