use crate::models::projects::{NewProject, Project, ProjectStatus};
use crate::web::pagination::{Paginated, PaginationParams};
use crate::{ApiError, AppState, User};
use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;
use validator::Validate;

pub fn router(app_state: Arc<AppState>) -> Router<()> {
    Router::new()
        .route("/projects", post(create_project))
        .route("/projects", get(list_projects))
        .route("/projects/:project_id", get(get_project))
        .route("/projects/:project_id", put(update_project))
        .route("/projects/:project_id", delete(delete_project))
        .with_state(app_state)
}

#[derive(Deserialize, Clone, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 500, message = "Description must not exceed 500 characters"))]
    pub description: Option<String>,
}

/// Update payload. `description` distinguishes "absent" (leave unchanged)
/// from an explicit `null` (clear the field).
#[derive(Deserialize, Clone, Validate)]
pub struct UpdateProjectRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<Option<String>>,
    pub status: Option<String>,
}

/// Loads a project by UUID and confirms the caller owns it. Foreign projects
/// are reported as missing rather than forbidden.
fn owned_project(data: &AppState, user: &User, project_id: Uuid) -> Result<Project, ApiError> {
    let project = data.db.get_project_by_uuid(project_id)?;
    if project.owner_id != user.uuid {
        return Err(ApiError::NotFound);
    }
    Ok(project)
}

async fn create_project(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(create_request): Json<CreateProjectRequest>,
) -> Result<Json<Project>, ApiError> {
    debug!("Creating new project");

    if let Err(errors) = create_request.validate() {
        error!("Validation error: {:?}", errors);
        return Err(ApiError::ValidationError(errors.to_string()));
    }

    let new_project = NewProject::new(user.uuid, create_request.name, create_request.description);
    let project = data.db.create_project(new_project).map_err(|e| {
        error!("Failed to create project: {:?}", e);
        ApiError::InternalServerError
    })?;

    Ok(Json(project))
}

async fn list_projects(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<Project>>, ApiError> {
    debug!("Listing projects");

    let (projects, total) = data
        .db
        .get_projects_for_owner(user.uuid, params.page(), params.per_page())
        .map_err(|e| {
            error!("Failed to list projects: {:?}", e);
            ApiError::InternalServerError
        })?;

    Ok(Json(Paginated::new(projects, &params, total)))
}

async fn get_project(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Project>, ApiError> {
    debug!("Fetching project");

    let project = owned_project(&data, &user, project_id)?;
    Ok(Json(project))
}

async fn update_project(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(project_id): Path<Uuid>,
    Json(update_request): Json<UpdateProjectRequest>,
) -> Result<Json<Project>, ApiError> {
    debug!("Updating project");

    if let Err(errors) = update_request.validate() {
        error!("Validation error: {:?}", errors);
        return Err(ApiError::ValidationError(errors.to_string()));
    }

    let mut project = owned_project(&data, &user, project_id)?;

    if let Some(name) = update_request.name {
        project.name = name;
    }
    if let Some(description) = update_request.description {
        project.description = description;
    }
    if let Some(status) = update_request.status {
        let status = ProjectStatus::parse(&status).ok_or_else(|| {
            ApiError::ValidationError(format!("Unknown project status: {}", status))
        })?;
        project.status = status.as_str().to_string();
    }

    data.db.update_project(&project).map_err(|e| {
        error!("Failed to update project: {:?}", e);
        ApiError::InternalServerError
    })?;

    // Read the row back so updated_at reflects the write
    let project = data.db.get_project_by_uuid(project_id)?;
    Ok(Json(project))
}

async fn delete_project(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    debug!("Deleting project");

    let project = owned_project(&data, &user, project_id)?;

    data.db.delete_project(&project).map_err(|e| {
        error!("Failed to delete project: {:?}", e);
        ApiError::InternalServerError
    })?;

    Ok(Json(serde_json::json!({
        "message": "Project deleted successfully"
    })))
}
