/// Project endpoints
///
/// - `GET    /v1/projects` - List (`?page&limit&status&search`)
/// - `POST   /v1/projects` - Create (member+)
/// - `GET    /v1/projects/:id`
/// - `PATCH  /v1/projects/:id` - Update provided fields (member+)
/// - `DELETE /v1/projects/:id` - Project owner or admin+
/// - `GET    /v1/projects/:id/stats` - Task counts and progress
///
/// Every write refreshes the project's search index row and publishes an
/// event to the organization room.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::pagination::{PageParams, Paginated},
    routes::gateway::broadcast_event,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tasklane_shared::{
    auth::{
        authorization::{require_permission, require_project_owner_or_admin, ResourcePermission},
        middleware::AuthContext,
    },
    models::{
        double_option,
        project::{
            CreateProject, Project, ProjectFilter, ProjectStats, ProjectStatus, UpdateProject,
        },
    },
};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct ListProjectsQuery {
    pub status: Option<ProjectStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    #[validate(length(max = 5000, message = "Description is too long"))]
    pub description: Option<String>,

    #[serde(default)]
    pub status: ProjectStatus,

    pub color: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProjectRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,

    pub status: Option<ProjectStatus>,

    #[serde(default, deserialize_with = "double_option")]
    pub color: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub start_date: Option<Option<NaiveDate>>,

    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,
}

/// `#rrggbb`
fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

fn check_color(color: Option<&str>) -> ApiResult<()> {
    match color {
        Some(c) if !is_hex_color(c) => Err(ApiError::invalid("color", "Color must be #rrggbb")),
        _ => Ok(()),
    }
}

fn check_dates(start: Option<NaiveDate>, due: Option<NaiveDate>) -> ApiResult<()> {
    match (start, due) {
        (Some(start), Some(due)) if due < start => Err(ApiError::invalid(
            "due_date",
            "Due date must not be before the start date",
        )),
        _ => Ok(()),
    }
}

async fn sync_index(state: &AppState, project: &Project) {
    if let Err(e) = state.search.index_project(project).await {
        tracing::warn!(error = %e, project_id = %project.id, "Failed to index project");
    }
}

pub async fn list_projects(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(page): Query<PageParams>,
    Query(query): Query<ListProjectsQuery>,
) -> ApiResult<Json<Paginated<Project>>> {
    let filter = ProjectFilter {
        status: query.status,
        search: query.search.filter(|s| !s.trim().is_empty()),
    };

    let projects = Project::list(
        &state.db,
        auth.organization_id,
        &filter,
        page.sql_limit(),
        page.offset(),
    )
    .await?;
    let total = Project::count(&state.db, auth.organization_id, &filter).await?;

    Ok(Json(Paginated::new(projects, total, &page)))
}

pub async fn create_project(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    require_permission(&auth, ResourcePermission::Write)?;
    req.validate()?;
    check_color(req.color.as_deref())?;
    check_dates(req.start_date, req.due_date)?;

    let project = Project::create(
        &state.db,
        CreateProject {
            organization_id: auth.organization_id,
            owner_id: auth.user_id,
            name: req.name.trim().to_string(),
            description: req.description,
            status: req.status,
            color: req.color.map(|c| c.to_lowercase()),
            start_date: req.start_date,
            due_date: req.due_date,
        },
    )
    .await?;

    tracing::info!(project_id = %project.id, user_id = %auth.user_id, "Project created");

    sync_index(&state, &project).await;
    broadcast_event(&state, auth.organization_id, "project.created", json!(project)).await;

    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn get_project(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Project>> {
    let project = Project::find(&state.db, auth.organization_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project"))?;

    Ok(Json(project))
}

pub async fn update_project(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProjectRequest>,
) -> ApiResult<Json<Project>> {
    require_permission(&auth, ResourcePermission::Write)?;
    req.validate()?;
    check_color(req.color.as_ref().and_then(|c| c.as_deref()))?;

    let current = Project::find(&state.db, auth.organization_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project"))?;

    let start = req.start_date.unwrap_or(current.start_date);
    let due = req.due_date.unwrap_or(current.due_date);
    check_dates(start, due)?;

    let project = Project::update(
        &state.db,
        auth.organization_id,
        id,
        UpdateProject {
            name: req.name.map(|n| n.trim().to_string()),
            description: req.description,
            status: req.status,
            color: req.color.map(|c| c.map(|c| c.to_lowercase())),
            start_date: req.start_date,
            due_date: req.due_date,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Project"))?;

    tracing::info!(project_id = %project.id, user_id = %auth.user_id, "Project updated");

    sync_index(&state, &project).await;
    broadcast_event(&state, auth.organization_id, "project.updated", json!(project)).await;

    Ok(Json(project))
}

/// Deletes a project together with its tasks
pub async fn delete_project(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let project = Project::find(&state.db, auth.organization_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project"))?;

    require_project_owner_or_admin(&auth, project.owner_id)?;

    if !Project::delete(&state.db, auth.organization_id, id).await? {
        return Err(ApiError::not_found("Project"));
    }

    tracing::info!(project_id = %id, user_id = %auth.user_id, "Project deleted");

    if let Err(e) = state.search.remove_project(auth.organization_id, id).await {
        tracing::warn!(error = %e, project_id = %id, "Failed to remove project from search index");
    }
    broadcast_event(
        &state,
        auth.organization_id,
        "project.deleted",
        json!({ "id": id }),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn project_stats(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ProjectStats>> {
    let project = Project::find(&state.db, auth.organization_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project"))?;

    let stats = ProjectStats::collect(&state.db, project.id).await?;

    Ok(Json(stats))
}
