/// Task endpoints
///
/// - `GET    /v1/tasks` - List (`?page&limit&project_id&status&priority&assignee_id`)
/// - `POST   /v1/tasks` - Create (member+), appended to its column
/// - `GET    /v1/tasks/:id`
/// - `PATCH  /v1/tasks/:id` - Update provided fields (member+)
/// - `DELETE /v1/tasks/:id` - Member+
/// - `POST   /v1/tasks/:id/move` - Move to a column and position (member+)
/// - `GET    /v1/projects/:id/board` - Kanban board
///
/// Assigning a task to someone other than the caller notifies the assignee.

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
use serde::{Deserialize, Serialize};
use serde_json::json;
use tasklane_shared::{
    auth::{
        authorization::{require_permission, ResourcePermission},
        middleware::AuthContext,
    },
    models::{
        double_option,
        notification::{CreateNotification, NotificationKind},
        project::Project,
        search_index::EntityType,
        task::{BoardColumn, CreateTask, Task, TaskFilter, TaskPriority, TaskStatus, UpdateTask},
        user::User,
    },
    notifications::notify,
};
use uuid::Uuid;
use validator::Validate;

const MAX_TAGS: usize = 20;

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    pub project_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assignee_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    pub project_id: Uuid,

    #[validate(length(min = 1, max = 500, message = "Title must be 1-500 characters"))]
    pub title: String,

    #[validate(length(max = 10000, message = "Description is too long"))]
    pub description: Option<String>,

    #[serde(default)]
    pub status: TaskStatus,

    #[serde(default)]
    pub priority: TaskPriority,

    pub assignee_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    #[validate(length(max = 20, message = "At most 20 tags"))]
    pub tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 500, message = "Title must be 1-500 characters"))]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,

    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,

    /// `null` unassigns
    #[serde(default, deserialize_with = "double_option")]
    pub assignee_id: Option<Option<Uuid>>,

    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,

    #[validate(length(max = 20, message = "At most 20 tags"))]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct MoveTaskRequest {
    pub status: TaskStatus,

    /// Zero-based; clamped to the column length
    pub position: u32,
}

#[derive(Debug, Serialize)]
pub struct BoardResponse {
    pub project_id: Uuid,
    pub columns: Vec<BoardColumn>,
}

/// Trims, lowercases and deduplicates tags, keeping first-seen order
fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len().min(MAX_TAGS));
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

async fn require_project(state: &AppState, auth: &AuthContext, id: Uuid) -> ApiResult<Project> {
    Project::find(&state.db, auth.organization_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project"))
}

/// The assignee must be an active member of the caller's organization
async fn require_assignee(state: &AppState, auth: &AuthContext, id: Uuid) -> ApiResult<()> {
    match User::find_in_organization(&state.db, auth.organization_id, id).await? {
        Some(user) if user.is_active => Ok(()),
        _ => Err(ApiError::invalid("assignee_id", "Assignee not found in organization")),
    }
}

async fn sync_index(state: &AppState, task: &Task) {
    if let Err(e) = state.search.index_task(task).await {
        tracing::warn!(error = %e, task_id = %task.id, "Failed to index task");
    }
}

/// Notifies a new assignee unless they assigned themselves
async fn notify_assignee(state: &AppState, auth: &AuthContext, task: &Task) {
    let Some(assignee_id) = task.assignee_id.filter(|id| !auth.is_self(*id)) else {
        return;
    };

    let result = notify(
        &state.db,
        &state.hub,
        CreateNotification {
            user_id: assignee_id,
            organization_id: task.organization_id,
            kind: NotificationKind::TaskAssigned,
            title: "Task assigned".to_string(),
            message: format!("You were assigned to \"{}\"", task.title),
            data: json!({
                "task_id": task.id,
                "project_id": task.project_id,
                "assigned_by": auth.user_id,
            }),
        },
    )
    .await;

    if let Err(e) = result {
        tracing::warn!(error = %e, task_id = %task.id, "Failed to notify assignee");
    }
}

pub async fn list_tasks(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(page): Query<PageParams>,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<Paginated<Task>>> {
    let filter = TaskFilter {
        project_id: query.project_id,
        status: query.status,
        priority: query.priority,
        assignee_id: query.assignee_id,
    };

    let tasks = Task::list(
        &state.db,
        auth.organization_id,
        &filter,
        page.sql_limit(),
        page.offset(),
    )
    .await?;
    let total = Task::count(&state.db, auth.organization_id, &filter).await?;

    Ok(Json(Paginated::new(tasks, total, &page)))
}

pub async fn create_task(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    require_permission(&auth, ResourcePermission::Write)?;
    req.validate()?;

    let project = require_project(&state, &auth, req.project_id).await?;
    if let Some(assignee_id) = req.assignee_id {
        require_assignee(&state, &auth, assignee_id).await?;
    }

    let task = Task::create(
        &state.db,
        CreateTask {
            organization_id: auth.organization_id,
            project_id: project.id,
            reporter_id: auth.user_id,
            assignee_id: req.assignee_id,
            title: req.title.trim().to_string(),
            description: req.description,
            status: req.status,
            priority: req.priority,
            due_date: req.due_date,
            tags: normalize_tags(req.tags),
        },
    )
    .await?;

    tracing::info!(
        task_id = %task.id,
        project_id = %task.project_id,
        status = task.status.as_str(),
        position = task.position,
        "Task created"
    );

    sync_index(&state, &task).await;
    notify_assignee(&state, &auth, &task).await;
    broadcast_event(&state, auth.organization_id, "task.created", json!(task)).await;

    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_task(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    let task = Task::find(&state.db, auth.organization_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Task"))?;

    Ok(Json(task))
}

pub async fn update_task(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    require_permission(&auth, ResourcePermission::Write)?;
    req.validate()?;

    let previous = Task::find(&state.db, auth.organization_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Task"))?;

    if let Some(Some(assignee_id)) = req.assignee_id {
        require_assignee(&state, &auth, assignee_id).await?;
    }

    let task = Task::update(
        &state.db,
        auth.organization_id,
        id,
        UpdateTask {
            title: req.title.map(|t| t.trim().to_string()),
            description: req.description,
            status: req.status,
            priority: req.priority,
            assignee_id: req.assignee_id,
            due_date: req.due_date,
            tags: req.tags.map(normalize_tags),
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Task"))?;

    tracing::info!(task_id = %task.id, user_id = %auth.user_id, "Task updated");

    sync_index(&state, &task).await;
    if task.assignee_id != previous.assignee_id {
        notify_assignee(&state, &auth, &task).await;
    }
    broadcast_event(&state, auth.organization_id, "task.updated", json!(task)).await;

    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_permission(&auth, ResourcePermission::Write)?;

    if !Task::delete(&state.db, auth.organization_id, id).await? {
        return Err(ApiError::not_found("Task"));
    }

    tracing::info!(task_id = %id, user_id = %auth.user_id, "Task deleted");

    if let Err(e) = state
        .search
        .remove(auth.organization_id, EntityType::Task, id)
        .await
    {
        tracing::warn!(error = %e, task_id = %id, "Failed to remove task from search index");
    }
    broadcast_event(&state, auth.organization_id, "task.deleted", json!({ "id": id })).await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn move_task(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<MoveTaskRequest>,
) -> ApiResult<Json<Task>> {
    require_permission(&auth, ResourcePermission::Write)?;

    let task = Task::move_to(
        &state.db,
        auth.organization_id,
        id,
        req.status,
        req.position as usize,
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Task"))?;

    tracing::info!(
        task_id = %task.id,
        status = task.status.as_str(),
        position = task.position,
        "Task moved"
    );

    sync_index(&state, &task).await;
    broadcast_event(&state, auth.organization_id, "task.moved", json!(task)).await;

    Ok(Json(task))
}

pub async fn board(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<BoardResponse>> {
    let project = require_project(&state, &auth, project_id).await?;
    let columns = Task::board(&state.db, project.id).await?;

    Ok(Json(BoardResponse {
        project_id: project.id,
        columns,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(vec![
            " Backend ".into(),
            "backend".into(),
            "".into(),
            "API".into(),
        ]);
        assert_eq!(tags, vec!["backend", "api"]);
    }

    #[test]
    fn test_create_request_defaults() {
        let req: CreateTaskRequest = serde_json::from_value(json!({
            "project_id": Uuid::new_v4(),
            "title": "Write docs",
        }))
        .unwrap();

        assert_eq!(req.status, TaskStatus::Todo);
        assert_eq!(req.priority, TaskPriority::Medium);
        assert!(req.tags.is_empty());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_update_request_unassign() {
        let req: UpdateTaskRequest = serde_json::from_str(r#"{"assignee_id": null}"#).unwrap();
        assert_eq!(req.assignee_id, Some(None));
    }

    #[test]
    fn test_too_many_tags_rejected() {
        let req = UpdateTaskRequest {
            tags: Some((0..21).map(|i| format!("t{}", i)).collect()),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_move_request_requires_position() {
        assert!(serde_json::from_str::<MoveTaskRequest>(r#"{"status": "done"}"#).is_err());
        let req: MoveTaskRequest =
            serde_json::from_str(r#"{"status": "in_progress", "position": 2}"#).unwrap();
        assert_eq!(req.status, TaskStatus::InProgress);
    }
}
