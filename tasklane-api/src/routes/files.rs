/// File endpoints
///
/// - `POST   /v1/files/upload` - Multipart upload (member+)
/// - `GET    /v1/files` - List (`?page&limit&project_id&task_id&mime_prefix`)
/// - `GET    /v1/files/:id` - Metadata
/// - `GET    /v1/files/:id/download` - Content as an attachment
/// - `GET    /v1/files/:id/thumbnail` - 256px PNG preview of images
/// - `DELETE /v1/files/:id` - Member+
///
/// # Upload form
///
/// ```text
/// file        required, the content (its filename and Content-Type are used)
/// project_id  optional UUID
/// task_id     optional UUID; the project defaults to the task's project
/// ```

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::pagination::{PageParams, Paginated},
};
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tasklane_shared::{
    auth::{
        authorization::{require_permission, ResourcePermission},
        middleware::AuthContext,
    },
    files::{UploadOutcome, UploadRequest},
    models::{
        file::{FileFilter, FileRecord},
        project::Project,
        search_index::EntityType,
        task::Task,
    },
};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    pub project_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub mime_prefix: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file: FileRecord,
    pub duplicate: bool,
}

impl From<UploadOutcome> for UploadResponse {
    fn from(outcome: UploadOutcome) -> Self {
        Self {
            file: outcome.file,
            duplicate: outcome.duplicate,
        }
    }
}

/// Fields collected from the multipart form
#[derive(Debug, Default)]
struct UploadForm {
    file_name: Option<String>,
    content_type: Option<String>,
    data: Option<Bytes>,
    project_id: Option<Uuid>,
    task_id: Option<Uuid>,
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("Upload exceeds the request size limit".to_string())
    } else {
        ApiError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
    }
}

fn parse_uuid_field(field: &str, value: &str) -> ApiResult<Option<Uuid>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    Uuid::parse_str(value)
        .map(Some)
        .map_err(|_| ApiError::invalid(field, "Must be a UUID"))
}

async fn read_form(mut multipart: Multipart) -> ApiResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                form.file_name = field.file_name().map(str::to_string);
                form.content_type = field.content_type().map(str::to_string);
                form.data = Some(field.bytes().await.map_err(multipart_error)?);
            }
            "project_id" => {
                let text = field.text().await.map_err(multipart_error)?;
                form.project_id = parse_uuid_field("project_id", &text)?;
            }
            "task_id" => {
                let text = field.text().await.map_err(multipart_error)?;
                form.task_id = parse_uuid_field("task_id", &text)?;
            }
            other => tracing::debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    Ok(form)
}

/// `attachment` with an ASCII `filename`. Names outside ASCII also get an
/// RFC 5987 `filename*` holding the UTF-8 original.
fn content_disposition(file_name: &str) -> String {
    let name: String = file_name.chars().filter(|c| !c.is_control()).collect();
    let fallback: String = name
        .chars()
        .flat_map(|c| match c {
            '"' | '\\' => vec!['\\', c],
            c if c.is_ascii() => vec![c],
            _ => vec!['_'],
        })
        .collect();

    if name.is_ascii() {
        format!("attachment; filename=\"{}\"", fallback)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            urlencoding::encode(&name)
        )
    }
}

/// Resolves the optional project/task link inside the caller's organization
async fn resolve_links(
    state: &AppState,
    auth: &AuthContext,
    project_id: Option<Uuid>,
    task_id: Option<Uuid>,
) -> ApiResult<(Option<Uuid>, Option<Uuid>)> {
    let task = match task_id {
        Some(id) => Some(
            Task::find(&state.db, auth.organization_id, id)
                .await?
                .ok_or_else(|| ApiError::not_found("Task"))?,
        ),
        None => None,
    };

    let project_id = match (project_id, &task) {
        (Some(project_id), Some(task)) if task.project_id != project_id => {
            return Err(ApiError::invalid(
                "task_id",
                "Task does not belong to the given project",
            ));
        }
        (Some(project_id), _) => {
            Project::find(&state.db, auth.organization_id, project_id)
                .await?
                .ok_or_else(|| ApiError::not_found("Project"))?;
            Some(project_id)
        }
        (None, Some(task)) => Some(task.project_id),
        (None, None) => None,
    };

    Ok((project_id, task.map(|t| t.id)))
}

pub async fn upload(
    State(state): State<AppState>,
    auth: AuthContext,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    require_permission(&auth, ResourcePermission::Write)?;

    let form = read_form(multipart).await?;
    let data = form
        .data
        .ok_or_else(|| ApiError::invalid("file", "A file field is required"))?;

    let (project_id, task_id) = resolve_links(&state, &auth, form.project_id, form.task_id).await?;

    let outcome = state
        .files
        .upload(UploadRequest {
            organization_id: auth.organization_id,
            uploaded_by_id: auth.user_id,
            project_id,
            task_id,
            file_name: form.file_name.unwrap_or_default(),
            content_type: form.content_type,
            data,
        })
        .await?;

    let status = if outcome.duplicate {
        StatusCode::OK
    } else {
        if let Err(e) = state.search.index_file(&outcome.file).await {
            tracing::warn!(error = %e, file_id = %outcome.file.id, "Failed to index file");
        }
        StatusCode::CREATED
    };

    Ok((status, Json(outcome.into())))
}

pub async fn list_files(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(page): Query<PageParams>,
    Query(query): Query<ListFilesQuery>,
) -> ApiResult<Json<Paginated<FileRecord>>> {
    let filter = FileFilter {
        project_id: query.project_id,
        task_id: query.task_id,
        mime_prefix: query.mime_prefix.filter(|p| !p.trim().is_empty()),
    };

    let files = FileRecord::list(
        &state.db,
        auth.organization_id,
        &filter,
        page.sql_limit(),
        page.offset(),
    )
    .await?;
    let total = FileRecord::count(&state.db, auth.organization_id, &filter).await?;

    Ok(Json(Paginated::new(files, total, &page)))
}

pub async fn get_file(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<FileRecord>> {
    Ok(Json(state.files.find(auth.organization_id, id).await?))
}

pub async fn download(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let (file, data) = state.files.download(auth.organization_id, id).await?;

    tracing::debug!(file_id = %file.id, size = data.len(), "Serving download");

    Ok((
        [
            (header::CONTENT_TYPE, file.mime_type.clone()),
            (header::CONTENT_DISPOSITION, content_disposition(&file.original_name)),
        ],
        data,
    ))
}

pub async fn thumbnail(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let data = state.files.thumbnail(auth.organization_id, id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "private, max-age=86400"),
        ],
        data,
    ))
}

pub async fn delete_file(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_permission(&auth, ResourcePermission::Write)?;

    let file = state.files.delete(auth.organization_id, id).await?;

    if let Err(e) = state
        .search
        .remove(auth.organization_id, EntityType::File, file.id)
        .await
    {
        tracing::warn!(error = %e, file_id = %file.id, "Failed to remove file from search index");
    }

    Ok(StatusCode::NO_CONTENT)
}
