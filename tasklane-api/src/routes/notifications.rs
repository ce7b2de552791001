/// Notification inbox of the caller
///
/// - `GET    /v1/notifications` - List (`?page&limit&unread_only`)
/// - `GET    /v1/notifications/unread-count`
/// - `POST   /v1/notifications/read-all`
/// - `PATCH  /v1/notifications/:id/read`
/// - `DELETE /v1/notifications/:id`
///
/// Every query filters by the caller's user id, so another user's
/// notification is reported as missing.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::pagination::{PageParams, Paginated},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tasklane_shared::{auth::middleware::AuthContext, models::notification::Notification};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCount {
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(page): Query<PageParams>,
    Query(query): Query<ListNotificationsQuery>,
) -> ApiResult<Json<Paginated<Notification>>> {
    let items = Notification::list_for_user(
        &state.db,
        auth.user_id,
        query.unread_only,
        page.sql_limit(),
        page.offset(),
    )
    .await?;
    let total = Notification::count_for_user(&state.db, auth.user_id, query.unread_only).await?;

    Ok(Json(Paginated::new(items, total, &page)))
}

pub async fn unread_count(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<UnreadCount>> {
    let count = Notification::unread_count(&state.db, auth.user_id).await?;
    Ok(Json(UnreadCount { count }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Notification>> {
    let notification = Notification::mark_read(&state.db, auth.user_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Notification"))?;

    Ok(Json(notification))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<MarkAllReadResponse>> {
    let updated = Notification::mark_all_read(&state.db, auth.user_id).await?;

    tracing::debug!(user_id = %auth.user_id, updated, "Marked notifications read");

    Ok(Json(MarkAllReadResponse { updated }))
}

pub async fn delete(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !Notification::delete(&state.db, auth.user_id, id).await? {
        return Err(ApiError::not_found("Notification"));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unread_only_defaults_to_false() {
        let query: ListNotificationsQuery = serde_json::from_str("{}").unwrap();
        assert!(!query.unread_only);
    }
}
