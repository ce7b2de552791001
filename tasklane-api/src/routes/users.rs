/// User management within the caller's organization
///
/// - `GET    /v1/users` - List (`?page&limit&search&role`)
/// - `POST   /v1/users` - Create (admin+)
/// - `GET    /v1/users/:id`
/// - `PATCH  /v1/users/:id` - Self for profile fields, admin+ for role/status
/// - `DELETE /v1/users/:id` - Admin+, never self or the last owner

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
use serde::Deserialize;
use tasklane_shared::{
    auth::{
        authorization::{require_can_grant, require_can_manage_user},
        middleware::AuthContext,
        password,
    },
    models::{
        double_option,
        search_index::EntityType,
        user::{CreateUser, UpdateUser, User, UserFilter, UserRole},
    },
};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub search: Option<String>,
    pub role: Option<UserRole>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,

    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[serde(default)]
    pub role: UserRole,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub avatar_url: Option<Option<String>>,

    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

async fn sync_index(state: &AppState, user: &User) {
    if let Err(e) = state.search.index_user(user).await {
        tracing::warn!(error = %e, user_id = %user.id, "Failed to index user");
    }
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(page): Query<PageParams>,
    Query(query): Query<ListUsersQuery>,
) -> ApiResult<Json<Paginated<User>>> {
    let filter = UserFilter {
        search: query.search.filter(|s| !s.trim().is_empty()),
        role: query.role,
    };

    let users = User::list(
        &state.db,
        auth.organization_id,
        &filter,
        page.sql_limit(),
        page.offset(),
    )
    .await?;
    let total = User::count(&state.db, auth.organization_id, &filter).await?;

    Ok(Json(Paginated::new(users, total, &page)))
}

pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    require_can_grant(&auth, req.role)?;
    req.validate()?;
    password::validate_password_strength(&req.password)?;

    if User::find_by_email(&state.db, &req.email).await?.is_some() {
        return Err(ApiError::Conflict("Email already exists".to_string()));
    }

    let user = User::create(
        &state.db,
        CreateUser {
            organization_id: auth.organization_id,
            email: req.email,
            password_hash: password::hash_password(&req.password)?,
            name: req.name.trim().to_string(),
            role: req.role,
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, created_by = %auth.user_id, role = user.role.as_str(), "User created");
    sync_index(&state, &user).await;

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<User>> {
    let user = User::find_in_organization(&state.db, auth.organization_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    req.validate()?;

    let target = User::find_in_organization(&state.db, auth.organization_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    let changes_profile = req.name.is_some() || req.avatar_url.is_some();
    let changes_access = req.role.is_some() || req.is_active.is_some();

    if changes_profile && !auth.is_self(id) {
        require_can_manage_user(&auth, target.role)?;
    }
    if changes_access {
        require_can_manage_user(&auth, target.role)?;
        if let Some(role) = req.role {
            require_can_grant(&auth, role)?;
        }
        if auth.is_self(id) {
            return Err(ApiError::Forbidden(
                "You cannot change your own role or status".to_string(),
            ));
        }
    }

    let update = UpdateUser {
        name: req.name.map(|n| n.trim().to_string()),
        avatar_url: req.avatar_url,
        role: req.role,
        is_active: req.is_active,
    };

    if update.is_empty() {
        return Ok(Json(target));
    }

    let user = User::update(&state.db, auth.organization_id, id, update)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    sync_index(&state, &user).await;

    Ok(Json(user))
}

pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if auth.is_self(id) {
        return Err(ApiError::Forbidden("You cannot delete yourself".to_string()));
    }

    let target = User::find_in_organization(&state.db, auth.organization_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    require_can_manage_user(&auth, target.role)?;

    if !User::delete(&state.db, auth.organization_id, id).await? {
        return Err(ApiError::not_found("User"));
    }

    tracing::info!(user_id = %id, deleted_by = %auth.user_id, "User deleted");

    if let Err(e) = state
        .search
        .remove(auth.organization_id, EntityType::User, id)
        .await
    {
        tracing::warn!(error = %e, user_id = %id, "Failed to remove user from search index");
    }

    Ok(StatusCode::NO_CONTENT)
}
