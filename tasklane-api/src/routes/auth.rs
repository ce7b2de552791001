/// Authentication endpoints
///
/// - `POST /v1/auth/register` - Create an organization and its owner
/// - `POST /v1/auth/login` - Login and get tokens
/// - `POST /v1/auth/refresh` - Exchange a refresh token for new tokens
/// - `GET  /v1/auth/me` - Current user
/// - `POST /v1/auth/change-password` - Change own password

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tasklane_shared::{
    auth::{
        jwt::{self, TokenPair},
        middleware::AuthContext,
        password,
    },
    models::{
        organization::{is_valid_subdomain, CreateOrganization, Organization},
        user::{CreateUser, User, UserRole},
    },
};
use validator::{Validate, ValidationError};

fn validate_subdomain(subdomain: &str) -> Result<(), ValidationError> {
    if is_valid_subdomain(subdomain) {
        Ok(())
    } else {
        let mut err = ValidationError::new("subdomain");
        err.message = Some(
            "Subdomain must be 3-63 lowercase letters, digits or hyphens, \
             starting and ending with a letter or digit"
                .into(),
        );
        Err(err)
    }
}

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Checked for strength separately
    pub password: String,

    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[validate(length(
        min = 1,
        max = 100,
        message = "Organization name must be 1-100 characters"
    ))]
    pub organization_name: String,

    #[validate(custom(function = "validate_subdomain"))]
    pub subdomain: String,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,
}

/// Refresh token request
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Returned by register and login
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub organization: Organization,

    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Register a new organization with its owner
///
/// The organization and the owner are created in one transaction; either
/// both exist afterwards or neither does.
///
/// # Errors
///
/// - `409 Conflict`: Email already exists / Subdomain already taken
/// - `422 Unprocessable Entity`: Validation failed or weak password
pub async fn register(
    State(state): State<AppState>,
    Json(mut req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    req.subdomain = req.subdomain.trim().to_lowercase();
    req.email = req.email.trim().to_lowercase();
    req.validate()?;
    password::validate_password_strength(&req.password)?;

    if User::find_by_email(&state.db, &req.email).await?.is_some() {
        return Err(ApiError::Conflict("Email already exists".to_string()));
    }
    if !Organization::subdomain_available(&state.db, &req.subdomain).await? {
        return Err(ApiError::Conflict("Subdomain already taken".to_string()));
    }

    let password_hash = password::hash_password(&req.password)?;

    let mut tx = state.db.begin().await?;

    let organization = Organization::create(
        &mut *tx,
        CreateOrganization {
            name: req.organization_name.trim().to_string(),
            subdomain: req.subdomain,
            plan: Default::default(),
        },
    )
    .await?;

    let user = User::create(
        &mut *tx,
        CreateUser {
            organization_id: organization.id,
            email: req.email,
            password_hash,
            name: req.name.trim().to_string(),
            role: UserRole::Owner,
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        org_id = %organization.id,
        user_id = %user.id,
        subdomain = %organization.subdomain,
        "Organization registered"
    );

    if let Err(e) = state.search.index_user(&user).await {
        tracing::warn!(error = %e, "Failed to index new user");
    }

    let tokens = jwt::issue_token_pair(user.id, organization.id, user.role, state.jwt_secret())?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user,
            organization,
            tokens,
        }),
    ))
}

/// Login with email and password
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid credentials
/// - `403 Forbidden`: Account deactivated
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    req.validate()?;

    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(invalid)?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "Login failed: wrong password");
        return Err(invalid());
    }

    if !user.is_active {
        return Err(ApiError::Forbidden("Account is deactivated".to_string()));
    }

    let organization = Organization::find_by_id(&state.db, user.organization_id)
        .await?
        .ok_or_else(|| ApiError::InternalError("User has no organization".to_string()))?;

    User::update_last_login(&state.db, user.id).await?;

    let tokens = jwt::issue_token_pair(user.id, organization.id, user.role, state.jwt_secret())?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(AuthResponse {
        user,
        organization,
        tokens,
    }))
}

/// Exchange a refresh token for a new token pair
///
/// The user is reloaded so a deactivated account or a changed role takes
/// effect at the next refresh.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let claims = jwt::validate_refresh_token(&req.refresh_token, state.jwt_secret())?;

    let user = User::find_in_organization(&state.db, claims.org, claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::Unauthorized("User no longer active".to_string()))?;

    let tokens = jwt::issue_token_pair(
        user.id,
        user.organization_id,
        user.role,
        state.jwt_secret(),
    )?;

    Ok(Json(tokens))
}

pub async fn me(State(state): State<AppState>, auth: AuthContext) -> ApiResult<Json<User>> {
    let user = User::find_in_organization(&state.db, auth.organization_id, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    Ok(Json(user))
}

pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<StatusCode> {
    let user = User::find_in_organization(&state.db, auth.organization_id, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    if !password::verify_password(&req.current_password, &user.password_hash)? {
        return Err(ApiError::invalid(
            "current_password",
            "Current password is incorrect",
        ));
    }

    password::validate_password_strength(&req.new_password)?;

    let hash = password::hash_password(&req.new_password)?;
    User::update_password(&state.db, user.id, &hash).await?;

    tracing::info!(user_id = %user.id, "Password changed");

    Ok(StatusCode::NO_CONTENT)
}
