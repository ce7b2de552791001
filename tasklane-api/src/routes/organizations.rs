/// Organization endpoints
///
/// - `GET   /v1/organizations/current`
/// - `PATCH /v1/organizations/current` - Admin+; plan changes need the owner
/// - `GET   /v1/organizations/current/stats` - Dashboard counters
/// - `GET   /v1/organizations/subdomain/:subdomain` - Availability check (public)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tasklane_shared::{
    auth::{authorization::require_role, middleware::AuthContext},
    models::{
        organization::{
            is_valid_subdomain, Organization, OrganizationPlan, OrganizationStats,
            UpdateOrganization,
        },
        user::UserRole,
    },
};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateOrganizationRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    #[validate(url(message = "Logo must be a valid URL"))]
    pub logo_url: Option<String>,

    pub plan: Option<OrganizationPlan>,

    /// Merged into the stored settings
    pub settings: Option<JsonValue>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubdomainAvailability {
    pub subdomain: String,
    pub valid: bool,
    pub available: bool,
}

async fn load_current(state: &AppState, auth: &AuthContext) -> ApiResult<Organization> {
    Organization::find_by_id(&state.db, auth.organization_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Organization"))
}

pub async fn current(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<Organization>> {
    Ok(Json(load_current(&state, &auth).await?))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<UpdateOrganizationRequest>,
) -> ApiResult<Json<Organization>> {
    require_role(&auth, UserRole::Admin)?;
    if req.plan.is_some() {
        require_role(&auth, UserRole::Owner)?;
    }
    req.validate()?;

    if let Some(settings) = &req.settings {
        if !settings.is_object() {
            return Err(ApiError::invalid("settings", "Settings must be a JSON object"));
        }
    }

    let organization = Organization::update(
        &state.db,
        auth.organization_id,
        UpdateOrganization {
            name: req.name.map(|n| n.trim().to_string()),
            logo_url: req.logo_url,
            plan: req.plan,
            settings: req.settings,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Organization"))?;

    tracing::info!(org_id = %organization.id, updated_by = %auth.user_id, "Organization updated");

    Ok(Json(organization))
}

pub async fn stats(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<OrganizationStats>> {
    let stats = OrganizationStats::collect(&state.db, auth.organization_id).await?;
    Ok(Json(stats))
}

/// Public so the signup form can check a subdomain before registering
pub async fn check_subdomain(
    State(state): State<AppState>,
    Path(subdomain): Path<String>,
) -> ApiResult<Json<SubdomainAvailability>> {
    let subdomain = subdomain.trim().to_lowercase();
    let valid = is_valid_subdomain(&subdomain);

    let available = valid && Organization::subdomain_available(&state.db, &subdomain).await?;

    Ok(Json(SubdomainAvailability {
        subdomain,
        valid,
        available,
    }))
}
