/// Role-based access checks
///
/// Roles come from the access token, so these checks are pure functions over
/// the [`AuthContext`]. Tenant isolation is enforced separately by scoping
/// every query to `auth.organization_id`.
///
/// | Permission | Minimum role |
/// |------------|--------------|
/// | Read       | viewer       |
/// | Write      | member       |
/// | Manage     | admin        |
/// | Own        | owner        |
use uuid::Uuid;

use super::middleware::AuthContext;
use crate::models::user::UserRole;

#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    #[error("Insufficient permissions: requires {} role", .required.as_str())]
    InsufficientRole { required: UserRole, actual: UserRole },

    #[error("{0}")]
    Forbidden(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcePermission {
    Read,
    Write,
    Manage,
    Own,
}

impl ResourcePermission {
    pub fn min_role(&self) -> UserRole {
        match self {
            ResourcePermission::Read => UserRole::Viewer,
            ResourcePermission::Write => UserRole::Member,
            ResourcePermission::Manage => UserRole::Admin,
            ResourcePermission::Own => UserRole::Owner,
        }
    }
}

pub fn require_role(auth: &AuthContext, required: UserRole) -> Result<(), AuthzError> {
    if !auth.role.has_permission(&required) {
        return Err(AuthzError::InsufficientRole {
            required,
            actual: auth.role,
        });
    }

    Ok(())
}

pub fn require_permission(auth: &AuthContext, permission: ResourcePermission) -> Result<(), AuthzError> {
    require_role(auth, permission.min_role())
}

/// Project deletion: the project's owner or any admin
pub fn require_project_owner_or_admin(
    auth: &AuthContext,
    project_owner_id: Option<Uuid>,
) -> Result<(), AuthzError> {
    if project_owner_id == Some(auth.user_id) && auth.role.can_write() {
        return Ok(());
    }

    require_role(auth, UserRole::Admin)
}

/// Admins may hand out any role except owner; only owners create owners.
pub fn require_can_grant(auth: &AuthContext, role: UserRole) -> Result<(), AuthzError> {
    require_role(auth, UserRole::Admin)?;

    if role == UserRole::Owner && auth.role != UserRole::Owner {
        return Err(AuthzError::Forbidden("Only owners can grant the owner role"));
    }

    Ok(())
}

/// Admins may not modify or remove owners unless they are owners themselves.
pub fn require_can_manage_user(auth: &AuthContext, target_role: UserRole) -> Result<(), AuthzError> {
    require_role(auth, UserRole::Admin)?;

    if target_role == UserRole::Owner && auth.role != UserRole::Owner {
        return Err(AuthzError::Forbidden("Only owners can modify other owners"));
    }

    Ok(())
}
