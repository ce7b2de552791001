//! User model and role hierarchy
//!
//! Every user belongs to exactly one organization and carries a role within
//! it. Emails are unique across the whole system (case-insensitive) so a
//! login never has to ask which organization it targets.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE users (
//!     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
//!     organization_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
//!     email VARCHAR(255) NOT NULL,
//!     password_hash VARCHAR(255) NOT NULL,
//!     name VARCHAR(255) NOT NULL,
//!     avatar_url VARCHAR(512),
//!     role user_role NOT NULL DEFAULT 'member',
//!     is_active BOOLEAN NOT NULL DEFAULT TRUE,
//!     last_login_at TIMESTAMPTZ,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! CREATE UNIQUE INDEX users_email_key ON users (lower(email));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

const COLUMNS: &str = "id, organization_id, email, password_hash, name, avatar_url, role, \
                       is_active, last_login_at, created_at, updated_at";

/// Roles within an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Everything, including granting ownership
    Owner,

    /// Manages users, the organization and any project
    Admin,

    /// Creates and edits projects, tasks and files
    #[default]
    Member,

    /// Read-only
    Viewer,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Owner => "owner",
            UserRole::Admin => "admin",
            UserRole::Member => "member",
            UserRole::Viewer => "viewer",
        }
    }

    /// Parses the lowercase form used in tokens and query strings
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "owner" => Some(UserRole::Owner),
            "admin" => Some(UserRole::Admin),
            "member" => Some(UserRole::Member),
            "viewer" => Some(UserRole::Viewer),
            _ => None,
        }
    }

    pub fn can_write(&self) -> bool {
        self.has_permission(&UserRole::Member)
    }

    pub fn can_manage_users(&self) -> bool {
        self.has_permission(&UserRole::Admin)
    }

    /// Checks the hierarchy Owner > Admin > Member > Viewer
    pub fn has_permission(&self, required: &UserRole) -> bool {
        self.permission_level() >= required.permission_level()
    }

    fn permission_level(&self) -> u8 {
        match self {
            UserRole::Owner => 4,
            UserRole::Admin => 3,
            UserRole::Member => 2,
            UserRole::Viewer => 1,
        }
    }
}

/// A user account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub organization_id: Uuid,

    /// Stored lowercase
    pub email: String,

    /// Argon2id PHC string, never serialized
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    pub name: String,
    pub avatar_url: Option<String>,
    pub role: UserRole,

    /// Inactive users cannot log in
    pub is_active: bool,

    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub organization_id: Uuid,
    pub email: String,

    /// Argon2id hash, not the plaintext password
    pub password_hash: String,

    pub name: String,
    #[serde(default)]
    pub role: UserRole,
}

/// Input for updating a user. Only `Some` fields are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUser {
    pub name: Option<String>,

    /// `Some(None)` clears the avatar
    pub avatar_url: Option<Option<String>>,

    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

impl UpdateUser {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.avatar_url.is_none()
            && self.role.is_none()
            && self.is_active.is_none()
    }

    /// Whether applying the update can take ownership away from its target
    pub fn may_remove_owner(&self) -> bool {
        self.role.is_some_and(|r| r != UserRole::Owner) || self.is_active == Some(false)
    }
}

/// A change that would leave an organization without an active owner
#[derive(Debug, thiserror::Error)]
pub enum OwnershipError {
    #[error("an organization needs at least one active owner")]
    LastOwner,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Serializes ownership changes within an organization, then fails when
/// `id` is its only active owner.
async fn guard_last_owner(
    conn: &mut PgConnection,
    organization_id: Uuid,
    id: Uuid,
) -> Result<(), OwnershipError> {
    sqlx::query("SELECT id FROM organizations WHERE id = $1 FOR NO KEY UPDATE")
        .bind(organization_id)
        .execute(&mut *conn)
        .await?;

    let (is_owner, other_owners): (bool, i64) = sqlx::query_as(
        r#"
        SELECT
            EXISTS (SELECT 1 FROM users
                    WHERE id = $2 AND organization_id = $1 AND role = 'owner' AND is_active),
            (SELECT COUNT(*) FROM users
             WHERE organization_id = $1 AND role = 'owner' AND is_active AND id <> $2)
        "#,
    )
    .bind(organization_id)
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;

    if is_owner && other_owners == 0 {
        return Err(OwnershipError::LastOwner);
    }
    Ok(())
}

/// Filters for listing users
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Case-insensitive substring of name or email
    pub search: Option<String>,
    pub role: Option<UserRole>,
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, organization_id: Uuid, filter: &UserFilter) {
    qb.push(" WHERE organization_id = ").push_bind(organization_id);

    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", escape_like(search));
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(role) = filter.role {
        qb.push(" AND role = ").push_bind(role);
    }
}

/// Escapes `%`, `_` and `\` so user input matches literally inside `ILIKE`
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl User {
    /// Inserts a user. The email is lowercased before storage.
    ///
    /// # Errors
    ///
    /// A duplicate email fails with a unique violation on `users_email_key`.
    pub async fn create<'e, E>(executor: E, data: CreateUser) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (organization_id, email, password_hash, name, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(data.organization_id)
        .bind(data.email.trim().to_lowercase())
        .bind(data.password_hash)
        .bind(data.name)
        .bind(data.role)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds a user only if it belongs to the given organization
    pub async fn find_in_organization(
        pool: &PgPool,
        organization_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {COLUMNS} FROM users WHERE id = $1 AND organization_id = $2"
        ))
        .bind(id)
        .bind(organization_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email.trim())
        .fetch_optional(pool)
        .await
    }

    /// Applies the provided fields. Demoting or deactivating the last active
    /// owner fails with [`OwnershipError::LastOwner`].
    pub async fn update(
        pool: &PgPool,
        organization_id: Uuid,
        id: Uuid,
        data: UpdateUser,
    ) -> Result<Option<Self>, OwnershipError> {
        let mut tx = pool.begin().await?;
        if data.may_remove_owner() {
            guard_last_owner(&mut tx, organization_id, id).await?;
        }

        let mut query = String::from("UPDATE users SET updated_at = NOW()");
        let mut bind_count = 2;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.avatar_url.is_some() {
            bind_count += 1;
            query.push_str(&format!(", avatar_url = ${}", bind_count));
        }
        if data.role.is_some() {
            bind_count += 1;
            query.push_str(&format!(", role = ${}", bind_count));
        }
        if data.is_active.is_some() {
            bind_count += 1;
            query.push_str(&format!(", is_active = ${}", bind_count));
        }

        query.push_str(&format!(
            " WHERE id = $1 AND organization_id = $2 RETURNING {COLUMNS}"
        ));

        let mut q = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(organization_id);

        if let Some(name) = data.name {
            q = q.bind(name);
        }
        if let Some(avatar_url) = data.avatar_url {
            q = q.bind(avatar_url);
        }
        if let Some(role) = data.role {
            q = q.bind(role);
        }
        if let Some(is_active) = data.is_active {
            q = q.bind(is_active);
        }

        let user = q.fetch_optional(&mut *tx).await?;
        tx.commit().await?;
        Ok(user)
    }

    pub async fn update_password(
        pool: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(password_hash)
                .execute(pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn update_last_login(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Deletes a user unless it is the last active owner
    pub async fn delete(
        pool: &PgPool,
        organization_id: Uuid,
        id: Uuid,
    ) -> Result<bool, OwnershipError> {
        let mut tx = pool.begin().await?;
        guard_last_owner(&mut tx, organization_id, id).await?;

        let result = sqlx::query("DELETE FROM users WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(organization_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Lists users of an organization ordered by name
    pub async fn list(
        pool: &PgPool,
        organization_id: Uuid,
        filter: &UserFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut qb = QueryBuilder::new(format!("SELECT {COLUMNS} FROM users"));
        push_filter(&mut qb, organization_id, filter);
        qb.push(" ORDER BY name ASC, id ASC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        qb.build_query_as::<User>().fetch_all(pool).await
    }

    pub async fn count(
        pool: &PgPool,
        organization_id: Uuid,
        filter: &UserFilter,
    ) -> Result<i64, sqlx::Error> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM users");
        push_filter(&mut qb, organization_id, filter);

        qb.build_query_scalar::<i64>().fetch_one(pool).await
    }
}
