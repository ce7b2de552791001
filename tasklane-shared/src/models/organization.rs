//! Organization (tenant) model
//!
//! Organizations scope every other record: users, projects, tasks, files and
//! search index rows all carry an `organization_id`, and every query made on
//! behalf of a user filters by it.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE organizations (
//!     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
//!     name VARCHAR(255) NOT NULL,
//!     subdomain VARCHAR(63) NOT NULL UNIQUE,
//!     plan organization_plan NOT NULL DEFAULT 'free',
//!     logo_url VARCHAR(512),
//!     settings JSONB NOT NULL DEFAULT '{}',
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

const COLUMNS: &str = "id, name, subdomain, plan, logo_url, settings, created_at, updated_at";

/// Billing plan of an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "organization_plan", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrganizationPlan {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl OrganizationPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationPlan::Free => "free",
            OrganizationPlan::Pro => "pro",
            OrganizationPlan::Enterprise => "enterprise",
        }
    }
}

/// A customer account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,

    /// Unique, DNS-safe handle (`acme` in `acme.tasklane.app`)
    pub subdomain: String,

    pub plan: OrganizationPlan,
    pub logo_url: Option<String>,

    /// Free-form organization preferences (JSONB, merged on update)
    pub settings: JsonValue,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrganization {
    pub name: String,
    pub subdomain: String,
    #[serde(default)]
    pub plan: OrganizationPlan,
}

/// Fields that may change after creation. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateOrganization {
    pub name: Option<String>,
    pub logo_url: Option<String>,
    pub plan: Option<OrganizationPlan>,

    /// Merged into the stored settings with the JSONB `||` operator
    pub settings: Option<JsonValue>,
}

/// Checks the subdomain shape enforced by the `organizations_subdomain_format`
/// constraint: 3 to 63 characters of `[a-z0-9-]`, alphanumeric at both ends.
pub fn is_valid_subdomain(subdomain: &str) -> bool {
    let len = subdomain.len();
    if !(3..=63).contains(&len) {
        return false;
    }

    let bytes = subdomain.as_bytes();
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();

    edge_ok(bytes[0])
        && edge_ok(bytes[len - 1])
        && bytes
            .iter()
            .all(|&b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

impl Organization {
    /// Inserts a new organization.
    ///
    /// Takes any executor so registration can create the organization and its
    /// owner inside one transaction.
    ///
    /// # Errors
    ///
    /// A duplicate subdomain fails with a unique violation on
    /// `organizations_subdomain_key`.
    pub async fn create<'e, E>(executor: E, data: CreateOrganization) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Organization>(&format!(
            "INSERT INTO organizations (name, subdomain, plan) VALUES ($1, $2, $3) RETURNING {COLUMNS}"
        ))
        .bind(data.name)
        .bind(data.subdomain.to_lowercase())
        .bind(data.plan)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Organization>(&format!(
            "SELECT {COLUMNS} FROM organizations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_subdomain(
        pool: &PgPool,
        subdomain: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Organization>(&format!(
            "SELECT {COLUMNS} FROM organizations WHERE subdomain = $1"
        ))
        .bind(subdomain.to_lowercase())
        .fetch_optional(pool)
        .await
    }

    /// True when no organization has claimed the subdomain yet
    pub async fn subdomain_available(pool: &PgPool, subdomain: &str) -> Result<bool, sqlx::Error> {
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM organizations WHERE subdomain = $1)")
                .bind(subdomain.to_lowercase())
                .fetch_one(pool)
                .await?;

        Ok(!taken)
    }

    /// Applies the provided fields; settings are merged rather than replaced.
    ///
    /// Returns `None` when the organization does not exist.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateOrganization,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE organizations SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.logo_url.is_some() {
            bind_count += 1;
            query.push_str(&format!(", logo_url = ${}", bind_count));
        }
        if data.plan.is_some() {
            bind_count += 1;
            query.push_str(&format!(", plan = ${}", bind_count));
        }
        if data.settings.is_some() {
            bind_count += 1;
            query.push_str(&format!(", settings = settings || ${}", bind_count));
        }

        query.push_str(&format!(" WHERE id = $1 RETURNING {COLUMNS}"));

        let mut q = sqlx::query_as::<_, Organization>(&query).bind(id);

        if let Some(name) = data.name {
            q = q.bind(name);
        }
        if let Some(logo_url) = data.logo_url {
            q = q.bind(logo_url);
        }
        if let Some(plan) = data.plan {
            q = q.bind(plan);
        }
        if let Some(settings) = data.settings {
            q = q.bind(settings);
        }

        q.fetch_optional(pool).await
    }

    /// Deletes the organization and, through cascades, everything it owns.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Dashboard figures for one organization
#[derive(Debug, Clone, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrganizationStats {
    pub users: i64,
    pub active_projects: i64,
    pub completed_projects: i64,
    pub total_projects: i64,
    pub open_tasks: i64,
    pub completed_tasks: i64,
    pub overdue_tasks: i64,
    pub files: i64,
    pub storage_bytes: i64,
}

impl OrganizationStats {
    /// Collects all dashboard counters in one round trip.
    pub async fn collect(pool: &PgPool, organization_id: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, OrganizationStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users WHERE organization_id = $1) AS users,
                (SELECT COUNT(*) FROM projects
                    WHERE organization_id = $1 AND status = 'active') AS active_projects,
                (SELECT COUNT(*) FROM projects
                    WHERE organization_id = $1 AND status = 'completed') AS completed_projects,
                (SELECT COUNT(*) FROM projects WHERE organization_id = $1) AS total_projects,
                (SELECT COUNT(*) FROM tasks
                    WHERE organization_id = $1 AND status <> 'done') AS open_tasks,
                (SELECT COUNT(*) FROM tasks
                    WHERE organization_id = $1 AND status = 'done') AS completed_tasks,
                (SELECT COUNT(*) FROM tasks
                    WHERE organization_id = $1 AND status <> 'done'
                      AND due_date < CURRENT_DATE) AS overdue_tasks,
                (SELECT COUNT(*) FROM files WHERE organization_id = $1) AS files,
                (SELECT COALESCE(SUM(size_bytes), 0)::BIGINT FROM files
                    WHERE organization_id = $1) AS storage_bytes
            "#,
        )
        .bind(organization_id)
        .fetch_one(pool)
        .await
    }
}
