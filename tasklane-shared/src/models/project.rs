//! Project model
//!
//! Projects group tasks and files inside an organization. A project's owner
//! (or any admin) may delete it; deleting a project cascades to its tasks.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::double_option;
use super::user::escape_like;

const COLUMNS: &str = "id, organization_id, owner_id, name, description, status, color, \
                       start_date, due_date, created_at, updated_at";

/// Lifecycle of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "project_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Planning,
    Active,
    OnHold,
    Completed,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Planning => "planning",
            ProjectStatus::Active => "active",
            ProjectStatus::OnHold => "on_hold",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub organization_id: Uuid,

    /// Creator, `None` once that user is deleted
    pub owner_id: Option<Uuid>,

    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,

    /// `#rrggbb`
    pub color: Option<String>,

    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProject {
    pub organization_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub status: ProjectStatus,
    pub color: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
}

/// Partial update. Nullable columns use `Option<Option<_>>` so an explicit
/// JSON `null` clears them while an absent key leaves them alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProject {
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

#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,

    /// Case-insensitive substring of the name or description
    pub search: Option<String>,
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, organization_id: Uuid, filter: &ProjectFilter) {
    qb.push(" WHERE organization_id = ").push_bind(organization_id);

    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", escape_like(search));
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

impl Project {
    pub async fn create(pool: &PgPool, data: CreateProject) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            r#"
            INSERT INTO projects
                (organization_id, owner_id, name, description, status, color, start_date, due_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(data.organization_id)
        .bind(data.owner_id)
        .bind(data.name)
        .bind(data.description)
        .bind(data.status)
        .bind(data.color)
        .bind(data.start_date)
        .bind(data.due_date)
        .fetch_one(pool)
        .await
    }

    /// Looks up a project inside one organization. Projects of other
    /// organizations are indistinguishable from missing ones.
    pub async fn find(
        pool: &PgPool,
        organization_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            "SELECT {COLUMNS} FROM projects WHERE id = $1 AND organization_id = $2"
        ))
        .bind(id)
        .bind(organization_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        organization_id: Uuid,
        id: Uuid,
        data: UpdateProject,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE projects SET updated_at = NOW()");
        let mut bind_count = 2;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.description.is_some() {
            bind_count += 1;
            query.push_str(&format!(", description = ${}", bind_count));
        }
        if data.status.is_some() {
            bind_count += 1;
            query.push_str(&format!(", status = ${}", bind_count));
        }
        if data.color.is_some() {
            bind_count += 1;
            query.push_str(&format!(", color = ${}", bind_count));
        }
        if data.start_date.is_some() {
            bind_count += 1;
            query.push_str(&format!(", start_date = ${}", bind_count));
        }
        if data.due_date.is_some() {
            bind_count += 1;
            query.push_str(&format!(", due_date = ${}", bind_count));
        }

        query.push_str(&format!(
            " WHERE id = $1 AND organization_id = $2 RETURNING {COLUMNS}"
        ));

        let mut q = sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .bind(organization_id);

        if let Some(name) = data.name {
            q = q.bind(name);
        }
        if let Some(description) = data.description {
            q = q.bind(description);
        }
        if let Some(status) = data.status {
            q = q.bind(status);
        }
        if let Some(color) = data.color {
            q = q.bind(color);
        }
        if let Some(start_date) = data.start_date {
            q = q.bind(start_date);
        }
        if let Some(due_date) = data.due_date {
            q = q.bind(due_date);
        }

        q.fetch_optional(pool).await
    }

    pub async fn delete(pool: &PgPool, organization_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(organization_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Newest first
    pub async fn list(
        pool: &PgPool,
        organization_id: Uuid,
        filter: &ProjectFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut qb = QueryBuilder::new(format!("SELECT {COLUMNS} FROM projects"));
        push_filter(&mut qb, organization_id, filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        qb.build_query_as::<Project>().fetch_all(pool).await
    }

    pub async fn count(
        pool: &PgPool,
        organization_id: Uuid,
        filter: &ProjectFilter,
    ) -> Result<i64, sqlx::Error> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM projects");
        push_filter(&mut qb, organization_id, filter);

        qb.build_query_scalar::<i64>().fetch_one(pool).await
    }
}

/// Per-status task counts of one project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectStats {
    pub total_tasks: i64,
    pub todo: i64,
    pub in_progress: i64,
    pub review: i64,
    pub done: i64,
    pub overdue: i64,

    /// `done / total * 100`, 0 when the project has no tasks
    #[sqlx(skip)]
    pub progress: f64,
}

impl ProjectStats {
    pub async fn collect(pool: &PgPool, project_id: Uuid) -> Result<Self, sqlx::Error> {
        let stats = sqlx::query_as::<_, ProjectStats>(
            r#"
            SELECT
                COUNT(*) AS total_tasks,
                COUNT(*) FILTER (WHERE status = 'todo') AS todo,
                COUNT(*) FILTER (WHERE status = 'in_progress') AS in_progress,
                COUNT(*) FILTER (WHERE status = 'review') AS review,
                COUNT(*) FILTER (WHERE status = 'done') AS done,
                COUNT(*) FILTER (WHERE status <> 'done' AND due_date < CURRENT_DATE) AS overdue
            FROM tasks
            WHERE project_id = $1
            "#,
        )
        .bind(project_id)
        .fetch_one(pool)
        .await?;

        Ok(stats.with_progress())
    }

    fn with_progress(mut self) -> Self {
        self.progress = progress_percent(self.done, self.total_tasks);
        self
    }
}

/// Completion percentage rounded to two decimals
pub fn progress_percent(done: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let raw = done as f64 / total as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}
