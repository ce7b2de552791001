//! Uploaded file metadata
//!
//! The blob itself lives in a storage backend under `storage_key`; this row
//! records where, plus the checksum used for per-organization deduplication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::user::escape_like;

const COLUMNS: &str = "id, organization_id, project_id, task_id, uploaded_by_id, original_name, \
                       mime_type, size_bytes, checksum, storage_backend, storage_key, \
                       thumbnail_key, scan_status, created_at, updated_at";

/// Result of the post-upload content scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "scan_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    #[default]
    Pending,
    Clean,
    Infected,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Clean => "clean",
            ScanStatus::Infected => "infected",
            ScanStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FileRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub project_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub uploaded_by_id: Option<Uuid>,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,

    /// Lowercase hex SHA-256 of the content
    pub checksum: String,

    /// Backend name at upload time (`local`, `s3`, `memory`)
    pub storage_backend: String,

    #[serde(skip_serializing)]
    pub storage_key: String,

    #[serde(skip_serializing)]
    pub thumbnail_key: Option<String>,

    pub scan_status: ScanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn has_thumbnail(&self) -> bool {
        self.thumbnail_key.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct CreateFile {
    /// Chosen before the blob is written so the storage key can embed it
    pub id: Uuid,
    pub organization_id: Uuid,
    pub project_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub uploaded_by_id: Uuid,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub storage_backend: String,
    pub storage_key: String,
    pub thumbnail_key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    pub project_id: Option<Uuid>,
    pub task_id: Option<Uuid>,

    /// e.g. `image/` to list only images
    pub mime_prefix: Option<String>,
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, organization_id: Uuid, filter: &FileFilter) {
    qb.push(" WHERE organization_id = ").push_bind(organization_id);

    if let Some(project_id) = filter.project_id {
        qb.push(" AND project_id = ").push_bind(project_id);
    }
    if let Some(task_id) = filter.task_id {
        qb.push(" AND task_id = ").push_bind(task_id);
    }
    if let Some(prefix) = &filter.mime_prefix {
        qb.push(" AND mime_type LIKE ")
            .push_bind(format!("{}%", escape_like(prefix)));
    }
}

impl FileRecord {
    pub async fn create(pool: &PgPool, data: CreateFile) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, FileRecord>(&format!(
            r#"
            INSERT INTO files
                (id, organization_id, project_id, task_id, uploaded_by_id, original_name,
                 mime_type, size_bytes, checksum, storage_backend, storage_key, thumbnail_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(data.id)
        .bind(data.organization_id)
        .bind(data.project_id)
        .bind(data.task_id)
        .bind(data.uploaded_by_id)
        .bind(data.original_name)
        .bind(data.mime_type)
        .bind(data.size_bytes)
        .bind(data.checksum)
        .bind(data.storage_backend)
        .bind(data.storage_key)
        .bind(data.thumbnail_key)
        .fetch_one(pool)
        .await
    }

    pub async fn find(
        pool: &PgPool,
        organization_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {COLUMNS} FROM files WHERE id = $1 AND organization_id = $2"
        ))
        .bind(id)
        .bind(organization_id)
        .fetch_optional(pool)
        .await
    }

    /// Existing upload of the same content inside an organization
    pub async fn find_by_checksum(
        pool: &PgPool,
        organization_id: Uuid,
        checksum: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {COLUMNS} FROM files WHERE organization_id = $1 AND checksum = $2"
        ))
        .bind(organization_id)
        .bind(checksum)
        .fetch_optional(pool)
        .await
    }

    pub async fn set_scan_status(
        pool: &PgPool,
        id: Uuid,
        status: ScanStatus,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE files SET scan_status = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(status)
                .execute(pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes the row and returns it so the caller can delete the blobs.
    pub async fn delete(
        pool: &PgPool,
        organization_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, FileRecord>(&format!(
            "DELETE FROM files WHERE id = $1 AND organization_id = $2 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(organization_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list(
        pool: &PgPool,
        organization_id: Uuid,
        filter: &FileFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut qb = QueryBuilder::new(format!("SELECT {COLUMNS} FROM files"));
        push_filter(&mut qb, organization_id, filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        qb.build_query_as::<FileRecord>().fetch_all(pool).await
    }

    pub async fn count(
        pool: &PgPool,
        organization_id: Uuid,
        filter: &FileFilter,
    ) -> Result<i64, sqlx::Error> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM files");
        push_filter(&mut qb, organization_id, filter);

        qb.build_query_scalar::<i64>().fetch_one(pool).await
    }
}
