//! In-app notifications
//!
//! Rows are the durable record; live delivery over the WebSocket gateway is
//! handled by [`crate::notifications`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

const COLUMNS: &str =
    "id, user_id, organization_id, kind, title, message, data, read_at, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TaskAssigned,
    TaskUpdated,
    ProjectUpdated,
    FileUploaded,
    Mention,
    System,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TaskAssigned => "task_assigned",
            NotificationKind::TaskUpdated => "task_updated",
            NotificationKind::ProjectUpdated => "project_updated",
            NotificationKind::FileUploaded => "file_uploaded",
            NotificationKind::Mention => "mention",
            NotificationKind::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,

    /// Entity references for the client (`{"task_id": ...}`)
    pub data: JsonValue,

    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotification {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: JsonValue,
}

impl Notification {
    pub async fn create(pool: &PgPool, data: CreateNotification) -> Result<Self, sqlx::Error> {
        let payload = if data.data.is_null() {
            JsonValue::Object(Default::default())
        } else {
            data.data
        };

        sqlx::query_as::<_, Notification>(&format!(
            r#"
            INSERT INTO notifications (user_id, organization_id, kind, title, message, data)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(data.user_id)
        .bind(data.organization_id)
        .bind(data.kind)
        .bind(data.title)
        .bind(data.message)
        .bind(payload)
        .fetch_one(pool)
        .await
    }

    /// Newest first
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            SELECT {COLUMNS} FROM notifications
            WHERE user_id = $1 AND ($2 = FALSE OR read_at IS NULL)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn count_for_user(
        pool: &PgPool,
        user_id: Uuid,
        unread_only: bool,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND ($2 = FALSE OR read_at IS NULL)",
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_one(pool)
        .await
    }

    pub async fn unread_count(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        Self::count_for_user(pool, user_id, true).await
    }

    /// Marks one notification read. Already-read rows keep their timestamp.
    pub async fn mark_read(
        pool: &PgPool,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            UPDATE notifications
            SET read_at = COALESCE(read_at, NOW()), updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Returns how many notifications changed state
    pub async fn mark_all_read(pool: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = NOW(), updated_at = NOW() \
             WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
