//! Per-user settings
//!
//! A row is created lazily with defaults the first time a user reads their
//! settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

const COLUMNS: &str = "user_id, theme, language, timezone, email_notifications, \
                       push_notifications, preferences, created_at, updated_at";

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "theme", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Settings {
    pub user_id: Uuid,
    pub theme: Theme,
    pub language: String,
    pub timezone: String,
    pub email_notifications: bool,

    /// When false, notifications are stored but not pushed over WebSocket
    pub push_notifications: bool,

    pub preferences: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSettings {
    pub theme: Option<Theme>,
    pub language: Option<String>,
    pub timezone: Option<String>,
    pub email_notifications: Option<bool>,
    pub push_notifications: Option<bool>,

    /// Merged into the stored preferences
    pub preferences: Option<JsonValue>,
}

impl Settings {
    /// Returns the user's settings, inserting the defaults on first access.
    pub async fn get_or_create(pool: &PgPool, user_id: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query("INSERT INTO settings (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(pool)
            .await?;

        sqlx::query_as::<_, Settings>(&format!("SELECT {COLUMNS} FROM settings WHERE user_id = $1"))
            .bind(user_id)
            .fetch_one(pool)
            .await
    }

    /// Whether live pushes are enabled. Users without a settings row get the
    /// default (enabled).
    pub async fn push_enabled(pool: &PgPool, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let enabled: Option<bool> =
            sqlx::query_scalar("SELECT push_notifications FROM settings WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(pool)
                .await?;

        Ok(enabled.unwrap_or(true))
    }

    pub async fn update(
        pool: &PgPool,
        user_id: Uuid,
        data: UpdateSettings,
    ) -> Result<Self, sqlx::Error> {
        Self::get_or_create(pool, user_id).await?;

        let mut query = String::from("UPDATE settings SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.theme.is_some() {
            bind_count += 1;
            query.push_str(&format!(", theme = ${}", bind_count));
        }
        if data.language.is_some() {
            bind_count += 1;
            query.push_str(&format!(", language = ${}", bind_count));
        }
        if data.timezone.is_some() {
            bind_count += 1;
            query.push_str(&format!(", timezone = ${}", bind_count));
        }
        if data.email_notifications.is_some() {
            bind_count += 1;
            query.push_str(&format!(", email_notifications = ${}", bind_count));
        }
        if data.push_notifications.is_some() {
            bind_count += 1;
            query.push_str(&format!(", push_notifications = ${}", bind_count));
        }
        if data.preferences.is_some() {
            bind_count += 1;
            query.push_str(&format!(", preferences = preferences || ${}", bind_count));
        }

        query.push_str(&format!(" WHERE user_id = $1 RETURNING {COLUMNS}"));

        let mut q = sqlx::query_as::<_, Settings>(&query).bind(user_id);

        if let Some(theme) = data.theme {
            q = q.bind(theme);
        }
        if let Some(language) = data.language {
            q = q.bind(language);
        }
        if let Some(timezone) = data.timezone {
            q = q.bind(timezone);
        }
        if let Some(email_notifications) = data.email_notifications {
            q = q.bind(email_notifications);
        }
        if let Some(push_notifications) = data.push_notifications {
            q = q.bind(push_notifications);
        }
        if let Some(preferences) = data.preferences {
            q = q.bind(preferences);
        }

        q.fetch_one(pool).await
    }

    /// Restores every field to its default
    pub async fn reset(pool: &PgPool, user_id: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Settings>(&format!(
            r#"
            INSERT INTO settings (user_id) VALUES ($1)
            ON CONFLICT (user_id) DO UPDATE SET
                theme = 'system',
                language = $2,
                timezone = $3,
                email_notifications = TRUE,
                push_notifications = TRUE,
                preferences = '{{}}',
                updated_at = NOW()
            RETURNING {COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(DEFAULT_LANGUAGE)
        .bind(DEFAULT_TIMEZONE)
        .fetch_one(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_theme_default() {
        assert_eq!(Theme::default(), Theme::System);
        assert_eq!(serde_json::to_string(&Theme::Dark).unwrap(), "\"dark\"");
    }

    #[test]
    fn test_update_settings_partial() {
        let update: UpdateSettings =
            serde_json::from_str(r#"{"theme": "light", "push_notifications": false}"#).unwrap();
        assert_eq!(update.theme, Some(Theme::Light));
        assert_eq!(update.push_notifications, Some(false));
        assert!(update.language.is_none());
        assert!(update.preferences.is_none());
    }
}
