/// Per-user settings
///
/// - `GET   /v1/settings` - Created with defaults on first access
/// - `PATCH /v1/settings` - Provided fields only; preferences are merged
/// - `POST  /v1/settings/reset`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tasklane_shared::{
    auth::middleware::AuthContext,
    models::settings::{Settings, Theme, UpdateSettings},
};
use validator::Validate;

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateSettingsRequest {
    pub theme: Option<Theme>,

    #[validate(length(min = 2, max = 10, message = "Language must be a 2-10 character code"))]
    pub language: Option<String>,

    #[validate(length(min = 1, max = 64, message = "Timezone must be 1-64 characters"))]
    pub timezone: Option<String>,

    pub email_notifications: Option<bool>,
    pub push_notifications: Option<bool>,
    pub preferences: Option<JsonValue>,
}

impl UpdateSettingsRequest {
    fn check(&self) -> ApiResult<()> {
        self.validate()?;

        if self.preferences.as_ref().is_some_and(|p| !p.is_object()) {
            return Err(ApiError::invalid(
                "preferences",
                "Preferences must be a JSON object",
            ));
        }
        Ok(())
    }
}

pub async fn get_settings(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<Settings>> {
    Ok(Json(Settings::get_or_create(&state.db, auth.user_id).await?))
}

pub async fn update_settings(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<UpdateSettingsRequest>,
) -> ApiResult<Json<Settings>> {
    req.check()?;

    let settings = Settings::update(
        &state.db,
        auth.user_id,
        UpdateSettings {
            theme: req.theme,
            language: req.language.map(|l| l.trim().to_string()),
            timezone: req.timezone.map(|t| t.trim().to_string()),
            email_notifications: req.email_notifications,
            push_notifications: req.push_notifications,
            preferences: req.preferences,
        },
    )
    .await?;

    tracing::debug!(user_id = %auth.user_id, "Settings updated");

    Ok(Json(settings))
}

pub async fn reset_settings(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<Settings>> {
    let settings = Settings::reset(&state.db, auth.user_id).await?;

    tracing::info!(user_id = %auth.user_id, "Settings reset");

    Ok(Json(settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferences_must_be_object() {
        let req: UpdateSettingsRequest =
            serde_json::from_str(r#"{"preferences": [1, 2]}"#).unwrap();
        assert!(req.check().is_err());

        let req: UpdateSettingsRequest =
            serde_json::from_str(r#"{"theme": "dark", "preferences": {"density": "compact"}}"#)
                .unwrap();
        assert!(req.check().is_ok());
        assert_eq!(req.theme, Some(Theme::Dark));
    }

    #[test]
    fn test_language_length() {
        let req = UpdateSettingsRequest {
            language: Some("x".into()),
            ..Default::default()
        };
        assert!(req.check().is_err());
    }
}
