/// Request authentication context
///
/// The API's bearer middleware validates the access token, re-reads the
/// user with [`load_current`] and inserts the resulting [`AuthContext`] into
/// the request extensions. Handlers receive it as an extractor:
///
/// ```no_run
/// use tasklane_shared::auth::middleware::AuthContext;
///
/// async fn whoami(auth: AuthContext) -> String {
///     format!("user {} in organization {}", auth.user_id, auth.organization_id)
/// }
/// ```
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use super::jwt::{validate_access_token, Claims, JwtError};
use crate::models::user::UserRole;

/// Identity of the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: UserRole,
}

impl AuthContext {
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            user_id: claims.sub,
            organization_id: claims.org,
            role: claims.role,
        }
    }

    pub fn is_self(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingCredentials,

    #[error("{0}")]
    InvalidFormat(String),

    #[error("{0}")]
    InvalidToken(String),
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
            JwtError::InvalidIssuer => AuthError::InvalidToken("Invalid issuer".to_string()),
            JwtError::WrongTokenType { expected } => {
                AuthError::InvalidToken(format!("Expected {} token", expected))
            }
            other => AuthError::InvalidToken(format!("Invalid token: {}", other)),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let body = Json(json!({ "error": "unauthorized", "message": message }));

        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

/// Extracts the token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))
}

/// Validates an access token and builds the caller's context
pub fn authenticate_token(token: &str, secret: &str) -> Result<AuthContext, AuthError> {
    let claims = validate_access_token(token, secret)?;
    Ok(AuthContext::from_claims(&claims))
}

/// Re-reads the caller named by a token.
///
/// `None` when the user is gone from the token's organization or has been
/// deactivated. The role is taken from the stored row, not the token.
pub async fn load_current(
    pool: &PgPool,
    claimed: AuthContext,
) -> Result<Option<AuthContext>, sqlx::Error> {
    let row: Option<(UserRole, bool)> =
        sqlx::query_as("SELECT role, is_active FROM users WHERE id = $1 AND organization_id = $2")
            .bind(claimed.user_id)
            .bind(claimed.organization_id)
            .fetch_optional(pool)
            .await?;

    Ok(row
        .filter(|(_, is_active)| *is_active)
        .map(|(role, _)| AuthContext { role, ..claimed }))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .copied()
            .ok_or(AuthError::MissingCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{create_token, TokenType};
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers_with("Bearer abc.def")).unwrap(), "abc.def");
        assert!(matches!(
            bearer_token(&HeaderMap::new()),
            Err(AuthError::MissingCredentials)
        ));
        assert!(matches!(
            bearer_token(&headers_with("Basic dXNlcg==")),
            Err(AuthError::InvalidFormat(_))
        ));
        assert!(bearer_token(&headers_with("Bearer ")).is_err());
    }

    #[test]
    fn test_authenticate_builds_context() {
        let claims = Claims::new(Uuid::new_v4(), Uuid::new_v4(), UserRole::Viewer, TokenType::Access);
        let token = create_token(&claims, SECRET).unwrap();

        let headers = headers_with(&format!("Bearer {}", token));
        let ctx = authenticate_token(bearer_token(&headers).unwrap(), SECRET).unwrap();
        assert_eq!(ctx.user_id, claims.sub);
        assert_eq!(ctx.organization_id, claims.org);
        assert_eq!(ctx.role, UserRole::Viewer);
        assert!(ctx.is_self(claims.sub));
    }

    #[test]
    fn test_authenticate_rejects_refresh_token() {
        let claims = Claims::new(Uuid::new_v4(), Uuid::new_v4(), UserRole::Owner, TokenType::Refresh);
        let token = create_token(&claims, SECRET).unwrap();

        let err = authenticate_token(&token, SECRET).unwrap_err();
        assert!(err.to_string().contains("Expected access token"));
    }

    #[test]
    fn test_auth_error_is_unauthorized() {
        for err in [
            AuthError::MissingCredentials,
            AuthError::InvalidFormat("bad".into()),
            AuthError::InvalidToken("bad".into()),
        ] {
            assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
        }
    }
}
