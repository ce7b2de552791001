/// Bearer-token authentication layer
///
/// Validates the access token, confirms its user still exists and is
/// active, and stores the caller's
/// [`AuthContext`](tasklane_shared::auth::middleware::AuthContext) in the
/// request extensions, where handlers pick it up as an extractor. The role
/// in the context is the stored one, so demotions and deactivations take
/// effect before the token expires.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tasklane_shared::auth::middleware::{
    authenticate_token, bearer_token, load_current, AuthContext,
};

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

/// Validates an access token and loads the current state of its user
pub async fn authenticate_user(state: &AppState, token: &str) -> ApiResult<AuthContext> {
    let claimed = authenticate_token(token, state.jwt_secret())?;

    load_current(&state.db, claimed).await?.ok_or_else(|| {
        tracing::debug!(user_id = %claimed.user_id, "Token of inactive or deleted user");
        ApiError::Unauthorized("User is inactive or no longer exists".to_string())
    })
}

pub async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())?;
    let auth = authenticate_user(&state, token).await?;

    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}
