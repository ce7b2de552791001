/// Health check endpoint
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected",
///   "cache": "memory",
///   "pool": {"active_connections": 1, "idle_connections": 4, "total_connections": 5}
/// }
/// ```
///
/// `status` is `degraded` when the database or a configured Redis cache does
/// not answer.

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tasklane_shared::db::pool::{get_pool_stats, health_check as database_health, PoolStats};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,

    /// Search cache backend, or `unavailable`
    pub cache: String,

    pub pool: PoolStats,
}

pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let database_ok = database_health(&state.db).await.is_ok();
    let cache = state.search.cache();
    let cache_ok = cache.healthy().await;

    Ok(Json(HealthResponse {
        status: if database_ok && cache_ok {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if database_ok { "connected" } else { "disconnected" }.to_string(),
        cache: if cache_ok {
            cache.backend_name().to_string()
        } else {
            "unavailable".to_string()
        },
        pool: get_pool_stats(&state.db),
    }))
}
