/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use tasklane_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::build(pool, config).await?;
/// let app = tasklane_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    middleware::{auth::jwt_auth_layer, security::SecurityHeadersLayer},
    routes,
};
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, Request},
    routing::{get, patch, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tasklane_shared::{
    files::FileService,
    notifications::NotificationHub,
    redis::{RedisClient, RedisConfig},
    search::{SearchCache, SearchService},
    storage::{build_storage, StorageBackend},
};
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Every field is a handle, so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,

    pub storage: Arc<dyn StorageBackend>,
    pub files: FileService,
    pub search: SearchService,
    pub hub: NotificationHub,

    /// Cancelled on shutdown; WebSocket sessions watch it to close cleanly
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Assembles state from already-built components
    pub fn new(
        db: PgPool,
        config: Config,
        storage: Arc<dyn StorageBackend>,
        cache: SearchCache,
    ) -> Self {
        let files = FileService::new(db.clone(), storage.clone(), config.uploads.clone());
        let search = SearchService::new(db.clone(), cache);

        Self {
            db,
            config: Arc::new(config),
            storage,
            files,
            search,
            hub: NotificationHub::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Builds the storage backend and search cache named by the configuration.
    ///
    /// A configured but unreachable Redis falls back to the in-memory cache.
    pub async fn build(db: PgPool, config: Config) -> anyhow::Result<Self> {
        let storage = build_storage(&config.storage).await?;
        tracing::info!(backend = storage.name(), "Storage backend ready");

        let ttl = Duration::from_secs(config.search.cache_ttl_secs);
        let cache = match &config.redis {
            Some(redis) => match RedisClient::new(RedisConfig::new(redis.url.clone())).await {
                Ok(client) => SearchCache::redis(client, ttl),
                Err(e) => {
                    tracing::warn!(error = %e, "Redis unavailable, using in-memory search cache");
                    SearchCache::memory(ttl)
                }
            },
            None => SearchCache::memory(ttl),
        };

        Ok(Self::new(db, config, storage, cache))
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Span for one HTTP request.
///
/// Only the path is recorded: the gateway takes its access token in the
/// query string.
fn request_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        version = ?request.version(),
    )
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                          # Health check (public)
/// └── /v1/
///     ├── /auth/                       # register, login, refresh (public); me, change-password
///     ├── /users/                      # user management
///     ├── /organizations/              # current organization, stats, subdomain check (public)
///     ├── /projects/                   # projects, stats, Kanban board
///     ├── /tasks/                      # tasks and moves
///     ├── /files/                      # upload, download, thumbnails
///     ├── /notifications/              # inbox; /ws gateway authenticates via ?token=
///     ├── /search/                     # search, suggestions, analytics
///     └── /settings/                   # per-user settings
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Authentication (protected routes only)
/// 2. Logging (tower-http TraceLayer)
/// 3. CORS (tower-http CorsLayer)
/// 4. Compression
/// 5. Security headers
pub fn build_router(state: AppState) -> Router {
    // Public endpoints
    let public_routes = Router::new()
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/refresh", post(routes::auth::refresh))
        .route(
            "/organizations/subdomain/:subdomain",
            get(routes::organizations::check_subdomain),
        )
        .route("/notifications/ws", get(routes::gateway::notifications_ws));

    // Uploads get their own body limit
    let upload_routes = Router::new()
        .route("/files/upload", post(routes::files::upload))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.body_limit()));

    let protected_routes = Router::new()
        .route("/auth/me", get(routes::auth::me))
        .route("/auth/change-password", post(routes::auth::change_password))
        .route(
            "/users",
            get(routes::users::list_users).post(routes::users::create_user),
        )
        .route(
            "/users/:id",
            get(routes::users::get_user)
                .patch(routes::users::update_user)
                .delete(routes::users::delete_user),
        )
        .route(
            "/organizations/current",
            get(routes::organizations::current).patch(routes::organizations::update),
        )
        .route(
            "/organizations/current/stats",
            get(routes::organizations::stats),
        )
        .route(
            "/projects",
            get(routes::projects::list_projects).post(routes::projects::create_project),
        )
        .route(
            "/projects/:id",
            get(routes::projects::get_project)
                .patch(routes::projects::update_project)
                .delete(routes::projects::delete_project),
        )
        .route("/projects/:id/stats", get(routes::projects::project_stats))
        .route("/projects/:id/board", get(routes::tasks::board))
        .route(
            "/tasks",
            get(routes::tasks::list_tasks).post(routes::tasks::create_task),
        )
        .route(
            "/tasks/:id",
            get(routes::tasks::get_task)
                .patch(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        .route("/tasks/:id/move", post(routes::tasks::move_task))
        .merge(upload_routes)
        .route("/files", get(routes::files::list_files))
        .route(
            "/files/:id",
            get(routes::files::get_file).delete(routes::files::delete_file),
        )
        .route("/files/:id/download", get(routes::files::download))
        .route("/files/:id/thumbnail", get(routes::files::thumbnail))
        .route("/notifications", get(routes::notifications::list))
        .route(
            "/notifications/unread-count",
            get(routes::notifications::unread_count),
        )
        .route(
            "/notifications/read-all",
            post(routes::notifications::mark_all_read),
        )
        .route(
            "/notifications/:id/read",
            patch(routes::notifications::mark_read),
        )
        .route(
            "/notifications/:id",
            axum::routing::delete(routes::notifications::delete),
        )
        .route("/search", get(routes::search::search))
        .route("/search/suggestions", get(routes::search::suggestions))
        .route("/search/analytics", get(routes::search::analytics))
        .route(
            "/settings",
            get(routes::settings::get_settings).patch(routes::settings::update_settings),
        )
        .route("/settings/reset", post(routes::settings::reset_settings))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let v1_routes = Router::new().merge(public_routes).merge(protected_routes);

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(Duration::from_secs(3600))
    };

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}
