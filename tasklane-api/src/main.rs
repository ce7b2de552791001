//! # Tasklane API Server
//!
//! Multi-tenant project management backend: REST endpoints for
//! organizations, users, projects, tasks, files, notifications, search and
//! settings, plus a WebSocket gateway for live notifications.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/tasklane \
//! JWT_SECRET=$(openssl rand -hex 32) \
//! cargo run -p tasklane-api
//! ```
//!
//! Set `LOG_FORMAT=json` for structured log lines.

use tasklane_api::{
    app::{build_router, AppState},
    config::Config,
};
use tasklane_shared::db::{
    migrations::run_migrations,
    pool::{create_pool, DatabaseConfig},
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tasklane_api=debug,tasklane_shared=debug,tower_http=debug".into()
            }),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }

    tracing::info!("Shutdown signal received, closing connections...");
    token.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!(
        "Tasklane API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env()?;

    let db = create_pool(DatabaseConfig {
        max_connections: config.database.max_connections,
        ..DatabaseConfig::from_url(config.database.url.clone())
    })
    .await?;

    run_migrations(&db).await?;

    let bind_address = config.bind_address();
    let state = AppState::build(db.clone(), config).await?;
    let shutdown = state.shutdown.clone();

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    db.close().await;
    tracing::info!("Server stopped");

    Ok(())
}
