//! Embedded schema migrations
//!
//! Migration files live in the workspace-level `migrations/` directory and
//! are compiled into the binary with `sqlx::migrate!`, so a deployed server
//! never needs the SQL files on disk. The API server runs them at startup.

use sqlx::{migrate::MigrateDatabase, migrate::Migrator, postgres::PgPool, Postgres};
use tracing::{debug, info, warn};

static MIGRATOR: Migrator = sqlx::migrate!("../migrations");

/// Applied-migration summary reported by [`get_migration_status`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Number of successfully applied migrations
    pub applied_migrations: usize,

    /// Version of the newest applied migration
    pub latest_version: Option<i64>,

    /// Number of migrations embedded in this build
    pub known_migrations: usize,
}

impl MigrationStatus {
    /// True when every embedded migration has been applied
    pub fn is_up_to_date(&self) -> bool {
        self.applied_migrations >= self.known_migrations
    }
}

/// Runs all pending migrations. Already-applied migrations are skipped.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    info!(
        known_migrations = MIGRATOR.iter().count(),
        "Running database migrations"
    );

    MIGRATOR.run(pool).await.map_err(|e| {
        warn!(error = %e, "Migration failed");
        e
    })?;

    info!("Database schema is up to date");
    Ok(())
}

/// Reads `_sqlx_migrations` to report how far the schema has progressed.
pub async fn get_migration_status(pool: &PgPool) -> Result<MigrationStatus, sqlx::Error> {
    let known_migrations = MIGRATOR.iter().filter(|m| !m.migration_type.is_down_migration()).count();

    let table_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_schema = 'public'
            AND table_name = '_sqlx_migrations'
        )",
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        debug!("Migrations table does not exist yet");
        return Ok(MigrationStatus {
            applied_migrations: 0,
            latest_version: None,
            known_migrations,
        });
    }

    let (count, latest_version): (i64, Option<i64>) = sqlx::query_as(
        "SELECT COUNT(*), MAX(version) FROM _sqlx_migrations WHERE success = true",
    )
    .fetch_one(pool)
    .await?;

    Ok(MigrationStatus {
        applied_migrations: count as usize,
        latest_version,
        known_migrations,
    })
}

/// Creates the target database when missing (development and tests).
pub async fn ensure_database_exists(database_url: &str) -> Result<(), sqlx::Error> {
    if !Postgres::database_exists(database_url).await? {
        info!("Database does not exist, creating it");
        Postgres::create_database(database_url).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_migrations_present() {
        assert!(MIGRATOR.iter().count() >= 5);
    }

    #[test]
    fn test_up_to_date_compares_counts() {
        let status = MigrationStatus {
            applied_migrations: 4,
            latest_version: Some(20250110000004),
            known_migrations: 5,
        };
        assert!(!status.is_up_to_date());

        let status = MigrationStatus {
            applied_migrations: 5,
            ..status
        };
        assert!(status.is_up_to_date());
    }
}
