//! Database layer for Tasklane
//!
//! - `pool`: PostgreSQL connection pool with a startup health check
//! - `migrations`: embedded sqlx migrations from the workspace `migrations/` directory
//!
//! Models live in the crate-level `models` module.

pub mod migrations;
pub mod pool;
