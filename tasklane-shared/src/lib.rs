//! # Tasklane Shared Library
//!
//! This crate contains the data model, business logic and infrastructure
//! adapters used by the Tasklane API server.
//!
//! ## Module Organization
//!
//! - `models`: Database models and their queries
//! - `auth`: Password hashing, JWT tokens, request auth context and role checks
//! - `db`: Connection pool and migrations
//! - `storage`: Blob storage backends (local disk, S3, memory)
//! - `files`: File upload pipeline (validation, checksum, thumbnails, scan)
//! - `search`: Search index maintenance, relevance scoring and result caching
//! - `notifications`: Notification persistence and WebSocket fan-out hub
//! - `redis`: Redis client used by the search result cache

pub mod auth;
pub mod db;
pub mod files;
pub mod models;
pub mod notifications;
pub mod redis;
pub mod search;
pub mod storage;

/// Current version of the Tasklane shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
