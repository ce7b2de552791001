//! Search over projects, tasks, files and users
//!
//! Entities are mirrored into the `search_index` table as they change.
//! A query scores and pages the matching rows of the caller's organization
//! in SQL (see [`scoring::score_sql`]) and caches the resulting page.

pub mod cache;
pub mod query;
pub mod scoring;
pub mod service;

pub use cache::{CacheError, SearchCache};
pub use query::ParsedQuery;
pub use service::{SearchHit, SearchRequest, SearchResults, SearchService};

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("query must be at least {0} characters")]
    QueryTooShort(usize),

    #[error("query must be at most {0} characters")]
    QueryTooLong(usize),

    #[error("unknown entity type: {0}")]
    UnknownType(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
