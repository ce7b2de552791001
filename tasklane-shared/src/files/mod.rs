//! File upload pipeline
//!
//! An upload goes through validation (size and MIME allow-list), a SHA-256
//! checksum, a per-organization duplicate check, optional thumbnail
//! generation, blob writes, the row insert and finally a background scan.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use tasklane_shared::files::{FileService, UploadConfig, UploadRequest};
//! use tasklane_shared::storage::MemoryStorage;
//! use uuid::Uuid;
//!
//! # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//! let files = FileService::new(pool, Arc::new(MemoryStorage::new()), UploadConfig::default());
//!
//! let outcome = files
//!     .upload(UploadRequest {
//!         organization_id: Uuid::new_v4(),
//!         uploaded_by_id: Uuid::new_v4(),
//!         project_id: None,
//!         task_id: None,
//!         file_name: "notes.txt".to_string(),
//!         content_type: Some("text/plain".to_string()),
//!         data: Bytes::from_static(b"hello"),
//!     })
//!     .await?;
//!
//! println!("stored {} (duplicate: {})", outcome.file.id, outcome.duplicate);
//! # Ok(())
//! # }
//! ```

pub mod scan;
pub mod service;
pub mod thumbnail;
pub mod validation;

pub use service::{FileService, UploadOutcome, UploadRequest};
pub use validation::UploadConfig;

use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("file is empty")]
    Empty,

    #[error("file is {size} bytes, the limit is {max} bytes")]
    TooLarge { size: u64, max: u64 },

    #[error("file type not allowed: {0}")]
    UnsupportedType(String),

    #[error("file not found")]
    NotFound,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
