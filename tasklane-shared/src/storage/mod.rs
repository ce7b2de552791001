//! Blob storage backends
//!
//! Uploaded files and their thumbnails are written through the
//! [`StorageBackend`] trait. The backend is chosen once at startup from
//! [`StorageConfig`]; the file rows remember which backend held them.
//!
//! Keys are relative, `/`-separated paths generated by the upload pipeline
//! (`<organization>/<yyyy>/<mm>/<file id>.<ext>`).
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub mod local;
pub mod memory;
pub mod s3;

pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use s3::{S3Storage, S3StorageConfig};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("s3: {0}")]
    S3(String),

    #[error("storage configuration: {0}")]
    Config(String),
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short backend name stored with each file row
    fn name(&self) -> &'static str;

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;

    /// Deleting a missing key is not an error
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    async fn healthy(&self) -> bool {
        true
    }
}

/// Which backend to build
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    Local { path: std::path::PathBuf },
    S3(S3StorageConfig),
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Local {
            path: "./uploads".into(),
        }
    }
}

pub async fn build_storage(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>, StorageError> {
    match config {
        StorageConfig::Local { path } => Ok(Arc::new(LocalStorage::new(path).await?)),
        StorageConfig::S3(s3) => Ok(Arc::new(S3Storage::new(s3).await?)),
        StorageConfig::Memory => Ok(Arc::new(MemoryStorage::new())),
    }
}

/// Rejects keys that could escape the storage root
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.contains('\0')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");

    if invalid {
        return Err(StorageError::InvalidKey(key.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("org/2025/01/file.png").is_ok());
        assert!(validate_key("file").is_ok());

        for bad in ["", "/abs/path", "a/../b", "..", "a//b", "a/./b", "a\\b", "trailing/"] {
            assert!(validate_key(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[tokio::test]
    async fn test_build_memory_storage() {
        let storage = build_storage(&StorageConfig::Memory).await.unwrap();
        assert_eq!(storage.name(), "memory");
        assert!(storage.healthy().await);
    }

    #[test]
    fn test_config_from_json() {
        let config: StorageConfig =
            serde_json::from_str(r#"{"backend": "local", "path": "/var/lib/tasklane"}"#).unwrap();
        assert!(matches!(config, StorageConfig::Local { .. }));

        let config: StorageConfig = serde_json::from_str(r#"{"backend": "memory"}"#).unwrap();
        assert!(matches!(config, StorageConfig::Memory));
    }
}
