use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use super::{validate_key, StorageBackend, StorageError};

/// Files under a directory on the local filesystem
#[derive(Debug)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    #[tracing::instrument(skip(root), name = "LocalStorage::new", fields(root = %root.display()), err)]
    pub async fn new(root: &Path) -> Result<Self, StorageError> {
        tracing::debug!("setting up local storage");

        tokio::fs::create_dir_all(root).await?;

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn name(&self) -> &'static str {
        "local"
    }

    #[tracing::instrument(skip(self, data, _content_type), name = "LocalStorage::put", fields(size = data.len()), err)]
    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(path, data).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), name = "LocalStorage::get", err)]
    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = self.path_for(key)?;

        match tokio::fs::read(path).await {
            Ok(data) => Ok(data.into()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self), name = "LocalStorage::delete", err)]
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;

        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn healthy(&self) -> bool {
        tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("tasklane-storage-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let root = temp_root();
        let storage = LocalStorage::new(&root).await.unwrap();

        storage
            .put("org/2025/01/a.txt", Bytes::from_static(b"hello"), "text/plain")
            .await
            .unwrap();
        assert!(root.join("org/2025/01/a.txt").exists());

        let data = storage.get("org/2025/01/a.txt").await.unwrap();
        assert_eq!(&data[..], b"hello");

        storage.delete("org/2025/01/a.txt").await.unwrap();
        assert!(matches!(
            storage.get("org/2025/01/a.txt").await,
            Err(StorageError::NotFound(_))
        ));

        // deleting twice is fine
        storage.delete("org/2025/01/a.txt").await.unwrap();
        assert!(storage.healthy().await);

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let root = temp_root();
        let storage = LocalStorage::new(&root).await.unwrap();

        let result = storage
            .put("../escape.txt", Bytes::from_static(b"x"), "text/plain")
            .await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }
}
