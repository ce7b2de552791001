use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::{validate_key, StorageBackend, StorageError};

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    content_type: String,
}

/// Process-local storage for tests and ephemeral deployments
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, MemoryObject>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.content_type.clone())
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    #[tracing::instrument(skip(self, data), name = "MemoryStorage::put", fields(size = data.len()), err)]
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StorageError> {
        validate_key(key)?;

        self.objects.write().await.insert(
            key.to_owned(),
            MemoryObject {
                data,
                content_type: content_type.to_owned(),
            },
        );

        Ok(())
    }

    #[tracing::instrument(skip(self), name = "MemoryStorage::get", err)]
    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    #[tracing::instrument(skip(self), name = "MemoryStorage::delete", err)]
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.write().await.remove(key);
        Ok(())
    }
}
