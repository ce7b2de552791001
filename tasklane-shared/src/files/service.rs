use std::sync::Arc;

use bytes::Bytes;
use chrono::{Datelike, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::scan::scan_stored_file;
use super::thumbnail::{generate_thumbnail, is_raster_image};
use super::validation::{
    checksum, resolve_mime_type, sanitize_file_name, storage_extension, validate_size,
    UploadConfig,
};
use super::UploadError;
use crate::models::file::{CreateFile, FileRecord};
use crate::storage::StorageBackend;

const CHECKSUM_CONSTRAINT: &str = "files_checksum_key";

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub organization_id: Uuid,
    pub uploaded_by_id: Uuid,
    pub project_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub file_name: String,

    /// Content type declared by the client, if any
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub file: FileRecord,

    /// True when identical content already existed in the organization
    pub duplicate: bool,
}

/// Blob key for an upload: `<org>/<yyyy>/<mm>/<file id>.<ext>`
pub fn blob_key(organization_id: Uuid, file_id: Uuid, extension: &str) -> String {
    let now = Utc::now();
    format!(
        "{}/{:04}/{:02}/{}.{}",
        organization_id,
        now.year(),
        now.month(),
        file_id,
        extension
    )
}

pub fn thumbnail_key(organization_id: Uuid, file_id: Uuid) -> String {
    format!("{}/thumbnails/{}.png", organization_id, file_id)
}

fn is_checksum_conflict(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.constraint() == Some(CHECKSUM_CONSTRAINT)
    )
}

#[derive(Clone)]
pub struct FileService {
    pool: PgPool,
    storage: Arc<dyn StorageBackend>,
    config: Arc<UploadConfig>,
}

impl FileService {
    pub fn new(pool: PgPool, storage: Arc<dyn StorageBackend>, config: UploadConfig) -> Self {
        Self {
            pool,
            storage,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    #[tracing::instrument(
        skip(self, req),
        fields(org_id = %req.organization_id, file_name = %req.file_name, size = req.data.len())
    )]
    pub async fn upload(&self, req: UploadRequest) -> Result<UploadOutcome, UploadError> {
        validate_size(&self.config, req.data.len() as u64)?;

        let original_name = sanitize_file_name(&req.file_name);
        let mime_type =
            resolve_mime_type(&self.config, req.content_type.as_deref(), &original_name)?;
        let checksum = checksum(&req.data);

        if let Some(existing) =
            FileRecord::find_by_checksum(&self.pool, req.organization_id, &checksum).await?
        {
            tracing::debug!(file_id = %existing.id, "duplicate upload");
            return Ok(UploadOutcome {
                file: existing,
                duplicate: true,
            });
        }

        let file_id = Uuid::new_v4();
        let key = blob_key(
            req.organization_id,
            file_id,
            &storage_extension(&original_name, &mime_type),
        );

        let thumbnail = if is_raster_image(&mime_type) {
            let data = req.data.clone();
            match tokio::task::spawn_blocking(move || generate_thumbnail(&data)).await {
                Ok(Ok(thumb)) => Some(thumb),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "thumbnail generation failed");
                    None
                }
                Err(e) => {
                    tracing::warn!(error = %e, "thumbnail task panicked");
                    None
                }
            }
        } else {
            None
        };

        self.storage.put(&key, req.data.clone(), &mime_type).await?;

        let thumb_key = match thumbnail {
            Some(thumb) => {
                let thumb_key = thumbnail_key(req.organization_id, file_id);
                match self.storage.put(&thumb_key, thumb, "image/png").await {
                    Ok(()) => Some(thumb_key),
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to store thumbnail");
                        None
                    }
                }
            }
            None => None,
        };

        let created = FileRecord::create(
            &self.pool,
            CreateFile {
                id: file_id,
                organization_id: req.organization_id,
                project_id: req.project_id,
                task_id: req.task_id,
                uploaded_by_id: req.uploaded_by_id,
                original_name,
                mime_type,
                size_bytes: req.data.len() as i64,
                checksum: checksum.clone(),
                storage_backend: self.storage.name().to_string(),
                storage_key: key.clone(),
                thumbnail_key: thumb_key.clone(),
            },
        )
        .await;

        let file = match created {
            Ok(file) => file,
            Err(e) => {
                self.discard_blobs(&key, thumb_key.as_deref()).await;

                if is_checksum_conflict(&e) {
                    if let Some(winner) =
                        FileRecord::find_by_checksum(&self.pool, req.organization_id, &checksum)
                            .await?
                    {
                        return Ok(UploadOutcome {
                            file: winner,
                            duplicate: true,
                        });
                    }
                }
                return Err(e.into());
            }
        };

        tracing::info!(file_id = %file.id, mime_type = %file.mime_type, "file uploaded");

        tokio::spawn(scan_stored_file(
            self.pool.clone(),
            self.storage.clone(),
            file.id,
            key,
        ));

        Ok(UploadOutcome {
            file,
            duplicate: false,
        })
    }

    async fn discard_blobs(&self, key: &str, thumb_key: Option<&str>) {
        for key in std::iter::once(key).chain(thumb_key) {
            if let Err(e) = self.storage.delete(key).await {
                tracing::warn!(error = %e, key, "failed to remove orphaned blob");
            }
        }
    }

    pub async fn find(&self, organization_id: Uuid, id: Uuid) -> Result<FileRecord, UploadError> {
        FileRecord::find(&self.pool, organization_id, id)
            .await?
            .ok_or(UploadError::NotFound)
    }

    /// File row and its content
    pub async fn download(
        &self,
        organization_id: Uuid,
        id: Uuid,
    ) -> Result<(FileRecord, Bytes), UploadError> {
        let file = self.find(organization_id, id).await?;
        let data = self.storage.get(&file.storage_key).await?;
        Ok((file, data))
    }

    pub async fn thumbnail(&self, organization_id: Uuid, id: Uuid) -> Result<Bytes, UploadError> {
        let file = self.find(organization_id, id).await?;
        let key = file.thumbnail_key.ok_or(UploadError::NotFound)?;
        Ok(self.storage.get(&key).await?)
    }

    /// Deletes the row, then its blobs. Blob failures are logged only.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, organization_id: Uuid, id: Uuid) -> Result<FileRecord, UploadError> {
        let file = FileRecord::delete(&self.pool, organization_id, id)
            .await?
            .ok_or(UploadError::NotFound)?;

        self.discard_blobs(&file.storage_key, file.thumbnail_key.as_deref())
            .await;

        tracing::info!(file_id = %file.id, "file deleted");
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_key_layout() {
        let org = Uuid::new_v4();
        let id = Uuid::new_v4();
        let key = blob_key(org, id, "pdf");

        let parts: Vec<&str> = key.split('/').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], org.to_string());
        assert_eq!(parts[1].len(), 4);
        assert_eq!(parts[2].len(), 2);
        assert_eq!(parts[3], format!("{}.pdf", id));
        assert!(crate::storage::validate_key(&key).is_ok());
    }

    #[test]
    fn test_thumbnail_key_layout() {
        let org = Uuid::new_v4();
        let id = Uuid::new_v4();
        assert_eq!(
            thumbnail_key(org, id),
            format!("{}/thumbnails/{}.png", org, id)
        );
    }

    #[test]
    fn test_non_database_error_is_not_conflict() {
        assert!(!is_checksum_conflict(&sqlx::Error::RowNotFound));
    }
}
