use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region, SharedCredentialsProvider};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{validate_key, StorageBackend, StorageError};

/// S3 or an S3-compatible store (MinIO, R2, ...)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3StorageConfig {
    pub bucket: String,
    pub region: String,

    /// Custom endpoint for S3-compatible stores
    pub endpoint: Option<String>,

    /// Static credentials. When absent the default AWS provider chain is used.
    pub access_key: Option<String>,
    pub secret_key: Option<String>,

    /// Prepended to every key
    pub prefix: Option<String>,

    #[serde(default)]
    pub force_path_style: bool,
}

#[derive(Debug)]
pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3Storage {
    #[tracing::instrument(skip(config), name = "S3Storage::new", fields(bucket = %config.bucket), err)]
    pub async fn new(config: &S3StorageConfig) -> Result<Self, StorageError> {
        tracing::debug!("setting up s3 storage");

        if config.bucket.is_empty() {
            return Err(StorageError::Config("S3 bucket is required".to_string()));
        }

        let mut builder = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => aws_sdk_s3::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .credentials_provider(SharedCredentialsProvider::new(Credentials::new(
                    access_key.clone(),
                    secret_key.clone(),
                    None,
                    None,
                    "TasklaneStaticCredentials",
                ))),
            _ => {
                let shared = aws_config::load_defaults(BehaviorVersion::latest()).await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
        };

        builder.set_region(Some(Region::new(config.region.clone())));
        builder.set_endpoint_url(config.endpoint.clone());
        builder.set_force_path_style(Some(config.force_path_style));

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone(),
        })
    }

    fn object_key(&self, key: &str) -> Result<String, StorageError> {
        validate_key(key)?;

        Ok(match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), key),
            None => key.to_string(),
        })
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    fn name(&self) -> &'static str {
        "s3"
    }

    #[tracing::instrument(skip(self, data), name = "S3Storage::put", fields(size = data.len()), err)]
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StorageError> {
        let object_key = self.object_key(key)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(object_key)
            .content_type(content_type)
            .body(data.into())
            .send()
            .await
            .map_err(|e| StorageError::S3(format!("put failed: {}", e)))?;

        Ok(())
    }

    #[tracing::instrument(skip(self), name = "S3Storage::get", err)]
    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let object_key = self.object_key(key)?;

        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(object_key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map_or(false, |se| se.is_no_such_key()) {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::S3(format!("get failed: {}", e))
                }
            })?;

        let bytes = result
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(format!("read body failed: {}", e)))?;

        Ok(bytes.into_bytes())
    }

    #[tracing::instrument(skip(self), name = "S3Storage::delete", err)]
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let object_key = self.object_key(key)?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(object_key)
            .send()
            .await
            .map_err(|e| StorageError::S3(format!("delete failed: {}", e)))?;

        Ok(())
    }

    async fn healthy(&self) -> bool {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
    }
}
