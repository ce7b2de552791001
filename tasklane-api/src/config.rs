/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `JWT_SECRET`: Secret key for JWT signing, at least 32 characters (required)
/// - `API_HOST` / `API_PORT`: Bind address (default: 0.0.0.0:8080)
/// - `CORS_ORIGINS`: Comma-separated allowed origins, `*` for any (default: `*`)
/// - `PRODUCTION`: Enables HSTS (default: false)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `STORAGE_BACKEND`: `local`, `s3` or `memory` (default: local)
/// - `STORAGE_LOCAL_PATH`: Upload directory for the local backend (default: ./uploads)
/// - `S3_BUCKET`, `S3_REGION`, `S3_ENDPOINT`, `S3_ACCESS_KEY`, `S3_SECRET_KEY`,
///   `S3_PREFIX`, `S3_FORCE_PATH_STYLE`: S3 backend settings
/// - `UPLOAD_MAX_FILE_SIZE`: Upload limit in bytes (default: 52428800)
/// - `SEARCH_CACHE_TTL_SECS`: Search result cache lifetime (default: 300)
/// - `REDIS_URL`: Redis for the search cache; in-memory cache when unset
/// - `RUST_LOG` / `LOG_FORMAT`: Log filter and `json` output
///
/// # Example
///
/// ```no_run
/// use tasklane_api::config::Config;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}:{}", config.api.host, config.api.port);
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tasklane_shared::files::validation::DEFAULT_MAX_FILE_SIZE;
use tasklane_shared::files::UploadConfig;
use tasklane_shared::search::cache::DEFAULT_TTL_SECS;
use tasklane_shared::storage::{S3StorageConfig, StorageConfig};

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub uploads: UploadConfig,
    pub search: SearchConfig,
    pub redis: Option<RedisSettings>,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,

    /// Production mode turns on HSTS
    pub production: bool,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// IMPORTANT: This must be kept secret and should be at least 32 bytes.
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value: {}", key, e)),
        None => Ok(default),
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing
    /// - Environment variables have invalid values
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Builds the configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let jwt_secret = lookup("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let storage = match lookup("STORAGE_BACKEND")
            .unwrap_or_else(|| "local".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "local" => StorageConfig::Local {
                path: PathBuf::from(
                    lookup("STORAGE_LOCAL_PATH").unwrap_or_else(|| "./uploads".to_string()),
                ),
            },
            "s3" => StorageConfig::S3(S3StorageConfig {
                bucket: lookup("S3_BUCKET").unwrap_or_default(),
                region: lookup("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                endpoint: lookup("S3_ENDPOINT"),
                access_key: lookup("S3_ACCESS_KEY"),
                secret_key: lookup("S3_SECRET_KEY"),
                prefix: lookup("S3_PREFIX"),
                force_path_style: lookup("S3_FORCE_PATH_STYLE")
                    .map(|v| parse_bool(&v))
                    .unwrap_or(false),
            }),
            "memory" => StorageConfig::Memory,
            other => anyhow::bail!("STORAGE_BACKEND must be local, s3 or memory, got {}", other),
        };

        if let StorageConfig::S3(s3) = &storage {
            if s3.bucket.is_empty() {
                anyhow::bail!("S3_BUCKET is required when STORAGE_BACKEND=s3");
            }
        }

        let max_file_size = parse_or(&lookup, "UPLOAD_MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?;
        if max_file_size == 0 {
            anyhow::bail!("UPLOAD_MAX_FILE_SIZE must be greater than zero");
        }

        Ok(Self {
            api: ApiConfig {
                host: lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "API_PORT", 8080)?,
                cors_origins,
                production: lookup("PRODUCTION").map(|v| parse_bool(&v)).unwrap_or(false),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            },
            jwt: JwtConfig { secret: jwt_secret },
            storage,
            uploads: UploadConfig {
                max_file_size,
                ..Default::default()
            },
            search: SearchConfig {
                cache_ttl_secs: parse_or(&lookup, "SEARCH_CACHE_TTL_SECS", DEFAULT_TTL_SECS)?,
            },
            redis: lookup("REDIS_URL").map(|url| RedisSettings { url }),
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Request body limit: the upload limit plus room for multipart framing
    pub fn body_limit(&self) -> usize {
        usize::try_from(self.uploads.max_file_size)
            .unwrap_or(usize::MAX)
            .saturating_add(1024 * 1024)
    }
}
