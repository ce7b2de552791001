//! Upload validation: size limits, MIME allow-list and file naming

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::UploadError;

/// Default maximum upload size: 50 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

const DEFAULT_ALLOWED_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "image/bmp",
    "image/svg+xml",
    "application/pdf",
    "text/plain",
    "text/csv",
    "text/markdown",
    "application/json",
    "application/zip",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub max_file_size: u64,

    /// Lowercase `type/subtype` entries
    pub allowed_mime_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_mime_types: DEFAULT_ALLOWED_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl UploadConfig {
    pub fn is_allowed(&self, mime: &str) -> bool {
        self.allowed_mime_types.iter().any(|m| m == mime)
    }
}

/// `type/subtype` without parameters, lowercased
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Picks the MIME type of an upload.
///
/// The declared content type wins when it is allowed. A missing, generic or
/// disallowed declaration falls back to a guess from the file name.
pub fn resolve_mime_type(
    config: &UploadConfig,
    declared: Option<&str>,
    file_name: &str,
) -> Result<String, UploadError> {
    let declared = declared.map(essence).filter(|m| !m.is_empty());

    if let Some(mime) = declared.as_deref() {
        if config.is_allowed(mime) {
            return Ok(mime.to_string());
        }
    }

    let guessed = mime_guess::from_path(file_name)
        .first()
        .map(|m| essence(m.essence_str()));

    match guessed {
        Some(mime) if config.is_allowed(&mime) => Ok(mime),
        _ => Err(UploadError::UnsupportedType(
            declared.unwrap_or_else(|| "application/octet-stream".to_string()),
        )),
    }
}

pub fn validate_size(config: &UploadConfig, size: u64) -> Result<(), UploadError> {
    if size == 0 {
        return Err(UploadError::Empty);
    }
    if size > config.max_file_size {
        return Err(UploadError::TooLarge {
            size,
            max: config.max_file_size,
        });
    }
    Ok(())
}

/// Lowercase hex SHA-256
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Strips directories and control characters from a client-supplied name
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .take(255)
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "unnamed".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Extension used in storage keys: the file name's own when it is short and
/// alphanumeric, otherwise one derived from the MIME type
pub fn storage_extension(file_name: &str, mime: &str) -> String {
    let from_name = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    from_name
        .or_else(|| {
            mime_guess::get_mime_extensions_str(mime)
                .and_then(|exts| exts.first())
                .map(|ext| ext.to_string())
        })
        .unwrap_or_else(|| "bin".to_string())
}
