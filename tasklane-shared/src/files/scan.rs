//! Post-upload content scan
//!
//! Runs after the upload response has been sent. The only signature checked
//! is the EICAR test string, which lets deployments verify the wiring end to
//! end; swapping in a real scanner only changes [`scan_bytes`].

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::file::{FileRecord, ScanStatus};
use crate::storage::StorageBackend;

/// The EICAR antivirus test file signature
pub const EICAR_SIGNATURE: &[u8] =
    br"X5O!P%@AP[4\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";

pub fn scan_bytes(data: &[u8]) -> ScanStatus {
    let infected = data.len() >= EICAR_SIGNATURE.len()
        && data
            .windows(EICAR_SIGNATURE.len())
            .any(|window| window == EICAR_SIGNATURE);

    if infected {
        ScanStatus::Infected
    } else {
        ScanStatus::Clean
    }
}

/// Reads the stored blob back, scans it and records the verdict.
#[tracing::instrument(skip(pool, storage))]
pub async fn scan_stored_file(
    pool: PgPool,
    storage: Arc<dyn StorageBackend>,
    file_id: Uuid,
    storage_key: String,
) -> ScanStatus {
    let status = match storage.get(&storage_key).await {
        Ok(data) => scan_bytes(&data),
        Err(e) => {
            tracing::warn!(error = %e, "scan could not read blob");
            ScanStatus::Failed
        }
    };

    if status == ScanStatus::Infected {
        tracing::warn!("upload flagged as infected");
    }

    if let Err(e) = FileRecord::set_scan_status(&pool, file_id, status).await {
        tracing::error!(error = %e, "failed to record scan status");
    }

    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_content() {
        assert_eq!(scan_bytes(b"quarterly report"), ScanStatus::Clean);
        assert_eq!(scan_bytes(b""), ScanStatus::Clean);
    }

    #[test]
    fn test_eicar_detected_anywhere() {
        let mut data = b"prefix bytes ".to_vec();
        data.extend_from_slice(EICAR_SIGNATURE);
        data.extend_from_slice(b" suffix");

        assert_eq!(scan_bytes(EICAR_SIGNATURE), ScanStatus::Infected);
        assert_eq!(scan_bytes(&data), ScanStatus::Infected);
    }
}
