//! Content fingerprinting for duplicate detection
//!
//! A SHA-256 digest of the raw uploaded bytes is compared against every
//! fingerprint already in the upload registry. A match is a conflict
//! outcome carrying the existing record, not an error: callers surface the
//! existing upload's identity so users re-trigger processing on it instead
//! of re-uploading.

use crate::models::UploadRecord;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tirta_common::Result;

/// Outcome of a duplicate check
#[derive(Debug, Clone)]
pub enum DuplicateCheck {
    /// Fingerprint unseen; continue with registration
    Unique(String),
    /// Byte-identical upload already registered
    Duplicate {
        hash: String,
        existing: UploadRecord,
    },
}

/// Hex-encoded SHA-256 digest of raw file bytes
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Fingerprint the upload and check it against the registry
pub async fn check_duplicate(pool: &SqlitePool, bytes: &[u8]) -> Result<DuplicateCheck> {
    let hash = sha256_hex(bytes);

    match crate::db::uploads::find_by_hash(pool, &hash).await? {
        Some(existing) => {
            tracing::info!(
                hash = %hash,
                existing_upload = %existing.id,
                "Duplicate upload detected"
            );
            Ok(DuplicateCheck::Duplicate { hash, existing })
        }
        None => Ok(DuplicateCheck::Unique(hash)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DateRange, Granularity};

    async fn setup_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::db::init_tables(&pool).await.unwrap();
        pool
    }

    #[test]
    fn digest_is_stable_hex_sha256() {
        let hash = sha256_hex(b"test content");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, format!("{:x}", Sha256::digest(b"test content")));
    }

    #[tokio::test]
    async fn unseen_content_is_unique() {
        let pool = setup_pool().await;
        let result = check_duplicate(&pool, b"fresh bytes").await.unwrap();
        assert!(matches!(result, DuplicateCheck::Unique(_)));
    }

    #[tokio::test]
    async fn registered_content_is_reported_as_duplicate() {
        let pool = setup_pool().await;
        let bytes = b"date,total_m3\n2025-01-01,1.5\n";

        let record = UploadRecord::new(
            "upload_1.csv".to_string(),
            Granularity::Daily,
            1,
            DateRange {
                start: "2025-01-01".to_string(),
                end: "2025-01-01".to_string(),
            },
            sha256_hex(bytes),
        );
        crate::db::uploads::insert(&pool, &record).await.unwrap();

        match check_duplicate(&pool, bytes).await.unwrap() {
            DuplicateCheck::Duplicate { existing, hash } => {
                assert_eq!(existing.id, record.id);
                assert_eq!(hash, record.file_hash);
            }
            other => panic!("Expected Duplicate, got {:?}", other),
        }
    }
}
