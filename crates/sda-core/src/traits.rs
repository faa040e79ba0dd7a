//! Core traits for the SDA coordination layer.
//!
//! `FileStore` is the abstract shape of C1 (§4.1): every operation the
//! admin API and the workers need, retried and reconnect-aware inside the
//! concrete implementation. Defining it here — rather than in `sda-db`
//! directly — lets the broker, worker skeleton, and admin API crates depend
//! on the abstraction without pulling in `sqlx`, and lets tests substitute
//! an in-memory double (§9: "pass an explicit context... tests become
//! straightforward").

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    error::Result,
    types::{AccessionCheck, ArchiveInfo, CorrelationId, DatasetId, FileEventType, FileId, VerifiedInfo},
};

/// A lifecycle service that can be started and stopped cooperatively.
#[async_trait]
pub trait Service {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

/// A component whose liveness can be probed (§4.5 readiness).
#[async_trait]
pub trait HealthCheck {
    /// Returns `Ok(())` iff the component answers within its own timeout.
    async fn ping(&self) -> Result<()>;
}

/// Projection of a file's current status plus the handful of fields the
/// admin API and workers read back out.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub file_id: FileId,
    pub submission_user: String,
    pub submission_file_path: String,
    pub status: FileEventType,
    pub stable_id: Option<String>,
    pub archive_file_path: Option<String>,
    pub archive_file_size: Option<i64>,
    pub key_hash: Option<String>,
}

/// One row the admin API lists for a user (`GET /files`, `GET /users/:u/files`).
#[derive(Debug, Clone)]
pub struct UserFile {
    pub file_id: FileId,
    pub inbox_path: String,
    pub status: FileEventType,
}

/// External object storage, named by interface only (§1 Out of scope):
/// inbox and archive are both addressed through this same shape, whether
/// backed by S3 or POSIX.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn read(&self, path: &str) -> Result<Vec<u8>>;
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;
    async fn stat_size(&self, path: &str) -> Result<i64>;
}

/// External Crypt4GH collaborator, named by interface only (§1): the only
/// operation the coordination layer relies on is re-encrypting a header
/// for a new recipient without touching the payload.
#[async_trait]
pub trait HeaderReencryptor: Send + Sync {
    async fn reencrypt_header(&self, header: &[u8]) -> Result<Vec<u8>>;
}

/// The authoritative store for files, events, checksums, datasets, and
/// encryption keys (C1, §4.1). Every mutating method here is the *outer*,
/// retrying entry point described in §4.1's retry contract; implementations
/// own the inner single-attempt call and the `check_and_reconnect_if_needed`
/// step.
#[async_trait]
pub trait FileStore: HealthCheck + Send + Sync {
    /// Create-or-update the file row and append a `registered` event.
    /// Idempotent on `(submission_user, submission_file_path)`; the row is
    /// reused but the event is always appended.
    async fn register_file(&self, inbox_path: &str, user: &str) -> Result<FileId>;

    /// Append an event; fails if no row was inserted (the file must already
    /// exist).
    async fn update_file_event_log(
        &self,
        file_id: FileId,
        event: FileEventType,
        correlation_id: CorrelationId,
        user: &str,
        details: Option<Value>,
        message: &str,
    ) -> Result<()>;

    /// Persist the Crypt4GH header bytes so a replay can resume without
    /// re-reading the object from storage.
    async fn store_header(&self, file_id: FileId, header: &[u8]) -> Result<()>;

    /// Raw header bytes stored by [`FileStore::store_header`].
    async fn get_header(&self, file_id: FileId) -> Result<Vec<u8>>;

    /// Write the archive path/size/checksum and append an `archived` event,
    /// atomically.
    async fn set_archived(
        &self,
        file_id: FileId,
        correlation_id: CorrelationId,
        info: &ArchiveInfo,
    ) -> Result<()>;

    /// Write the decrypted size/checksum and append a `verified` event,
    /// atomically.
    async fn set_verified(
        &self,
        file_id: FileId,
        correlation_id: CorrelationId,
        info: &VerifiedInfo,
    ) -> Result<()>;

    /// Assign the stable accession id; fails if the row is missing.
    async fn set_accession_id(&self, stable_id: &str, file_id: FileId) -> Result<()>;

    /// Pre-check used before assigning an accession, to distinguish
    /// "already assigned to this file" from "taken by another file".
    async fn check_accession_id_exists(
        &self,
        stable_id: &str,
        file_id: FileId,
    ) -> Result<AccessionCheck>;

    /// Within one transaction: create the dataset row if missing, resolve
    /// each accession to its file id, insert the mapping rows. Rolls back
    /// entirely on any lookup failure.
    async fn map_files_to_dataset(&self, dataset_stable_id: &str, accession_ids: &[String]) -> Result<()>;

    /// Resolve a dataset's externally-chosen `stable_id` to its opaque
    /// `dataset_id`, for callers (the release worker) that only ever learn
    /// the stable id from a broker message.
    async fn get_dataset_id(&self, stable_id: &str) -> Result<DatasetId>;

    /// Append a dataset event.
    async fn update_dataset_event(
        &self,
        dataset_id: DatasetId,
        event: crate::types::DatasetEventType,
        message: &str,
    ) -> Result<()>;

    /// Latest event for the given correlation id.
    async fn get_file_status(&self, correlation_id: CorrelationId) -> Result<FileEventType>;

    /// Full projection of a file's current state.
    async fn get_file_info(&self, file_id: FileId) -> Result<FileInfo>;

    /// Inbox path for a stable id.
    async fn get_inbox_path(&self, stable_id: &str) -> Result<String>;

    /// Archive path for a stable id.
    async fn get_archive_path(&self, stable_id: &str) -> Result<String>;

    /// Hex-decoded header bytes for a stable id.
    async fn get_header_for_stable_id(&self, stable_id: &str) -> Result<Vec<u8>>;

    /// Everything the federated sync path needs about a stable id, bundled
    /// as JSON (the sync-api re-encodes this; no separate route is built
    /// here, see SPEC_FULL Non-goals).
    async fn get_sync_data(&self, stable_id: &str) -> Result<Value>;

    /// Users with at least one file not yet mapped into a dataset.
    async fn list_active_users(&self) -> Result<Vec<String>>;

    /// A user's files that are not yet mapped into a dataset.
    async fn get_user_files(&self, user: &str) -> Result<Vec<UserFile>>;

    /// The correlation id to reuse for a user/path not yet part of any
    /// dataset, so admin-triggered operations join an existing
    /// conversation instead of starting a new one.
    async fn get_corr_id(&self, user: &str, path: &str) -> Result<CorrelationId>;

    /// Resolve a submitter's own path back to a `file_id`. `Error::NotFound`
    /// distinguishes "no such user+path" (400 at the admin API edge) from a
    /// retryable database failure; used by the admin API's ingest and
    /// accession handlers before they ever touch the broker.
    async fn find_file_id_by_path(&self, user: &str, path: &str) -> Result<FileId>;

    /// Register a new encryption key hash.
    async fn add_key_hash(&self, key_hash: &str, description: &str) -> Result<()>;

    /// Associate a file with the encryption key used for its header.
    async fn set_key_hash(&self, file_id: FileId, key_hash: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct AlwaysHealthy;

    #[async_trait]
    impl HealthCheck for AlwaysHealthy {
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn health_check_trait_object_is_usable() {
        let probe: Box<dyn HealthCheck + Send + Sync> = Box::new(AlwaysHealthy);
        assert!(probe.ping().await.is_ok());
    }
}
