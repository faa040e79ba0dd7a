//! `verify` stage (§4.3): recompute the decrypted payload checksum from the
//! archived object and the stored header, and record `verified`.
//!
//! Full Crypt4GH decryption is out of scope (§1: the coordination layer
//! relies only on "decrypt-and-reencrypt a header", nothing about payload
//! decryption). The checksum recorded here is a documented surrogate: a
//! hash of the archived payload bytes with the header stripped off, not of
//! the plaintext a real Crypt4GH decrypt would produce. See DESIGN.md.

use serde_json::Value;
use tracing::instrument;

use sda_core::{
    traits::{FileStore, ObjectStore},
    types::{ChecksumType, CorrelationId, VerifiedInfo},
    Error,
};

use crate::driver::{Outcome, WorkerHandler};

pub struct VerifyHandler {
    objects: std::sync::Arc<dyn ObjectStore>,
}

impl VerifyHandler {
    pub fn new(objects: std::sync::Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }
}

#[async_trait::async_trait]
impl WorkerHandler for VerifyHandler {
    fn queue(&self) -> &str {
        "verification"
    }

    fn input_schema(&self) -> &str {
        "ingestion-verification"
    }

    #[instrument(level = "debug", skip(self, store, body), fields(%correlation_id))]
    async fn handle(&self, store: &dyn FileStore, correlation_id: CorrelationId, body: &Value) -> Outcome {
        let user = match body["user"].as_str() {
            Some(u) => u,
            None => return Outcome::Recoverable(Error::Validation("missing user".into())),
        };
        let filepath = match body["filepath"].as_str() {
            Some(p) => p,
            None => return Outcome::Recoverable(Error::Validation("missing filepath".into())),
        };

        let file_id = match store.find_file_id_by_path(user, filepath).await {
            Ok(id) => id,
            Err(err) if err.is_definitive() => return Outcome::Fatal { file_id: None, err },
            Err(err) => return Outcome::Recoverable(err),
        };

        let info = match store.get_file_info(file_id).await {
            Ok(info) => info,
            Err(err) => return Outcome::Recoverable(err),
        };

        let archive_path = match info.archive_file_path {
            Some(p) => p,
            None => {
                return Outcome::Fatal {
                    file_id: Some(file_id),
                    err: Error::Validation("file has no archive path yet".into()),
                }
            }
        };

        let header = match store.get_header(file_id).await {
            Ok(h) => h,
            Err(err) => return Outcome::Recoverable(err),
        };

        let archived = match self.objects.read(&archive_path).await {
            Ok(bytes) => bytes,
            Err(err) if err.is_definitive() => return Outcome::Fatal { file_id: Some(file_id), err },
            Err(err) => return Outcome::Recoverable(err),
        };

        if archived.len() < header.len() {
            return Outcome::Fatal {
                file_id: Some(file_id),
                err: Error::Validation("archived object shorter than its own header".into()),
            };
        }
        let payload = &archived[header.len()..];

        let verified = VerifiedInfo {
            decrypted_size: payload.len() as i64,
            decrypted_checksum: sda_core::utils::sha256_hex(payload),
            checksum_type: ChecksumType::sha256(),
        };

        match store.set_verified(file_id, correlation_id, &verified).await {
            Ok(()) => Outcome::Done,
            Err(err) => Outcome::Recoverable(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeObjectStore, FakeStore};
    use sda_core::types::ArchiveInfo;
    use std::sync::Arc;

    #[tokio::test]
    async fn computes_a_checksum_over_the_payload_past_the_header() {
        let store = FakeStore::default();
        let file_id = store.seed_registered("dummy", "inbox/dummy/file1.c4gh");
        store.store_header(file_id, b"header-bytes").await.unwrap();
        store
            .set_archived(
                file_id,
                CorrelationId::new(),
                &ArchiveInfo {
                    archive_file_path: "archive/file1.c4gh".into(),
                    archive_file_size: 30,
                    checksum: "irrelevant".into(),
                    checksum_type: ChecksumType::sha256(),
                },
            )
            .await
            .unwrap();

        let objects = Arc::new(FakeObjectStore::default());
        let mut archived = b"header-bytes".to_vec();
        archived.extend_from_slice(b"payload-bytes");
        objects.seed("archive/file1.c4gh", archived);

        let handler = VerifyHandler::new(objects);
        let body = serde_json::json!({"user": "dummy", "filepath": "inbox/dummy/file1.c4gh"});

        match handler.handle(&store, CorrelationId::new(), &body).await {
            Outcome::Done => {}
            _ => panic!("expected Outcome::Done"),
        }
        assert_eq!(store.events_for(file_id).last(), Some(&FileEventType::Verified));
    }

    #[tokio::test]
    async fn unknown_path_is_fatal() {
        let store = FakeStore::default();
        let handler = VerifyHandler::new(Arc::new(FakeObjectStore::default()));
        let body = serde_json::json!({"user": "dummy", "filepath": "no-such-file"});

        match handler.handle(&store, CorrelationId::new(), &body).await {
            Outcome::Fatal { .. } => {}
            _ => panic!("expected Outcome::Fatal"),
        }
    }
}
