//! `ingest` stage (§4.3): read the inbox object, persist and reencrypt its
//! Crypt4GH header, write the archive object, record `archived`.

use serde_json::Value;
use tracing::instrument;

use sda_core::{
    crypt4gh,
    traits::{FileStore, HeaderReencryptor, ObjectStore},
    types::{ArchiveInfo, ChecksumType, CorrelationId},
    Error,
};

use crate::driver::{Outcome, WorkerHandler};

/// Handles `ingest` messages (schema `ingestion-trigger`): `{type, user,
/// filepath}`. Archives the file and hands off to [`super::VerifyHandler`]
/// by publishing a `verification` message — the canonical broker types in
/// spec.md §6 don't name an archived→verify handoff schema, so this worker
/// mints one (`ingestion-verification`) rather than folding verify into this
/// handler, keeping each stage a single retryable unit per §4.3.
pub struct IngestHandler {
    objects: std::sync::Arc<dyn ObjectStore>,
    reencryptor: std::sync::Arc<dyn HeaderReencryptor>,
    archive_root: String,
}

impl IngestHandler {
    pub fn new(
        objects: std::sync::Arc<dyn ObjectStore>,
        reencryptor: std::sync::Arc<dyn HeaderReencryptor>,
        archive_root: impl Into<String>,
    ) -> Self {
        Self {
            objects,
            reencryptor,
            archive_root: archive_root.into(),
        }
    }

    fn archive_path(&self, filepath: &str) -> String {
        format!("{}/{}", self.archive_root.trim_end_matches('/'), filepath.trim_start_matches('/'))
    }
}

#[async_trait::async_trait]
impl WorkerHandler for IngestHandler {
    fn queue(&self) -> &str {
        "ingest"
    }

    fn input_schema(&self) -> &str {
        "ingestion-trigger"
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

        let file_id = match store.register_file(filepath, user).await {
            Ok(id) => id,
            Err(err) => return Outcome::Recoverable(err),
        };

        let raw = match self.objects.read(filepath).await {
            Ok(bytes) => bytes,
            Err(err) if err.is_definitive() => return Outcome::Fatal { file_id: Some(file_id), err },
            Err(err) => return Outcome::Recoverable(err),
        };

        let header_len = match crypt4gh::header_length(&raw) {
            Ok(len) => len,
            Err(err) => return Outcome::Fatal { file_id: Some(file_id), err },
        };
        let (header, payload) = raw.split_at(header_len);

        if let Err(err) = store.store_header(file_id, header).await {
            return Outcome::Recoverable(err);
        }

        let reencrypted_header = match self.reencryptor.reencrypt_header(header).await {
            Ok(h) => h,
            Err(err) => return Outcome::Fatal { file_id: Some(file_id), err },
        };

        let mut archived_bytes = reencrypted_header;
        archived_bytes.extend_from_slice(payload);

        let archive_path = self.archive_path(filepath);
        if let Err(err) = self.objects.write(&archive_path, &archived_bytes).await {
            return Outcome::Recoverable(err);
        }

        let checksum = sda_core::utils::sha256_hex(&archived_bytes);
        let info = ArchiveInfo {
            archive_file_path: archive_path,
            archive_file_size: archived_bytes.len() as i64,
            checksum,
            checksum_type: ChecksumType::sha256(),
        };

        if let Err(err) = store.set_archived(file_id, correlation_id, &info).await {
            return Outcome::Recoverable(err);
        }

        Outcome::Publish(crate::driver::NextMessage {
            schema_name: "ingestion-verification".into(),
            routing_key: "verification".into(),
            body: serde_json::json!({
                "type": "verification",
                "user": user,
                "filepath": filepath,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeObjectStore, FakeStore, PassthroughReencryptor};
    use std::sync::Arc;

    fn c4gh_container(packet: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"crypt4gh");
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        let len = (packet.len() + 4) as u32;
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(packet);
        buf.extend_from_slice(payload);
        buf
    }

    #[tokio::test]
    async fn archives_and_publishes_a_verification_message() {
        let store = FakeStore::default();
        let objects = Arc::new(FakeObjectStore::default());
        let container = c4gh_container(b"key-packet", b"ciphertext-payload");
        objects.seed("inbox/dummy/file1.c4gh", container);

        let handler = IngestHandler::new(objects.clone(), Arc::new(PassthroughReencryptor), "archive");
        let body = serde_json::json!({"user": "dummy", "filepath": "inbox/dummy/file1.c4gh"});

        match handler.handle(&store, CorrelationId::new(), &body).await {
            Outcome::Publish(next) => {
                assert_eq!(next.schema_name, "ingestion-verification");
                assert_eq!(next.body["user"], "dummy");
            }
            _ => panic!("expected Outcome::Publish"),
        }

        let archived = objects.read("archive/inbox/dummy/file1.c4gh").await.unwrap();
        assert!(archived.ends_with(b"ciphertext-payload"));
    }

    #[tokio::test]
    async fn rejects_a_non_crypt4gh_object() {
        let store = FakeStore::default();
        let objects = Arc::new(FakeObjectStore::default());
        objects.seed("inbox/dummy/bad.c4gh", b"not-a-container".to_vec());

        let handler = IngestHandler::new(objects, Arc::new(PassthroughReencryptor), "archive");
        let body = serde_json::json!({"user": "dummy", "filepath": "inbox/dummy/bad.c4gh"});

        match handler.handle(&store, CorrelationId::new(), &body).await {
            Outcome::Fatal { .. } => {}
            _ => panic!("expected Outcome::Fatal"),
        }
    }
}
