//! `finalize` stage (§4.3): assign the stable accession id and mark the
//! file `ready`. Modeled after the original's single "backup" event
//! (SPEC_FULL §4.3): `backup` has no distinct queue contract of its own, so
//! a file that reaches `ready` here is considered both finalized and
//! backed up.

use serde_json::Value;
use tracing::instrument;

use sda_core::{
    traits::FileStore,
    types::{AccessionCheck, CorrelationId, FileEventType},
    Error,
};

use crate::driver::{NextMessage, Outcome, WorkerHandler};

pub struct FinalizeHandler;

impl FinalizeHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FinalizeHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl WorkerHandler for FinalizeHandler {
    fn queue(&self) -> &str {
        "accession"
    }

    fn input_schema(&self) -> &str {
        "ingestion-accession"
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
        let accession_id = match body["accession_id"].as_str() {
            Some(a) => a,
            None => return Outcome::Recoverable(Error::Validation("missing accession_id".into())),
        };

        let file_id = match store.find_file_id_by_path(user, filepath).await {
            Ok(id) => id,
            Err(err) if err.is_definitive() => return Outcome::Fatal { file_id: None, err },
            Err(err) => return Outcome::Recoverable(err),
        };

        match store.check_accession_id_exists(accession_id, file_id).await {
            Ok(AccessionCheck::Unused) | Ok(AccessionCheck::Same) => {}
            Ok(AccessionCheck::Duplicate) => {
                return Outcome::Fatal {
                    file_id: Some(file_id),
                    err: Error::Conflict(format!("accession {accession_id} already assigned to another file")),
                }
            }
            Err(err) => return Outcome::Recoverable(err),
        }

        if let Err(err) = store.set_accession_id(accession_id, file_id).await {
            return Outcome::Recoverable(err);
        }

        let decrypted_checksums = match body["decrypted_checksums"].as_array() {
            Some(arr) if !arr.is_empty() => arr.clone(),
            _ => {
                return Outcome::Fatal {
                    file_id: Some(file_id),
                    err: Error::Validation("accession message missing decrypted_checksums".into()),
                }
            }
        };

        if let Err(err) = store
            .update_file_event_log(
                file_id,
                FileEventType::Ready,
                correlation_id,
                user,
                Some(serde_json::json!({"accession_id": accession_id})),
                "accession assigned, file ready",
            )
            .await
        {
            return Outcome::Recoverable(err);
        }

        Outcome::Publish(NextMessage {
            schema_name: "ingestion-completion".into(),
            routing_key: "ingestion-completion".into(),
            body: serde_json::json!({
                "type": "ingestion-completion",
                "accession_id": accession_id,
                "decrypted_checksums": decrypted_checksums,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeStore;

    fn body_with_checksums(accession_id: &str) -> Value {
        serde_json::json!({
            "accession_id": accession_id,
            "user": "dummy",
            "filepath": "inbox/dummy/file1.c4gh",
            "decrypted_checksums": [{"type": "sha256", "value": "abc123"}],
        })
    }

    #[tokio::test]
    async fn assigns_accession_and_publishes_completion() {
        let store = FakeStore::default();
        let file_id = store.seed_registered("dummy", "inbox/dummy/file1.c4gh");
        let handler = FinalizeHandler::new();

        match handler
            .handle(&store, CorrelationId::new(), &body_with_checksums("API:accession-01"))
            .await
        {
            Outcome::Publish(next) => {
                assert_eq!(next.schema_name, "ingestion-completion");
                assert_eq!(next.body["accession_id"], "API:accession-01");
            }
            _ => panic!("expected Outcome::Publish"),
        }
        assert_eq!(store.events_for(file_id).last(), Some(&FileEventType::Ready));
    }

    #[tokio::test]
    async fn duplicate_accession_is_fatal() {
        let store = FakeStore::default();
        store.seed_registered("dummy", "inbox/dummy/file1.c4gh");
        let other = store.seed_registered("someone-else", "inbox/other/file2.c4gh");
        store.set_accession_id("API:accession-01", other).await.unwrap();

        let handler = FinalizeHandler::new();
        match handler
            .handle(&store, CorrelationId::new(), &body_with_checksums("API:accession-01"))
            .await
        {
            Outcome::Fatal { .. } => {}
            _ => panic!("expected Outcome::Fatal"),
        }
    }

    #[tokio::test]
    async fn missing_checksums_is_fatal() {
        let store = FakeStore::default();
        store.seed_registered("dummy", "inbox/dummy/file1.c4gh");
        let handler = FinalizeHandler::new();
        let body = serde_json::json!({
            "accession_id": "API:accession-01",
            "user": "dummy",
            "filepath": "inbox/dummy/file1.c4gh",
        });

        match handler.handle(&store, CorrelationId::new(), &body).await {
            Outcome::Fatal { .. } => {}
            _ => panic!("expected Outcome::Fatal"),
        }
    }
}
