//! `release` stage (§4.3): consume a `release` message and append the
//! `released` dataset event (§4.4 `POST /dataset/release/*dataset`).

use serde_json::Value;
use tracing::instrument;

use sda_core::{traits::FileStore, types::{CorrelationId, DatasetEventType}, Error};

use crate::driver::{Outcome, WorkerHandler};

pub struct ReleaseHandler;

impl ReleaseHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ReleaseHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl WorkerHandler for ReleaseHandler {
    fn queue(&self) -> &str {
        "release"
    }

    fn input_schema(&self) -> &str {
        "dataset-release"
    }

    #[instrument(level = "debug", skip(self, store, body), fields(%correlation_id))]
    async fn handle(&self, store: &dyn FileStore, correlation_id: CorrelationId, body: &Value) -> Outcome {
        let _ = correlation_id;

        let stable_id = match body["dataset_id"].as_str() {
            Some(d) => d,
            None => return Outcome::Recoverable(Error::Validation("missing dataset_id".into())),
        };

        let dataset_id = match store.get_dataset_id(stable_id).await {
            Ok(id) => id,
            Err(err) if err.is_definitive() => return Outcome::Fatal { file_id: None, err },
            Err(err) => return Outcome::Recoverable(err),
        };

        match store
            .update_dataset_event(dataset_id, DatasetEventType::Released, "dataset released")
            .await
        {
            Ok(()) => Outcome::Done,
            Err(err) => Outcome::Recoverable(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeStore;

    #[tokio::test]
    async fn releases_a_mapped_dataset() {
        let store = FakeStore::default();
        let f1 = store.seed_registered("a", "inbox/a/1.c4gh");
        store.set_accession_id("API:accession-01", f1).await.unwrap();
        store
            .map_files_to_dataset("API:dataset-01", &["API:accession-01".to_string()])
            .await
            .unwrap();

        let handler = ReleaseHandler::new();
        let body = serde_json::json!({"dataset_id": "API:dataset-01"});

        match handler.handle(&store, CorrelationId::new(), &body).await {
            Outcome::Done => {}
            _ => panic!("expected Outcome::Done"),
        }
    }

    #[tokio::test]
    async fn unknown_dataset_is_fatal() {
        let store = FakeStore::default();
        let handler = ReleaseHandler::new();
        let body = serde_json::json!({"dataset_id": "API:does-not-exist"});

        match handler.handle(&store, CorrelationId::new(), &body).await {
            Outcome::Fatal { .. } => {}
            _ => panic!("expected Outcome::Fatal"),
        }
    }
}
