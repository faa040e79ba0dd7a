//! `mapper` stage (§4.3): consume a `mapping` message and perform the
//! atomic file-to-dataset mapping that the Admin API only ever requests,
//! never performs itself (§4.4: "the mapper worker does").

use serde_json::Value;
use tracing::instrument;

use sda_core::{traits::FileStore, types::CorrelationId, Error};

use crate::driver::{Outcome, WorkerHandler};

pub struct MapperHandler;

impl MapperHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MapperHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl WorkerHandler for MapperHandler {
    fn queue(&self) -> &str {
        "mapping"
    }

    fn input_schema(&self) -> &str {
        "dataset-mapping"
    }

    #[instrument(level = "debug", skip(self, store, body), fields(%correlation_id))]
    async fn handle(&self, store: &dyn FileStore, correlation_id: CorrelationId, body: &Value) -> Outcome {
        let _ = correlation_id;

        let dataset_id = match body["dataset_id"].as_str() {
            Some(d) => d,
            None => return Outcome::Recoverable(Error::Validation("missing dataset_id".into())),
        };

        let accession_ids: Vec<String> = match body["accession_ids"].as_array() {
            Some(arr) => arr.iter().filter_map(|v| v.as_str().map(String::from)).collect(),
            None => return Outcome::Recoverable(Error::Validation("missing accession_ids".into())),
        };

        if accession_ids.is_empty() {
            return Outcome::Fatal {
                file_id: None,
                err: Error::Validation("mapping message lists no accessions".into()),
            };
        }

        match store.map_files_to_dataset(dataset_id, &accession_ids).await {
            Ok(()) => Outcome::Done,
            Err(err) if err.is_definitive() => Outcome::Fatal { file_id: None, err },
            Err(err) => Outcome::Recoverable(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeStore;

    #[tokio::test]
    async fn maps_known_accessions_into_a_dataset() {
        let store = FakeStore::default();
        let f1 = store.seed_registered("a", "inbox/a/1.c4gh");
        let f2 = store.seed_registered("a", "inbox/a/2.c4gh");
        store.set_accession_id("API:accession-01", f1).await.unwrap();
        store.set_accession_id("API:accession-02", f2).await.unwrap();

        let handler = MapperHandler::new();
        let body = serde_json::json!({
            "dataset_id": "API:dataset-01",
            "accession_ids": ["API:accession-01", "API:accession-02"],
        });

        match handler.handle(&store, CorrelationId::new(), &body).await {
            Outcome::Done => {}
            _ => panic!("expected Outcome::Done"),
        }
    }

    #[tokio::test]
    async fn unknown_accession_is_fatal() {
        let store = FakeStore::default();
        let handler = MapperHandler::new();
        let body = serde_json::json!({
            "dataset_id": "API:dataset-01",
            "accession_ids": ["API:does-not-exist"],
        });

        match handler.handle(&store, CorrelationId::new(), &body).await {
            Outcome::Fatal { .. } => {}
            _ => panic!("expected Outcome::Fatal"),
        }
    }
}
