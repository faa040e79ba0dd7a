//! The generic ack/nack/requeue driver every non-API worker runs (§4.3).

use std::time::Duration;

use serde_json::Value;
use tracing::{error, info, instrument, warn};

use sda_broker::BrokerTransport;
use sda_core::{
    traits::FileStore,
    types::{CorrelationId, FileEventType, FileId},
    Error, Result,
};
use sda_schema::SchemaValidator;

/// Bounded pause before requeueing on a recoverable failure (§4.3 step 7:
/// "nack with requeue after a bounded pause (≤ 5 minutes)").
const MAX_REQUEUE_PAUSE: Duration = Duration::from_secs(5 * 60);

/// A message ready to publish once the driver reaches step 5.
pub struct NextMessage {
    pub schema_name: String,
    pub routing_key: String,
    pub body: Value,
}

/// What a [`WorkerHandler`] decided after doing its work.
pub enum Outcome {
    /// Publish this message, then ack (§4.3 steps 5-6).
    Publish(NextMessage),
    /// Work is complete with nothing further to publish (e.g. a dataset
    /// release with no downstream stage); ack directly.
    Done,
    /// A transient failure the system is expected to recover from
    /// (database blip, broker unreachable): nack with requeue.
    Recoverable(Error),
    /// A failure that will not be fixed by retrying (decrypt fails, schema
    /// mismatch in a way input validation didn't already catch): append an
    /// `error` event and ack so the message does not loop forever.
    Fatal { file_id: Option<FileId>, err: Error },
}

/// One pipeline stage's business logic, parameterized over the generic
/// driver in [`run_worker`].
#[async_trait::async_trait]
pub trait WorkerHandler: Send + Sync {
    /// Queue this handler consumes from.
    fn queue(&self) -> &str;

    /// Schema name the input envelope must satisfy.
    fn input_schema(&self) -> &str;

    /// Do the stage's work. `correlation_id` has already been resolved by
    /// the driver (from the envelope, or freshly minted if this is the
    /// first worker to see the file).
    async fn handle(&self, store: &dyn FileStore, correlation_id: CorrelationId, body: &Value) -> Outcome;
}

/// Pull one delivery, run it through `handler`, and resolve it per the
/// seven-step protocol in §4.3. Returns after handling exactly one
/// delivery; callers loop this to run the worker continuously.
#[instrument(level = "debug", skip(handler, broker, store, validator))]
pub async fn run_worker_once(
    handler: &dyn WorkerHandler,
    broker: &dyn BrokerTransport,
    store: &dyn FileStore,
    validator: &SchemaValidator,
) -> Result<()> {
    let delivery = broker.next_delivery(handler.queue()).await?;

    if let Err(err) = validator.validate(handler.input_schema(), &delivery.body) {
        warn!(%err, queue = handler.queue(), "invalid input envelope, dropping");
        broker.nack(delivery.delivery_tag, false).await?;
        return Ok(());
    }

    let correlation_id = delivery.correlation_id;

    match handler.handle(store, correlation_id, &delivery.body).await {
        Outcome::Publish(next) => {
            match broker.publish(&next.schema_name, &next.routing_key, &next.body).await {
                Ok(()) => {
                    broker.ack(delivery.delivery_tag).await?;
                    info!(%correlation_id, routing_key = %next.routing_key, "✅ stage complete, published next message");
                }
                Err(err) => {
                    warn!(%err, %correlation_id, "publish failed, requeueing input delivery");
                    broker.nack(delivery.delivery_tag, true).await?;
                }
            }
        }
        Outcome::Done => {
            broker.ack(delivery.delivery_tag).await?;
        }
        Outcome::Recoverable(err) => {
            warn!(%err, %correlation_id, "recoverable failure, requeueing after bounded pause");
            tokio::time::sleep(MAX_REQUEUE_PAUSE).await;
            broker.nack(delivery.delivery_tag, true).await?;
        }
        Outcome::Fatal { file_id, err } => {
            error!(%err, %correlation_id, "fatal failure, recording error event and acking");
            if let Some(file_id) = file_id {
                let _ = store
                    .update_file_event_log(
                        file_id,
                        FileEventType::Error,
                        correlation_id,
                        "system",
                        None,
                        &err.to_string(),
                    )
                    .await;
            }
            broker.ack(delivery.delivery_tag).await?;
        }
    }

    Ok(())
}

/// Run `handler` forever, one delivery at a time.
pub async fn run_worker(
    handler: &dyn WorkerHandler,
    broker: &dyn BrokerTransport,
    store: &dyn FileStore,
    validator: &SchemaValidator,
) -> Result<()> {
    loop {
        run_worker_once(handler, broker, store, validator).await?;
    }
}
