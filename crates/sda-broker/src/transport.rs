use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        ConfirmSelectOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use metrics::counter;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use sda_core::{
    config::BrokerConfig,
    traits::HealthCheck,
    types::CorrelationId,
    utils::{backoff_delay, RETRY_TIMES},
    Error, Result,
};
use sda_schema::SchemaValidator;

/// One pulled message awaiting a terminal ack/nack decision (§4.2).
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub correlation_id: CorrelationId,
    pub body: Value,
}

/// Abstraction over the wire client so worker-skeleton tests can substitute
/// an in-memory double (§9) while production code drives real AMQP.
#[async_trait]
pub trait BrokerTransport: HealthCheck + Send + Sync {
    /// Validate `message` against `schema_name` and publish it to
    /// `routing_key` on the configured exchange. Invalid messages never
    /// leave the process (§4.2.1).
    async fn publish(&self, schema_name: &str, routing_key: &str, message: &Value) -> Result<()>;

    /// Pull the next delivery from `queue`, blocking the caller's await
    /// point until one arrives.
    async fn next_delivery(&self, queue: &str) -> Result<Delivery>;

    /// Acknowledge a delivery; it will not be redelivered.
    async fn ack(&self, delivery_tag: u64) -> Result<()>;

    /// Reject a delivery, optionally returning it to the queue.
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<()>;
}

struct Link {
    connection: Connection,
    channel: Channel,
}

/// Production [`BrokerTransport`]: one AMQP-0-9-1 connection and channel,
/// rebuilt transparently when either is observed closed (§4.2.3).
pub struct AmqpBroker {
    config: BrokerConfig,
    validator: Arc<SchemaValidator>,
    link: RwLock<Link>,
    consumers: Mutex<std::collections::HashMap<String, lapin::Consumer>>,
}

impl AmqpBroker {
    #[instrument(level = "debug", skip(config, validator))]
    pub async fn connect(config: BrokerConfig, validator: Arc<SchemaValidator>) -> Result<Self> {
        let link = Self::dial(&config).await?;
        info!(host = %config.host, "✅ broker connection established");
        Ok(Self {
            config,
            validator,
            link: RwLock::new(link),
            consumers: Mutex::new(std::collections::HashMap::new()),
        })
    }

    async fn dial(config: &BrokerConfig) -> Result<Link> {
        let mut attempt = 0;
        loop {
            let outcome: std::result::Result<Link, lapin::Error> = async {
                let connection = Connection::connect(
                    &config.amqp_url(),
                    ConnectionProperties::default(),
                )
                .await?;
                let channel = connection.create_channel().await?;
                channel
                    .confirm_select(ConfirmSelectOptions::default())
                    .await?;
                channel
                    .basic_qos(config.prefetch_count, lapin::options::BasicQosOptions::default())
                    .await?;
                Ok(Link { connection, channel })
            }
            .await;

            match outcome {
                Ok(link) => return Ok(link),
                Err(err) if attempt + 1 >= RETRY_TIMES => {
                    return Err(Error::Broker(format!("giving up after {attempt} reconnect attempts: {err}")));
                }
                Err(err) => {
                    let delay = backoff_delay(attempt + 1);
                    warn!(%err, attempt, ?delay, "broker connect failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Rebuild the connection and channel if either has closed underneath us.
    async fn ensure_connected(&self) -> Result<()> {
        let needs_rebuild = {
            let link = self.link.read().await;
            !link.connection.status().connected() || !link.channel.status().connected()
        };
        if needs_rebuild {
            warn!("broker link not connected, rebuilding");
            let fresh = Self::dial(&self.config).await?;
            *self.link.write().await = fresh;
            self.consumers.lock().await.clear();
        }
        Ok(())
    }
}

#[async_trait]
impl HealthCheck for AmqpBroker {
    async fn ping(&self) -> Result<()> {
        let link = self.link.read().await;
        if link.connection.status().connected() && link.channel.status().connected() {
            Ok(())
        } else {
            Err(Error::Broker("connection or channel not open".into()))
        }
    }
}

#[async_trait]
impl BrokerTransport for AmqpBroker {
    #[instrument(level = "debug", skip(self, message))]
    async fn publish(&self, schema_name: &str, routing_key: &str, message: &Value) -> Result<()> {
        self.validator.validate(schema_name, message)?;
        self.ensure_connected().await?;

        let payload = serde_json::to_vec(message)?;
        let publish = {
            let link = self.link.read().await;
            link.channel
                .basic_publish(
                    &self.config.exchange,
                    routing_key,
                    BasicPublishOptions::default(),
                    &payload,
                    BasicProperties::default(),
                )
                .await
        };

        let confirmed = match publish {
            Ok(pending) => pending.await,
            Err(err) => {
                debug!(%err, "publish failed, rebuilding link and retrying once");
                self.ensure_connected().await?;
                let link = self.link.read().await;
                link.channel
                    .basic_publish(
                        &self.config.exchange,
                        routing_key,
                        BasicPublishOptions::default(),
                        &payload,
                        BasicProperties::default(),
                    )
                    .await
                    .map_err(|e| Error::Broker(e.to_string()))?
                    .await
            }
        };

        confirmed.map_err(|e| Error::Broker(e.to_string()))?;
        counter!("sda_broker_publish_total", 1, "routing_key" => routing_key.to_string());
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn next_delivery(&self, queue: &str) -> Result<Delivery> {
        self.ensure_connected().await?;

        let mut consumers = self.consumers.lock().await;
        if !consumers.contains_key(queue) {
            let link = self.link.read().await;
            let consumer = link
                .channel
                .basic_consume(
                    queue,
                    &format!("sda-{}", Uuid::new_v4()),
                    BasicConsumeOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| Error::Broker(e.to_string()))?;
            consumers.insert(queue.to_string(), consumer);
        }
        let consumer = consumers.get_mut(queue).expect("just inserted");

        let delivery = consumer
            .next()
            .await
            .ok_or_else(|| Error::Broker("consumer stream closed".into()))?
            .map_err(|e| Error::Broker(e.to_string()))?;

        let body: Value = serde_json::from_slice(&delivery.data)?;
        let correlation_id = delivery
            .properties
            .correlation_id()
            .as_ref()
            .and_then(|c| Uuid::parse_str(c.as_str()).ok())
            .map(CorrelationId)
            .unwrap_or_default();

        counter!("sda_broker_delivered_total", 1, "queue" => queue.to_string());
        Ok(Delivery {
            delivery_tag: delivery.delivery_tag,
            correlation_id,
            body,
        })
    }

    #[instrument(level = "debug", skip(self))]
    async fn ack(&self, delivery_tag: u64) -> Result<()> {
        let link = self.link.read().await;
        link.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| Error::Broker(e.to_string()))?;
        counter!("sda_broker_ack_total", 1);
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<()> {
        let link = self.link.read().await;
        link.channel
            .basic_nack(delivery_tag, BasicNackOptions { requeue, multiple: false })
            .await
            .map_err(|e| Error::Broker(e.to_string()))?;
        counter!("sda_broker_nack_total", 1, "requeue" => requeue.to_string());
        Ok(())
    }
}
