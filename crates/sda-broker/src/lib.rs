//! Broker Adapter (C2): validated publish, manual-ack consumption with a
//! prefetch limit, and a self-healing AMQP-0-9-1 connection.

mod transport;

pub use transport::{AmqpBroker, BrokerTransport, Delivery};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sda_core::{types::CorrelationId, Result};
    use serde_json::Value;
    use std::sync::Mutex;

    /// In-memory double used by worker-skeleton unit tests (§9: "tests
    /// become straightforward" once the transport is behind a trait).
    #[derive(Default)]
    pub struct FakeBroker {
        pub published: Mutex<Vec<(String, Value)>>,
        pub queue: Mutex<Vec<Delivery>>,
        pub acked: Mutex<Vec<u64>>,
        pub nacked: Mutex<Vec<(u64, bool)>>,
    }

    #[async_trait]
    impl sda_core::traits::HealthCheck for FakeBroker {
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl BrokerTransport for FakeBroker {
        async fn publish(&self, _schema_name: &str, routing_key: &str, message: &Value) -> Result<()> {
            self.published
                .lock()
                .unwrap()
                .push((routing_key.to_string(), message.clone()));
            Ok(())
        }

        async fn next_delivery(&self, _queue: &str) -> Result<Delivery> {
            self.queue
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| sda_core::Error::Broker("queue empty".into()))
        }

        async fn ack(&self, delivery_tag: u64) -> Result<()> {
            self.acked.lock().unwrap().push(delivery_tag);
            Ok(())
        }

        async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<()> {
            self.nacked.lock().unwrap().push((delivery_tag, requeue));
            Ok(())
        }
    }

    #[tokio::test]
    async fn fake_broker_records_publishes() {
        let broker = FakeBroker::default();
        broker
            .publish("ingestion-trigger", "ingest", &serde_json::json!({"type": "ingest"}))
            .await
            .unwrap();
        assert_eq!(broker.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fake_broker_replays_queued_deliveries() {
        let broker = FakeBroker::default();
        broker.queue.lock().unwrap().push(Delivery {
            delivery_tag: 1,
            correlation_id: CorrelationId::new(),
            body: serde_json::json!({"type": "ingest"}),
        });

        let delivery = broker.next_delivery("v1.files").await.unwrap();
        assert_eq!(delivery.delivery_tag, 1);
        broker.ack(delivery.delivery_tag).await.unwrap();
        assert_eq!(broker.acked.lock().unwrap()[0], 1);
    }
}
