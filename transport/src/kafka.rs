//! Redpanda/Kafka adapter, compiled with `--features kafka`.
//!
//! Settings follow the production deployment: consumer groups with manual
//! commit for the trade topic, gzip-compressed keyed writes for the result
//! topic, and a group-less live tail for the relay.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;

use crate::error::TransportError;
use crate::{LogRecord, ResultSink, ResultSource, TradeSource};

fn unavailable(e: impl std::fmt::Display) -> TransportError {
    TransportError::Unavailable(e.to_string())
}

fn record_from(message: &impl Message) -> LogRecord {
    LogRecord {
        key: message
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned()),
        payload: message.payload().unwrap_or_default().to_vec(),
    }
}

/// Trade-topic consumer. `connect` joins the consumer group; offsets resume
/// from the last committed position, or `earliest` for a fresh group.
pub struct KafkaTradeSource {
    brokers: String,
    group_id: String,
    topic: String,
    consumer: Option<StreamConsumer>,
}

impl KafkaTradeSource {
    pub fn new(brokers: String, group_id: String, topic: String) -> Self {
        Self {
            brokers,
            group_id,
            topic,
            consumer: None,
        }
    }
}

#[async_trait]
impl TradeSource for KafkaTradeSource {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .create()
            .map_err(unavailable)?;

        consumer
            .subscribe(&[self.topic.as_str()])
            .map_err(unavailable)?;

        self.consumer = Some(consumer);
        Ok(())
    }

    async fn next(&mut self) -> Result<LogRecord, TransportError> {
        let consumer = self
            .consumer
            .as_ref()
            .ok_or_else(|| TransportError::Unavailable("consumer not connected".into()))?;

        let message = consumer.recv().await.map_err(unavailable)?;
        Ok(record_from(&message))
    }

    async fn commit(&mut self) -> Result<(), TransportError> {
        let consumer = self
            .consumer
            .as_ref()
            .ok_or_else(|| TransportError::Unavailable("consumer not connected".into()))?;

        consumer
            .commit_consumer_state(CommitMode::Async)
            .map_err(unavailable)
    }
}

/// Result-topic producer, keyed by instrument so downstream consumers keep
/// per-instrument ordering.
pub struct KafkaResultSink {
    topic: String,
    producer: FutureProducer,
}

impl KafkaResultSink {
    pub fn connect(brokers: &str, topic: String) -> Result<Self, TransportError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("compression.type", "gzip")
            .create()
            .map_err(unavailable)?;

        Ok(Self { topic, producer })
    }
}

#[async_trait]
impl ResultSink for KafkaResultSink {
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), TransportError> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);

        self.producer
            .send(record, Duration::from_secs(0))
            .await
            .map(|_| ())
            .map_err(|(e, _)| unavailable(e))
    }
}

/// Live tail on the result topic for the relay's shared reader. Uses a
/// process-unique group so it never steals offsets, and starts at `latest`.
pub struct KafkaResultSource {
    consumer: StreamConsumer,
}

impl KafkaResultSource {
    pub fn connect(brokers: &str, topic: &str) -> Result<Self, TransportError> {
        let group = format!("relay-tail-{}", std::process::id());

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", &group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "latest")
            .set("session.timeout.ms", "6000")
            .create()
            .map_err(unavailable)?;

        consumer.subscribe(&[topic]).map_err(unavailable)?;
        Ok(Self { consumer })
    }
}

#[async_trait]
impl ResultSource for KafkaResultSource {
    async fn next(&mut self) -> Result<LogRecord, TransportError> {
        let message = self.consumer.recv().await.map_err(unavailable)?;
        Ok(record_from(&message))
    }
}
