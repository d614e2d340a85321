//! Seams over the partitioned message log.
//!
//! The log itself (broker, offsets, topic administration) is an external
//! collaborator; the engine and relay only see the three traits below. Two
//! implementations ship here: an in-process [`memory::MemoryLog`] used by
//! tests and local replay, and an rdkafka-backed adapter behind the `kafka`
//! feature for the real Redpanda deployment.

pub mod error;
pub mod memory;

#[cfg(feature = "kafka")]
pub mod kafka;

use async_trait::async_trait;

use crate::error::TransportError;

/// One record as stored on a log topic.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Partition key; the instrument identifier for both topics.
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

impl LogRecord {
    pub fn new(key: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            key: Some(key.into()),
            payload: payload.into(),
        }
    }
}

/// Read side of the inbound trade topic.
///
/// A source owns a single read position. `commit` durably advances it past
/// the last record returned by `next`; after a restart `connect` resumes
/// from the committed position (at-least-once delivery).
#[async_trait]
pub trait TradeSource: Send {
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Wait for and return the next record after the current position.
    async fn next(&mut self) -> Result<LogRecord, TransportError>;

    /// Commit the read position up to the last record returned.
    async fn commit(&mut self) -> Result<(), TransportError>;
}

/// Write side of the outbound result topic.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), TransportError>;
}

/// Read side of the outbound result topic, as consumed by the relay.
///
/// The cursor is fixed at construction (live tail for the relay); there is
/// no commit; a relay restart simply resumes from the new live edge.
#[async_trait]
pub trait ResultSource: Send {
    async fn next(&mut self) -> Result<LogRecord, TransportError>;
}
