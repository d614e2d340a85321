//! Outbound result publisher.
//!
//! Serializes each `ResultEvent` and writes it to the outbound log, keyed
//! by instrument. Transient transport errors are retried a bounded number
//! of times with exponential backoff; exhausting the retries is a fatal
//! publish failure the ingest loop answers by pausing consumption, so a
//! computed RSI is never silently dropped. A serialization failure is
//! fatal only for that single event.

use std::time::Duration;

use thiserror::Error;

use corelib::models::ResultEvent;
use transport::ResultSink;
use transport::error::TransportError;

#[derive(Error, Debug)]
pub enum PublishError {
    /// The event could not be encoded. Scoped to this one result: it is
    /// logged and dropped, and the triggering trade is not retried.
    #[error("result serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The outbound log stayed unreachable through every retry.
    #[error("outbound log unreachable after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: TransportError },
}

#[derive(Debug, Clone, Copy)]
pub struct PublisherConfig {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(200),
        }
    }
}

pub struct Publisher<S: ResultSink> {
    sink: S,
    cfg: PublisherConfig,
}

impl<S: ResultSink> Publisher<S> {
    pub fn new(sink: S, cfg: PublisherConfig) -> Self {
        Self { sink, cfg }
    }

    pub async fn publish(&self, event: &ResultEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            match self.sink.publish(&event.token_address, &payload).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt <= self.cfg.max_retries => {
                    tracing::warn!(
                        token = %event.token_address,
                        attempt,
                        error = %e,
                        "transient publish failure, backing off"
                    );
                    let delay = self.cfg.backoff_base * 2u32.saturating_pow(attempt - 1);
                    tokio::time::sleep(delay).await;
                }
                Err(last) => return Err(PublishError::Exhausted { attempts: attempt, last }),
            }
        }
    }
}
