//! Ingestion loop.
//!
//! Pulls trade events from the inbound log, routes each to its
//! instrument's state, and hands warm results to the publisher. Runs as a
//! single sequential consumer so per-instrument delta ordering can never
//! race; scaling out means running more loops over disjoint token shards,
//! never splitting one instrument across loops.
//!
//! State machine: `Connecting -> Consuming`, with `Backoff` on transport
//! trouble and `ShuttingDown` on the watch signal. The read position is
//! committed only after a successful publisher hand-off, giving
//! at-least-once delivery: a crash between processing and commit replays
//! the trade on restart.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

use corelib::models::ResultEvent;
use corelib::parse::parse_trade;
use transport::error::TransportError;
use transport::{LogRecord, ResultSink, TradeSource};

use crate::backoff::BackoffPolicy;
use crate::publisher::{PublishError, Publisher};
use crate::table::InstrumentTable;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Consecutive failures went past the configured ceiling; the process
    /// should exit non-zero and let the supervisor restart it.
    #[error("ingestion gave up after {0} consecutive failures")]
    RetriesExhausted(u32),
}

#[derive(Debug, Clone, Copy)]
pub struct IngestConfig {
    pub connect_backoff: BackoffPolicy,
    /// `None` retries forever (the default); `Some(n)` bounds consecutive
    /// failures before the loop errors out.
    pub failure_ceiling: Option<u32>,
    /// Emit a progress line every this many published results.
    pub progress_every: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            connect_backoff: BackoffPolicy::default(),
            failure_ceiling: None,
            progress_every: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IngestState {
    Connecting,
    Consuming,
    Backoff,
    ShuttingDown,
}

enum Processed {
    Continue,
    /// Publishing exhausted its retries; pause consumption without
    /// committing so the trade replays once the log is reachable again.
    Stall,
}

pub struct IngestLoop<S: TradeSource, K: ResultSink> {
    source: S,
    publisher: Publisher<K>,
    table: Arc<InstrumentTable>,
    cfg: IngestConfig,
    shutdown: watch::Receiver<bool>,
    trades_seen: u64,
    results_published: u64,
}

impl<S: TradeSource, K: ResultSink> IngestLoop<S, K> {
    pub fn new(
        source: S,
        publisher: Publisher<K>,
        table: Arc<InstrumentTable>,
        cfg: IngestConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            publisher,
            table,
            cfg,
            shutdown,
            trades_seen: 0,
            results_published: 0,
        }
    }

    pub async fn run(mut self) -> Result<(), IngestError> {
        let mut state = IngestState::Connecting;
        let mut failures = 0u32;

        loop {
            if *self.shutdown.borrow() {
                state = IngestState::ShuttingDown;
            }

            state = match state {
                IngestState::Connecting => match self.source.connect().await {
                    // The failure count resets on successful processing,
                    // not here: a reachable broker with a dead publish path
                    // must still hit the ceiling.
                    Ok(()) => {
                        tracing::info!("inbound log connected");
                        IngestState::Consuming
                    }
                    Err(e) => {
                        failures += 1;
                        tracing::warn!(error = %e, failures, "inbound connect failed");
                        IngestState::Backoff
                    }
                },

                IngestState::Backoff => {
                    if let Some(ceiling) = self.cfg.failure_ceiling {
                        if failures >= ceiling {
                            tracing::error!(failures, "failure ceiling reached, giving up");
                            return Err(IngestError::RetriesExhausted(failures));
                        }
                    }

                    let delay = self.cfg.connect_backoff.delay(failures);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => IngestState::Connecting,
                        _ = self.shutdown.changed() => IngestState::ShuttingDown,
                    }
                }

                IngestState::Consuming => {
                    let next = tokio::select! {
                        _ = self.shutdown.changed() => None,
                        record = self.source.next() => Some(record),
                    };

                    match next {
                        // The in-flight record (if any) was fully processed
                        // before we got here; nothing is left half-done.
                        None => IngestState::ShuttingDown,
                        Some(Ok(record)) => match self.process(record).await {
                            Processed::Continue => {
                                failures = 0;
                                IngestState::Consuming
                            }
                            Processed::Stall => {
                                failures += 1;
                                IngestState::Backoff
                            }
                        },
                        Some(Err(TransportError::Closed)) => {
                            tracing::info!("inbound log closed, stopping");
                            IngestState::ShuttingDown
                        }
                        Some(Err(e)) => {
                            failures += 1;
                            tracing::warn!(error = %e, failures, "inbound read failed");
                            IngestState::Backoff
                        }
                    }
                }

                IngestState::ShuttingDown => {
                    tracing::info!(
                        trades = self.trades_seen,
                        published = self.results_published,
                        "ingestion stopped"
                    );
                    return Ok(());
                }
            };
        }
    }

    async fn process(&mut self, record: LogRecord) -> Processed {
        self.trades_seen += 1;

        let trade = match parse_trade(&record.payload) {
            Ok(trade) => trade,
            Err(e) => {
                // One bad message never halts ingestion, and is never
                // retried: move the cursor past it.
                tracing::warn!(error = %e, "skipping malformed trade payload");
                self.commit().await;
                return Processed::Continue;
            }
        };

        let reading = {
            let state = self.table.get_or_create(&trade.token_address);
            let mut guard = state.lock();
            guard.on_price(trade.price_in_sol)
        };

        // Cold instruments publish nothing, not a placeholder.
        if let Some(reading) = reading {
            let event = ResultEvent::now(
                trade.token_address,
                reading.value,
                trade.price_in_sol,
                self.table.period(),
                reading.signal,
            );

            match self.publisher.publish(&event).await {
                Ok(()) => {
                    self.results_published += 1;
                    tracing::debug!(
                        token = %event.token_address,
                        rsi = event.rsi_value,
                        signal = ?event.signal,
                        "result published"
                    );

                    if self.cfg.progress_every > 0
                        && self.results_published % self.cfg.progress_every == 0
                    {
                        tracing::info!(
                            trades = self.trades_seen,
                            published = self.results_published,
                            instruments = self.table.len(),
                            "ingest progress"
                        );
                    }
                }
                Err(PublishError::Serialization(e)) => {
                    // Fatal for this single event only.
                    tracing::error!(
                        token = %event.token_address,
                        error = %e,
                        "dropping unserializable result"
                    );
                }
                Err(e @ PublishError::Exhausted { .. }) => {
                    tracing::error!(error = %e, "publish failed, pausing consumption");
                    return Processed::Stall;
                }
            }
        }

        self.commit().await;
        Processed::Continue
    }

    async fn commit(&mut self) {
        // A failed commit is not fatal: delivery is at-least-once and the
        // worst case is a replayed trade after restart.
        if let Err(e) = self.source.commit().await {
            tracing::warn!(error = %e, "offset commit failed");
        }
    }
}
