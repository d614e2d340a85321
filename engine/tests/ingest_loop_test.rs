use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::watch;

use corelib::models::{ResultEvent, Signal};
use engine::backoff::BackoffPolicy;
use engine::ingest::{IngestConfig, IngestError, IngestLoop};
use engine::publisher::{Publisher, PublisherConfig};
use engine::rsi::RsiBands;
use engine::table::InstrumentTable;
use transport::error::TransportError;
use transport::memory::{MemoryLog, MemoryResultSink, MemoryTradeSource};
use transport::{LogRecord, ResultSink, ResultSource};

fn trade_json(token: &str, price: f64) -> String {
    format!(
        r#"{{"token_address":"{token}","price_in_sol":{price},"block_time":"2024-01-01T00:00:00Z","transaction_signature":"sig","is_buy":true,"amount_in_sol":1.0}}"#
    )
}

fn seed_trades(log: &MemoryLog, token: &str, prices: &[f64]) {
    for &p in prices {
        log.append(LogRecord::new(token, trade_json(token, p)));
    }
}

/// Drain every published result. The writes are finished by the time this
/// runs, so the log is closed first and read to the end.
async fn decode_results(log: &Arc<MemoryLog>) -> Vec<ResultEvent> {
    log.close();
    let mut source = transport::memory::MemoryResultSource::from_start(log.clone());
    let mut out = Vec::new();
    while let Ok(record) = source.next().await {
        out.push(serde_json::from_slice(&record.payload).unwrap());
    }
    out
}

fn pipeline(
    inbound: &Arc<MemoryLog>,
    outbound: &Arc<MemoryLog>,
    cfg: IngestConfig,
) -> (IngestLoop<MemoryTradeSource, MemoryResultSink>, watch::Sender<bool>) {
    let table = Arc::new(InstrumentTable::new(14, RsiBands::default()));
    let publisher = Publisher::new(MemoryResultSink::new(outbound.clone()), PublisherConfig::default());
    let (tx, rx) = watch::channel(false);

    let ingest = IngestLoop::new(
        MemoryTradeSource::new(inbound.clone()),
        publisher,
        table,
        cfg,
        rx,
    );
    (ingest, tx)
}

#[tokio::test]
async fn warm_results_publish_in_trade_order() {
    let inbound = MemoryLog::new();
    let outbound = MemoryLog::new();

    // 16 ascending prices: results for the 15th and 16th trades only.
    let prices: Vec<f64> = (1..=16).map(|i| i as f64).collect();
    seed_trades(&inbound, "EQTOKEN", &prices);
    inbound.close();

    let (ingest, _tx) = pipeline(&inbound, &outbound, IngestConfig::default());
    ingest.run().await.unwrap();

    let results = decode_results(&outbound).await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].current_price, 15.0);
    assert_eq!(results[1].current_price, 16.0);
    for r in &results {
        assert_eq!(r.token_address, "EQTOKEN");
        assert_eq!(r.rsi_value, 100.0);
        assert_eq!(r.signal, Signal::Overbought);
        assert_eq!(r.period, 14);
    }
}

#[tokio::test]
async fn cold_instruments_publish_nothing() {
    let inbound = MemoryLog::new();
    let outbound = MemoryLog::new();

    seed_trades(&inbound, "EQCOLD", &[1.0, 2.0, 3.0, 4.0, 5.0]);
    inbound.close();

    let (ingest, _tx) = pipeline(&inbound, &outbound, IngestConfig::default());
    ingest.run().await.unwrap();

    assert!(outbound.is_empty());
}

#[tokio::test]
async fn malformed_payloads_are_skipped_not_fatal() {
    let inbound = MemoryLog::new();
    let outbound = MemoryLog::new();

    let prices: Vec<f64> = (1..=15).map(|i| i as f64).collect();
    for (i, &p) in prices.iter().enumerate() {
        // Poison the stream between every valid trade.
        inbound.append(LogRecord::new("junk", format!("not json #{i}")));
        inbound.append(LogRecord::new(
            "junk",
            r#"{"token_address":"EQBAD","price_in_sol":-1.0,"block_time":"t"}"#,
        ));
        inbound.append(LogRecord::new("EQTOKEN", trade_json("EQTOKEN", p)));
    }
    inbound.close();

    let (ingest, _tx) = pipeline(&inbound, &outbound, IngestConfig::default());
    ingest.run().await.unwrap();

    let results = decode_results(&outbound).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].rsi_value, 100.0);
}

#[tokio::test]
async fn interleaved_instruments_stay_independent() {
    let inbound = MemoryLog::new();
    let outbound = MemoryLog::new();

    // A rises while B falls, strictly interleaved through one loop.
    for i in 1..=16 {
        inbound.append(LogRecord::new("A", trade_json("A", i as f64)));
        inbound.append(LogRecord::new("B", trade_json("B", (17 - i) as f64)));
    }
    inbound.close();

    let (ingest, _tx) = pipeline(&inbound, &outbound, IngestConfig::default());
    ingest.run().await.unwrap();

    let results = decode_results(&outbound).await;
    let a: Vec<_> = results.iter().filter(|r| r.token_address == "A").collect();
    let b: Vec<_> = results.iter().filter(|r| r.token_address == "B").collect();

    assert_eq!(a.len(), 2);
    assert_eq!(b.len(), 2);
    assert!(a.iter().all(|r| r.rsi_value == 100.0 && r.signal == Signal::Overbought));
    assert!(b.iter().all(|r| r.rsi_value == 0.0 && r.signal == Signal::Oversold));

    // Per-instrument publish order follows trade order.
    assert!(a[0].current_price < a[1].current_price);
    assert!(b[0].current_price > b[1].current_price);
}

/// Sink whose broker is permanently down.
struct DeadSink {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl ResultSink for DeadSink {
    async fn publish(&self, _key: &str, _payload: &[u8]) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Unavailable("broker gone".into()))
    }
}

#[tokio::test(start_paused = true)]
async fn exhausted_publishing_stalls_then_hits_ceiling() {
    let inbound = MemoryLog::new();
    let prices: Vec<f64> = (1..=15).map(|i| i as f64).collect();
    seed_trades(&inbound, "EQTOKEN", &prices);

    let table = Arc::new(InstrumentTable::new(14, RsiBands::default()));
    let calls = Arc::new(AtomicU32::new(0));
    let publisher = Publisher::new(
        DeadSink { calls: calls.clone() },
        PublisherConfig::default(),
    );
    let (_tx, rx) = watch::channel(false);

    let cfg = IngestConfig {
        connect_backoff: BackoffPolicy::default(),
        failure_ceiling: Some(3),
        progress_every: 0,
    };
    let ingest = IngestLoop::new(MemoryTradeSource::new(inbound.clone()), publisher, table, cfg, rx);

    let err = ingest.run().await.unwrap_err();
    assert!(matches!(err, IngestError::RetriesExhausted(3)));
    // Every stall went through the publisher's full retry budget.
    assert!(calls.load(Ordering::SeqCst) >= 4);
}

#[tokio::test]
async fn shutdown_signal_drains_and_stops() {
    let inbound = MemoryLog::new();
    let outbound = MemoryLog::new();

    seed_trades(&inbound, "EQTOKEN", &[1.0, 2.0, 3.0]);
    // Log stays open: without the signal the loop would wait forever.

    let (ingest, tx) = pipeline(&inbound, &outbound, IngestConfig::default());
    let handle = tokio::spawn(ingest.run());

    tokio::task::yield_now().await;
    tx.send(true).unwrap();

    let joined = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("loop must stop on shutdown");
    joined.unwrap().unwrap();
}
