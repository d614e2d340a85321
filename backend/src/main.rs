use std::sync::Arc;

use tokio::sync::watch;

use backend::config::AppConfig;
use common::logger::init_tracing;
use engine::backoff::BackoffPolicy;
use engine::ingest::{IngestConfig, IngestLoop};
use engine::publisher::{Publisher, PublisherConfig};
use engine::rsi::RsiBands;
use engine::table::InstrumentTable;
use relay::reader::run_reader;
use relay::server::RelayState;

/// Local mode: trades come from stdin as JSON lines and results stay on an
/// in-process log the relay tails directly.
#[cfg(not(feature = "kafka"))]
fn build_transports(
    _cfg: &AppConfig,
) -> anyhow::Result<(
    transport::memory::MemoryTradeSource,
    transport::memory::MemoryResultSink,
    transport::memory::MemoryResultSource,
)> {
    use transport::memory::{MemoryLog, MemoryResultSink, MemoryResultSource, MemoryTradeSource};

    tracing::info!("kafka feature disabled, replaying trade events from stdin");

    let inbound = MemoryLog::new();
    let outbound = MemoryLog::new();
    tokio::spawn(backend::replay::feed_stdin(inbound.clone()));

    Ok((
        MemoryTradeSource::new(inbound),
        MemoryResultSink::new(outbound.clone()),
        MemoryResultSource::from_latest(outbound),
    ))
}

#[cfg(feature = "kafka")]
fn build_transports(
    cfg: &AppConfig,
) -> anyhow::Result<(
    transport::kafka::KafkaTradeSource,
    transport::kafka::KafkaResultSink,
    transport::kafka::KafkaResultSource,
)> {
    use transport::kafka::{KafkaResultSink, KafkaResultSource, KafkaTradeSource};

    tracing::info!(
        broker = %cfg.broker_addr,
        inbound = %cfg.inbound_topic,
        outbound = %cfg.outbound_topic,
        "connecting log transports"
    );

    let source = KafkaTradeSource::new(
        cfg.broker_addr.clone(),
        cfg.consumer_group.clone(),
        cfg.inbound_topic.clone(),
    );
    let sink = KafkaResultSink::connect(&cfg.broker_addr, cfg.outbound_topic.clone())?;
    let tail = KafkaResultSource::connect(&cfg.broker_addr, &cfg.outbound_topic)?;

    Ok((source, sink, tail))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env()?;
    init_tracing("rsi-backend", cfg.is_production);

    tracing::info!(
        period = cfg.rsi_period,
        oversold = cfg.oversold,
        overbought = cfg.overbought,
        relay = %cfg.relay_addr,
        "starting rsi backend"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let signal_tx = Arc::clone(&shutdown_tx);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = signal_tx.send(true);
        }
    });

    let (trade_source, result_sink, result_tail) = build_transports(&cfg)?;

    // Relay: one shared reader on the result topic, fanned out over SSE.
    let state = RelayState::new(cfg.session_buffer);
    tokio::spawn(run_reader(
        result_tail,
        state.sender(),
        state.observed(),
        shutdown_rx.clone(),
    ));
    let relay_handle = tokio::spawn(relay::server::serve(
        cfg.relay_addr,
        state,
        shutdown_rx.clone(),
    ));

    // Engine: runs on the main task; its exit decides the process status.
    let table = Arc::new(InstrumentTable::new(
        cfg.rsi_period,
        RsiBands {
            oversold: cfg.oversold,
            overbought: cfg.overbought,
        },
    ));
    let publisher = Publisher::new(
        result_sink,
        PublisherConfig {
            max_retries: cfg.publish_retries,
            backoff_base: cfg.publish_backoff,
        },
    );
    let ingest_cfg = IngestConfig {
        connect_backoff: BackoffPolicy::new(cfg.connect_backoff, cfg.connect_backoff_cap),
        failure_ceiling: cfg.connect_attempt_ceiling,
        progress_every: 50,
    };
    let ingest = IngestLoop::new(trade_source, publisher, table, ingest_cfg, shutdown_rx);

    let outcome = ingest.run().await;

    // Stop the relay whichever way the engine ended.
    let _ = shutdown_tx.send(true);
    if let Err(e) = relay_handle.await? {
        tracing::warn!(error = %e, "relay exited with an error");
    }

    outcome?;
    tracing::info!("rsi backend stopped");
    Ok(())
}
