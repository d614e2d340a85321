use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

#[derive(Clone, Debug)]
pub struct AppConfig {
    // =========================
    // Log topology
    // =========================
    /// Broker bootstrap address, only read by `--features kafka` builds.
    pub broker_addr: String,

    /// Topic carrying raw trade events.
    pub inbound_topic: String,

    /// Topic carrying computed RSI results.
    pub outbound_topic: String,

    /// Consumer group for the ingest loop. Offsets committed under this
    /// group are the engine's restart position.
    pub consumer_group: String,

    // =========================
    // Indicator configuration
    // =========================
    /// Wilder smoothing period. The first reading for an instrument comes
    /// with its `rsi_period + 1`-th price.
    pub rsi_period: usize,

    /// RSI at or below this reads as oversold.
    pub oversold: f64,

    /// RSI at or above this reads as overbought.
    pub overbought: f64,

    // =========================
    // Publishing and resilience
    // =========================
    /// Retries per result publish before the ingest loop stalls.
    pub publish_retries: u32,

    /// Base delay between publish retries; doubles per attempt.
    pub publish_backoff: Duration,

    /// Base delay before reconnecting to the inbound log.
    pub connect_backoff: Duration,

    /// Ceiling on the reconnect delay.
    pub connect_backoff_cap: Duration,

    /// Consecutive failures before the process exits non-zero.
    /// `None` keeps retrying forever.
    pub connect_attempt_ceiling: Option<u32>,

    // =========================
    // Relay
    // =========================
    /// Listen address of the SSE relay.
    pub relay_addr: SocketAddr,

    /// Frames buffered per viewer session before the oldest are dropped.
    pub session_buffer: usize,

    /// Switches logs to JSON when `APP_ENV=production`.
    pub is_production: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        fn parsed<T: FromStr>(
            get: &impl Fn(&str) -> Option<String>,
            key: &str,
            default: T,
        ) -> anyhow::Result<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            match get(key) {
                None => Ok(default),
                Some(raw) => raw.parse().with_context(|| format!("invalid {key}: {raw:?}")),
            }
        }

        let cfg = Self {
            broker_addr: get("BROKER_ADDR").unwrap_or_else(|| "localhost:9092".into()),
            inbound_topic: get("INBOUND_TOPIC").unwrap_or_else(|| "trade-data".into()),
            outbound_topic: get("OUTBOUND_TOPIC").unwrap_or_else(|| "rsi-data".into()),
            consumer_group: get("CONSUMER_GROUP").unwrap_or_else(|| "rsi-engine".into()),

            rsi_period: parsed(&get, "RSI_PERIOD", 14)?,
            oversold: parsed(&get, "OVERSOLD", 30.0)?,
            overbought: parsed(&get, "OVERBOUGHT", 70.0)?,

            publish_retries: parsed(&get, "PUBLISH_RETRIES", 3)?,
            publish_backoff: Duration::from_millis(parsed(&get, "PUBLISH_BACKOFF_MS", 200)?),
            connect_backoff: Duration::from_millis(parsed(&get, "CONNECT_BACKOFF_MS", 1_000)?),
            connect_backoff_cap: Duration::from_millis(parsed(
                &get,
                "CONNECT_BACKOFF_CAP_MS",
                30_000,
            )?),
            connect_attempt_ceiling: get("CONNECT_ATTEMPT_CEILING")
                .map(|raw| {
                    raw.parse()
                        .with_context(|| format!("invalid CONNECT_ATTEMPT_CEILING: {raw:?}"))
                })
                .transpose()?,

            relay_addr: parsed(&get, "RELAY_ADDR", "0.0.0.0:8080".parse()?)?,
            session_buffer: parsed(&get, "SESSION_BUFFER", 256)?,

            is_production: get("APP_ENV").as_deref() == Some("production"),
        };

        if cfg.rsi_period == 0 {
            bail!("RSI_PERIOD must be at least 1");
        }
        if cfg.oversold >= cfg.overbought {
            bail!(
                "OVERSOLD ({}) must be below OVERBOUGHT ({})",
                cfg.oversold,
                cfg.overbought
            );
        }
        if cfg.session_buffer == 0 {
            bail!("SESSION_BUFFER must be at least 1");
        }

        Ok(cfg)
    }
}
