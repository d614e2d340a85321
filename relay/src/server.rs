//! HTTP surface of the relay.
//!
//! - `GET /stream?token=<address|all>`: server-sent events, one JSON result
//!   per frame, filtered per session.
//! - `GET /tokens`: instruments observed on the result topic so far.
//! - `GET /health`: liveness probe.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream;
use serde::Deserialize;
use tokio::sync::{broadcast, watch};
use tower_http::cors::{Any, CorsLayer};

use corelib::models::ResultEvent;

use crate::reader::ObservedTokens;
use crate::session::{SubscriberSession, TokenFilter};

/// Everything a request handler needs, shared across sessions.
#[derive(Clone)]
pub struct RelayState {
    tx: broadcast::Sender<ResultEvent>,
    observed: ObservedTokens,
}

impl RelayState {
    /// `session_buffer` bounds how many frames a stalled viewer may fall
    /// behind before the oldest ones are dropped.
    pub fn new(session_buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(session_buffer.max(1));
        Self {
            tx,
            observed: ObservedTokens::default(),
        }
    }

    /// Sender side handed to the shared reader.
    pub fn sender(&self) -> broadcast::Sender<ResultEvent> {
        self.tx.clone()
    }

    pub fn observed(&self) -> ObservedTokens {
        self.observed.clone()
    }
}

pub fn router(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/stream", get(stream_handler))
        .route("/tokens", get(tokens_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the shutdown signal flips.
pub async fn serve(
    addr: SocketAddr,
    state: RelayState,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "relay listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
            tracing::info!("relay shutting down");
        })
        .await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct StreamParams {
    token: Option<String>,
}

async fn stream_handler(
    State(state): State<RelayState>,
    Query(params): Query<StreamParams>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let filter = TokenFilter::parse(params.token.as_deref());
    let session = SubscriberSession::new(filter, state.tx.subscribe());
    tracing::info!(
        session = %session.id(),
        filter = ?session.filter(),
        "viewer connected"
    );

    let stream = stream::unfold(session, |mut session| async move {
        let event = session.next_event().await?;
        // json_data only fails on unserializable input, which ResultEvent
        // is not; ending the stream is the safe answer anyway.
        let frame = Event::default().json_data(&event).ok()?;
        Some((Ok(frame), session))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn tokens_handler(State(state): State<RelayState>) -> Json<Vec<String>> {
    Json(state.observed.read().iter().cloned().collect())
}

async fn health_handler() -> &'static str {
    "ok"
}
