//! Shared reader over the outbound result topic.
//!
//! Exactly one of these runs per relay process. It owns the live log
//! cursor, decodes each record, remembers which instruments have appeared,
//! and broadcasts the event to every session.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};

use corelib::models::ResultEvent;
use transport::ResultSource;
use transport::error::TransportError;

/// Instruments seen on the result topic since this relay started.
pub type ObservedTokens = Arc<RwLock<BTreeSet<String>>>;

pub async fn run_reader<R: ResultSource>(
    mut source: R,
    tx: broadcast::Sender<ResultEvent>,
    observed: ObservedTokens,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let record = tokio::select! {
            _ = shutdown.changed() => break,
            record = source.next() => record,
        };

        match record {
            Ok(record) => match serde_json::from_slice::<ResultEvent>(&record.payload) {
                Ok(event) => {
                    observed.write().insert(event.token_address.clone());
                    // A send error only means no viewer is connected right
                    // now; the next one subscribes at the live edge.
                    let _ = tx.send(event);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping undecodable result payload");
                }
            },
            Err(TransportError::Closed) => {
                tracing::info!("result topic closed, reader stopping");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "result read failed, retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }

    tracing::info!("relay reader stopped");
}
