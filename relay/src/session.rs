//! Per-viewer subscription state.

use corelib::models::ResultEvent;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Which instruments a viewer asked to watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenFilter {
    All,
    Token(String),
}

impl TokenFilter {
    /// Absent or literal `all` means everything; anything else is an exact
    /// token address match.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => TokenFilter::All,
            Some(s) if s.eq_ignore_ascii_case("all") => TokenFilter::All,
            Some(s) => TokenFilter::Token(s.to_string()),
        }
    }

    pub fn matches(&self, token: &str) -> bool {
        match self {
            TokenFilter::All => true,
            TokenFilter::Token(t) => t == token,
        }
    }
}

/// One live viewer: a filter over the shared broadcast of results.
///
/// The receiver buffers at most the channel capacity. A viewer that stalls
/// while results keep flowing loses the oldest buffered frames and resumes
/// at the newest ones; frames are never delivered partially or out of
/// order.
pub struct SubscriberSession {
    id: Uuid,
    filter: TokenFilter,
    rx: broadcast::Receiver<ResultEvent>,
    dropped: u64,
}

impl SubscriberSession {
    pub fn new(filter: TokenFilter, rx: broadcast::Receiver<ResultEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            filter,
            rx,
            dropped: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn filter(&self) -> &TokenFilter {
        &self.filter
    }

    /// Next event passing this session's filter, or `None` once the shared
    /// reader has gone away.
    pub async fn next_event(&mut self) -> Option<ResultEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event.token_address) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    self.dropped += skipped;
                    tracing::warn!(
                        session = %self.id,
                        skipped,
                        total_dropped = self.dropped,
                        "slow viewer, oldest buffered frames dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for SubscriberSession {
    fn drop(&mut self) {
        tracing::debug!(session = %self.id, dropped = self.dropped, "viewer disconnected");
    }
}
