use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    /// The broker (or in-process log) cannot be reached right now.
    /// Retryable: callers back off and try again.
    #[error("log unavailable: {0}")]
    Unavailable(String),

    /// The log has been closed and no further records will arrive.
    #[error("log closed")]
    Closed,
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Unavailable(_))
    }
}
