pub mod backoff;
pub mod ingest;
pub mod publisher;
pub mod rolling_window;
pub mod rsi;
pub mod table;
