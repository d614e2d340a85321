//! Local replay feed.
//!
//! Without the `kafka` feature the backend reads trade events as JSON
//! lines from stdin and appends them to the in-process inbound log, one
//! record per line. EOF closes the log, which drains the pipeline and
//! stops the engine cleanly.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use transport::LogRecord;
use transport::memory::MemoryLog;

pub async fn feed_stdin(log: Arc<MemoryLog>) {
    feed_lines(BufReader::new(tokio::io::stdin()), log).await;
}

/// Append every non-empty line as one record, then close the log.
pub async fn feed_lines<R: AsyncBufRead + Unpin>(reader: R, log: Arc<MemoryLog>) {
    let mut lines = reader.lines();
    let mut fed = 0u64;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                // Key by token when the line parses; a malformed line is
                // still appended unkeyed so the engine logs the skip.
                let key = serde_json::from_str::<serde_json::Value>(line)
                    .ok()
                    .and_then(|v| {
                        v.get("token_address")
                            .and_then(|t| t.as_str())
                            .map(str::to_string)
                    });

                log.append(LogRecord {
                    key,
                    payload: line.as_bytes().to_vec(),
                });
                fed += 1;
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "replay input read failed, stopping feed");
                break;
            }
        }
    }

    log.close();
    tracing::info!(records = fed, "replay feed finished");
}
