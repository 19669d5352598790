//! Fix sources feeding the tracking session.

use crate::types::RawFix;
use log::{debug, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub lines: u64,
    pub sent: u64,
    pub skipped: u64,
    pub dropped: u64,
}

/// Read newline-delimited JSON fixes and forward them to `tx`.
///
/// Unparsable lines are skipped. When the channel is full the fix is
/// dropped rather than stalling the reader. Returns at end of input or
/// once the receiver is gone.
pub async fn ndjson_fix_loop<R>(reader: R, tx: Sender<RawFix>) -> SourceStats
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = SourceStats::default();
    let mut lines = reader.lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("[fixes] Read failed after {} lines: {}", stats.lines, e);
                break;
            }
        };
        stats.lines += 1;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fix: RawFix = match serde_json::from_str(line) {
            Ok(fix) => fix,
            Err(e) => {
                warn!("[fixes] Skipping line {}: {}", stats.lines, e);
                stats.skipped += 1;
                continue;
            }
        };

        match tx.try_send(fix) {
            Ok(_) => {
                stats.sent += 1;
                if stats.sent % 100 == 0 {
                    debug!("[fixes] {} fixes", stats.sent);
                }
            }
            Err(TrySendError::Closed(_)) => {
                info!("[fixes] Channel closed after {} fixes", stats.sent);
                break;
            }
            Err(TrySendError::Full(_)) => {
                // Consumer is behind, drop this fix
                stats.dropped += 1;
            }
        }
    }

    info!(
        "[fixes] Source finished: {} sent, {} skipped, {} dropped",
        stats.sent, stats.skipped, stats.dropped
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_reads_fixes_and_skips_garbage() {
        let input = concat!(
            r#"{"latitude": 17.7, "longitude": 83.1, "timestamp": 1000, "accuracy": 5.0}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"latitude": 17.71, "longitude": 83.1, "timestamp": 2000, "speed": 30.0}"#,
            "\n",
        );
        let (tx, mut rx) = mpsc::channel(16);

        let stats = ndjson_fix_loop(BufReader::new(input.as_bytes()), tx).await;
        assert_eq!(stats.lines, 4);
        assert_eq!(stats.sent, 2);
        assert_eq!(stats.skipped, 1);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.timestamp, Some(1000));
        assert_eq!(first.accuracy, Some(5.0));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.speed, Some(30.0));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_partial_fix_is_forwarded() {
        // Validation happens downstream
        let (tx, mut rx) = mpsc::channel(4);
        let stats = ndjson_fix_loop(BufReader::new(&b"{\"latitude\": 1.0}\n"[..]), tx).await;
        assert_eq!(stats.sent, 1);
        assert!(rx.recv().await.unwrap().validate().is_none());
    }

    #[tokio::test]
    async fn test_full_channel_drops_fixes() {
        let line = r#"{"latitude": 1.0, "longitude": 2.0, "timestamp": 0}"#;
        let input = format!("{}\n{}\n{}\n", line, line, line);
        let (tx, _rx) = mpsc::channel(1);

        let stats = ndjson_fix_loop(BufReader::new(input.as_bytes()), tx).await;
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.dropped, 2);
    }

    #[tokio::test]
    async fn test_closed_channel_stops_reader() {
        let line = r#"{"latitude": 1.0, "longitude": 2.0, "timestamp": 0}"#;
        let input = format!("{}\n{}\n", line, line);
        let (tx, rx) = mpsc::channel(4);
        drop(rx);

        let stats = ndjson_fix_loop(BufReader::new(input.as_bytes()), tx).await;
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.lines, 1);
    }
}
