use doech_core::protocol::HostEvent;
use tokio::io::AsyncBufRead;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::DaemonError;
use crate::ndjson::LineReader;

/// Counters for one stream's lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamStats {
    pub forwarded: u64,
    pub malformed: u64,
}

/// Reads newline-delimited JSON host events (e.g. a native-messaging pipe)
/// and forwards them to the orchestrator.
///
/// Example line:
/// ```json
/// {"type": "tab-removed", "data": {"tabId": 4}}
/// ```
pub struct HostStreamSource<R> {
    reader: R,
    tx: mpsc::Sender<HostEvent>,
    cancel: CancellationToken,
}

impl<R: AsyncBufRead + Unpin> HostStreamSource<R> {
    pub fn new(reader: R, tx: mpsc::Sender<HostEvent>) -> Self {
        Self::with_cancel(reader, tx, CancellationToken::new())
    }

    pub fn with_cancel(reader: R, tx: mpsc::Sender<HostEvent>, cancel: CancellationToken) -> Self {
        Self { reader, tx, cancel }
    }

    /// Forward events until EOF or cancellation. Malformed lines are logged
    /// and skipped. Fails if the stream errors or the loop is gone.
    pub async fn run(self) -> Result<StreamStats, DaemonError> {
        let mut lines = LineReader::new(self.reader);
        let mut stats = StreamStats::default();

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = self.cancel.cancelled() => {
                    tracing::debug!("host stream: cancelled");
                    break;
                }
            };
            let Some(line) = line else {
                tracing::debug!(
                    forwarded = stats.forwarded,
                    malformed = stats.malformed,
                    "host stream: EOF"
                );
                break;
            };

            if line.is_empty() {
                continue;
            }

            match HostEvent::decode_bytes(&line) {
                Ok(event) => {
                    if self.tx.send(event).await.is_err() {
                        tracing::warn!("host stream: monitor loop gone, stopping");
                        return Err(DaemonError::LoopClosed);
                    }
                    stats.forwarded += 1;
                }
                Err(e) => {
                    stats.malformed += 1;
                    tracing::warn!(
                        "failed to parse host event: {e}, line: {}",
                        String::from_utf8_lossy(&line)
                    );
                }
            }
        }
        Ok(stats)
    }
}
