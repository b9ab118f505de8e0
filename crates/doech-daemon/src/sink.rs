//! Presentation sink sessions.
//!
//! A sink (sidebar, crawler, test harness) talks NDJSON over any byte stream:
//! it sends `refresh-request` / `export` requests and receives the replies
//! plus every pushed `entry-added` / `snapshot` message.

use doech_core::protocol::{SinkMessage, SinkRequest};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::DaemonError;
use crate::handle::MonitorHandle;
use crate::ndjson::LineReader;

/// Error line written back for an undecodable request.
#[derive(Debug, Serialize)]
struct ErrorReply {
    error: String,
}

/// Serve one sink until it disconnects, the loop stops or `cancel` fires.
pub async fn serve_sink<R, W>(
    reader: R,
    mut writer: W,
    handle: MonitorHandle,
    cancel: CancellationToken,
) -> Result<(), DaemonError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = LineReader::new(reader);
    let mut notify_rx = handle.subscribe();

    tracing::debug!("sink connected");

    loop {
        tokio::select! {
            // --- incoming request from the sink ---
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(l)) => l,
                    Ok(None) => {
                        tracing::debug!("sink disconnected (EOF)");
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "read error, dropping sink");
                        return Err(e.into());
                    }
                };
                if line.is_empty() {
                    continue;
                }

                match SinkRequest::decode_bytes(&line) {
                    Ok(request) => {
                        let reply = handle.request(request).await?;
                        write_json(&mut writer, &reply).await?;
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "undecodable sink request");
                        write_json(&mut writer, &ErrorReply { error: e.to_string() }).await?;
                    }
                }
            }

            // --- push from the monitor ---
            msg = notify_rx.recv() => {
                let msg = match msg {
                    Ok(m) => m,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "sink lagged, dropped messages");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("sink channel closed, dropping sink");
                        return Ok(());
                    }
                };
                if let Err(e) = write_json(&mut writer, &msg).await {
                    tracing::debug!(error = %e, "failed to push message, dropping sink");
                    return Err(e.into());
                }
            }

            _ = cancel.cancelled() => {
                tracing::debug!("sink session cancelled");
                return Ok(());
            }
        }
    }
}

async fn write_json<W, T>(writer: &mut W, value: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut buf = serde_json::to_vec(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    buf.push(b'\n');
    writer.write_all(&buf).await?;
    writer.flush().await
}

/// Decode one pushed or replied line. Used by sinks written in Rust.
pub fn decode_message(line: &str) -> Result<SinkMessage, DaemonError> {
    serde_json::from_str(line)
        .map_err(|e| DaemonError::Core(doech_core::CoreError::MalformedMessage(e)))
}
