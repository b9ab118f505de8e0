//! Raw NDJSON line reading shared by host streams and sink sessions.
//!
//! Lines are kept as bytes so that a line that is not valid UTF-8 reaches the
//! JSON decoder and is rejected there, instead of failing the whole read.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

pub(crate) struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Next line with surrounding ASCII whitespace removed, or `None` at EOF.
    ///
    /// Cancel safe: bytes read by a call dropped inside `select!` stay in the
    /// buffer and are returned by the next call.
    pub(crate) async fn next_line(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        self.reader.read_until(b'\n', &mut self.buf).await?;
        if self.buf.is_empty() {
            return Ok(None);
        }
        let raw = std::mem::take(&mut self.buf);
        Ok(Some(raw.trim_ascii().to_vec()))
    }
}
