//! Newline-delimited reader with a per-line length cap

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

/// Longest inbound line kept; longer lines are discarded whole
pub const MAX_LINE_LEN: usize = 512;

/// Splits a byte stream into lines. `next_line` is cancel safe: bytes are
/// only consumed from the inner reader once they are copied into `buf`.
pub struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
    max_len: usize,
    overflowed: bool,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_len(inner, MAX_LINE_LEN)
    }

    pub fn with_max_len(inner: R, max_len: usize) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            max_len,
            overflowed: false,
        }
    }

    /// Next line without its terminator, `None` at end of stream. An
    /// oversized line comes back empty. Invalid UTF-8 is replaced, not
    /// rejected.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                // A trailing partial line is dropped
                return Ok(None);
            }

            let newline = available.iter().position(|b| *b == b'\n');
            let take = newline.unwrap_or(available.len());
            if !self.overflowed {
                if self.buf.len() + take > self.max_len {
                    self.overflowed = true;
                    self.buf.clear();
                } else {
                    self.buf.extend_from_slice(&available[..take]);
                }
            }

            match newline {
                Some(pos) => {
                    self.inner.consume(pos + 1);
                    if std::mem::take(&mut self.overflowed) {
                        warn!(max_len = self.max_len, "Discarding oversized line");
                        return Ok(Some(String::new()));
                    }
                    let raw = std::mem::take(&mut self.buf);
                    let line = String::from_utf8_lossy(&raw);
                    return Ok(Some(line.trim_end_matches('\r').to_string()));
                }
                None => self.inner.consume(take),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn splits_lines_across_reads() {
        let socket = tokio_test::io::Builder::new()
            .read(b"CONN")
            .read(b"ECT;alice\r\nSHOOT_CMD\n")
            .read(b"partial")
            .build();
        let mut lines = LineReader::new(BufReader::new(socket));

        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("CONNECT;alice"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("SHOOT_CMD"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_line_is_discarded_and_reading_continues() {
        let mut input = vec![b'x'; 40];
        input.extend_from_slice(b"\nSHOOT_CMD\n");
        let socket = tokio_test::io::Builder::new().read(&input).build();
        let mut lines = LineReader::with_max_len(BufReader::new(socket), 16);

        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("SHOOT_CMD"));
    }
}
