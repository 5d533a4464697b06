use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Reads newline-delimited text records from an async byte stream.
pub struct LineReader<R> {
    inner: R,
    buffer: String,
}

impl<R> LineReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: String::new(),
        }
    }

    /// Reads the next line, without its terminator. Returns `None` on a
    /// clean end of stream. A trailing `\r` before the terminator is
    /// stripped so telnet-style clients look the same as everyone else. A
    /// final unterminated fragment still counts as one line, so a peer
    /// that dies mid-line loses nothing.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        self.buffer.clear();
        let bytes = self.inner.read_line(&mut self.buffer).await?;
        if bytes == 0 {
            return Ok(None);
        }

        if self.buffer.ends_with('\n') {
            self.buffer.pop();
            if self.buffer.ends_with('\r') {
                self.buffer.pop();
            }
        }
        Ok(Some(self.buffer.clone()))
    }
}

/// Writes newline-terminated text records.
///
/// Every record is flushed as it is written; peers are interactive, so a
/// line must never sit in a buffer waiting for company.
pub struct LineWriter<W> {
    inner: W,
}

impl<W> LineWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Writes `line` followed by the terminator and forces transmission.
    /// `line` must not itself contain the terminator.
    pub async fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.write_all(b"\n").await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Flushes and closes the underlying stream.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}
