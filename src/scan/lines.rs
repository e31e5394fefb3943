//! Bounded line reading over the worker's pipes.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Line budget matching the worker-side pipe buffer.
pub(crate) const LINE_LIMIT: usize = 1 << 20; // 1MiB

#[derive(Error, Debug)]
pub(crate) enum LineError {
    /// The line exceeded the budget and was discarded (stream continues).
    #[error("line too long ({len} bytes)")]
    TooLong { len: usize },
    /// The underlying read failed (stream ends).
    #[error("read: {0}")]
    Io(#[from] io::Error),
}

/// Newline-delimited reader that tolerates unusually long lines by skipping
/// them rather than growing without bound.
pub(crate) struct BoundedLines<R> {
    reader: BufReader<R>,
    limit: usize,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> BoundedLines<R> {
    pub fn new(reader: R, limit: usize) -> Self {
        Self {
            reader: BufReader::with_capacity(64 * 1024, reader),
            limit,
            buf: Vec::new(),
        }
    }

    /// Returns the next line without its terminator, `None` at EOF.
    pub async fn next_line(&mut self) -> Option<Result<String, LineError>> {
        self.buf.clear();
        loop {
            let chunk = match self.reader.fill_buf().await {
                Ok(chunk) => chunk,
                Err(err) => return Some(Err(LineError::Io(err))),
            };
            if chunk.is_empty() {
                // EOF; a trailing unterminated line still counts.
                if self.buf.is_empty() {
                    return None;
                }
                return Some(Ok(self.take_line()));
            }
            match chunk.iter().position(|&b| b == b'\n') {
                Some(at) => {
                    self.buf.extend_from_slice(&chunk[..at]);
                    self.reader.consume(at + 1);
                    if self.buf.len() > self.limit {
                        let len = self.buf.len();
                        self.buf.clear();
                        return Some(Err(LineError::TooLong { len }));
                    }
                    return Some(Ok(self.take_line()));
                }
                None => {
                    let taken = chunk.len();
                    self.buf.extend_from_slice(chunk);
                    self.reader.consume(taken);
                    if self.buf.len() > self.limit {
                        return self.discard_until_newline().await;
                    }
                }
            }
        }
    }

    fn take_line(&mut self) -> String {
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        String::from_utf8_lossy(&self.buf).into_owned()
    }

    async fn discard_until_newline(&mut self) -> Option<Result<String, LineError>> {
        let mut len = self.buf.len();
        self.buf.clear();
        loop {
            let chunk = match self.reader.fill_buf().await {
                Ok(chunk) => chunk,
                Err(err) => return Some(Err(LineError::Io(err))),
            };
            if chunk.is_empty() {
                return Some(Err(LineError::TooLong { len }));
            }
            match chunk.iter().position(|&b| b == b'\n') {
                Some(at) => {
                    len += at;
                    self.reader.consume(at + 1);
                    return Some(Err(LineError::TooLong { len }));
                }
                None => {
                    len += chunk.len();
                    let taken = chunk.len();
                    self.reader.consume(taken);
                }
            }
        }
    }
}
