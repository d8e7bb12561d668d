//! Chunked attachment reads with optional timeouts.
//!
//! Without a timeout, chunks are read directly from the attachment stream.
//! With one, a watchdog reader thread reads ahead into a one-slot channel and
//! the consumer waits on the channel with a deadline. At most two chunks are
//! buffered at any time. A reader thread stuck in a blocking read is left
//! behind when the consumer gives up; it exits once the read returns.

use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("read failed: {0}")]
    Io(#[from] io::Error),

    #[error("read timed out after {0:?}")]
    TimedOut(Duration),
}

enum Mode {
    Direct(Box<dyn Read + Send>),
    Watched {
        rx: Receiver<io::Result<Vec<u8>>>,
        read_timeout: Option<Duration>,
    },
}

/// Reads an attachment stream one chunk at a time.
pub struct ChunkReader {
    mode: Mode,
    buf: Vec<u8>,
    done: bool,
}

impl ChunkReader {
    /// Read `content` directly, without timeouts.
    pub fn direct(content: Box<dyn Read + Send>, chunk_size: usize) -> Self {
        ChunkReader {
            mode: Mode::Direct(content),
            buf: vec![0; chunk_size.max(1)],
            done: false,
        }
    }

    /// Read `content` on a watchdog thread so reads can time out.
    pub fn watched(
        content: Box<dyn Read + Send>,
        chunk_size: usize,
        read_timeout: Option<Duration>,
    ) -> io::Result<Self> {
        let chunk_size = chunk_size.max(1);
        let (tx, rx) = mpsc::sync_channel(1);

        thread::Builder::new()
            .name("eln-attachment-reader".to_string())
            .spawn(move || {
                let mut content = content;
                loop {
                    let mut chunk = vec![0u8; chunk_size];
                    let message = match read_retrying(&mut content, &mut chunk) {
                        Ok(n) => {
                            chunk.truncate(n);
                            Ok(chunk)
                        }
                        Err(e) => Err(e),
                    };
                    let finished = !matches!(&message, Ok(c) if !c.is_empty());
                    if tx.send(message).is_err() || finished {
                        break;
                    }
                }
            })?;

        Ok(ChunkReader {
            mode: Mode::Watched { rx, read_timeout },
            buf: Vec::new(),
            done: false,
        })
    }

    /// Direct when no timeout applies, watched otherwise.
    pub fn new(
        content: Box<dyn Read + Send>,
        chunk_size: usize,
        read_timeout: Option<Duration>,
        timed_record: bool,
    ) -> io::Result<Self> {
        if read_timeout.is_none() && !timed_record {
            Ok(Self::direct(content, chunk_size))
        } else {
            Self::watched(content, chunk_size, read_timeout)
        }
    }

    /// Next chunk, or `None` at end of stream.
    ///
    /// In watched mode the wait is bounded by the read timeout and by
    /// `deadline`, whichever comes first.
    pub fn next_chunk(&mut self, deadline: Option<Instant>) -> Result<Option<&[u8]>, ChunkError> {
        if self.done {
            return Ok(None);
        }

        match &mut self.mode {
            Mode::Direct(content) => {
                let n = read_retrying(content, &mut self.buf)?;
                if n == 0 {
                    self.done = true;
                    return Ok(None);
                }
                Ok(Some(&self.buf[..n]))
            }
            Mode::Watched { rx, read_timeout } => {
                let wait = effective_wait(*read_timeout, deadline);
                let message = match wait {
                    Some(wait) => rx.recv_timeout(wait).map_err(|e| match e {
                        RecvTimeoutError::Timeout => ChunkError::TimedOut(wait),
                        RecvTimeoutError::Disconnected => reader_gone(),
                    })?,
                    None => rx.recv().map_err(|_| reader_gone())?,
                };

                let chunk = message?;
                if chunk.is_empty() {
                    self.done = true;
                    return Ok(None);
                }
                self.buf = chunk;
                Ok(Some(&self.buf))
            }
        }
    }
}

fn read_retrying(content: &mut Box<dyn Read + Send>, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match content.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

fn effective_wait(read_timeout: Option<Duration>, deadline: Option<Instant>) -> Option<Duration> {
    let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
    match (read_timeout, remaining) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn reader_gone() -> ChunkError {
    ChunkError::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "attachment reader thread exited",
    ))
}
