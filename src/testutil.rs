//! In-memory stream for protocol tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

/// A stream that replays scripted chunks, one chunk per `read` call, and
/// records everything written to it.
///
/// A chunk larger than the caller's buffer is split; the remainder is
/// returned by the next read. Once the script is exhausted reads return 0.
#[derive(Debug, Default)]
pub struct ScriptedStream {
    reads: VecDeque<Vec<u8>>,
    pub written: Vec<u8>,
    broken_pipe: bool,
}

impl ScriptedStream {
    pub fn new<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        Self {
            reads: chunks.into_iter().map(|c| c.as_ref().to_vec()).collect(),
            written: Vec::new(),
            broken_pipe: false,
        }
    }

    /// Make every subsequent write fail.
    pub fn with_broken_pipe(mut self) -> Self {
        self.broken_pipe = true;
        self
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(mut chunk) = self.reads.pop_front() else {
            return Ok(0);
        };

        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.reads.push_front(chunk.split_off(n));
        }
        Ok(n)
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.broken_pipe {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"));
        }
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
