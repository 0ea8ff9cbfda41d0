//! Fixed-capacity receive buffer for unframed handshake messages.
//!
//! The login and hash-response messages carry no length prefix: each is
//! whatever a single `read` returns, truncated to the buffer capacity.
//! `RecvBuffer` owns that storage and tracks how much of it is filled.

use std::io::{self, Read};

/// Byte buffer with a fixed capacity, filled by a single read.
#[derive(Debug)]
pub struct RecvBuffer {
    /// Backing storage, always `capacity` bytes long.
    data: Vec<u8>,
    /// Bytes filled by the last read.
    filled: usize,
}

impl RecvBuffer {
    /// Create a buffer able to hold at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            filled: 0,
        }
    }

    /// Perform exactly one read from `reader`, replacing any previous
    /// contents.
    ///
    /// A read of zero bytes means the peer closed the connection and is
    /// reported as `UnexpectedEof`. Interrupted reads are retried.
    pub fn recv_once<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<&[u8]> {
        self.filled = 0;

        let n = loop {
            match reader.read(&mut self.data) {
                Ok(n) => break n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };

        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed connection",
            ));
        }

        self.filled = n;
        Ok(self.as_slice())
    }

    /// Bytes filled by the last read.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.filled]
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.filled
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Maximum number of bytes a single read can deliver.
    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedStream;

    #[test]
    fn test_single_read() {
        let mut stream = ScriptedStream::new([b"user".as_slice(), b"more"]);
        let mut buf = RecvBuffer::new(255);

        assert_eq!(buf.recv_once(&mut stream).unwrap(), b"user");
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.recv_once(&mut stream).unwrap(), b"more");
    }

    #[test]
    fn test_truncates_to_capacity() {
        let mut stream = ScriptedStream::new([b"0123456789".as_slice()]);
        let mut buf = RecvBuffer::new(4);

        assert_eq!(buf.capacity(), 4);
        assert_eq!(buf.recv_once(&mut stream).unwrap(), b"0123");
        // The rest stays on the stream for the next read
        assert_eq!(buf.recv_once(&mut stream).unwrap(), b"4567");
    }

    #[test]
    fn test_eof_is_error() {
        let mut stream = ScriptedStream::new(Vec::<&[u8]>::new());
        let mut buf = RecvBuffer::new(16);

        let err = buf.recv_once(&mut stream).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(buf.is_empty());
    }
}
