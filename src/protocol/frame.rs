//! Binary frame codec for batch counts, vectors and results.
//!
//! Every declared count or length is checked against its bound before any
//! of the bytes it describes are read off the wire.

use bytes::{Buf, BufMut, BytesMut};
use std::io::{self, Read, Write};
use thiserror::Error;

/// Largest number of vectors in one session.
pub const MAX_BATCH_COUNT: u32 = 100;

/// Largest number of elements in one vector.
pub const MAX_VECTOR_LEN: u32 = 1000;

const U32_SIZE: usize = std::mem::size_of::<u32>();
const F32_SIZE: usize = std::mem::size_of::<f32>();

/// Frame-level failures. All of them end the session.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("batch count {0} outside 1..={max}", max = MAX_BATCH_COUNT)]
    BatchCountOutOfRange(u32),

    #[error("vector length {0} outside 1..={max}", max = MAX_VECTOR_LEN)]
    VectorLengthOutOfRange(u32),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Reads and writes protocol frames, reusing one scratch buffer.
#[derive(Debug)]
pub struct FrameCodec {
    buf: BytesMut,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(MAX_VECTOR_LEN as usize * F32_SIZE),
        }
    }

    /// Read the number of vectors that follow.
    pub fn read_batch_count<R: Read + ?Sized>(
        &mut self,
        reader: &mut R,
    ) -> Result<u32, FrameError> {
        let count = self.read_u32(reader)?;
        if !(1..=MAX_BATCH_COUNT).contains(&count) {
            return Err(FrameError::BatchCountOutOfRange(count));
        }
        Ok(count)
    }

    /// Read the element count of the next vector.
    pub fn read_vector_length<R: Read + ?Sized>(
        &mut self,
        reader: &mut R,
    ) -> Result<u32, FrameError> {
        let len = self.read_u32(reader)?;
        if !(1..=MAX_VECTOR_LEN).contains(&len) {
            return Err(FrameError::VectorLengthOutOfRange(len));
        }
        Ok(len)
    }

    /// Read `len` elements. The length must already have been validated by
    /// [`read_vector_length`](Self::read_vector_length).
    pub fn read_elements<R: Read + ?Sized>(
        &mut self,
        reader: &mut R,
        len: u32,
    ) -> Result<Vec<f32>, FrameError> {
        if !(1..=MAX_VECTOR_LEN).contains(&len) {
            return Err(FrameError::VectorLengthOutOfRange(len));
        }

        let len = len as usize;
        self.fill(reader, len * F32_SIZE)?;

        let mut data = &self.buf[..];
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            values.push(data.get_f32_le());
        }
        Ok(values)
    }

    /// Send one result.
    pub fn write_result<W: Write + ?Sized>(
        &mut self,
        writer: &mut W,
        value: f32,
    ) -> Result<(), FrameError> {
        self.buf.clear();
        self.buf.put_f32_le(value);
        writer.write_all(&self.buf)?;
        writer.flush()?;
        Ok(())
    }

    fn read_u32<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<u32, FrameError> {
        self.fill(reader, U32_SIZE)?;
        let mut data = &self.buf[..];
        Ok(data.get_u32_le())
    }

    /// Read exactly `n` bytes into the scratch buffer, accumulating partial
    /// reads until the count is satisfied.
    fn fill<R: Read + ?Sized>(&mut self, reader: &mut R, n: usize) -> io::Result<()> {
        self.buf.clear();
        self.buf.resize(n, 0);
        reader.read_exact(&mut self.buf[..n])
    }
}
