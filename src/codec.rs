//! Little-endian byte cursor helpers shared by the container and classifier payloads.

use crate::error::{PipelineError, Result};

/// Append-only little-endian writer.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Creates a writer with `capacity` bytes reserved.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Writes a `u64` in little-endian order.
    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an `f64` in little-endian order.
    pub fn put_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes every value of `values` as `f64`.
    pub fn put_f64s(&mut self, values: &[f64]) {
        for value in values {
            self.put_f64(*value);
        }
    }

    /// Writes a `u64` length prefix followed by `bytes`.
    pub fn put_prefixed(&mut self, bytes: &[u8]) {
        self.put_u64(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    /// Writes `bytes` without a prefix.
    pub fn put_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Consumes the writer, returning the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Forward-only reader over a borrowed buffer.
///
/// Every read that would run past the end fails with `BufferUnderflow`.
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Starts reading at the beginning of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Takes exactly `len` bytes.
    pub fn take(&mut self, len: u64) -> Result<&'a [u8]> {
        let remaining = self.remaining();
        let Some(len) = usize::try_from(len).ok().filter(|len| *len <= remaining) else {
            return Err(PipelineError::BufferUnderflow {
                needed: len,
                remaining: remaining as u64,
            });
        };
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Reads a little-endian `u64`.
    pub fn take_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    /// Reads a little-endian `f64`.
    pub fn take_f64(&mut self) -> Result<f64> {
        self.take_u64().map(f64::from_bits)
    }

    /// Reads `count` consecutive `f64` values.
    pub fn take_f64s(&mut self, count: usize) -> Result<Vec<f64>> {
        let needed = (count as u64).saturating_mul(8);
        if needed > self.remaining() as u64 {
            return Err(PipelineError::BufferUnderflow {
                needed,
                remaining: self.remaining() as u64,
            });
        }
        (0..count).map(|_| self.take_f64()).collect()
    }

    /// Reads a `u64` length prefix and then that many bytes.
    pub fn take_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.take_u64()?;
        self.take(len)
    }

    /// Consumes everything that is left.
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }
}
