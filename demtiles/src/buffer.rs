//! Reusable I/O and decompression buffers.
//!
//! Every lookup reads directory and tile bytes into the same pair of buffers.
//! Capacity only ever grows, always to a power of two, so after a few lookups
//! the steady state does no allocation at all.

use std::io::{ErrorKind, Read, Seek, SeekFrom};

use flate2::read::GzDecoder;
use tracing::debug;

use crate::error::{DemError, Result};

/// Initial capacity of each scratch buffer.
pub const INITIAL_CAPACITY: usize = 1024;

/// A byte buffer with power-of-two capacity and a separately tracked length.
///
/// The whole capacity is initialised memory; `len` marks how much of it holds
/// valid data. Shrinking only moves `len`.
#[derive(Debug, Default)]
pub struct GrowableBuffer {
    data: Vec<u8>,
    len: usize,
}

impl GrowableBuffer {
    /// Create a buffer whose capacity is the next power of two ≥ `capacity`.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut buffer = Self::default();
        buffer.ensure_capacity(capacity)?;
        Ok(buffer)
    }

    /// Grow to the next power of two ≥ `required` if the buffer is smaller.
    ///
    /// Existing contents are preserved.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::Allocation`] if the allocator refuses the request.
    pub fn ensure_capacity(&mut self, required: usize) -> Result<()> {
        if required <= self.data.len() && !self.data.is_empty() {
            return Ok(());
        }
        let target = required
            .checked_next_power_of_two()
            .ok_or(DemError::Allocation {
                requested: required,
            })?;
        if target <= self.data.len() {
            return Ok(());
        }

        self.data
            .try_reserve_exact(target - self.data.len())
            .map_err(|_| DemError::Allocation { requested: target })?;
        debug!(from = self.data.len(), to = target, "grow buffer");
        self.data.resize(target, 0);
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set the valid length. Returns `false` (and clamps to capacity) if
    /// `len` exceeds the capacity.
    pub fn set_len(&mut self, len: usize) -> bool {
        if len > self.data.len() {
            self.len = self.data.len();
            return false;
        }
        self.len = len;
        true
    }

    /// The valid bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// The whole capacity, for filling.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Replace the contents with `bytes`, growing if needed.
    pub fn fill_from(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_capacity(bytes.len())?;
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
        Ok(())
    }
}

/// Read `length` bytes at `offset` into `buffer`.
///
/// # Errors
///
/// [`DemError::Io`] if seeking fails or the source ends before `length`
/// bytes were read; [`DemError::Allocation`] if the buffer cannot grow.
pub fn read_range<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    length: usize,
    buffer: &mut GrowableBuffer,
) -> Result<()> {
    buffer.ensure_capacity(length)?;
    buffer.set_len(0);
    reader.seek(SeekFrom::Start(offset))?;
    reader.read_exact(&mut buffer.spare_mut()[..length])?;
    buffer.set_len(length);
    Ok(())
}

/// Inflate a complete gzip stream from `input` into `output`.
///
/// The output buffer at least doubles whenever the decoder fills it, and is
/// never shrunk.
///
/// # Errors
///
/// [`DemError::Decompress`] if the stream is corrupt, truncated or fails its
/// checksum.
pub fn decompress_gzip(input: &[u8], output: &mut GrowableBuffer) -> Result<()> {
    let mut decoder = GzDecoder::new(input);
    output.set_len(0);
    let mut filled = 0;

    loop {
        if filled == output.capacity() {
            output.ensure_capacity((filled * 2).max(INITIAL_CAPACITY))?;
        }
        match decoder.read(&mut output.spare_mut()[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(DemError::Decompress(e.to_string())),
        }
    }

    output.set_len(filled);
    Ok(())
}

/// The read buffer and the decompression buffer used by every lookup.
#[derive(Debug)]
pub struct ScratchBuffers {
    read: GrowableBuffer,
    inflate: GrowableBuffer,
}

impl ScratchBuffers {
    pub fn new() -> Result<Self> {
        Ok(Self {
            read: GrowableBuffer::with_capacity(INITIAL_CAPACITY)?,
            inflate: GrowableBuffer::with_capacity(INITIAL_CAPACITY)?,
        })
    }

    /// Read a byte range into the read buffer and return it.
    pub fn read_range<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        offset: u64,
        length: usize,
    ) -> Result<&[u8]> {
        read_range(reader, offset, length, &mut self.read)?;
        Ok(self.read.as_slice())
    }

    /// Copy a blob obtained elsewhere into the read buffer.
    pub fn load(&mut self, bytes: &[u8]) -> Result<&[u8]> {
        self.read.fill_from(bytes)?;
        Ok(self.read.as_slice())
    }

    /// Inflate the read buffer's contents into the decompression buffer.
    pub fn inflate_read(&mut self) -> Result<&[u8]> {
        decompress_gzip(self.read.as_slice(), &mut self.inflate)?;
        Ok(self.inflate.as_slice())
    }

    /// Current bytes of the read buffer.
    pub fn read_bytes(&self) -> &[u8] {
        self.read.as_slice()
    }

    /// Capacities of the read and decompression buffers.
    pub fn capacities(&self) -> (usize, usize) {
        (self.read.capacity(), self.inflate.capacity())
    }
}
