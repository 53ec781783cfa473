//! Windowed random-access reader
//!
//! Wraps a [`ByteSource`] with a single cached window. Parsers walk
//! containers approximately linearly but also jump to read a chunk header
//! and then the chunk body; one window the size of a typical metadata
//! block amortises I/O without the complexity of a general cache. The
//! reader is deliberately not a forward iterator: callers jump backward
//! (APEv2 footers) and forward freely.

use crate::error::{Error, Result};
use crate::options::ParseOptions;
use crate::source::{ByteSource, MemorySource};

/// Single-window caching reader with bounded per-read size
pub struct WindowedReader {
    source: Box<dyn ByteSource>,
    window: Vec<u8>,
    window_offset: u64,
    window_size: usize,
    max_read_bytes: usize,
    bytes_read: u64,
}

impl WindowedReader {
    /// Wrap a source using the window and read limits from `options`
    pub fn new(source: Box<dyn ByteSource>, options: &ParseOptions) -> Self {
        WindowedReader {
            source,
            window: Vec::new(),
            window_offset: 0,
            window_size: options.effective_window_size(),
            max_read_bytes: options.effective_max_read_bytes(),
            bytes_read: 0,
        }
    }

    /// Build a reader over an in-memory slice
    ///
    /// Format parsers use this to re-parse an embedded tag block (an
    /// `ID3 ` chunk body, a DSF metadata region) through the same code
    /// paths as a top-level source.
    pub fn from_slice(data: &[u8], options: &ParseOptions) -> Self {
        WindowedReader::new(
            Box::new(MemorySource::new(data.to_vec(), None)),
            options,
        )
    }

    /// Total source size, when known
    pub fn len(&self) -> Option<u64> {
        self.source.len()
    }

    /// Whether the source is known to be empty
    pub fn is_empty(&self) -> bool {
        self.source.len() == Some(0)
    }

    /// Filename hint from the source
    pub fn name_hint(&self) -> Option<&str> {
        self.source.name_hint()
    }

    /// Bytes fetched from the underlying source so far
    ///
    /// Monotonically increasing; reads served from the cached window do
    /// not count.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read up to `length` bytes at `offset`
    ///
    /// Returns fewer bytes when the source ends inside the requested
    /// range; callers that need an exact count use [`read_exact`] or the
    /// typed helpers. A request larger than the configured cap fails with
    /// `ioFailure` before any I/O occurs.
    ///
    /// [`read_exact`]: WindowedReader::read_exact
    pub fn read(&mut self, offset: u64, length: usize) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }

        if let Some(slice) = self.cached(offset, length) {
            return Ok(slice.to_vec());
        }

        if length > self.max_read_bytes {
            return Err(Error::io_failure("read request exceeds configured cap")
                .with_offset(offset)
                .with_context("requested", length.to_string())
                .with_context("max_read_bytes", self.max_read_bytes.to_string()));
        }

        let fetch = self.window_size.max(length);
        let data = self.source.read_at(offset, fetch)?;
        self.bytes_read += data.len() as u64;
        self.window = data;
        self.window_offset = offset;

        Ok(self.window[..length.min(self.window.len())].to_vec())
    }

    /// Read exactly `length` bytes at `offset`, failing on a short read
    pub fn read_exact(&mut self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let data = self.read(offset, length)?;
        if data.len() < length {
            return Err(Error::truncated_data(format!(
                "needed {} bytes, got {}",
                length,
                data.len()
            ))
            .with_offset(offset));
        }
        Ok(data)
    }

    /// Slice of the cached window covering the request, if fully contained
    fn cached(&self, offset: u64, length: usize) -> Option<&[u8]> {
        let end = offset.checked_add(length as u64)?;
        let window_end = self.window_offset + self.window.len() as u64;
        if offset >= self.window_offset && end <= window_end {
            let start = (offset - self.window_offset) as usize;
            Some(&self.window[start..start + length])
        } else {
            None
        }
    }

    pub fn read_u8(&mut self, offset: u64) -> Result<u8> {
        let b = self.read_exact(offset, 1)?;
        Ok(b[0])
    }

    pub fn read_u16_le(&mut self, offset: u64) -> Result<u16> {
        let b = self.read_exact(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u16_be(&mut self, offset: u64) -> Result<u16> {
        let b = self.read_exact(offset, 2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u24_be(&mut self, offset: u64) -> Result<u32> {
        let b = self.read_exact(offset, 3)?;
        Ok(((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32)
    }

    pub fn read_u32_le(&mut self, offset: u64) -> Result<u32> {
        let b = self.read_exact(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u32_be(&mut self, offset: u64) -> Result<u32> {
        let b = self.read_exact(offset, 4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64_le(&mut self, offset: u64) -> Result<u64> {
        let b = self.read_exact(offset, 8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_u64_be(&mut self, offset: u64) -> Result<u64> {
        let b = self.read_exact(offset, 8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Read an exact-length ASCII string (lossy for non-ASCII bytes)
    pub fn read_ascii(&mut self, offset: u64, length: usize) -> Result<String> {
        let b = self.read_exact(offset, length)?;
        Ok(String::from_utf8_lossy(&b).into_owned())
    }
}
