//! Byte sources: the boundary between the parsing core and external I/O
//!
//! A [`ByteSource`] is a random-access byte provider with an optional
//! length and filename hint. Sources are created once per top-level parse
//! and dropped with it; the file-backed variant is the only one holding an
//! OS resource.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use bytes::Bytes;

use crate::error::{Error, Result};

/// Abstract random-access byte provider
pub trait ByteSource: Send {
    /// Total size in bytes, when known
    fn len(&self) -> Option<u64>;

    /// Whether the source is known to be empty
    fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Filename hint for extension heuristics
    fn name_hint(&self) -> Option<&str>;

    /// Read at most `length` bytes starting at `offset`
    ///
    /// Returns fewer bytes when the source ends inside the requested
    /// range, and an empty buffer at or past the end. Zero-length
    /// requests return empty without touching the source.
    fn read_at(&mut self, offset: u64, length: usize) -> Result<Vec<u8>>;
}

/// File-backed source using positional reads against an open handle
pub struct FileSource {
    file: File,
    len: u64,
    name: Option<String>,
}

impl FileSource {
    /// Open a file and capture its length and name hint
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::io_failure(format!("failed to open {}: {}", path.display(), e)))?;
        let len = file
            .metadata()
            .map_err(|e| Error::io_failure(format!("failed to stat {}: {}", path.display(), e)))?
            .len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        Ok(FileSource { file, len, name })
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> Option<u64> {
        Some(self.len)
    }

    fn name_hint(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn read_at(&mut self, offset: u64, length: usize) -> Result<Vec<u8>> {
        if length == 0 || offset >= self.len {
            return Ok(Vec::new());
        }

        self.file.seek(SeekFrom::Start(offset))?;

        let available = (self.len - offset).min(length as u64) as usize;
        let mut buf = vec![0u8; available];
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }
}

/// In-memory source serving a slice of a pre-supplied buffer
///
/// Holding [`Bytes`] keeps clones of caller buffers cheap. Never fails.
pub struct MemorySource {
    data: Bytes,
    name: Option<String>,
}

impl MemorySource {
    /// Wrap an in-memory buffer
    pub fn new(data: impl Into<Bytes>, name_hint: Option<&str>) -> Self {
        MemorySource {
            data: data.into(),
            name: name_hint.map(str::to_string),
        }
    }

    /// Eagerly drain a forward-only stream into memory
    ///
    /// Stream parsing is thus reduced to buffered parsing; underlying read
    /// errors surface as `ioFailure`.
    pub fn from_reader<R: Read>(mut reader: R, name_hint: Option<&str>) -> Result<Self> {
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(|e| Error::io_failure(format!("failed to drain stream: {}", e)))?;
        Ok(MemorySource::new(data, name_hint))
    }
}

impl ByteSource for MemorySource {
    fn len(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn name_hint(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn read_at(&mut self, offset: u64, length: usize) -> Result<Vec<u8>> {
        if length == 0 || offset >= self.data.len() as u64 {
            return Ok(Vec::new());
        }
        let start = offset as usize;
        let end = (start + length).min(self.data.len());
        Ok(self.data[start..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_memory_source_reads() {
        let mut source = MemorySource::new(vec![1u8, 2, 3, 4, 5], Some("a.bin"));
        assert_eq!(source.len(), Some(5));
        assert_eq!(source.name_hint(), Some("a.bin"));
        assert_eq!(source.read_at(1, 3).unwrap(), vec![2, 3, 4]);
        // short read past the end
        assert_eq!(source.read_at(3, 10).unwrap(), vec![4, 5]);
        // at and past the end
        assert!(source.read_at(5, 1).unwrap().is_empty());
        assert!(source.read_at(100, 1).unwrap().is_empty());
        // zero-length
        assert!(source.read_at(0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_stream_source_drains() {
        let data: &[u8] = b"stream contents";
        let mut source = MemorySource::from_reader(data, Some("s.mp3")).unwrap();
        assert_eq!(source.len(), Some(15));
        assert_eq!(source.read_at(0, 6).unwrap(), b"stream");
    }

    #[test]
    fn test_file_source_reads() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();

        let mut source = FileSource::open(file.path()).unwrap();
        assert_eq!(source.len(), Some(10));
        assert!(source.name_hint().is_some());
        assert_eq!(source.read_at(2, 4).unwrap(), b"2345");
        assert_eq!(source.read_at(8, 10).unwrap(), b"89");
        assert!(source.read_at(10, 4).unwrap().is_empty());
    }

    #[test]
    fn test_file_source_missing() {
        assert!(FileSource::open("/nonexistent/file.mp3").is_err());
    }
}
