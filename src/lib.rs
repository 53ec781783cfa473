//! audioprobe - audio container and tag metadata extraction
//!
//! audioprobe identifies the format of an audio file, recovers its core
//! parameters (duration, bitrate, sample rate, channels, sample depth),
//! decodes the embedded tag vocabularies (ID3v2, APEv2, Vorbis comments,
//! MP4 ilst, ASF content description), and surfaces binary attachments as
//! SHA-256 digests or embedded payloads. It reads metadata only; no audio
//! is decoded and nothing is ever written.
//!
//! # Architecture
//!
//! - `source`: random-access byte providers (file, memory, drained stream)
//! - `reader`: single-window caching reader with bounded per-read size
//! - `probe`: magic/extension scoring and parser resolution
//! - `format`: one parser per container
//! - `tag`: shared tag-vocabulary decoders invoked across formats
//! - `engine`: permit-pooled entry point producing normalized results
//!
//! # Usage
//!
//! ```rust,no_run
//! use audioprobe::Engine;
//!
//! let engine = Engine::new();
//! let metadata = engine.parse_path("song.flac")?;
//! println!("{}", metadata);
//! # Ok::<(), audioprobe::Error>(())
//! ```

pub mod engine;
pub mod error;
pub mod format;
pub mod metadata;
pub mod options;
pub mod probe;
pub mod reader;
pub mod source;
pub mod tag;

pub use engine::Engine;
pub use error::{Error, ErrorKind, Result};
pub use metadata::{
    AudioCoreInfo, AudioFormat, BinaryDigest, ParsedAudioMetadata, ParserDiagnostics, TagMap,
    TagValue,
};
pub use options::ParseOptions;

use std::io::Read;
use std::path::Path;

/// Parse a file on disk with default options
pub fn parse_path<P: AsRef<Path>>(path: P) -> Result<ParsedAudioMetadata> {
    Engine::new().parse_path(path)
}

/// Parse an in-memory buffer with default options
pub fn parse_bytes(
    data: impl Into<bytes::Bytes>,
    name_hint: Option<&str>,
) -> Result<ParsedAudioMetadata> {
    Engine::new().parse_bytes(data, name_hint)
}

/// Parse a forward-only stream with default options
pub fn parse_stream<R: Read>(reader: R, name_hint: Option<&str>) -> Result<ParsedAudioMetadata> {
    Engine::new().parse_stream(reader, name_hint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convenience_entry_points() {
        let metadata = parse_bytes(b"fLaC".to_vec(), Some("x.flac"));
        // a bare magic with no STREAMINFO is a truncated file, but it
        // still dispatches to the FLAC parser
        assert!(metadata.is_err() || metadata.unwrap().format == AudioFormat::Flac);

        let metadata = parse_stream(&b"\x00\x01\x02\x03"[..], None).unwrap();
        assert_eq!(metadata.format, AudioFormat::Unknown);
    }
}
