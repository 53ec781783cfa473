//! Metadata model: formats, core audio parameters, tag values, diagnostics
//!
//! Everything a parse returns is a plain value in this module. Results are
//! serde-serializable so callers can persist or forward them as JSON.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{Error, Result};

/// Recognised container/codec formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AudioFormat {
    Mp3,
    Id3,
    Flac,
    Mp4,
    M4a,
    Wave,
    Aiff,
    Asf,
    Apev2,
    Musepack,
    Wavpack,
    Tak,
    Dsf,
    Dsdiff,
    Aac,
    Ac3,
    Eac3,
    Ogg,
    OggVorbis,
    OggOpus,
    OggSpeex,
    OggTheora,
    OggFlac,
    TrueAudio,
    OptimFrog,
    Smf,
    MonkeysAudio,
    Unknown,
}

impl AudioFormat {
    /// All formats, in the canonical enumeration order
    pub fn all() -> &'static [AudioFormat] {
        use AudioFormat::*;
        &[
            Mp3, Id3, Flac, Mp4, M4a, Wave, Aiff, Asf, Apev2, Musepack, Wavpack, Tak, Dsf,
            Dsdiff, Aac, Ac3, Eac3, Ogg, OggVorbis, OggOpus, OggSpeex, OggTheora, OggFlac,
            TrueAudio, OptimFrog, Smf, MonkeysAudio, Unknown,
        ]
    }

    /// Stable lowerCamelCase name, matching the serialized form
    pub fn name(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Id3 => "id3",
            AudioFormat::Flac => "flac",
            AudioFormat::Mp4 => "mp4",
            AudioFormat::M4a => "m4a",
            AudioFormat::Wave => "wave",
            AudioFormat::Aiff => "aiff",
            AudioFormat::Asf => "asf",
            AudioFormat::Apev2 => "apev2",
            AudioFormat::Musepack => "musepack",
            AudioFormat::Wavpack => "wavpack",
            AudioFormat::Tak => "tak",
            AudioFormat::Dsf => "dsf",
            AudioFormat::Dsdiff => "dsdiff",
            AudioFormat::Aac => "aac",
            AudioFormat::Ac3 => "ac3",
            AudioFormat::Eac3 => "eac3",
            AudioFormat::Ogg => "ogg",
            AudioFormat::OggVorbis => "oggVorbis",
            AudioFormat::OggOpus => "oggOpus",
            AudioFormat::OggSpeex => "oggSpeex",
            AudioFormat::OggTheora => "oggTheora",
            AudioFormat::OggFlac => "oggFlac",
            AudioFormat::TrueAudio => "trueAudio",
            AudioFormat::OptimFrog => "optimFrog",
            AudioFormat::Smf => "smf",
            AudioFormat::MonkeysAudio => "monkeysAudio",
            AudioFormat::Unknown => "unknown",
        }
    }

    /// Ordered lowercase file extensions associated with the format
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            AudioFormat::Mp3 => &["mp3"],
            AudioFormat::Id3 => &["id3"],
            AudioFormat::Flac => &["flac"],
            AudioFormat::Mp4 => &["mp4"],
            AudioFormat::M4a => &["m4a", "m4b", "m4p", "3g2"],
            AudioFormat::Wave => &["wav", "wave"],
            AudioFormat::Aiff => &["aif", "aiff", "aifc"],
            AudioFormat::Asf => &["asf", "wma"],
            AudioFormat::Apev2 => &["apev2"],
            AudioFormat::Musepack => &["mpc"],
            AudioFormat::Wavpack => &["wv"],
            AudioFormat::Tak => &["tak"],
            AudioFormat::Dsf => &["dsf"],
            AudioFormat::Dsdiff => &["dff", "dsdiff"],
            AudioFormat::Aac => &["aac"],
            AudioFormat::Ac3 => &["ac3"],
            AudioFormat::Eac3 => &["eac3"],
            AudioFormat::Ogg => &["ogg", "oga"],
            AudioFormat::OggVorbis => &["ogg", "oga"],
            AudioFormat::OggOpus => &["opus"],
            AudioFormat::OggSpeex => &["spx"],
            AudioFormat::OggTheora => &["oggtheora", "ogv"],
            AudioFormat::OggFlac => &["oggflac"],
            AudioFormat::TrueAudio => &["tta"],
            AudioFormat::OptimFrog => &["ofr", "ofs"],
            AudioFormat::Smf => &["mid", "smf"],
            AudioFormat::MonkeysAudio => &["ape"],
            AudioFormat::Unknown => &[],
        }
    }

    /// Resolve the first format whose extension list contains `ext`
    pub fn from_extension(ext: &str) -> Option<AudioFormat> {
        let ext = ext.to_lowercase();
        AudioFormat::all()
            .iter()
            .copied()
            .find(|f| f.extensions().contains(&ext.as_str()))
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Core audio parameters
///
/// All fields are independently optional; a parser leaves a field unset
/// when the container does not expose that quantity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioCoreInfo {
    /// Duration in seconds
    pub length: Option<f64>,
    /// Bitrate in bits per second
    pub bitrate: Option<u32>,
    /// Sample rate in Hz
    pub sample_rate: Option<u32>,
    /// Number of audio channels
    pub channels: Option<u32>,
    /// Sample depth in bits
    pub bits_per_sample: Option<u32>,
}

/// Digest of an embedded binary payload (pictures, opaque tag blobs)
///
/// The SHA-256 is always computed; `data` is embedded only when the
/// options allow it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryDigest {
    /// Byte count of the decoded payload
    pub size: u64,
    /// MIME type when the container declares one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    /// Lowercase hex SHA-256 of the payload
    pub sha256: String,
    /// The payload itself, when embedding is enabled and within bounds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
}

/// A decoded tag value
///
/// Text values are always a list to express multi-value tags (Vorbis,
/// ID3v2.4); single-value tags are a one-element list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum TagValue {
    Text(Vec<String>),
    Int(i64),
    Double(f64),
    Bool(bool),
    Binary(BinaryDigest),
}

impl TagValue {
    /// Single-value text convenience constructor
    pub fn text<S: Into<String>>(value: S) -> Self {
        TagValue::Text(vec![value.into()])
    }

    /// Borrow the text values, if this is a text tag
    pub fn as_text(&self) -> Option<&[String]> {
        match self {
            TagValue::Text(values) => Some(values),
            _ => None,
        }
    }

    /// Borrow the binary digest, if this is a binary tag
    pub fn as_binary(&self) -> Option<&BinaryDigest> {
        match self {
            TagValue::Binary(digest) => Some(digest),
            _ => None,
        }
    }
}

/// Mapping from tag key to value, ordered for stable output
pub type TagMap = BTreeMap<String, TagValue>;

/// Bookkeeping about how a parse went
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParserDiagnostics {
    /// Name of the parser that produced the result
    pub parser_name: String,
    /// Bytes fetched from the underlying source over the life of the reader
    pub bytes_read: u64,
    /// Non-fatal problems encountered while parsing
    pub warnings: Vec<String>,
    /// Arbitrary key/value context
    pub context: HashMap<String, String>,
}

/// The result of a parse
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedAudioMetadata {
    /// Detected format
    pub format: AudioFormat,
    /// Core audio parameters
    pub core: AudioCoreInfo,
    /// Decoded tag vocabulary, keys preserved verbatim from the source
    pub tags: TagMap,
    /// Format-specific supplementary fields (bitrate_mode, mpeg_version, ...)
    pub extensions: TagMap,
    /// Parse bookkeeping
    pub diagnostics: ParserDiagnostics,
}

impl ParsedAudioMetadata {
    /// Create an empty result for the given format
    pub fn new(format: AudioFormat) -> Self {
        ParsedAudioMetadata {
            format,
            core: AudioCoreInfo::default(),
            tags: TagMap::new(),
            extensions: TagMap::new(),
            diagnostics: ParserDiagnostics::default(),
        }
    }

    /// Record a non-fatal warning
    pub fn warn<S: Into<String>>(&mut self, message: S) {
        self.diagnostics.warnings.push(message.into());
    }

    /// All embedded pictures, in key order
    ///
    /// Every format parser funnels pictures through [`BinaryDigest`] under
    /// the conventional keys (`APIC`, `PICTURE`, `covr`), so this is a
    /// uniform accessor over all of them.
    pub fn pictures(&self) -> Vec<(&str, &BinaryDigest)> {
        self.tags
            .iter()
            .filter(|(key, _)| {
                key.starts_with("APIC") || key.as_str() == "PICTURE" || key.as_str() == "covr"
            })
            .filter_map(|(key, value)| value.as_binary().map(|d| (key.as_str(), d)))
            .collect()
    }

    /// Convert to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::internal_invariant(format!("JSON serialization failed: {}", e)))
    }

    /// Convert to compact JSON
    pub fn to_json_compact(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::internal_invariant(format!("JSON serialization failed: {}", e)))
    }
}

impl fmt::Display for ParsedAudioMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Format: {}", self.format)?;

        if let Some(length) = self.core.length {
            let minutes = (length / 60.0) as u32;
            let seconds = length % 60.0;
            writeln!(f, "  Duration: {:02}:{:05.2}", minutes, seconds)?;
        }
        if let Some(bitrate) = self.core.bitrate {
            writeln!(f, "  Bitrate: {:.1} kbps", bitrate as f64 / 1000.0)?;
        }
        if let Some(rate) = self.core.sample_rate {
            writeln!(f, "  Sample rate: {} Hz", rate)?;
        }
        if let Some(channels) = self.core.channels {
            writeln!(f, "  Channels: {}", channels)?;
        }
        if let Some(bits) = self.core.bits_per_sample {
            writeln!(f, "  Bits per sample: {}", bits)?;
        }

        for (key, value) in &self.tags {
            match value {
                TagValue::Text(values) => writeln!(f, "  {}: {}", key, values.join(" / "))?,
                TagValue::Int(v) => writeln!(f, "  {}: {}", key, v)?,
                TagValue::Double(v) => writeln!(f, "  {}: {}", key, v)?,
                TagValue::Bool(v) => writeln!(f, "  {}: {}", key, v)?,
                TagValue::Binary(digest) => {
                    writeln!(
                        f,
                        "  {}: <binary {} bytes, sha256 {}...>",
                        key,
                        digest.size,
                        &digest.sha256[..digest.sha256.len().min(12)]
                    )?;
                }
            }
        }

        Ok(())
    }
}
