//! Container format parsers
//!
//! One parser per container. Every parser exposes the same capability
//! surface: its [`AudioFormat`], a constant-time [`can_parse`] check over
//! the probe prefix, and [`parse`] over the windowed reader. Parsers are
//! held as a fixed-order collection by the registry; there is no dynamic
//! discovery.
//!
//! [`can_parse`]: FormatParser::can_parse
//! [`parse`]: FormatParser::parse

pub mod aac;
pub mod ac3;
pub mod aiff;
pub mod apev2;
pub mod asf;
pub mod dsdiff;
pub mod dsf;
pub mod fallback;
pub mod flac;
pub mod monkeys;
pub mod mp3;
pub mod mp4;
pub mod musepack;
pub mod ogg;
pub mod optimfrog;
pub mod smf;
pub mod tak;
pub mod trueaudio;
pub mod wave;
pub mod wavpack;

use crate::error::Result;
use crate::metadata::{AudioFormat, ParsedAudioMetadata, TagMap};
use crate::options::ParseOptions;
use crate::reader::WindowedReader;
use crate::tag;

/// Context handed to every parse call
#[derive(Debug, Clone)]
pub struct ParseContext {
    /// Options for this engine
    pub options: ParseOptions,
    /// Filename hint from the source, when one exists
    pub name_hint: Option<String>,
}

impl ParseContext {
    pub fn new(options: ParseOptions, name_hint: Option<String>) -> Self {
        ParseContext { options, name_hint }
    }

    /// Lowercased filename extension from the hint
    pub fn extension(&self) -> Option<String> {
        let name = self.name_hint.as_deref()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        Some(ext.to_lowercase())
    }
}

/// A container format parser
pub trait FormatParser: Send + Sync {
    /// The format this parser yields
    fn format(&self) -> AudioFormat;

    /// Constant-time acceptance check over the header prefix
    fn can_parse(&self, header: &[u8], name_hint: Option<&str>) -> bool;

    /// Parse the source into normalized metadata
    fn parse(&self, reader: &mut WindowedReader, ctx: &ParseContext)
        -> Result<ParsedAudioMetadata>;
}

/// All parsers in registration order; the fallback is last
pub fn default_parsers() -> Vec<Box<dyn FormatParser>> {
    vec![
        Box::new(mp3::Mp3Parser),
        Box::new(flac::FlacParser),
        Box::new(ogg::OggParser),
        Box::new(mp4::Mp4Parser),
        Box::new(wave::WaveParser),
        Box::new(aiff::AiffParser),
        Box::new(asf::AsfParser),
        Box::new(ac3::Ac3Parser),
        Box::new(aac::AacParser),
        Box::new(wavpack::WavpackParser),
        Box::new(musepack::MusepackParser),
        Box::new(tak::TakParser),
        Box::new(dsf::DsfParser),
        Box::new(dsdiff::DsdiffParser),
        Box::new(trueaudio::TrueAudioParser),
        Box::new(optimfrog::OptimFrogParser),
        Box::new(smf::SmfParser),
        Box::new(monkeys::MonkeysAudioParser),
        Box::new(apev2::Apev2Parser),
        Box::new(fallback::FallbackParser),
    ]
}

/// Whether the filename hint carries one of the format's extensions
pub(crate) fn extension_matches(name_hint: Option<&str>, format: AudioFormat) -> bool {
    let Some(name) = name_hint else {
        return false;
    };
    let Some((_, ext)) = name.rsplit_once('.') else {
        return false;
    };
    let ext = ext.to_lowercase();
    format.extensions().contains(&ext.as_str())
}

/// Attempt an ID3v2 block at `offset`, merging tags into `metadata`
///
/// Returns the total tag size so the caller can skip past it, or zero
/// when no block is present. Tag keys already present are kept.
pub(crate) fn attempt_id3v2(
    reader: &mut WindowedReader,
    offset: u64,
    ctx: &ParseContext,
    metadata: &mut ParsedAudioMetadata,
) -> u64 {
    match tag::parse_id3v2(reader, offset, &ctx.options) {
        Ok(Some(block)) => {
            metadata.diagnostics.warnings.extend(block.warnings);
            merge_tags(&mut metadata.tags, block.tags);
            block.total_size
        }
        Ok(None) => 0,
        Err(err) => {
            metadata.warn(format!("ID3v2 parse failed: {}", err));
            0
        }
    }
}

/// Attempt an APEv2 footer, merging tags into `metadata`
///
/// A missing tag is silent; a malformed one becomes a warning. The
/// embedded-header stop sentinel is recorded under strict mode, since
/// APE headers are supposed to live at the start and footers at the end.
pub(crate) fn attempt_apev2(
    reader: &mut WindowedReader,
    ctx: &ParseContext,
    metadata: &mut ParsedAudioMetadata,
) {
    match tag::parse_apev2_footer(reader, &ctx.options) {
        Ok(Some(tag)) => {
            metadata.diagnostics.warnings.extend(tag.warnings);
            if tag.embedded_header && ctx.options.strict_mode {
                metadata
                    .diagnostics
                    .context
                    .insert("apev2_embedded_header".to_string(), "true".to_string());
            }
            merge_tags(&mut metadata.tags, tag.tags);
        }
        Ok(None) => {}
        Err(err) => metadata.warn(format!("APEv2 parse failed: {}", err)),
    }
}

/// Merge `incoming` into `tags`, keeping existing keys
pub(crate) fn merge_tags(tags: &mut TagMap, incoming: TagMap) {
    for (key, value) in incoming {
        tags.entry(key).or_insert(value);
    }
}
