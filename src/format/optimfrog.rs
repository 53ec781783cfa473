//! OptimFROG recognition
//!
//! Header check only; the compressed stream layout is not decoded.

use crate::error::{Error, Result};
use crate::format::{extension_matches, FormatParser, ParseContext};
use crate::metadata::{AudioFormat, ParsedAudioMetadata};
use crate::reader::WindowedReader;

pub struct OptimFrogParser;

impl FormatParser for OptimFrogParser {
    fn format(&self) -> AudioFormat {
        AudioFormat::OptimFrog
    }

    fn can_parse(&self, header: &[u8], name_hint: Option<&str>) -> bool {
        header.starts_with(b"OFR ") || extension_matches(name_hint, AudioFormat::OptimFrog)
    }

    fn parse(
        &self,
        reader: &mut WindowedReader,
        _ctx: &ParseContext,
    ) -> Result<ParsedAudioMetadata> {
        let magic = reader
            .read_exact(0, 4)
            .map_err(|_| Error::invalid_header("file too short for an OptimFROG header"))?;
        if &magic[..] != b"OFR " {
            return Err(Error::invalid_header("missing OFR magic"));
        }
        Ok(ParsedAudioMetadata::new(AudioFormat::OptimFrog))
    }
}
