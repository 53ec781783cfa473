//! TAK stream recognition
//!
//! The encoded stream details live in a bitstream this library does not
//! decode; recognition is by magic, and tags come from the APEv2 footer.

use crate::error::{Error, Result};
use crate::format::{attempt_apev2, extension_matches, FormatParser, ParseContext};
use crate::metadata::{AudioFormat, ParsedAudioMetadata};
use crate::reader::WindowedReader;

pub struct TakParser;

impl FormatParser for TakParser {
    fn format(&self) -> AudioFormat {
        AudioFormat::Tak
    }

    fn can_parse(&self, header: &[u8], name_hint: Option<&str>) -> bool {
        header.starts_with(b"tBaK") || extension_matches(name_hint, AudioFormat::Tak)
    }

    fn parse(
        &self,
        reader: &mut WindowedReader,
        ctx: &ParseContext,
    ) -> Result<ParsedAudioMetadata> {
        let magic = reader
            .read_exact(0, 4)
            .map_err(|_| Error::invalid_header("file too short for a TAK header"))?;
        if &magic[..] != b"tBaK" {
            return Err(Error::invalid_header("missing tBaK magic"));
        }

        let mut metadata = ParsedAudioMetadata::new(AudioFormat::Tak);
        attempt_apev2(reader, ctx, &mut metadata);
        Ok(metadata)
    }
}
