//! Last-resort parser
//!
//! Registered last and accepts anything. Recovers whatever ID3v2/APEv2
//! tags happen to be present and reports the format as unknown.

use crate::error::Result;
use crate::format::{attempt_apev2, attempt_id3v2, FormatParser, ParseContext};
use crate::metadata::{AudioFormat, ParsedAudioMetadata};
use crate::reader::WindowedReader;

pub struct FallbackParser;

impl FormatParser for FallbackParser {
    fn format(&self) -> AudioFormat {
        AudioFormat::Unknown
    }

    fn can_parse(&self, _header: &[u8], _name_hint: Option<&str>) -> bool {
        true
    }

    fn parse(
        &self,
        reader: &mut WindowedReader,
        ctx: &ParseContext,
    ) -> Result<ParsedAudioMetadata> {
        let mut metadata = ParsedAudioMetadata::new(AudioFormat::Unknown);
        attempt_id3v2(reader, 0, ctx, &mut metadata);
        attempt_apev2(reader, ctx, &mut metadata);
        Ok(metadata)
    }
}
