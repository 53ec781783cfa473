//! Standalone APEv2 tag files
//!
//! A `.apev2` file is nothing but a tag: a header record at offset zero,
//! items, and usually a footer. There is no audio to describe, so the
//! result carries tags only.

use crate::error::{Error, Result};
use crate::format::{extension_matches, merge_tags, FormatParser, ParseContext};
use crate::metadata::{AudioFormat, ParsedAudioMetadata};
use crate::reader::WindowedReader;
use crate::tag::{parse_apev2_footer, parse_apev2_from_header};

pub struct Apev2Parser;

impl FormatParser for Apev2Parser {
    fn format(&self) -> AudioFormat {
        AudioFormat::Apev2
    }

    fn can_parse(&self, header: &[u8], name_hint: Option<&str>) -> bool {
        header.starts_with(b"APETAGEX") || extension_matches(name_hint, AudioFormat::Apev2)
    }

    fn parse(
        &self,
        reader: &mut WindowedReader,
        ctx: &ParseContext,
    ) -> Result<ParsedAudioMetadata> {
        let mut metadata = ParsedAudioMetadata::new(AudioFormat::Apev2);

        let from_header = parse_apev2_from_header(reader, 0, &ctx.options)?;
        match from_header {
            Some(tag) => {
                metadata.diagnostics.warnings.extend(tag.warnings);
                merge_tags(&mut metadata.tags, tag.tags);
            }
            None => {
                // no leading header record: a footer-only tag still counts
                let Some(tag) = parse_apev2_footer(reader, &ctx.options)? else {
                    return Err(Error::invalid_header("no APEv2 preamble found"));
                };
                metadata.diagnostics.warnings.extend(tag.warnings);
                merge_tags(&mut metadata.tags, tag.tags);
            }
        }

        Ok(metadata)
    }
}
