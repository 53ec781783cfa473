//! DSF (DSD stream file) parsing
//!
//! Fixed little-endian layout: the `DSD ` chunk carries a pointer to a
//! trailing metadata region holding an ID3v2 block, and the `fmt ` chunk
//! carries every audio parameter directly.

use crate::error::{Error, Result};
use crate::format::{extension_matches, merge_tags, FormatParser, ParseContext};
use crate::metadata::{AudioFormat, ParsedAudioMetadata};
use crate::reader::WindowedReader;
use crate::tag::parse_id3v2;

pub struct DsfParser;

impl FormatParser for DsfParser {
    fn format(&self) -> AudioFormat {
        AudioFormat::Dsf
    }

    fn can_parse(&self, header: &[u8], name_hint: Option<&str>) -> bool {
        header.starts_with(b"DSD ") || extension_matches(name_hint, AudioFormat::Dsf)
    }

    fn parse(
        &self,
        reader: &mut WindowedReader,
        ctx: &ParseContext,
    ) -> Result<ParsedAudioMetadata> {
        let magic = reader
            .read_exact(0, 4)
            .map_err(|_| Error::invalid_header("file too short for a DSD chunk"))?;
        if &magic[..] != b"DSD " {
            return Err(Error::invalid_header("missing DSD magic"));
        }

        let mut metadata = ParsedAudioMetadata::new(AudioFormat::Dsf);
        let metadata_pointer = reader.read_u64_le(20)?;

        let fmt_magic = reader.read_exact(28, 4)?;
        if &fmt_magic[..] != b"fmt " {
            return Err(Error::invalid_header("missing fmt chunk").with_offset(28));
        }

        let channel_num = reader.read_u32_le(52)?;
        let sampling_frequency = reader.read_u32_le(56)?;
        let bits_per_sample = reader.read_u32_le(60)?;
        let sample_count = reader.read_u64_le(64)?;

        if channel_num > 0 {
            metadata.core.channels = Some(channel_num);
        }
        if sampling_frequency > 0 {
            metadata.core.sample_rate = Some(sampling_frequency);
            metadata.core.length = Some(sample_count as f64 / sampling_frequency as f64);
            metadata.core.bitrate =
                Some((sampling_frequency as u64 * bits_per_sample as u64 * channel_num as u64)
                    .min(u32::MAX as u64) as u32);
        }
        if bits_per_sample > 0 {
            metadata.core.bits_per_sample = Some(bits_per_sample);
        }

        // the metadata pointer leads to a trailing ID3v2 block; re-parse
        // it through a synthetic reader over that region
        if metadata_pointer != 0 && ctx.options.parse_tags {
            if let Some(file_len) = reader.len() {
                if metadata_pointer < file_len {
                    let region =
                        reader.read(metadata_pointer, (file_len - metadata_pointer) as usize)?;
                    let mut sub = WindowedReader::from_slice(&region, &ctx.options);
                    match parse_id3v2(&mut sub, 0, &ctx.options) {
                        Ok(Some(block)) => {
                            metadata.diagnostics.warnings.extend(block.warnings);
                            merge_tags(&mut metadata.tags, block.tags);
                        }
                        Ok(None) => metadata.warn("metadata pointer leads nowhere".to_string()),
                        Err(err) => metadata.warn(format!("trailing ID3 block: {}", err)),
                    }
                }
            }
        }

        Ok(metadata)
    }
}
