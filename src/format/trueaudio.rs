//! TrueAudio (TTA) header parsing
//!
//! The `TTA1` header may sit behind a leading ID3v2 block; every audio
//! parameter is a fixed-offset little-endian field.

use crate::error::{Error, Result};
use crate::format::{attempt_id3v2, extension_matches, FormatParser, ParseContext};
use crate::metadata::{AudioFormat, ParsedAudioMetadata};
use crate::reader::WindowedReader;

pub struct TrueAudioParser;

impl FormatParser for TrueAudioParser {
    fn format(&self) -> AudioFormat {
        AudioFormat::TrueAudio
    }

    fn can_parse(&self, header: &[u8], name_hint: Option<&str>) -> bool {
        if header.starts_with(b"TTA1") {
            return true;
        }
        if header.starts_with(b"ID3") && extension_matches(name_hint, AudioFormat::TrueAudio) {
            return true;
        }
        extension_matches(name_hint, AudioFormat::TrueAudio)
    }

    fn parse(
        &self,
        reader: &mut WindowedReader,
        ctx: &ParseContext,
    ) -> Result<ParsedAudioMetadata> {
        let mut metadata = ParsedAudioMetadata::new(AudioFormat::TrueAudio);
        let offset = attempt_id3v2(reader, 0, ctx, &mut metadata);

        let header = reader
            .read_exact(offset, 18)
            .map_err(|_| Error::invalid_header("file too short for a TTA1 header"))?;
        if &header[0..4] != b"TTA1" {
            return Err(Error::invalid_header("missing TTA1 magic").with_offset(offset));
        }

        let channels = u16::from_le_bytes([header[6], header[7]]) as u32;
        let bits = u16::from_le_bytes([header[8], header[9]]) as u32;
        let sample_rate = u32::from_le_bytes([header[10], header[11], header[12], header[13]]);
        let samples = u32::from_le_bytes([header[14], header[15], header[16], header[17]]);

        if channels > 0 {
            metadata.core.channels = Some(channels);
        }
        if bits > 0 {
            metadata.core.bits_per_sample = Some(bits);
        }
        if sample_rate > 0 {
            metadata.core.sample_rate = Some(sample_rate);
            metadata.core.length = Some(samples as f64 / sample_rate as f64);
        }

        Ok(metadata)
    }
}
