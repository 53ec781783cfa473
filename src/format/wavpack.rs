//! WavPack block header parsing

use crate::error::{Error, Result};
use crate::format::{attempt_apev2, extension_matches, FormatParser, ParseContext};
use crate::metadata::{AudioFormat, ParsedAudioMetadata, TagValue};
use crate::reader::WindowedReader;

/// Sample rates indexed by bits 23..26 of the block flags; 15 is custom
const SAMPLE_RATES: [u32; 15] = [
    6000, 8000, 9600, 11025, 12000, 16000, 22050, 24000, 32000, 44100, 48000, 64000, 88200,
    96000, 192000,
];

const FLAG_MONO: u32 = 0x4;

pub struct WavpackParser;

impl FormatParser for WavpackParser {
    fn format(&self) -> AudioFormat {
        AudioFormat::Wavpack
    }

    fn can_parse(&self, header: &[u8], name_hint: Option<&str>) -> bool {
        header.starts_with(b"wvpk") || extension_matches(name_hint, AudioFormat::Wavpack)
    }

    fn parse(
        &self,
        reader: &mut WindowedReader,
        ctx: &ParseContext,
    ) -> Result<ParsedAudioMetadata> {
        let header = reader
            .read_exact(0, 32)
            .map_err(|_| Error::invalid_header("file too short for a WavPack block"))?;
        if &header[0..4] != b"wvpk" {
            return Err(Error::invalid_header("missing wvpk magic"));
        }

        let version = u16::from_le_bytes([header[8], header[9]]);
        let total_samples = u32::from_le_bytes([header[12], header[13], header[14], header[15]]);
        let flags = u32::from_le_bytes([header[24], header[25], header[26], header[27]]);

        let mut metadata = ParsedAudioMetadata::new(AudioFormat::Wavpack);
        metadata
            .extensions
            .insert("version".to_string(), TagValue::Int(version as i64));

        let rate_index = ((flags >> 23) & 0x0F) as usize;
        let sample_rate = SAMPLE_RATES.get(rate_index).copied();
        let channels = if flags & FLAG_MONO != 0 { 1 } else { 2 };
        let bits = (flags & 0x3) * 8 + 8;

        metadata.core.channels = Some(channels);
        metadata.core.bits_per_sample = Some(bits);
        if let Some(rate) = sample_rate {
            metadata.core.sample_rate = Some(rate);
            // all-ones means the sample count is unknown
            if total_samples != u32::MAX && rate > 0 {
                metadata.core.length = Some(total_samples as f64 / rate as f64);
            }
        }

        attempt_apev2(reader, ctx, &mut metadata);
        Ok(metadata)
    }
}
