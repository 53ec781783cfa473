//! Raw AAC stream parsing (ADTS and ADIF framings)
//!
//! ADTS carries a 7-byte header per frame; the first frame yields the
//! sampling-frequency index, channel configuration and frame length, from
//! which an approximate bitrate follows. ADIF has a single leading header
//! with an explicit bitrate field.

use crate::error::{Error, Result};
use crate::format::{extension_matches, FormatParser, ParseContext};
use crate::metadata::{AudioFormat, ParsedAudioMetadata, TagValue};
use crate::reader::WindowedReader;

const ADTS_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

const PROFILES: [&str; 4] = ["Main", "LC", "SSR", "LTP"];

pub struct AacParser;

impl FormatParser for AacParser {
    fn format(&self) -> AudioFormat {
        AudioFormat::Aac
    }

    fn can_parse(&self, header: &[u8], name_hint: Option<&str>) -> bool {
        if header.starts_with(b"ADIF") {
            return true;
        }
        if header.len() >= 2 && header[0] == 0xFF && (header[1] & 0xF6) == 0xF0 {
            return true;
        }
        extension_matches(name_hint, AudioFormat::Aac)
    }

    fn parse(
        &self,
        reader: &mut WindowedReader,
        _ctx: &ParseContext,
    ) -> Result<ParsedAudioMetadata> {
        let header = reader
            .read_exact(0, 8)
            .map_err(|_| Error::invalid_header("file too short for an AAC header"))?;

        let mut metadata = ParsedAudioMetadata::new(AudioFormat::Aac);

        if header.starts_with(b"ADIF") {
            decode_adif(&header, &mut metadata)?;
        } else if header[0] == 0xFF && (header[1] & 0xF6) == 0xF0 {
            decode_adts(&header, &mut metadata)?;
        } else {
            return Err(Error::invalid_header("neither ADTS sync nor ADIF magic"));
        }

        if let (Some(bitrate), Some(file_len)) = (metadata.core.bitrate, reader.len()) {
            if bitrate > 0 {
                metadata.core.length = Some(file_len as f64 * 8.0 / bitrate as f64);
            }
        }

        Ok(metadata)
    }
}

fn decode_adts(header: &[u8], metadata: &mut ParsedAudioMetadata) -> Result<()> {
    let profile = (header[2] >> 6) as usize;
    let rate_index = ((header[2] >> 2) & 0x0F) as usize;
    if rate_index >= ADTS_SAMPLE_RATES.len() {
        return Err(Error::invalid_header("ADTS sampling frequency index out of range"));
    }
    let sample_rate = ADTS_SAMPLE_RATES[rate_index];
    let channel_config = ((header[2] & 0x01) << 2) | (header[3] >> 6);
    let frame_length = (((header[3] & 0x03) as u32) << 11)
        | ((header[4] as u32) << 3)
        | ((header[5] as u32) >> 5);

    metadata.core.sample_rate = Some(sample_rate);
    if channel_config > 0 {
        // config 7 means 7.1
        metadata.core.channels = Some(if channel_config == 7 {
            8
        } else {
            channel_config as u32
        });
    }
    // 1024 samples per frame
    metadata.core.bitrate =
        Some((frame_length as u64 * 8 * sample_rate as u64 / 1024) as u32);
    metadata
        .extensions
        .insert("profile".to_string(), TagValue::text(PROFILES[profile]));
    Ok(())
}

fn decode_adif(header: &[u8], metadata: &mut ParsedAudioMetadata) -> Result<()> {
    // after the magic: copyright_id_present(1) [+72-bit id], original(1),
    // home(1), bitstream_type(1), bitrate(23)
    let mut pos = 32usize;
    let copyright = read_bits(header, &mut pos, 1)
        .ok_or_else(|| Error::truncated_data("ADIF header cut short"))?;
    if copyright != 0 {
        pos += 72;
    }
    pos += 2; // original, home
    let vbr = read_bits(header, &mut pos, 1).unwrap_or(0) != 0;
    let bitrate = read_bits(header, &mut pos, 23).unwrap_or(0);

    metadata.extensions.insert(
        "bitrate_mode".to_string(),
        TagValue::text(if vbr { "VBR" } else { "CBR" }),
    );
    if bitrate > 0 {
        metadata.core.bitrate = Some(bitrate);
    }
    Ok(())
}

fn read_bits(data: &[u8], pos: &mut usize, count: usize) -> Option<u32> {
    let mut value = 0u32;
    for _ in 0..count {
        let byte = *data.get(*pos / 8)?;
        value = (value << 1) | ((byte >> (7 - *pos % 8)) & 1) as u32;
        *pos += 1;
    }
    Some(value)
}
