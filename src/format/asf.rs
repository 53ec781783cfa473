//! ASF (WMA) object parsing
//!
//! GUID-framed object walk. Only three objects matter for metadata: file
//! properties (duration, overall bitrate), audio stream properties
//! (format parameters), and the content description (UTF-16LE strings).
//! The walk is bounded so a corrupt size field cannot loop forever.

use crate::error::{Error, Result};
use crate::format::{extension_matches, FormatParser, ParseContext};
use crate::metadata::{AudioFormat, ParsedAudioMetadata, TagValue};
use crate::reader::WindowedReader;
use crate::tag::decode_utf16_le;

const HEADER_OBJECT: [u8; 16] = [
    0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11, 0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE,
    0x6C,
];
const FILE_PROPERTIES: [u8; 16] = [
    0xA1, 0xDC, 0xAB, 0x8C, 0x47, 0xA9, 0xCF, 0x11, 0x8E, 0xE4, 0x00, 0xC0, 0x0C, 0x20, 0x53,
    0x65,
];
const STREAM_PROPERTIES: [u8; 16] = [
    0x91, 0x07, 0xDC, 0xB7, 0xB7, 0xA9, 0xCF, 0x11, 0x8E, 0xE6, 0x00, 0xC0, 0x0C, 0x20, 0x53,
    0x65,
];
const AUDIO_MEDIA: [u8; 16] = [
    0x40, 0x9E, 0x69, 0xF8, 0x4D, 0x5B, 0xCF, 0x11, 0xA8, 0xFD, 0x00, 0x80, 0x5F, 0x5C, 0x44,
    0x2B,
];
const CONTENT_DESCRIPTION: [u8; 16] = [
    0x33, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11, 0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE,
    0x6C,
];

/// Upper bound on header sub-objects walked
const MAX_OBJECTS: usize = 1024;

/// Offset of the type-specific data inside a stream properties payload
const FORMAT_OFFSET: u64 = 54;

pub struct AsfParser;

impl FormatParser for AsfParser {
    fn format(&self) -> AudioFormat {
        AudioFormat::Asf
    }

    fn can_parse(&self, header: &[u8], name_hint: Option<&str>) -> bool {
        if header.len() >= 16 && header[0..16] == HEADER_OBJECT {
            return true;
        }
        extension_matches(name_hint, AudioFormat::Asf)
    }

    fn parse(
        &self,
        reader: &mut WindowedReader,
        ctx: &ParseContext,
    ) -> Result<ParsedAudioMetadata> {
        let guid = reader
            .read_exact(0, 16)
            .map_err(|_| Error::invalid_header("file too short for an ASF header"))?;
        if guid != HEADER_OBJECT {
            return Err(Error::invalid_header("missing ASF header GUID"));
        }

        let header_size = reader.read_u64_le(16)?;
        let header_end = header_size.max(30);

        let mut metadata = ParsedAudioMetadata::new(AudioFormat::Asf);
        // 16-byte GUID + 8-byte size + object count + 2 reserved bytes
        let mut pos = 30u64;

        for _ in 0..MAX_OBJECTS {
            if pos + 24 > header_end {
                break;
            }
            let object_guid = match reader.read_exact(pos, 16) {
                Ok(g) => g,
                Err(_) => break,
            };
            let object_size = reader.read_u64_le(pos + 16)?;
            if object_size < 24 || pos.checked_add(object_size).is_none_or(|end| end > header_end) {
                metadata.warn("ASF object size out of bounds".to_string());
                break;
            }
            let payload = pos + 24;

            if object_guid == FILE_PROPERTIES {
                decode_file_properties(reader, payload, &mut metadata)?;
            } else if object_guid == STREAM_PROPERTIES {
                decode_stream_properties(reader, payload, &mut metadata)?;
            } else if object_guid == CONTENT_DESCRIPTION && ctx.options.parse_tags {
                decode_content_description(reader, payload, object_size - 24, &mut metadata)?;
            }

            pos += object_size;
        }

        Ok(metadata)
    }
}

fn decode_file_properties(
    reader: &mut WindowedReader,
    payload: u64,
    metadata: &mut ParsedAudioMetadata,
) -> Result<()> {
    // play duration in 100 ns units includes the preroll (milliseconds)
    let play_duration = reader.read_u64_le(payload + 40)?;
    let preroll_ms = reader.read_u64_le(payload + 56)?;
    let bitrate = reader.read_u32_le(payload + 76)?;

    let net = play_duration.saturating_sub(preroll_ms.saturating_mul(10_000));
    if net > 0 {
        metadata.core.length = Some(net as f64 / 10_000_000.0);
    }
    if bitrate > 0 && metadata.core.bitrate.is_none() {
        metadata.core.bitrate = Some(bitrate);
    }
    Ok(())
}

fn decode_stream_properties(
    reader: &mut WindowedReader,
    payload: u64,
    metadata: &mut ParsedAudioMetadata,
) -> Result<()> {
    let stream_type = reader.read_exact(payload, 16)?;
    if stream_type != AUDIO_MEDIA {
        return Ok(());
    }

    let fmt = payload + FORMAT_OFFSET;
    let channels = reader.read_u16_le(fmt + 2)?;
    let sample_rate = reader.read_u32_le(fmt + 4)?;
    let bytes_per_sec = reader.read_u32_le(fmt + 8)?;
    let bits = reader.read_u16_le(fmt + 14)?;

    if channels > 0 {
        metadata.core.channels = Some(channels as u32);
    }
    if sample_rate > 0 {
        metadata.core.sample_rate = Some(sample_rate);
    }
    if bits > 0 {
        metadata.core.bits_per_sample = Some(bits as u32);
    }
    if bytes_per_sec > 0 {
        metadata.core.bitrate = Some(bytes_per_sec * 8);
    }
    Ok(())
}

fn decode_content_description(
    reader: &mut WindowedReader,
    payload: u64,
    size: u64,
    metadata: &mut ParsedAudioMetadata,
) -> Result<()> {
    let body = reader.read_exact(payload, size as usize)?;
    if body.len() < 10 {
        return Ok(());
    }

    let lengths: Vec<usize> = (0..5)
        .map(|i| u16::from_le_bytes([body[i * 2], body[i * 2 + 1]]) as usize)
        .collect();

    // title, author, copyright, description, rating in declaration order
    let keys = [Some("Title"), Some("Author"), None, Some("Description"), None];
    let mut pos = 10usize;
    for (length, key) in lengths.into_iter().zip(keys) {
        let Some(raw) = body.get(pos..pos + length) else {
            break;
        };
        pos += length;
        let Some(key) = key else {
            continue;
        };
        let text = decode_utf16_le(raw);
        if !text.is_empty() {
            metadata
                .tags
                .insert(key.to_string(), TagValue::text(text));
        }
    }
    Ok(())
}
