//! Musepack stream parsing (SV7 and SV8)
//!
//! SV7 files start with `MP+` and a fixed 32-byte header. SV8 files start
//! with `MPCK` and a sequence of keyed packets; the `SH` stream header
//! carries varint-encoded sample counts.

use crate::error::{Error, Result};
use crate::format::{attempt_apev2, extension_matches, FormatParser, ParseContext};
use crate::metadata::{AudioFormat, ParsedAudioMetadata, TagValue};
use crate::reader::WindowedReader;

const SAMPLE_RATES: [u32; 4] = [44100, 48000, 37800, 32000];

/// Samples per SV7 frame
const SV7_FRAME_SAMPLES: u64 = 1152;

/// Bound on SV8 packets scanned for the stream header
const MAX_PACKETS: usize = 64;

pub struct MusepackParser;

impl FormatParser for MusepackParser {
    fn format(&self) -> AudioFormat {
        AudioFormat::Musepack
    }

    fn can_parse(&self, header: &[u8], name_hint: Option<&str>) -> bool {
        header.starts_with(b"MPCK")
            || header.starts_with(b"MP+")
            || extension_matches(name_hint, AudioFormat::Musepack)
    }

    fn parse(
        &self,
        reader: &mut WindowedReader,
        ctx: &ParseContext,
    ) -> Result<ParsedAudioMetadata> {
        let magic = reader
            .read_exact(0, 4)
            .map_err(|_| Error::invalid_header("file too short for a Musepack header"))?;

        let mut metadata = ParsedAudioMetadata::new(AudioFormat::Musepack);

        if &magic[..] == b"MPCK" {
            decode_sv8(reader, &mut metadata)?;
        } else if &magic[0..3] == b"MP+" {
            decode_sv7(reader, &mut metadata)?;
        } else {
            return Err(Error::invalid_header("missing MP+/MPCK magic"));
        }

        attempt_apev2(reader, ctx, &mut metadata);
        Ok(metadata)
    }
}

fn decode_sv7(reader: &mut WindowedReader, metadata: &mut ParsedAudioMetadata) -> Result<()> {
    let header = reader.read_exact(0, 24)?;
    let stream_version = header[3] & 0x0F;
    let frames = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as u64;
    let flags = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);

    let sample_rate = SAMPLE_RATES[((flags >> 16) & 0x03) as usize];
    metadata.core.sample_rate = Some(sample_rate);
    metadata.core.channels = Some(2);
    if sample_rate > 0 {
        metadata.core.length = Some(frames as f64 * SV7_FRAME_SAMPLES as f64 / sample_rate as f64);
    }
    metadata.extensions.insert(
        "stream_version".to_string(),
        TagValue::Int(stream_version as i64),
    );
    Ok(())
}

fn decode_sv8(reader: &mut WindowedReader, metadata: &mut ParsedAudioMetadata) -> Result<()> {
    let mut pos = 4u64;

    for _ in 0..MAX_PACKETS {
        let key = reader.read(pos, 2)?;
        if key.len() < 2 {
            break;
        }

        // packet size varint covers key and size bytes too
        let mut cursor = pos + 2;
        let Some(packet_size) = read_varint(reader, &mut cursor)? else {
            break;
        };
        let packet_end = pos + packet_size;

        if &key[..] == b"SH" {
            decode_sv8_stream_header(reader, cursor, metadata)?;
            return Ok(());
        }
        if &key[..] == b"AP" {
            break; // audio packets follow the header block
        }
        if packet_end <= pos {
            break;
        }
        pos = packet_end;
    }

    metadata.warn("no SV8 stream header packet found".to_string());
    Ok(())
}

fn decode_sv8_stream_header(
    reader: &mut WindowedReader,
    start: u64,
    metadata: &mut ParsedAudioMetadata,
) -> Result<()> {
    // CRC, then the stream version byte
    let stream_version = reader.read_u8(start + 4)?;
    let mut cursor = start + 5;
    let samples = read_varint(reader, &mut cursor)?.unwrap_or(0);
    let silence = read_varint(reader, &mut cursor)?.unwrap_or(0);

    let packed = reader.read_u8(cursor)?;
    let sample_rate = SAMPLE_RATES[((packed >> 5) & 0x03) as usize];
    let channels = (reader.read_u8(cursor + 1)? >> 4) + 1;

    metadata.core.sample_rate = Some(sample_rate);
    metadata.core.channels = Some(channels as u32);
    if sample_rate > 0 && samples >= silence {
        metadata.core.length = Some((samples - silence) as f64 / sample_rate as f64);
    }
    metadata.extensions.insert(
        "stream_version".to_string(),
        TagValue::Int(stream_version as i64),
    );
    Ok(())
}

/// SV8 varint: 7 bits per byte, high bit set on continuation bytes
fn read_varint(reader: &mut WindowedReader, cursor: &mut u64) -> Result<Option<u64>> {
    let mut value = 0u64;
    for _ in 0..9 {
        let byte = match reader.read_u8(*cursor) {
            Ok(b) => b,
            Err(_) => return Ok(None),
        };
        *cursor += 1;
        value = (value << 7) | (byte & 0x7F) as u64;
        if byte & 0x80 == 0 {
            return Ok(Some(value));
        }
    }
    Ok(None)
}
