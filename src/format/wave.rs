//! RIFF/WAVE chunk parsing
//!
//! Little-endian chunk walk from offset 12: `fmt ` carries the audio
//! parameters, the `data` chunk size (not its payload) yields the
//! duration, and embedded `id3 `/`ID3 ` chunks re-parse through an
//! in-memory reader. RIFF `LIST`/`INFO` text tags are picked up keyed by
//! their FOURCC.

use tracing::debug;

use crate::error::{Error, Result};
use crate::format::{extension_matches, merge_tags, FormatParser, ParseContext};
use crate::metadata::{AudioFormat, ParsedAudioMetadata, TagValue};
use crate::reader::WindowedReader;
use crate::tag::{decode_latin1, parse_id3v2};

pub struct WaveParser;

impl FormatParser for WaveParser {
    fn format(&self) -> AudioFormat {
        AudioFormat::Wave
    }

    fn can_parse(&self, header: &[u8], name_hint: Option<&str>) -> bool {
        if header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WAVE" {
            return true;
        }
        extension_matches(name_hint, AudioFormat::Wave)
    }

    fn parse(
        &self,
        reader: &mut WindowedReader,
        ctx: &ParseContext,
    ) -> Result<ParsedAudioMetadata> {
        let header = reader.read_exact(0, 12).map_err(|_| {
            Error::invalid_header("file too short for a RIFF header")
        })?;
        if &header[0..4] != b"RIFF" || &header[8..12] != b"WAVE" {
            return Err(Error::invalid_header("missing RIFF/WAVE magic"));
        }

        let mut metadata = ParsedAudioMetadata::new(AudioFormat::Wave);
        let mut data_size: Option<u64> = None;
        let mut pos = 12u64;

        loop {
            let chunk_header = reader.read(pos, 8)?;
            if chunk_header.is_empty() {
                break; // end of file
            }
            if chunk_header.len() < 8 {
                metadata.warn("trailing bytes too short for a chunk header".to_string());
                break;
            }

            let chunk_id: [u8; 4] = chunk_header[0..4].try_into().expect("4-byte slice");
            let chunk_size = u32::from_le_bytes(
                chunk_header[4..8].try_into().expect("4-byte slice"),
            ) as u64;
            let body_pos = pos + 8;

            match &chunk_id {
                b"fmt " => {
                    let body = reader.read_exact(body_pos, chunk_size.min(16) as usize)?;
                    if body.len() >= 16 {
                        let channels = u16::from_le_bytes([body[2], body[3]]) as u32;
                        let rate = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
                        let bits = u16::from_le_bytes([body[14], body[15]]) as u32;
                        if channels > 0 {
                            metadata.core.channels = Some(channels);
                        }
                        if rate > 0 {
                            metadata.core.sample_rate = Some(rate);
                        }
                        if bits > 0 {
                            metadata.core.bits_per_sample = Some(bits);
                        }
                    } else {
                        metadata.warn("fmt chunk too short".to_string());
                    }
                }
                b"data" => {
                    data_size = Some(chunk_size);
                }
                b"id3 " | b"ID3 " if ctx.options.parse_tags => {
                    let body = reader.read(body_pos, chunk_size as usize)?;
                    let mut sub = WindowedReader::from_slice(&body, &ctx.options);
                    match parse_id3v2(&mut sub, 0, &ctx.options) {
                        Ok(Some(block)) => {
                            metadata.diagnostics.warnings.extend(block.warnings);
                            merge_tags(&mut metadata.tags, block.tags);
                        }
                        Ok(None) => {}
                        Err(err) => metadata.warn(format!("embedded ID3 chunk: {}", err)),
                    }
                }
                b"LIST" if ctx.options.parse_tags => {
                    let body = reader.read(body_pos, chunk_size as usize)?;
                    if body.len() >= 4 && &body[0..4] == b"INFO" {
                        decode_info_list(&body[4..], &mut metadata);
                    }
                }
                _ => {}
            }

            // chunks are word-aligned
            pos = body_pos + chunk_size + (chunk_size & 1);
        }

        derive_length(&mut metadata, data_size);
        debug!(tags = metadata.tags.len(), "parsed WAVE chunks");
        Ok(metadata)
    }
}

/// Duration and bitrate from the data chunk size and the fmt parameters
fn derive_length(metadata: &mut ParsedAudioMetadata, data_size: Option<u64>) {
    let (Some(rate), Some(channels), Some(bits)) = (
        metadata.core.sample_rate,
        metadata.core.channels,
        metadata.core.bits_per_sample,
    ) else {
        return;
    };

    let byte_rate = rate as f64 * channels as f64 * bits as f64 / 8.0;
    if byte_rate > 0.0 {
        if let Some(data_size) = data_size {
            metadata.core.length = Some(data_size as f64 / byte_rate);
        }
        metadata.core.bitrate = Some(rate * channels * bits);
    }
}

/// RIFF INFO sub-chunks: FOURCC key, NUL-padded Latin-1 text value
fn decode_info_list(body: &[u8], metadata: &mut ParsedAudioMetadata) {
    let mut pos = 0usize;
    while pos + 8 <= body.len() {
        let key = decode_latin1(&body[pos..pos + 4]);
        let size = u32::from_le_bytes(
            body[pos + 4..pos + 8].try_into().expect("4-byte slice"),
        ) as usize;
        let Some(value) = body.get(pos + 8..pos + 8 + size) else {
            break;
        };
        let text = decode_latin1(value);
        if !key.is_empty() && !text.is_empty() {
            metadata
                .tags
                .entry(key)
                .or_insert_with(|| TagValue::text(text));
        }
        pos += 8 + size + (size & 1);
    }
}
