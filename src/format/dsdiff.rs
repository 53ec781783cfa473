//! DSDIFF (DSD Interchange File Format) parsing
//!
//! Big-endian FORM-style container: `FRM8` wraps a `DSD ` form whose
//! `PROP/SND ` chunk nests the sample rate (`FS  `) and channel list
//! (`CHNL`). The top-level `DSD ` chunk size is the 1-bit sample data
//! itself, which yields the duration. `ID3 ` chunks re-parse as usual.

use crate::error::{Error, Result};
use crate::format::{extension_matches, merge_tags, FormatParser, ParseContext};
use crate::metadata::{AudioFormat, ParsedAudioMetadata};
use crate::reader::WindowedReader;
use crate::tag::parse_id3v2;

pub struct DsdiffParser;

impl FormatParser for DsdiffParser {
    fn format(&self) -> AudioFormat {
        AudioFormat::Dsdiff
    }

    fn can_parse(&self, header: &[u8], name_hint: Option<&str>) -> bool {
        header.starts_with(b"FRM8") || extension_matches(name_hint, AudioFormat::Dsdiff)
    }

    fn parse(
        &self,
        reader: &mut WindowedReader,
        ctx: &ParseContext,
    ) -> Result<ParsedAudioMetadata> {
        let header = reader
            .read_exact(0, 16)
            .map_err(|_| Error::invalid_header("file too short for an FRM8 header"))?;
        if &header[0..4] != b"FRM8" {
            return Err(Error::invalid_header("missing FRM8 magic"));
        }
        if &header[12..16] != b"DSD " {
            return Err(Error::invalid_header("FRM8 form type is not DSD").with_offset(12));
        }

        let mut metadata = ParsedAudioMetadata::new(AudioFormat::Dsdiff);
        metadata.core.bits_per_sample = Some(1);
        let mut dsd_bytes: Option<u64> = None;
        let mut pos = 16u64;

        loop {
            let chunk_header = reader.read(pos, 12)?;
            if chunk_header.is_empty() {
                break;
            }
            if chunk_header.len() < 12 {
                metadata.warn("trailing bytes too short for a chunk header".to_string());
                break;
            }

            let chunk_id: [u8; 4] = chunk_header[0..4].try_into().expect("4-byte slice");
            let chunk_size =
                u64::from_be_bytes(chunk_header[4..12].try_into().expect("8-byte slice"));
            let body_pos = pos + 12;

            match &chunk_id {
                b"PROP" => {
                    let body = reader.read(body_pos, chunk_size as usize)?;
                    if body.len() >= 4 && &body[0..4] == b"SND " {
                        decode_snd_properties(&body[4..], &mut metadata);
                    }
                }
                b"DSD " => {
                    dsd_bytes = Some(chunk_size);
                }
                b"ID3 " if ctx.options.parse_tags => {
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
                _ => {}
            }

            pos = body_pos + chunk_size + (chunk_size & 1);
        }

        if let (Some(bytes), Some(rate), Some(channels)) =
            (dsd_bytes, metadata.core.sample_rate, metadata.core.channels)
        {
            let bit_rate = rate as u64 * channels as u64;
            if bit_rate > 0 {
                metadata.core.length = Some(bytes as f64 * 8.0 / bit_rate as f64);
                metadata.core.bitrate = Some(bit_rate.min(u32::MAX as u64) as u32);
            }
        }

        Ok(metadata)
    }
}

/// Nested chunks of PROP/SND : `FS  ` sample rate, `CHNL` channel count
fn decode_snd_properties(body: &[u8], metadata: &mut ParsedAudioMetadata) {
    let mut pos = 0usize;
    while pos + 12 <= body.len() {
        let id = &body[pos..pos + 4];
        let size =
            u64::from_be_bytes(body[pos + 4..pos + 12].try_into().expect("8-byte slice")) as usize;
        let Some(chunk_body) = body.get(pos + 12..pos + 12 + size) else {
            break;
        };

        match id {
            b"FS  " if chunk_body.len() >= 4 => {
                let rate = u32::from_be_bytes(chunk_body[0..4].try_into().expect("4-byte slice"));
                if rate > 0 {
                    metadata.core.sample_rate = Some(rate);
                }
            }
            b"CHNL" if chunk_body.len() >= 2 => {
                let channels = u16::from_be_bytes([chunk_body[0], chunk_body[1]]);
                if channels > 0 {
                    metadata.core.channels = Some(channels as u32);
                }
            }
            _ => {}
        }

        pos += 12 + size + (size & 1);
    }
}
