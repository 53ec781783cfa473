//! Monkey's Audio (APE) header parsing
//!
//! From version 3.98 the file leads with a descriptor whose length field
//! locates the real header; older files pack everything into one fixed
//! legacy layout.

use crate::error::{Error, Result};
use crate::format::{attempt_apev2, extension_matches, FormatParser, ParseContext};
use crate::metadata::{AudioFormat, ParsedAudioMetadata, TagValue};
use crate::reader::WindowedReader;

/// First version using the descriptor/header layout
const MODERN_VERSION: u16 = 3980;

pub struct MonkeysAudioParser;

impl FormatParser for MonkeysAudioParser {
    fn format(&self) -> AudioFormat {
        AudioFormat::MonkeysAudio
    }

    fn can_parse(&self, header: &[u8], name_hint: Option<&str>) -> bool {
        header.starts_with(b"MAC ") || extension_matches(name_hint, AudioFormat::MonkeysAudio)
    }

    fn parse(
        &self,
        reader: &mut WindowedReader,
        ctx: &ParseContext,
    ) -> Result<ParsedAudioMetadata> {
        let header = reader
            .read_exact(0, 32)
            .map_err(|_| Error::invalid_header("file too short for a MAC header"))?;
        if &header[0..4] != b"MAC " {
            return Err(Error::invalid_header("missing MAC magic"));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        let mut metadata = ParsedAudioMetadata::new(AudioFormat::MonkeysAudio);
        metadata.extensions.insert(
            "version".to_string(),
            TagValue::Double(version as f64 / 1000.0),
        );

        if version >= MODERN_VERSION {
            decode_modern(reader, &mut metadata)?;
        } else {
            decode_legacy(reader, version, &mut metadata)?;
        }

        attempt_apev2(reader, ctx, &mut metadata);
        Ok(metadata)
    }
}

fn decode_modern(reader: &mut WindowedReader, metadata: &mut ParsedAudioMetadata) -> Result<()> {
    let descriptor_bytes = reader.read_u32_le(8)? as u64;
    if descriptor_bytes < 16 {
        return Err(Error::inconsistent_container(format!(
            "descriptor length {} too small",
            descriptor_bytes
        )));
    }

    let h = descriptor_bytes;
    let blocks_per_frame = reader.read_u32_le(h + 4)? as u64;
    let final_frame_blocks = reader.read_u32_le(h + 8)? as u64;
    let total_frames = reader.read_u32_le(h + 12)? as u64;
    let bits = reader.read_u16_le(h + 16)? as u32;
    let channels = reader.read_u16_le(h + 18)? as u32;
    let sample_rate = reader.read_u32_le(h + 20)?;

    fill_core(
        metadata,
        sample_rate,
        channels,
        bits,
        total_frames,
        blocks_per_frame,
        final_frame_blocks,
    );
    Ok(())
}

fn decode_legacy(
    reader: &mut WindowedReader,
    version: u16,
    metadata: &mut ParsedAudioMetadata,
) -> Result<()> {
    let header = reader.read_exact(0, 32)?;
    let channels = u16::from_le_bytes([header[10], header[11]]) as u32;
    let sample_rate = u32::from_le_bytes([header[12], header[13], header[14], header[15]]);
    let total_frames = u32::from_le_bytes([header[24], header[25], header[26], header[27]]) as u64;
    let final_frame_blocks =
        u32::from_le_bytes([header[28], header[29], header[30], header[31]]) as u64;

    let blocks_per_frame = if version >= 3950 { 73728 } else { 9216 };

    fill_core(
        metadata,
        sample_rate,
        channels,
        16,
        total_frames,
        blocks_per_frame,
        final_frame_blocks,
    );
    Ok(())
}

fn fill_core(
    metadata: &mut ParsedAudioMetadata,
    sample_rate: u32,
    channels: u32,
    bits: u32,
    total_frames: u64,
    blocks_per_frame: u64,
    final_frame_blocks: u64,
) {
    if channels > 0 {
        metadata.core.channels = Some(channels);
    }
    if bits > 0 {
        metadata.core.bits_per_sample = Some(bits);
    }
    if sample_rate > 0 {
        metadata.core.sample_rate = Some(sample_rate);
        if total_frames > 0 {
            let total_blocks = (total_frames - 1) * blocks_per_frame + final_frame_blocks;
            metadata.core.length = Some(total_blocks as f64 / sample_rate as f64);
        }
    }
}
