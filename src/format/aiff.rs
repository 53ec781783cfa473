//! AIFF/AIFC chunk parsing
//!
//! Big-endian sibling of the WAVE walker. `COMM` packs the sample rate as
//! an 80-bit IEEE extended float; `ID3 ` chunks re-parse through an
//! in-memory reader. Chunk sizes are padded to even length.

use crate::error::{Error, Result};
use crate::format::{extension_matches, merge_tags, FormatParser, ParseContext};
use crate::metadata::{AudioFormat, ParsedAudioMetadata};
use crate::reader::WindowedReader;
use crate::tag::parse_id3v2;

pub struct AiffParser;

impl FormatParser for AiffParser {
    fn format(&self) -> AudioFormat {
        AudioFormat::Aiff
    }

    fn can_parse(&self, header: &[u8], name_hint: Option<&str>) -> bool {
        if header.len() >= 12
            && &header[0..4] == b"FORM"
            && (&header[8..12] == b"AIFF" || &header[8..12] == b"AIFC")
        {
            return true;
        }
        extension_matches(name_hint, AudioFormat::Aiff)
    }

    fn parse(
        &self,
        reader: &mut WindowedReader,
        ctx: &ParseContext,
    ) -> Result<ParsedAudioMetadata> {
        let header = reader
            .read_exact(0, 12)
            .map_err(|_| Error::invalid_header("file too short for a FORM header"))?;
        if &header[0..4] != b"FORM" || (&header[8..12] != b"AIFF" && &header[8..12] != b"AIFC") {
            return Err(Error::invalid_header("missing FORM/AIFF magic"));
        }

        let mut metadata = ParsedAudioMetadata::new(AudioFormat::Aiff);
        let mut pos = 12u64;

        loop {
            let chunk_header = reader.read(pos, 8)?;
            if chunk_header.is_empty() {
                break;
            }
            if chunk_header.len() < 8 {
                metadata.warn("trailing bytes too short for a chunk header".to_string());
                break;
            }

            let chunk_id: [u8; 4] = chunk_header[0..4].try_into().expect("4-byte slice");
            let chunk_size = u32::from_be_bytes(
                chunk_header[4..8].try_into().expect("4-byte slice"),
            ) as u64;
            let body_pos = pos + 8;

            match &chunk_id {
                b"COMM" => {
                    let body = reader.read_exact(body_pos, chunk_size.min(18) as usize)?;
                    if body.len() >= 18 {
                        let channels = u16::from_be_bytes([body[0], body[1]]) as u32;
                        let frames = u32::from_be_bytes([body[2], body[3], body[4], body[5]]);
                        let bits = u16::from_be_bytes([body[6], body[7]]) as u32;
                        let rate = decode_extended80(&body[8..18]);

                        if channels > 0 {
                            metadata.core.channels = Some(channels);
                        }
                        if bits > 0 {
                            metadata.core.bits_per_sample = Some(bits);
                        }
                        if rate > 0.0 {
                            metadata.core.sample_rate = Some(rate.round() as u32);
                            metadata.core.length = Some(frames as f64 / rate);
                            metadata.core.bitrate =
                                Some((rate * channels as f64 * bits as f64).round() as u32);
                        }
                    } else {
                        metadata.warn("COMM chunk too short".to_string());
                    }
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

        Ok(metadata)
    }
}

/// Decode an 80-bit IEEE extended float (sign, 15-bit exponent biased
/// 16383, 64-bit mantissa normalized as mantissa / 2^63)
fn decode_extended80(bytes: &[u8]) -> f64 {
    if bytes.len() < 10 {
        return 0.0;
    }
    let sign = if bytes[0] & 0x80 != 0 { -1.0 } else { 1.0 };
    let exponent = (((bytes[0] & 0x7F) as i32) << 8) | bytes[1] as i32;
    let mantissa = u64::from_be_bytes(bytes[2..10].try_into().expect("8-byte slice"));

    if exponent == 0 && mantissa == 0 {
        return 0.0;
    }

    sign * (mantissa as f64 / (1u64 << 63) as f64) * 2f64.powi(exponent - 16383)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ParseOptions;

    /// Encode a positive sample rate the way AIFF COMM stores it
    fn encode_extended80(value: f64) -> [u8; 10] {
        let mut out = [0u8; 10];
        if value <= 0.0 {
            return out;
        }
        let exponent = value.log2().floor() as i32;
        let mantissa = (value / 2f64.powi(exponent) * (1u64 << 63) as f64) as u64;
        let biased = (exponent + 16383) as u16;
        out[0..2].copy_from_slice(&biased.to_be_bytes());
        out[2..10].copy_from_slice(&mantissa.to_be_bytes());
        out
    }

    fn comm_chunk(channels: u16, frames: u32, bits: u16, rate: f64) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&channels.to_be_bytes());
        body.extend_from_slice(&frames.to_be_bytes());
        body.extend_from_slice(&bits.to_be_bytes());
        body.extend_from_slice(&encode_extended80(rate));
        chunk(b"COMM", &body)
    }

    fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(id);
        data.extend_from_slice(&(body.len() as u32).to_be_bytes());
        data.extend_from_slice(body);
        if body.len() % 2 != 0 {
            data.push(0);
        }
        data
    }

    fn aiff_file(chunks: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = chunks.concat();
        let mut data = Vec::new();
        data.extend_from_slice(b"FORM");
        data.extend_from_slice(&((body.len() + 4) as u32).to_be_bytes());
        data.extend_from_slice(b"AIFF");
        data.extend_from_slice(&body);
        data
    }

    fn parse(data: &[u8]) -> Result<ParsedAudioMetadata> {
        let options = ParseOptions::default();
        let mut reader = WindowedReader::from_slice(data, &options);
        AiffParser.parse(&mut reader, &ParseContext::new(options, None))
    }

    #[test]
    fn test_extended80_round_trip() {
        for rate in [8000.0, 22050.0, 44100.0, 48000.0, 96000.0] {
            let encoded = encode_extended80(rate);
            assert!((decode_extended80(&encoded) - rate).abs() < 1e-6, "{}", rate);
        }
        assert_eq!(decode_extended80(&[0u8; 10]), 0.0);
    }

    #[test]
    fn test_comm_core_info() {
        let data = aiff_file(&[comm_chunk(2, 441_000, 16, 44100.0)]);
        let metadata = parse(&data).unwrap();
        assert_eq!(metadata.core.channels, Some(2));
        assert_eq!(metadata.core.bits_per_sample, Some(16));
        assert_eq!(metadata.core.sample_rate, Some(44100));
        assert!((metadata.core.length.unwrap() - 10.0).abs() < 1e-6);
        assert_eq!(metadata.core.bitrate, Some(1_411_200));
    }

    #[test]
    fn test_embedded_id3() {
        let mut frames = Vec::new();
        frames.extend_from_slice(b"TPE1");
        frames.extend_from_slice(&5u32.to_be_bytes());
        frames.extend_from_slice(&[0, 0, 3]);
        frames.extend_from_slice(b"Band");
        let mut id3 = b"ID3\x03\x00\x00".to_vec();
        let size = frames.len() as u32;
        id3.extend_from_slice(&[
            ((size >> 21) & 0x7F) as u8,
            ((size >> 14) & 0x7F) as u8,
            ((size >> 7) & 0x7F) as u8,
            (size & 0x7F) as u8,
        ]);
        id3.extend_from_slice(&frames);

        let data = aiff_file(&[comm_chunk(2, 0, 16, 44100.0), chunk(b"ID3 ", &id3)]);
        let metadata = parse(&data).unwrap();
        assert_eq!(
            metadata.tags.get("TPE1").unwrap().as_text().unwrap()[0],
            "Band"
        );
    }

    #[test]
    fn test_aifc_accepted() {
        let mut data = aiff_file(&[comm_chunk(1, 0, 8, 8000.0)]);
        data[8..12].copy_from_slice(b"AIFC");
        assert!(parse(&data).is_ok());
    }

    #[test]
    fn test_missing_magic() {
        let err = parse(b"FORM\x00\x00\x00\x04WAVE").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidHeader);
    }
}
