//! FLAC metadata block parsing
//!
//! Walks the metadata block chain after the `fLaC` magic. STREAMINFO is
//! mandatory and fatal when truncated; later blocks are best-effort, and
//! a truncated one flags `flac_metadata_truncated` and stops the walk.

use tracing::debug;

use crate::error::{Error, Result};
use crate::format::{attempt_id3v2, extension_matches, FormatParser, ParseContext};
use crate::metadata::{AudioFormat, ParsedAudioMetadata, TagValue};
use crate::reader::WindowedReader;
use crate::tag::{build_digest, merge_vorbis, parse_vorbis_comments};

const BLOCK_STREAMINFO: u8 = 0;
const BLOCK_VORBIS_COMMENT: u8 = 4;
const BLOCK_PICTURE: u8 = 6;

pub struct FlacParser;

impl FormatParser for FlacParser {
    fn format(&self) -> AudioFormat {
        AudioFormat::Flac
    }

    fn can_parse(&self, header: &[u8], name_hint: Option<&str>) -> bool {
        header.starts_with(b"fLaC")
            || (header.starts_with(b"ID3") && extension_matches(name_hint, AudioFormat::Flac))
    }

    fn parse(
        &self,
        reader: &mut WindowedReader,
        ctx: &ParseContext,
    ) -> Result<ParsedAudioMetadata> {
        let mut metadata = ParsedAudioMetadata::new(AudioFormat::Flac);

        // some taggers prepend an ID3v2 block to FLAC files
        let id3_size = attempt_id3v2(reader, 0, ctx, &mut metadata);

        let magic = reader.read_exact(id3_size, 4)?;
        if &magic[..] != b"fLaC" {
            return Err(Error::invalid_header("missing fLaC magic").with_offset(id3_size));
        }

        let mut pos = id3_size + 4;
        loop {
            let header = match reader.read_exact(pos, 4) {
                Ok(h) => h,
                Err(_) => {
                    mark_truncated(&mut metadata);
                    break;
                }
            };
            let last = header[0] & 0x80 != 0;
            let block_type = header[0] & 0x7F;
            let length =
                ((header[1] as u64) << 16) | ((header[2] as u64) << 8) | header[3] as u64;
            let body_pos = pos + 4;

            match block_type {
                BLOCK_STREAMINFO => {
                    let body = reader.read_exact(body_pos, length.min(34) as usize).map_err(
                        |_| {
                            Error::truncated_data("STREAMINFO block truncated")
                                .with_offset(body_pos)
                        },
                    )?;
                    if body.len() < 18 {
                        return Err(Error::truncated_data("STREAMINFO block truncated")
                            .with_offset(body_pos));
                    }
                    decode_streaminfo(&body, &mut metadata);
                }
                BLOCK_VORBIS_COMMENT if ctx.options.parse_tags => {
                    match reader.read_exact(body_pos, length as usize) {
                        Ok(body) => match parse_vorbis_comments(&body) {
                            Ok(tags) => merge_vorbis(&mut metadata.tags, tags),
                            Err(err) => {
                                metadata.warn(format!("Vorbis comment block: {}", err))
                            }
                        },
                        Err(_) => {
                            mark_truncated(&mut metadata);
                            break;
                        }
                    }
                }
                BLOCK_PICTURE if ctx.options.parse_tags => {
                    match reader.read_exact(body_pos, length as usize) {
                        Ok(body) => decode_picture(&body, ctx, &mut metadata),
                        Err(_) => {
                            mark_truncated(&mut metadata);
                            break;
                        }
                    }
                }
                _ => {
                    // verify the block body actually exists before skipping it
                    if let Some(total) = reader.len() {
                        if body_pos + length > total {
                            mark_truncated(&mut metadata);
                            break;
                        }
                    }
                }
            }

            pos = body_pos + length;
            if last {
                break;
            }
        }

        debug!(tags = metadata.tags.len(), "parsed FLAC metadata");
        Ok(metadata)
    }
}

/// The bit-packed fields of a STREAMINFO block
#[derive(Debug, Clone, Copy)]
pub(crate) struct StreamInfo {
    pub sample_rate: u32,
    pub channels: u32,
    pub bits_per_sample: u32,
    pub total_samples: u64,
}

impl StreamInfo {
    /// Unpack the bit-packed tail of STREAMINFO (bytes 10..18)
    pub(crate) fn unpack(body: &[u8]) -> Option<Self> {
        if body.len() < 18 {
            return None;
        }
        let sample_rate =
            ((body[10] as u32) << 12) | ((body[11] as u32) << 4) | (body[12] as u32 >> 4);
        let channels = ((body[12] >> 1) & 0x07) as u32 + 1;
        let bits_per_sample = ((((body[12] & 0x01) as u32) << 4) | (body[13] as u32 >> 4)) + 1;
        let total_samples = (((body[13] & 0x0F) as u64) << 32)
            | ((body[14] as u64) << 24)
            | ((body[15] as u64) << 16)
            | ((body[16] as u64) << 8)
            | body[17] as u64;
        Some(StreamInfo {
            sample_rate,
            channels,
            bits_per_sample,
            total_samples,
        })
    }
}

fn decode_streaminfo(body: &[u8], metadata: &mut ParsedAudioMetadata) {
    let Some(info) = StreamInfo::unpack(body) else {
        return;
    };
    metadata.core.sample_rate = Some(info.sample_rate);
    metadata.core.channels = Some(info.channels);
    metadata.core.bits_per_sample = Some(info.bits_per_sample);
    if info.sample_rate > 0 && info.total_samples > 0 {
        metadata.core.length = Some(info.total_samples as f64 / info.sample_rate as f64);
    }
    metadata.extensions.insert(
        "total_samples".to_string(),
        TagValue::Int(info.total_samples as i64),
    );
}

/// Decode a PICTURE block into a digest keyed `PICTURE`
fn decode_picture(body: &[u8], ctx: &ParseContext, metadata: &mut ParsedAudioMetadata) {
    let mut pos = 4usize; // picture type
    let Some(mime_len) = read_be32(body, pos) else {
        metadata.warn("PICTURE block too short".to_string());
        return;
    };
    pos += 4;
    let Some(mime) = body.get(pos..pos + mime_len as usize) else {
        metadata.warn("PICTURE mime overruns block".to_string());
        return;
    };
    let mime = String::from_utf8_lossy(mime).into_owned();
    pos += mime_len as usize;

    let Some(desc_len) = read_be32(body, pos) else {
        metadata.warn("PICTURE block too short".to_string());
        return;
    };
    pos += 4 + desc_len as usize;
    pos += 16; // width, height, depth, colors

    let Some(data_len) = read_be32(body, pos) else {
        metadata.warn("PICTURE block too short".to_string());
        return;
    };
    pos += 4;
    let Some(data) = body.get(pos..pos + data_len as usize) else {
        metadata.warn("PICTURE data overruns block".to_string());
        return;
    };

    let mime = if mime.is_empty() { None } else { Some(mime) };
    metadata.tags.insert(
        "PICTURE".to_string(),
        TagValue::Binary(build_digest(data, mime, &ctx.options)),
    );
}

fn read_be32(data: &[u8], pos: usize) -> Option<u32> {
    data.get(pos..pos + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn mark_truncated(metadata: &mut ParsedAudioMetadata) {
    metadata
        .extensions
        .insert("flac_metadata_truncated".to_string(), TagValue::Bool(true));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ParseOptions;

    /// 34-byte STREAMINFO: 44100 Hz, 2 channels, 16 bits, 441000 samples
    fn streaminfo() -> Vec<u8> {
        let mut body = vec![0u8; 34];
        body[0..2].copy_from_slice(&4096u16.to_be_bytes()); // min block
        body[2..4].copy_from_slice(&4096u16.to_be_bytes()); // max block
        let sample_rate: u32 = 44100;
        let channels: u32 = 2;
        let bits: u32 = 16;
        let total: u64 = 441_000;
        body[10] = (sample_rate >> 12) as u8;
        body[11] = (sample_rate >> 4) as u8;
        body[12] = (((sample_rate & 0x0F) as u8) << 4)
            | (((channels - 1) as u8) << 1)
            | (((bits - 1) >> 4) as u8);
        body[13] = ((((bits - 1) & 0x0F) as u8) << 4) | (((total >> 32) & 0x0F) as u8);
        body[14..18].copy_from_slice(&(total as u32).to_be_bytes());
        body
    }

    fn block(block_type: u8, last: bool, body: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.push(block_type | if last { 0x80 } else { 0 });
        let len = body.len() as u32;
        data.push((len >> 16) as u8);
        data.push((len >> 8) as u8);
        data.push(len as u8);
        data.extend_from_slice(body);
        data
    }

    fn vorbis_block(comments: &[&str]) -> Vec<u8> {
        let vendor = b"flac vendor";
        let mut body = Vec::new();
        body.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        body.extend_from_slice(vendor);
        body.extend_from_slice(&(comments.len() as u32).to_le_bytes());
        for comment in comments {
            body.extend_from_slice(&(comment.len() as u32).to_le_bytes());
            body.extend_from_slice(comment.as_bytes());
        }
        body
    }

    fn parse(data: &[u8]) -> Result<ParsedAudioMetadata> {
        let options = ParseOptions::default();
        let mut reader = WindowedReader::from_slice(data, &options);
        FlacParser.parse(&mut reader, &ParseContext::new(options, None))
    }

    #[test]
    fn test_minimal_flac() {
        let mut data = b"fLaC".to_vec();
        data.extend_from_slice(&block(BLOCK_STREAMINFO, true, &streaminfo()));
        let metadata = parse(&data).unwrap();
        assert_eq!(metadata.format, AudioFormat::Flac);
        assert_eq!(metadata.core.sample_rate, Some(44100));
        assert_eq!(metadata.core.channels, Some(2));
        assert_eq!(metadata.core.bits_per_sample, Some(16));
        assert!((metadata.core.length.unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(
            metadata.extensions.get("total_samples"),
            Some(&TagValue::Int(441_000))
        );
    }

    #[test]
    fn test_vorbis_comment_block() {
        let mut data = b"fLaC".to_vec();
        data.extend_from_slice(&block(BLOCK_STREAMINFO, false, &streaminfo()));
        data.extend_from_slice(&block(
            BLOCK_VORBIS_COMMENT,
            true,
            &vorbis_block(&["title=Deep", "artist=Blue"]),
        ));
        let metadata = parse(&data).unwrap();
        assert_eq!(
            metadata.tags.get("TITLE"),
            Some(&TagValue::text("Deep"))
        );
        assert_eq!(
            metadata.tags.get("ARTIST"),
            Some(&TagValue::text("Blue"))
        );
    }

    #[test]
    fn test_picture_block_digest() {
        let picture_data = b"\x89PNG\r\n\x1a\nxxxx";
        let mime = b"image/png";
        let mut body = Vec::new();
        body.extend_from_slice(&3u32.to_be_bytes()); // front cover
        body.extend_from_slice(&(mime.len() as u32).to_be_bytes());
        body.extend_from_slice(mime);
        body.extend_from_slice(&0u32.to_be_bytes()); // description
        body.extend_from_slice(&[0u8; 16]); // dimensions
        body.extend_from_slice(&(picture_data.len() as u32).to_be_bytes());
        body.extend_from_slice(picture_data);

        let mut data = b"fLaC".to_vec();
        data.extend_from_slice(&block(BLOCK_STREAMINFO, false, &streaminfo()));
        data.extend_from_slice(&block(BLOCK_PICTURE, true, &body));

        let metadata = parse(&data).unwrap();
        let digest = metadata.tags.get("PICTURE").unwrap().as_binary().unwrap();
        assert_eq!(digest.size, picture_data.len() as u64);
        assert_eq!(digest.mime.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_truncated_streaminfo_is_fatal() {
        let mut data = b"fLaC".to_vec();
        data.extend_from_slice(&block(BLOCK_STREAMINFO, true, &streaminfo()[..12]));
        // the declared length is larger than the surviving body
        data[7] = 34;
        data.truncate(4 + 4 + 12);
        let err = parse(&data).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::TruncatedData);
    }

    #[test]
    fn test_truncated_tag_block_flags_extension() {
        let mut data = b"fLaC".to_vec();
        data.extend_from_slice(&block(BLOCK_STREAMINFO, false, &streaminfo()));
        let comment = vorbis_block(&["title=Cut"]);
        let mut tag_block = block(BLOCK_VORBIS_COMMENT, true, &comment);
        tag_block.truncate(tag_block.len() - 6);
        data.extend_from_slice(&tag_block);

        let metadata = parse(&data).unwrap();
        assert_eq!(
            metadata.extensions.get("flac_metadata_truncated"),
            Some(&TagValue::Bool(true))
        );
        // core info from STREAMINFO survives
        assert_eq!(metadata.core.sample_rate, Some(44100));
    }

    #[test]
    fn test_missing_magic() {
        let err = parse(b"NOPE....").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidHeader);
    }
}
