//! MPEG audio (MP3) parsing
//!
//! Locates the first MPEG frame header after any leading ID3v2 block,
//! decodes the version/layer/bitrate/sample-rate fields, and looks for a
//! Xing/Info or VBRI header to recover an accurate duration for VBR
//! streams. APEv2 footers are picked up from the tail.

use crate::error::{Error, Result};
use crate::format::{attempt_apev2, attempt_id3v2, extension_matches, FormatParser, ParseContext};
use crate::metadata::{AudioFormat, ParsedAudioMetadata, TagValue};
use crate::reader::WindowedReader;

/// Window searched for the first MPEG sync after the ID3 block
const SYNC_SEARCH_LEN: usize = 128 * 1024;

/// MPEG-1 bitrate tables in kbps, indexed by layer then bitrate index
const MPEG1_BITRATES: [[u16; 15]; 3] = [
    [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
    [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
];

/// MPEG-2/2.5 bitrate tables in kbps
const MPEG2_BITRATES: [[u16; 15]; 3] = [
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
];

const MPEG1_SAMPLE_RATES: [u32; 3] = [44100, 48000, 32000];
const MPEG2_SAMPLE_RATES: [u32; 3] = [22050, 24000, 16000];
const MPEG25_SAMPLE_RATES: [u32; 3] = [11025, 12000, 8000];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

impl MpegVersion {
    /// Bit pattern `01` is reserved
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0b11 => Some(MpegVersion::Mpeg1),
            0b10 => Some(MpegVersion::Mpeg2),
            0b00 => Some(MpegVersion::Mpeg25),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            MpegVersion::Mpeg1 => "1",
            MpegVersion::Mpeg2 => "2",
            MpegVersion::Mpeg25 => "2.5",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FrameHeader {
    version: MpegVersion,
    layer: u8,
    bitrate_kbps: u16,
    sample_rate: u32,
    channels: u32,
    mono: bool,
}

impl FrameHeader {
    fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < 4 || data[0] != 0xFF || (data[1] & 0xE0) != 0xE0 {
            return None;
        }

        let version = MpegVersion::from_bits((data[1] >> 3) & 0x03)?;
        let layer_bits = (data[1] >> 1) & 0x03;
        if layer_bits == 0 {
            return None;
        }
        let layer = 4 - layer_bits;

        let bitrate_index = (data[2] >> 4) as usize;
        if bitrate_index == 0 || bitrate_index == 15 {
            return None;
        }
        let rate_index = ((data[2] >> 2) & 0x03) as usize;
        if rate_index == 3 {
            return None;
        }

        let bitrate_kbps = match version {
            MpegVersion::Mpeg1 => MPEG1_BITRATES[layer as usize - 1][bitrate_index],
            _ => MPEG2_BITRATES[layer as usize - 1][bitrate_index],
        };
        let sample_rate = match version {
            MpegVersion::Mpeg1 => MPEG1_SAMPLE_RATES[rate_index],
            MpegVersion::Mpeg2 => MPEG2_SAMPLE_RATES[rate_index],
            MpegVersion::Mpeg25 => MPEG25_SAMPLE_RATES[rate_index],
        };

        let channel_mode = data[3] >> 6;
        let mono = channel_mode == 3;

        Some(FrameHeader {
            version,
            layer,
            bitrate_kbps,
            sample_rate,
            channels: if mono { 1 } else { 2 },
            mono,
        })
    }

    fn samples_per_frame(&self) -> u32 {
        match self.layer {
            1 => 384,
            2 => 1152,
            _ => match self.version {
                MpegVersion::Mpeg1 => 1152,
                _ => 576,
            },
        }
    }

    /// Side-info length, which positions the Xing/Info header
    fn side_info_len(&self) -> usize {
        match (self.version, self.mono) {
            (MpegVersion::Mpeg1, true) => 17,
            (MpegVersion::Mpeg1, false) => 32,
            (_, true) => 9,
            (_, false) => 17,
        }
    }
}

#[derive(Debug, Default)]
struct VbrInfo {
    frames: Option<u32>,
    bytes: Option<u32>,
    cbr: bool,
    encoder_info: Option<String>,
}

/// Decode a Xing/Info header at `pos`, if present
fn decode_xing(buf: &[u8], pos: usize) -> Option<VbrInfo> {
    let tag = buf.get(pos..pos + 4)?;
    let cbr = match tag {
        b"Xing" => false,
        b"Info" => true,
        _ => return None,
    };

    let flags = u32::from_be_bytes(buf.get(pos + 4..pos + 8)?.try_into().ok()?);
    let mut cursor = pos + 8;
    let mut info = VbrInfo {
        cbr,
        ..VbrInfo::default()
    };

    if flags & 0x1 != 0 {
        info.frames = Some(u32::from_be_bytes(
            buf.get(cursor..cursor + 4)?.try_into().ok()?,
        ));
        cursor += 4;
    }
    if flags & 0x2 != 0 {
        info.bytes = Some(u32::from_be_bytes(
            buf.get(cursor..cursor + 4)?.try_into().ok()?,
        ));
        cursor += 4;
    }
    if flags & 0x4 != 0 {
        cursor += 100; // TOC
    }
    if flags & 0x8 != 0 {
        cursor += 4; // quality
    }

    // a LAME version string usually follows within a few bytes
    for probe in cursor..(cursor + 16).min(buf.len().saturating_sub(4)) {
        if &buf[probe..probe + 4] == b"LAME" {
            let end = (probe + 16).min(buf.len());
            info.encoder_info = Some(
                String::from_utf8_lossy(&buf[probe..end])
                    .trim_end_matches(|c| c == '\u{0}' || c == ' ')
                    .to_string(),
            );
            break;
        }
    }

    Some(info)
}

/// Decode a VBRI header at `pos`, if present
fn decode_vbri(buf: &[u8], pos: usize) -> Option<VbrInfo> {
    if buf.get(pos..pos + 4)? != b"VBRI" {
        return None;
    }
    let bytes = u32::from_be_bytes(buf.get(pos + 10..pos + 14)?.try_into().ok()?);
    let frames = u32::from_be_bytes(buf.get(pos + 14..pos + 18)?.try_into().ok()?);
    Some(VbrInfo {
        frames: Some(frames),
        bytes: Some(bytes),
        cbr: false,
        encoder_info: None,
    })
}

pub struct Mp3Parser;

impl FormatParser for Mp3Parser {
    fn format(&self) -> AudioFormat {
        AudioFormat::Mp3
    }

    fn can_parse(&self, header: &[u8], name_hint: Option<&str>) -> bool {
        if header.len() >= 3 && &header[0..3] == b"ID3" {
            return true;
        }
        if header.len() >= 2 && header[0] == 0xFF && (header[1] & 0xE0) == 0xE0 {
            return true;
        }
        extension_matches(name_hint, AudioFormat::Mp3)
    }

    fn parse(
        &self,
        reader: &mut WindowedReader,
        ctx: &ParseContext,
    ) -> Result<ParsedAudioMetadata> {
        let mut metadata = ParsedAudioMetadata::new(AudioFormat::Mp3);

        let id3_size = attempt_id3v2(reader, 0, ctx, &mut metadata);
        let audio_start = id3_size;

        let buf = reader.read(audio_start, SYNC_SEARCH_LEN)?;
        let Some((sync_pos, header)) = find_sync(&buf) else {
            if id3_size > 0 {
                // a bare tag file: keep the recovered tags
                metadata.format = AudioFormat::Id3;
                metadata.warn("no MPEG frames found after ID3v2 block");
                attempt_apev2(reader, ctx, &mut metadata);
                return Ok(metadata);
            }
            return Err(Error::invalid_header("no MPEG frame sync found")
                .with_offset(audio_start));
        };

        metadata.core.sample_rate = Some(header.sample_rate);
        metadata.core.channels = Some(header.channels);
        metadata
            .extensions
            .insert("mpeg_version".to_string(), TagValue::text(header.version.label()));

        let xing_pos = sync_pos + 4 + header.side_info_len();
        let vbr = decode_xing(&buf, xing_pos).or_else(|| decode_vbri(&buf, sync_pos + 4 + 32));

        match vbr {
            Some(info) => {
                metadata.extensions.insert(
                    "bitrate_mode".to_string(),
                    TagValue::text(if info.cbr { "CBR" } else { "VBR" }),
                );
                if let Some(encoder) = info.encoder_info {
                    metadata
                        .extensions
                        .insert("encoder_info".to_string(), TagValue::text(encoder));
                }

                let length = info.frames.map(|frames| {
                    frames as f64 * header.samples_per_frame() as f64 / header.sample_rate as f64
                });
                metadata.core.length = length;
                metadata.core.bitrate = match (info.bytes, length) {
                    (Some(bytes), Some(length)) if length > 0.0 => {
                        Some((bytes as f64 * 8.0 / length).round() as u32)
                    }
                    _ => Some(header.bitrate_kbps as u32 * 1000),
                };
            }
            None => {
                metadata
                    .extensions
                    .insert("bitrate_mode".to_string(), TagValue::text("CBR"));
                let bitrate = header.bitrate_kbps as u32 * 1000;
                metadata.core.bitrate = Some(bitrate);
                if let Some(file_len) = reader.len() {
                    let audio_bytes = file_len.saturating_sub(audio_start + sync_pos as u64);
                    if bitrate > 0 {
                        metadata.core.length = Some(audio_bytes as f64 * 8.0 / bitrate as f64);
                    }
                }
            }
        }

        attempt_apev2(reader, ctx, &mut metadata);
        Ok(metadata)
    }
}

/// Scan for the first byte pair that decodes as a valid frame header
fn find_sync(buf: &[u8]) -> Option<(usize, FrameHeader)> {
    for i in 0..buf.len().saturating_sub(4) {
        if buf[i] == 0xFF && (buf[i + 1] & 0xE0) == 0xE0 {
            if let Some(header) = FrameHeader::decode(&buf[i..i + 4]) {
                return Some((i, header));
            }
        }
    }
    None
}
