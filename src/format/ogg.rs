//! Ogg family parsing (Vorbis, Opus, Speex, Theora, FLAC-in-Ogg)
//!
//! Walks pages sequentially, reassembling packets per logical stream:
//! segments concatenate until one shorter than 255 bytes ends the packet.
//! Only the first few packets per serial are retained, enough for codec
//! identification plus the comment packet. Once at least one packet has
//! been reconstructed, truncation downgrades to a warning; partial
//! recovery beats failing the whole file.

use tracing::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::format::flac::StreamInfo;
use crate::format::{FormatParser, ParseContext};
use crate::metadata::{AudioFormat, ParsedAudioMetadata};
use crate::reader::WindowedReader;
use crate::tag::{merge_vorbis, parse_vorbis_comments};

/// Packets retained per serial
const MAX_PACKETS: usize = 8;

/// Safety bound on pages walked
const MAX_PAGES: usize = 1 << 20;

const FLAG_EOS: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OggCodec {
    Vorbis,
    Opus,
    Speex,
    Theora,
    Flac,
}

impl OggCodec {
    fn detect(packet: &[u8]) -> Option<Self> {
        if packet.starts_with(b"\x01vorbis") {
            Some(OggCodec::Vorbis)
        } else if packet.starts_with(b"OpusHead") {
            Some(OggCodec::Opus)
        } else if packet.starts_with(b"Speex   ") {
            Some(OggCodec::Speex)
        } else if packet.starts_with(b"\x80theora") {
            Some(OggCodec::Theora)
        } else if packet.starts_with(b"\x7FFLAC") {
            Some(OggCodec::Flac)
        } else {
            None
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "opus" => Some(OggCodec::Opus),
            "spx" => Some(OggCodec::Speex),
            "oggflac" => Some(OggCodec::Flac),
            "oggtheora" | "ogv" => Some(OggCodec::Theora),
            "ogg" | "oga" => Some(OggCodec::Vorbis),
            _ => None,
        }
    }

    fn format(&self) -> AudioFormat {
        match self {
            OggCodec::Vorbis => AudioFormat::OggVorbis,
            OggCodec::Opus => AudioFormat::OggOpus,
            OggCodec::Speex => AudioFormat::OggSpeex,
            OggCodec::Theora => AudioFormat::OggTheora,
            OggCodec::Flac => AudioFormat::OggFlac,
        }
    }
}

#[derive(Debug)]
struct LogicalStream {
    serial: u32,
    packets: Vec<Vec<u8>>,
    partial: Vec<u8>,
    last_granule: Option<u64>,
    codec: Option<OggCodec>,
}

impl LogicalStream {
    fn new(serial: u32) -> Self {
        LogicalStream {
            serial,
            packets: Vec::new(),
            partial: Vec::new(),
            last_granule: None,
            codec: None,
        }
    }
}

struct Page {
    header_type: u8,
    granule: u64,
    serial: u32,
    segments: Vec<u8>,
    payload: Vec<u8>,
    next_offset: u64,
}

pub struct OggParser;

impl FormatParser for OggParser {
    fn format(&self) -> AudioFormat {
        AudioFormat::Ogg
    }

    fn can_parse(&self, header: &[u8], name_hint: Option<&str>) -> bool {
        if header.starts_with(b"OggS") {
            return true;
        }
        let ogg_like = [
            AudioFormat::Ogg,
            AudioFormat::OggVorbis,
            AudioFormat::OggOpus,
            AudioFormat::OggSpeex,
            AudioFormat::OggTheora,
            AudioFormat::OggFlac,
        ];
        ogg_like
            .iter()
            .any(|f| super::extension_matches(name_hint, *f))
    }

    fn parse(
        &self,
        reader: &mut WindowedReader,
        ctx: &ParseContext,
    ) -> Result<ParsedAudioMetadata> {
        let mut metadata = ParsedAudioMetadata::new(AudioFormat::Ogg);
        let mut streams: Vec<LogicalStream> = Vec::new();
        let mut selected: Option<u32> = None;
        let mut packets_recovered = 0usize;
        let mut pos = 0u64;

        for _ in 0..MAX_PAGES {
            let page = match read_page(reader, pos) {
                Ok(Some(page)) => page,
                Ok(None) => break, // clean end of file
                Err(err)
                    if packets_recovered > 0
                        && !ctx.options.strict_mode
                        && matches!(
                            err.kind,
                            ErrorKind::TruncatedData | ErrorKind::InvalidHeader
                        ) =>
                {
                    metadata.warn(format!("Ogg page walk stopped early: {}", err));
                    break;
                }
                Err(err) => return Err(err),
            };
            pos = page.next_offset;

            let stream = match streams.iter_mut().find(|s| s.serial == page.serial) {
                Some(stream) => stream,
                None => {
                    streams.push(LogicalStream::new(page.serial));
                    streams.last_mut().unwrap()
                }
            };

            let mut cursor = 0usize;
            for &seg in &page.segments {
                let end = (cursor + seg as usize).min(page.payload.len());
                stream.partial.extend_from_slice(&page.payload[cursor..end]);
                cursor = end;
                if seg < 255 {
                    let packet = std::mem::take(&mut stream.partial);
                    packets_recovered += 1;
                    if stream.packets.len() < MAX_PACKETS {
                        stream.packets.push(packet);
                    }
                    if stream.packets.len() == 1 && stream.codec.is_none() {
                        stream.codec = OggCodec::detect(&stream.packets[0]);
                        if stream.codec.is_some() && selected.is_none() {
                            selected = Some(stream.serial);
                        }
                    }
                }
            }

            if page.granule != u64::MAX {
                stream.last_granule = Some(page.granule);
            }

            if page.header_type & FLAG_EOS != 0 && selected == Some(page.serial) {
                break;
            }
        }

        if streams.is_empty() {
            return Err(Error::invalid_header("no Ogg pages found"));
        }

        // no recognisable first packet: fall back to the extension, then
        // to the first stream seen
        let stream = match selected {
            Some(serial) => streams.iter().find(|s| s.serial == serial),
            None => streams.first(),
        }
        .expect("selected serial tracks an existing stream");

        let codec = stream
            .codec
            .or_else(|| ctx.extension().and_then(|e| OggCodec::from_extension(&e)));

        match codec {
            Some(codec) => {
                metadata.format = codec.format();
                extract_codec_info(codec, stream, ctx, &mut metadata);
            }
            None => metadata.warn("unrecognised Ogg codec".to_string()),
        }

        debug!(format = %metadata.format, streams = streams.len(), "parsed Ogg container");
        Ok(metadata)
    }
}

/// Read one page at `pos`; `Ok(None)` at clean end of file
fn read_page(reader: &mut WindowedReader, pos: u64) -> Result<Option<Page>> {
    let header = reader.read(pos, 27)?;
    if header.is_empty() {
        return Ok(None);
    }
    if header.len() < 27 {
        return Err(Error::truncated_data("Ogg page header cut short").with_offset(pos));
    }
    if &header[0..4] != b"OggS" {
        return Err(Error::invalid_header("bad Ogg page magic").with_offset(pos));
    }

    let header_type = header[5];
    let granule = u64::from_le_bytes(header[6..14].try_into().expect("8-byte slice"));
    let serial = u32::from_le_bytes(header[14..18].try_into().expect("4-byte slice"));

    let segment_count = header[26] as usize;
    let segments = reader.read_exact(pos + 27, segment_count)?;
    let payload_len: usize = segments.iter().map(|&s| s as usize).sum();
    let payload = reader.read_exact(pos + 27 + segment_count as u64, payload_len)?;

    Ok(Some(Page {
        header_type,
        granule,
        serial,
        segments,
        payload,
        next_offset: pos + 27 + segment_count as u64 + payload_len as u64,
    }))
}

fn extract_codec_info(
    codec: OggCodec,
    stream: &LogicalStream,
    ctx: &ParseContext,
    metadata: &mut ParsedAudioMetadata,
) {
    let id = stream.packets.first().map(Vec::as_slice).unwrap_or(&[]);
    let granule = stream.last_granule.unwrap_or(0);
    let mut comment_packet: Option<Vec<u8>> = None;

    match codec {
        OggCodec::Vorbis => {
            if id.len() >= 16 {
                metadata.core.channels = Some(id[11] as u32);
                let rate = u32::from_le_bytes(id[12..16].try_into().expect("4-byte slice"));
                metadata.core.sample_rate = Some(rate);
                if rate > 0 {
                    metadata.core.length = Some(granule as f64 / rate as f64);
                }
            }
            comment_packet = stream.packets.get(1).map(|p| {
                p.strip_prefix(b"\x03vorbis".as_slice())
                    .unwrap_or(p.as_slice())
                    .to_vec()
            });
        }
        OggCodec::Opus => {
            let pre_skip = if id.len() >= 12 {
                metadata.core.channels = Some(id[9] as u32);
                u16::from_le_bytes([id[10], id[11]]) as u64
            } else {
                0
            };
            metadata.core.sample_rate = Some(48000);
            metadata.core.length = Some(granule.saturating_sub(pre_skip) as f64 / 48000.0);
            comment_packet = stream
                .packets
                .iter()
                .find(|p| p.starts_with(b"OpusTags"))
                .map(|p| p[8..].to_vec());
        }
        OggCodec::Speex => {
            if id.len() >= 52 {
                let rate = u32::from_le_bytes(id[36..40].try_into().expect("4-byte slice"));
                let channels = u32::from_le_bytes(id[48..52].try_into().expect("4-byte slice"));
                metadata.core.sample_rate = Some(rate);
                metadata.core.channels = Some(channels);
                if rate > 0 {
                    metadata.core.length = Some(granule as f64 / rate as f64);
                }
            }
            comment_packet = stream.packets.get(1).cloned();
        }
        OggCodec::Theora => {
            if id.len() >= 42 {
                let num = u32::from_be_bytes(id[22..26].try_into().expect("4-byte slice"));
                let den = u32::from_be_bytes(id[26..30].try_into().expect("4-byte slice"));
                let bitrate = ((id[37] as u32) << 16) | ((id[38] as u32) << 8) | id[39] as u32;
                let shift =
                    (u16::from_be_bytes([id[40], id[41]]) >> 5) & 0x1F;
                if bitrate > 0 {
                    metadata.core.bitrate = Some(bitrate);
                }
                if num > 0 && den > 0 {
                    let fps = num as f64 / den as f64;
                    let frames =
                        (granule >> shift) + (granule & ((1u64 << shift) - 1));
                    metadata.core.length = Some(frames as f64 / fps);
                }
            }
            comment_packet = stream
                .packets
                .iter()
                .find(|p| p.first() == Some(&0x81))
                .map(|p| p.get(7..).unwrap_or(&[]).to_vec());
        }
        OggCodec::Flac => {
            if let Some(index) = find_subslice(id, b"fLaC") {
                // a metadata block header sits between the magic and the
                // STREAMINFO fields
                if let Some(info) = StreamInfo::unpack(id.get(index + 8..).unwrap_or(&[])) {
                    metadata.core.sample_rate = Some(info.sample_rate);
                    metadata.core.channels = Some(info.channels);
                    metadata.core.bits_per_sample = Some(info.bits_per_sample);
                    if info.sample_rate > 0 {
                        metadata.core.length =
                            Some(granule as f64 / info.sample_rate as f64);
                    }
                }
            }
            comment_packet = stream.packets.get(1).map(|p| {
                // packet 2 is a VORBIS_COMMENT metadata block
                if p.first().map(|b| b & 0x7F) == Some(4) {
                    p.get(4..).unwrap_or(&[]).to_vec()
                } else {
                    p.clone()
                }
            });
        }
    }

    if ctx.options.parse_tags {
        if let Some(packet) = comment_packet {
            match parse_vorbis_comments(&packet) {
                Ok(tags) => merge_vorbis(&mut metadata.tags, tags),
                Err(err) => metadata.warn(format!("Ogg comment packet: {}", err)),
            }
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
