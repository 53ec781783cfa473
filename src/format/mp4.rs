//! MP4 / M4A atom tree parsing
//!
//! Walks the atom tree for the first audio track (handler `soun`) and the
//! iTunes-style tag list at `moov/udta/meta/ilst`. Atom sizes are 32-bit
//! big-endian; size 1 means a 64-bit size follows and size 0 means "to
//! the end of the parent". A child whose end exceeds its parent aborts
//! that level rather than the whole parse.

use tracing::debug;

use crate::error::{Error, Result};
use crate::format::{extension_matches, FormatParser, ParseContext};
use crate::metadata::{AudioFormat, ParsedAudioMetadata, TagValue};
use crate::reader::WindowedReader;
use crate::tag::{build_digest, decode_latin1};

#[derive(Debug, Clone, Copy)]
struct Atom {
    kind: [u8; 4],
    body_start: u64,
    body_end: u64,
}

impl Atom {
    fn is(&self, kind: &[u8; 4]) -> bool {
        &self.kind == kind
    }

    /// Child atoms of `meta` start past its version/flags word
    fn child_start(&self) -> u64 {
        if self.is(b"meta") {
            self.body_start + 4
        } else {
            self.body_start
        }
    }
}

/// List the child atoms in `[start, end)`
///
/// Stops (without error) at the first child whose end would exceed the
/// parent, or whose header cannot be read.
fn list_children(reader: &mut WindowedReader, start: u64, end: u64) -> Vec<Atom> {
    let mut children = Vec::new();
    let mut pos = start;

    while pos + 8 <= end {
        let Ok(header) = reader.read_exact(pos, 8) else {
            break;
        };
        let size32 = u32::from_be_bytes(header[0..4].try_into().expect("4-byte slice"));
        let kind: [u8; 4] = header[4..8].try_into().expect("4-byte slice");

        let (body_start, atom_end) = match size32 {
            0 => (pos + 8, end),
            1 => {
                let Ok(size64) = reader.read_u64_be(pos + 8) else {
                    break;
                };
                if size64 < 16 {
                    break;
                }
                (pos + 16, pos + size64)
            }
            _ if size32 < 8 => break,
            _ => (pos + 8, pos + size32 as u64),
        };

        if atom_end > end || body_start > atom_end {
            break;
        }

        children.push(Atom {
            kind,
            body_start,
            body_end: atom_end,
        });
        pos = atom_end;
    }

    children
}

fn find_child(
    reader: &mut WindowedReader,
    parent: &Atom,
    kind: &[u8; 4],
) -> Option<Atom> {
    list_children(reader, parent.child_start(), parent.body_end)
        .into_iter()
        .find(|a| a.is(kind))
}

pub struct Mp4Parser;

impl FormatParser for Mp4Parser {
    fn format(&self) -> AudioFormat {
        AudioFormat::Mp4
    }

    fn can_parse(&self, header: &[u8], _name_hint: Option<&str>) -> bool {
        header.len() >= 8 && &header[4..8] == b"ftyp"
    }

    fn parse(
        &self,
        reader: &mut WindowedReader,
        ctx: &ParseContext,
    ) -> Result<ParsedAudioMetadata> {
        let end = reader
            .len()
            .ok_or_else(|| Error::io_failure("MP4 parsing requires a known source length"))?;

        let mut metadata = ParsedAudioMetadata::new(resolve_format(reader, ctx));

        let top = list_children(reader, 0, end);
        let Some(moov) = top.iter().find(|a| a.is(b"moov")).copied() else {
            return Err(Error::invalid_header("no moov atom found"));
        };

        let mut audio_trak = None;
        for trak in list_children(reader, moov.child_start(), moov.body_end)
            .into_iter()
            .filter(|a| a.is(b"trak"))
        {
            let Some(mdia) = find_child(reader, &trak, b"mdia") else {
                continue;
            };
            let Some(hdlr) = find_child(reader, &mdia, b"hdlr") else {
                continue;
            };
            let handler = reader.read(hdlr.body_start + 8, 4)?;
            if handler == b"soun" {
                audio_trak = Some(mdia);
                break;
            }
        }

        if let Some(mdia) = audio_trak {
            if let Some(mdhd) = find_child(reader, &mdia, b"mdhd") {
                decode_mdhd(reader, &mdhd, &mut metadata)?;
            }
            if let Some(stsd) = find_child(reader, &mdia, b"minf")
                .and_then(|minf| find_child(reader, &minf, b"stbl"))
                .and_then(|stbl| find_child(reader, &stbl, b"stsd"))
            {
                decode_stsd(reader, &stsd, &mut metadata)?;
            }
        } else {
            metadata.warn("no audio track found".to_string());
        }

        if ctx.options.parse_tags {
            if let Some(ilst) = find_child(reader, &moov, b"udta")
                .and_then(|udta| find_child(reader, &udta, b"meta"))
                .and_then(|meta| find_child(reader, &meta, b"ilst"))
            {
                decode_ilst(reader, &ilst, ctx, &mut metadata)?;
            }
        }

        debug!(format = %metadata.format, tags = metadata.tags.len(), "parsed MP4 atoms");
        Ok(metadata)
    }
}

/// Distinguish m4a from plain mp4 by extension, then ftyp major brand
fn resolve_format(reader: &mut WindowedReader, ctx: &ParseContext) -> AudioFormat {
    if extension_matches(ctx.name_hint.as_deref(), AudioFormat::M4a) {
        return AudioFormat::M4a;
    }
    if extension_matches(ctx.name_hint.as_deref(), AudioFormat::Mp4) {
        return AudioFormat::Mp4;
    }
    if let Ok(brand) = reader.read(8, 3) {
        if brand == b"M4A" || brand == b"M4B" || brand == b"M4P" {
            return AudioFormat::M4a;
        }
    }
    AudioFormat::Mp4
}

/// Timescale and duration; field offsets depend on the version byte
fn decode_mdhd(
    reader: &mut WindowedReader,
    mdhd: &Atom,
    metadata: &mut ParsedAudioMetadata,
) -> Result<()> {
    let version = reader.read_u8(mdhd.body_start)?;
    let (timescale, duration) = if version == 1 {
        (
            reader.read_u32_be(mdhd.body_start + 20)?,
            reader.read_u64_be(mdhd.body_start + 24)?,
        )
    } else {
        (
            reader.read_u32_be(mdhd.body_start + 12)?,
            reader.read_u32_be(mdhd.body_start + 16)? as u64,
        )
    };

    if timescale > 0 && duration > 0 {
        metadata.core.length = Some(duration as f64 / timescale as f64);
    }
    Ok(())
}

/// Channels, sample size and rate from the first sample description
fn decode_stsd(
    reader: &mut WindowedReader,
    stsd: &Atom,
    metadata: &mut ParsedAudioMetadata,
) -> Result<()> {
    // version/flags + entry count, then the first entry's own header
    let entry_payload = stsd.body_start + 8 + 8;
    if entry_payload + 28 > stsd.body_end {
        metadata.warn("stsd entry too short".to_string());
        return Ok(());
    }

    let channels = reader.read_u16_be(entry_payload + 16)?;
    let bits = reader.read_u16_be(entry_payload + 18)?;
    let sample_rate = reader.read_u32_be(entry_payload + 24)? >> 16;

    if channels > 0 {
        metadata.core.channels = Some(channels as u32);
    }
    if bits > 0 {
        metadata.core.bits_per_sample = Some(bits as u32);
    }
    if sample_rate > 0 {
        metadata.core.sample_rate = Some(sample_rate);
    }
    Ok(())
}

/// Decode the iTunes-style item list
fn decode_ilst(
    reader: &mut WindowedReader,
    ilst: &Atom,
    ctx: &ParseContext,
    metadata: &mut ParsedAudioMetadata,
) -> Result<()> {
    for item in list_children(reader, ilst.child_start(), ilst.body_end) {
        let key = decode_latin1(&item.kind);
        if key.is_empty() {
            continue;
        }

        for data_atom in list_children(reader, item.body_start, item.body_end)
            .into_iter()
            .filter(|a| a.is(b"data"))
        {
            let body_len = (data_atom.body_end - data_atom.body_start) as usize;
            let body = match reader.read_exact(data_atom.body_start, body_len) {
                Ok(body) => body,
                Err(err) => {
                    metadata.warn(format!("ilst item {} unreadable: {}", key, err));
                    continue;
                }
            };
            if body.len() < 8 {
                continue;
            }
            let type_code = u32::from_be_bytes(body[0..4].try_into().expect("4-byte slice"));
            let payload = &body[8..];
            decode_data_value(&key, type_code, payload, ctx, metadata);
        }
    }
    Ok(())
}

fn decode_data_value(
    key: &str,
    type_code: u32,
    payload: &[u8],
    ctx: &ParseContext,
    metadata: &mut ParsedAudioMetadata,
) {
    // track and disc numbers are packed pairs regardless of type code,
    // and compilation is a flag
    match key {
        "trkn" | "disk" => {
            if payload.len() >= 6 {
                let n = u16::from_be_bytes([payload[2], payload[3]]);
                let m = u16::from_be_bytes([payload[4], payload[5]]);
                append_text(metadata, key, format!("{}/{}", n, m));
            }
            return;
        }
        "cpil" => {
            let flag = payload.last().copied().unwrap_or(0) != 0;
            metadata.tags.insert(key.to_string(), TagValue::Bool(flag));
            return;
        }
        _ => {}
    }

    match type_code {
        0 | 1 => {
            let text = String::from_utf8_lossy(payload).into_owned();
            append_text(metadata, key, text);
        }
        13 => {
            metadata.tags.entry(key.to_string()).or_insert_with(|| {
                TagValue::Binary(build_digest(
                    payload,
                    Some("image/jpeg".to_string()),
                    &ctx.options,
                ))
            });
        }
        14 => {
            metadata.tags.entry(key.to_string()).or_insert_with(|| {
                TagValue::Binary(build_digest(
                    payload,
                    Some("image/png".to_string()),
                    &ctx.options,
                ))
            });
        }
        21 => {
            if let Some(value) = decode_signed_be(payload) {
                metadata.tags.insert(key.to_string(), TagValue::Int(value));
            }
        }
        _ => {
            metadata.tags.entry(key.to_string()).or_insert_with(|| {
                TagValue::Binary(build_digest(payload, None, &ctx.options))
            });
        }
    }
}

fn append_text(metadata: &mut ParsedAudioMetadata, key: &str, value: String) {
    match metadata.tags.get_mut(key) {
        Some(TagValue::Text(values)) => values.push(value),
        _ => {
            metadata
                .tags
                .insert(key.to_string(), TagValue::Text(vec![value]));
        }
    }
}

/// Big-endian signed integer of 1, 2, 4 or 8 bytes
fn decode_signed_be(payload: &[u8]) -> Option<i64> {
    match payload.len() {
        1 => Some(payload[0] as i8 as i64),
        2 => Some(i16::from_be_bytes([payload[0], payload[1]]) as i64),
        4 => Some(i32::from_be_bytes(payload.try_into().ok()?) as i64),
        8 => Some(i64::from_be_bytes(payload.try_into().ok()?)),
        _ => None,
    }
}
