//! ID3v2 tag block parsing
//!
//! Handles v2.2 through v2.4 headers; frame sizes are synchsafe from
//! v2.4 on, plain big-endian before that. Frames with a malformed id or
//! a size overrunning the payload terminate the walk without error, per
//! the usual tolerance for tags written by sloppy encoders.

use tracing::debug;

use crate::error::Result;
use crate::metadata::{TagMap, TagValue};
use crate::options::ParseOptions;
use crate::reader::WindowedReader;
use crate::tag::{binary::build_digest, decode_latin1, decode_utf16};

/// A decoded ID3v2 block
#[derive(Debug)]
pub struct Id3v2Block {
    /// Major version byte (2, 3 or 4)
    pub version: u8,
    /// Full tag size including the 10-byte header
    pub total_size: u64,
    /// Decoded frames
    pub tags: TagMap,
    /// Non-fatal problems hit while walking frames
    pub warnings: Vec<String>,
}

/// Decode a 28-bit synchsafe integer
///
/// Four 7-bit groups, high bit of each byte zero, so tag sizes can never
/// contain a false MPEG sync pattern.
pub fn parse_synchsafe_int(bytes: [u8; 4]) -> u32 {
    ((bytes[0] as u32 & 0x7F) << 21)
        | ((bytes[1] as u32 & 0x7F) << 14)
        | ((bytes[2] as u32 & 0x7F) << 7)
        | (bytes[3] as u32 & 0x7F)
}

/// Parse an ID3v2 block at `offset`, if one is present
///
/// Returns `Ok(None)` when the magic is absent; a missing tag is not an
/// error for any caller.
pub fn parse_id3v2(
    reader: &mut WindowedReader,
    offset: u64,
    options: &ParseOptions,
) -> Result<Option<Id3v2Block>> {
    let header = reader.read(offset, 10)?;
    if header.len() < 10 || &header[0..3] != b"ID3" {
        return Ok(None);
    }

    let version = header[3];
    let declared = parse_synchsafe_int([header[6], header[7], header[8], header[9]]) as u64;
    let total_size = 10 + declared;

    let mut block = Id3v2Block {
        version,
        total_size,
        tags: TagMap::new(),
        warnings: Vec::new(),
    };

    if !options.parse_tags || declared == 0 {
        return Ok(Some(block));
    }

    let payload = reader.read(offset + 10, declared as usize)?;
    if payload.len() < declared as usize {
        block.warnings.push(format!(
            "ID3v2 payload truncated: declared {}, got {}",
            declared,
            payload.len()
        ));
    }

    walk_frames(&payload, version, options, &mut block);
    debug!(version, frames = block.tags.len(), "decoded ID3v2 block");

    Ok(Some(block))
}

fn walk_frames(payload: &[u8], version: u8, options: &ParseOptions, block: &mut Id3v2Block) {
    let mut pos = 0usize;

    while pos + 10 <= payload.len() {
        let header = &payload[pos..pos + 10];
        if header.iter().all(|&b| b == 0) {
            break; // padding
        }

        let id = &header[0..4];
        if !id.iter().all(|&b| b.is_ascii_uppercase() || b.is_ascii_digit()) {
            block
                .warnings
                .push(format!("malformed frame id at payload offset {}", pos));
            break;
        }
        let id = String::from_utf8_lossy(id).into_owned();

        let size_bytes = [header[4], header[5], header[6], header[7]];
        let size = if version >= 4 {
            parse_synchsafe_int(size_bytes) as usize
        } else {
            u32::from_be_bytes(size_bytes) as usize
        };

        let body_start = pos + 10;
        let body_end = match body_start.checked_add(size) {
            Some(end) if end <= payload.len() => end,
            _ => {
                block
                    .warnings
                    .push(format!("frame {} overruns tag payload", id));
                break;
            }
        };

        decode_frame(&id, &payload[body_start..body_end], options, block);
        pos = body_end;
    }
}

fn decode_frame(id: &str, body: &[u8], options: &ParseOptions, block: &mut Id3v2Block) {
    if body.is_empty() {
        return;
    }

    match id {
        "TXXX" | "COMM" => {
            let encoding = body[0];
            // COMM carries a 3-byte language code before the description
            let rest = if id == "COMM" {
                if body.len() < 4 {
                    return;
                }
                &body[4..]
            } else {
                &body[1..]
            };
            let (description, value) = split_described(encoding, rest);
            let key = format!("{}:{}", id, description);
            let values = decode_text_values(encoding, value);
            insert_text(&mut block.tags, key, values);
        }
        "APIC" => {
            let encoding = body[0];
            let rest = &body[1..];
            let Some(mime_end) = rest.iter().position(|&b| b == 0) else {
                block.warnings.push("APIC frame missing mime terminator".into());
                return;
            };
            let mime = decode_latin1(&rest[..mime_end]);
            let rest = &rest[mime_end + 1..];
            if rest.is_empty() {
                return;
            }
            // picture-type byte, then a described payload
            let (_description, picture) = split_described(encoding, &rest[1..]);
            let mime = if mime.is_empty() { None } else { Some(mime) };
            block.tags.insert(
                "APIC".to_string(),
                TagValue::Binary(build_digest(picture, mime, options)),
            );
        }
        _ if id.starts_with('T') => {
            let encoding = body[0];
            let values = decode_text_values(encoding, &body[1..]);
            insert_text(&mut block.tags, id.to_string(), values);
        }
        _ => {} // frames outside the decoded vocabulary are skipped
    }
}

/// Split a description terminated by the encoding-appropriate NUL run
/// from the remaining value bytes
fn split_described(encoding: u8, data: &[u8]) -> (String, &[u8]) {
    match encoding {
        1 | 2 => {
            let mut i = 0;
            while i + 1 < data.len() {
                if data[i] == 0 && data[i + 1] == 0 {
                    return (decode_utf16(&data[..i]), &data[i + 2..]);
                }
                i += 2;
            }
            (decode_utf16(data), &[])
        }
        _ => match data.iter().position(|&b| b == 0) {
            Some(end) => {
                let description = if encoding == 3 {
                    String::from_utf8_lossy(&data[..end]).into_owned()
                } else {
                    decode_latin1(&data[..end])
                };
                (description, &data[end + 1..])
            }
            None => (decode_latin1(data), &[]),
        },
    }
}

/// Decode a text body into its list of values
///
/// UTF-8 and UTF-16 bodies split on NUL into multiple values with empties
/// dropped; Latin-1 bodies are a single value with control characters
/// trimmed.
fn decode_text_values(encoding: u8, body: &[u8]) -> Vec<String> {
    match encoding {
        1 | 2 => decode_utf16(body)
            .split('\u{0}')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        3 => String::from_utf8_lossy(body)
            .split('\u{0}')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => vec![decode_latin1(body)],
    }
}

fn insert_text(tags: &mut TagMap, key: String, values: Vec<String>) {
    if values.is_empty() {
        return;
    }
    match tags.get_mut(&key) {
        Some(TagValue::Text(existing)) => existing.extend(values),
        _ => {
            tags.insert(key, TagValue::Text(values));
        }
    }
}
