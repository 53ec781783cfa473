//! APEv2 tag parsing
//!
//! The footer walker is the primary entry: APEv2 tags normally sit at the
//! end of the file, so discovery starts from the last 32 bytes. Standalone
//! `.apev2` files lead with a header record instead; the forward entry
//! covers those.

use tracing::debug;

use crate::error::{Error, Result};
use crate::metadata::{TagMap, TagValue};
use crate::options::ParseOptions;
use crate::reader::WindowedReader;
use crate::tag::binary::build_digest;

const PREAMBLE: &[u8; 8] = b"APETAGEX";

/// Hard ceiling on decoded items, over and above the declared count
const MAX_ITEMS: u32 = 512;

/// A decoded APEv2 tag
#[derive(Debug, Default)]
pub struct Apev2Tag {
    /// Decoded items
    pub tags: TagMap,
    /// An `APETAGEX` marker was hit at an item boundary inside the payload
    pub embedded_header: bool,
    /// Non-fatal problems hit while walking items
    pub warnings: Vec<String>,
}

/// Parse an APEv2 tag anchored by a footer in the last 32 bytes
///
/// Returns `Ok(None)` when the source length is unknown, too small, or
/// the footer preamble is absent. A structurally broken footer is an
/// `invalidTagPayload` error; callers that treat the tag as optional
/// downgrade it to a warning.
pub fn parse_apev2_footer(
    reader: &mut WindowedReader,
    options: &ParseOptions,
) -> Result<Option<Apev2Tag>> {
    let Some(file_len) = reader.len() else {
        return Ok(None);
    };
    if file_len < 32 {
        return Ok(None);
    }

    let footer = reader.read_exact(file_len - 32, 32)?;
    if &footer[0..8] != PREAMBLE {
        return Ok(None);
    }

    let size = u32::from_le_bytes([footer[12], footer[13], footer[14], footer[15]]) as u64;
    let item_count = u32::from_le_bytes([footer[16], footer[17], footer[18], footer[19]]);

    if size < 32 || size > file_len {
        return Err(Error::invalid_tag_payload(format!(
            "APEv2 footer declares size {} for a {}-byte source",
            size, file_len
        ))
        .with_offset(file_len - 32));
    }

    if !options.parse_tags {
        return Ok(Some(Apev2Tag::default()));
    }

    let items_start = file_len - size;
    let items = reader.read_exact(items_start, (size - 32) as usize)?;
    let tag = walk_items(&items, item_count, options);
    debug!(items = tag.tags.len(), "decoded APEv2 tag from footer");
    Ok(Some(tag))
}

/// Parse an APEv2 tag that leads with a header record at `offset`
pub fn parse_apev2_from_header(
    reader: &mut WindowedReader,
    offset: u64,
    options: &ParseOptions,
) -> Result<Option<Apev2Tag>> {
    let header = reader.read(offset, 32)?;
    if header.len() < 32 || &header[0..8] != PREAMBLE {
        return Ok(None);
    }

    let size = u32::from_le_bytes([header[12], header[13], header[14], header[15]]) as u64;
    let item_count = u32::from_le_bytes([header[16], header[17], header[18], header[19]]);
    if size < 32 {
        return Err(
            Error::invalid_tag_payload(format!("APEv2 header declares size {}", size))
                .with_offset(offset),
        );
    }

    if !options.parse_tags {
        return Ok(Some(Apev2Tag::default()));
    }

    // size covers items plus the footer record; the trailing footer (it
    // also starts with APETAGEX) is caught by the sentinel stop below
    let items = reader.read(offset + 32, (size - 32) as usize)?;
    Ok(Some(walk_items(&items, item_count, options)))
}

fn walk_items(data: &[u8], item_count: u32, options: &ParseOptions) -> Apev2Tag {
    let mut tag = Apev2Tag::default();
    let mut pos = 0usize;

    for _ in 0..item_count.min(MAX_ITEMS) {
        if pos + 8 > data.len() {
            break;
        }
        if data[pos..].starts_with(PREAMBLE) {
            tag.embedded_header = true;
            break;
        }

        let value_size =
            u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        let flags =
            u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]]);

        let key_start = pos + 8;
        let Some(key_len) = data[key_start..].iter().position(|&b| b == 0) else {
            tag.warnings.push("APEv2 item key missing terminator".into());
            break;
        };
        let key = String::from_utf8_lossy(&data[key_start..key_start + key_len]).into_owned();

        let value_start = key_start + key_len + 1;
        let Some(value_end) = value_start.checked_add(value_size).filter(|&e| e <= data.len())
        else {
            tag.warnings
                .push(format!("APEv2 item {} overruns the tag", key));
            break;
        };
        let value = &data[value_start..value_end];

        // flag bits 1..2 select the item type; 0 is UTF-8 text
        if (flags >> 1) & 0x3 == 0 {
            let values: Vec<String> = String::from_utf8_lossy(value)
                .split('\u{0}')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !values.is_empty() {
                tag.tags.insert(key, TagValue::Text(values));
            }
        } else {
            tag.tags
                .insert(key, TagValue::Binary(build_digest(value, None, options)));
        }

        pos = value_end;
    }

    tag
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(key: &str, value: &[u8], flags: u32) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&(value.len() as u32).to_le_bytes());
        data.extend_from_slice(&flags.to_le_bytes());
        data.extend_from_slice(key.as_bytes());
        data.push(0);
        data.extend_from_slice(value);
        data
    }

    fn footer(size: u32, count: u32) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(PREAMBLE);
        data.extend_from_slice(&2000u32.to_le_bytes()); // version
        data.extend_from_slice(&size.to_le_bytes());
        data.extend_from_slice(&count.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes()); // flags
        data.extend_from_slice(&[0u8; 8]); // reserved
        data
    }

    fn tagged_file(items: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = items.concat();
        let size = (body.len() + 32) as u32;
        let mut file = b"AUDIO-DATA-PREFIX".to_vec();
        file.extend_from_slice(&body);
        file.extend_from_slice(&footer(size, items.len() as u32));
        file
    }

    fn parse(data: &[u8]) -> Option<Apev2Tag> {
        let options = ParseOptions::default();
        let mut reader = WindowedReader::from_slice(data, &options);
        parse_apev2_footer(&mut reader, &options).unwrap()
    }

    #[test]
    fn test_absent_footer_is_none() {
        assert!(parse(b"no ape tag here, just enough bytes to check....").is_none());
        assert!(parse(b"short").is_none());
    }

    #[test]
    fn test_text_items() {
        let file = tagged_file(&[
            item("Title", b"A Song", 0),
            item("Artist", b"Someone", 0),
        ]);
        let tag = parse(&file).unwrap();
        assert_eq!(
            tag.tags.get("Title"),
            Some(&TagValue::Text(vec!["A Song".to_string()]))
        );
        assert_eq!(
            tag.tags.get("Artist"),
            Some(&TagValue::Text(vec!["Someone".to_string()]))
        );
        assert!(!tag.embedded_header);
    }

    #[test]
    fn test_multi_value_text() {
        let file = tagged_file(&[item("Genre", b"Jazz\x00Swing", 0)]);
        let tag = parse(&file).unwrap();
        assert_eq!(
            tag.tags.get("Genre"),
            Some(&TagValue::Text(vec![
                "Jazz".to_string(),
                "Swing".to_string()
            ]))
        );
    }

    #[test]
    fn test_binary_item_digest() {
        // flag bits 1..2 = 1 selects binary
        let file = tagged_file(&[item("Cover Art (Front)", b"\x89PNGdata", 1 << 1)]);
        let tag = parse(&file).unwrap();
        let digest = tag.tags.get("Cover Art (Front)").unwrap().as_binary().unwrap();
        assert_eq!(digest.size, 8);
        assert!(digest.mime.is_none());
    }

    #[test]
    fn test_embedded_preamble_stops_walk() {
        let mut items = vec![item("Title", b"Kept", 0)];
        // a header record where the next item should be
        let mut bogus = Vec::new();
        bogus.extend_from_slice(PREAMBLE);
        bogus.extend_from_slice(&[0u8; 24]);
        items.push(bogus);
        items.push(item("Artist", b"Lost", 0));
        let file = tagged_file(&items);

        let tag = parse(&file).unwrap();
        assert!(tag.embedded_header);
        assert!(tag.tags.contains_key("Title"));
        assert!(!tag.tags.contains_key("Artist"));
    }

    #[test]
    fn test_item_count_ceiling() {
        // declared count exceeds the actual items; the walk just stops
        let body = item("Title", b"One", 0);
        let size = (body.len() + 32) as u32;
        let mut file = body;
        file.extend_from_slice(&footer(size, 99));
        let tag = parse(&file).unwrap();
        assert_eq!(tag.tags.len(), 1);
    }

    #[test]
    fn test_oversized_declaration_is_error() {
        let mut file = b"tiny".to_vec();
        file.extend_from_slice(&footer(5000, 1));
        let options = ParseOptions::default();
        let mut reader = WindowedReader::from_slice(&file, &options);
        let err = parse_apev2_footer(&mut reader, &options).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidTagPayload);
    }

    #[test]
    fn test_header_led_tag() {
        let items = [item("Album", b"Standalone", 0)].concat();
        let size = (items.len() + 32) as u32;
        let mut file = Vec::new();
        let mut header = footer(size, 1);
        header[20..24].copy_from_slice(&(1u32 << 29 | 1 << 31).to_le_bytes());
        file.extend_from_slice(&header);
        file.extend_from_slice(&items);
        file.extend_from_slice(&footer(size, 1));

        let options = ParseOptions::default();
        let mut reader = WindowedReader::from_slice(&file, &options);
        let tag = parse_apev2_from_header(&mut reader, 0, &options)
            .unwrap()
            .unwrap();
        assert_eq!(
            tag.tags.get("Album"),
            Some(&TagValue::Text(vec!["Standalone".to_string()]))
        );
    }
}
