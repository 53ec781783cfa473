//! Vorbis comment packet decoding
//!
//! Used by the FLAC parser (VORBIS_COMMENT block) and the whole Ogg
//! family. Keys are uppercased because the Vorbis spec declares them
//! case-insensitive; repeated keys become a multi-value list preserving
//! packet order.

use crate::error::{Error, Result};
use crate::metadata::{TagMap, TagValue};

/// Decode a Vorbis comment packet (vendor string + key=value list)
pub fn parse_vorbis_comments(data: &[u8]) -> Result<TagMap> {
    let mut cursor = Cursor { data, pos: 0 };

    let vendor_len = cursor.u32_le()? as usize;
    cursor.skip(vendor_len)?;

    let count = cursor.u32_le()?;
    let mut tags = TagMap::new();

    for _ in 0..count {
        let len = cursor.u32_le()? as usize;
        let entry = cursor.take(len)?;
        let entry = String::from_utf8_lossy(entry);

        let Some((key, value)) = entry.split_once('=') else {
            continue; // comment without a separator carries nothing
        };
        let key = key.to_uppercase();

        match tags.get_mut(&key) {
            Some(TagValue::Text(values)) => values.push(value.to_string()),
            _ => {
                tags.insert(key, TagValue::text(value));
            }
        }
    }

    Ok(tags)
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn u32_le(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&e| e <= self.data.len())
            .ok_or_else(|| {
                Error::invalid_tag_payload("Vorbis comment packet ends inside a field")
                    .with_offset(self.pos as u64)
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }
}
