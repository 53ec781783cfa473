//! Tag-vocabulary parsers
//!
//! These are free functions over a reader or a byte slice, invoked by
//! multiple format parsers: MP3, FLAC, AIFF, WAVE, DSF, DSDIFF, TrueAudio
//! and Monkey's Audio all route through the ID3v2 and/or APEv2 decoders
//! here. Keeping them free of any format-parser type avoids an
//! inheritance hierarchy at this seam.

pub mod apev2;
pub mod binary;
pub mod id3v2;
pub mod vorbis;

pub use apev2::{parse_apev2_footer, parse_apev2_from_header, Apev2Tag};
pub use binary::build_digest;
pub use id3v2::{parse_id3v2, parse_synchsafe_int, Id3v2Block};
pub use vorbis::parse_vorbis_comments;

use crate::metadata::{TagMap, TagValue};

/// Merge a decoded Vorbis comment map into `tags`
///
/// Text values for keys already present extend the existing list, so a
/// stream carrying several comment packets keeps every value in order.
pub fn merge_vorbis(tags: &mut TagMap, incoming: TagMap) {
    for (key, value) in incoming {
        match (tags.get_mut(&key), value) {
            (Some(TagValue::Text(existing)), TagValue::Text(values)) => existing.extend(values),
            (Some(_), _) => {}
            (None, value) => {
                tags.insert(key, value);
            }
        }
    }
}

/// Decode Latin-1 bytes, trimming leading/trailing control characters
pub(crate) fn decode_latin1(bytes: &[u8]) -> String {
    let text: String = bytes.iter().map(|&b| b as char).collect();
    text.trim_matches(|c: char| (c as u32) < 0x20).to_string()
}

/// Decode UTF-16 bytes, BOM-aware with a big-endian fallback
///
/// ID3v2 encodings 1 and 2 are both nominally UTF-16 variants (1 with
/// BOM, 2 big-endian); attempting BOM detection first covers both.
pub(crate) fn decode_utf16(bytes: &[u8]) -> String {
    let (data, le) = match bytes {
        [0xFF, 0xFE, rest @ ..] => (rest, true),
        [0xFE, 0xFF, rest @ ..] => (rest, false),
        _ => (bytes, false),
    };

    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| {
            if le {
                u16::from_le_bytes([pair[0], pair[1]])
            } else {
                u16::from_be_bytes([pair[0], pair[1]])
            }
        })
        .collect();

    String::from_utf16_lossy(&units)
}

/// Decode UTF-16LE without a BOM (ASF strings are always little-endian)
pub(crate) fn decode_utf16_le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
        .trim_end_matches('\u{0}')
        .to_string()
}
