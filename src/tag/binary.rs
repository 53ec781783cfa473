//! Binary payload digests

use sha2::{Digest, Sha256};

use crate::metadata::BinaryDigest;
use crate::options::ParseOptions;

/// Build a [`BinaryDigest`] for an embedded payload
///
/// The SHA-256 is always computed; the payload itself is embedded only
/// when `include_binary_data` is set and the payload fits within
/// `max_binary_tag_bytes`.
pub fn build_digest(payload: &[u8], mime: Option<String>, options: &ParseOptions) -> BinaryDigest {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    let sha256 = format!("{:x}", hasher.finalize());

    let data = if options.include_binary_data && payload.len() <= options.max_binary_tag_bytes {
        Some(payload.to_vec())
    } else {
        None
    };

    BinaryDigest {
        size: payload.len() as u64,
        mime,
        sha256,
        data,
    }
}
