//! Format detection by magic bytes and filename extension
//!
//! Scoring is advisory: the parser chosen from a candidate may still
//! reject the input through its own `can_parse` check. Higher scores mean
//! more specific signals; the extension contributes a small bump on top
//! of whatever the magic bytes say.

use std::collections::BTreeMap;

use crate::metadata::AudioFormat;

/// A probed format with its confidence score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub format: AudioFormat,
    pub score: u32,
}

/// ASF header object GUID, stored little-endian on the wire
const ASF_HEADER_GUID: [u8; 16] = [
    0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11, 0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE,
    0x6C,
];

/// Exact-prefix magics worth a definitive score
const PREFIX_MAGICS: &[(&[u8], AudioFormat)] = &[
    (b"wvpk", AudioFormat::Wavpack),
    (b"MPCK", AudioFormat::Musepack),
    (b"MAC ", AudioFormat::MonkeysAudio),
    (b"TTA1", AudioFormat::TrueAudio),
    (b"DSD ", AudioFormat::Dsf),
    (b"FRM8", AudioFormat::Dsdiff),
    (b"MThd", AudioFormat::Smf),
    (b"OFR ", AudioFormat::OptimFrog),
    (b"tBaK", AudioFormat::Tak),
];

/// Score formats against a header prefix and optional filename hint
///
/// Returns candidates in descending score order; ties break by format
/// name ascending.
pub fn probe_candidates(header: &[u8], name_hint: Option<&str>) -> Vec<Candidate> {
    let mut scores: BTreeMap<AudioFormat, u32> = BTreeMap::new();
    let mut bump = |format: AudioFormat, score: u32| {
        *scores.entry(format).or_insert(0) += score;
    };

    if header.len() >= 3 && &header[0..3] == b"ID3" {
        bump(AudioFormat::Mp3, 80);
        bump(AudioFormat::Id3, 60);
    }
    if header.starts_with(b"fLaC") {
        bump(AudioFormat::Flac, 100);
    }
    if header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WAVE" {
        bump(AudioFormat::Wave, 100);
    }
    if header.len() >= 12
        && &header[0..4] == b"FORM"
        && (&header[8..12] == b"AIFF" || &header[8..12] == b"AIFC")
    {
        bump(AudioFormat::Aiff, 100);
    }
    if header.starts_with(b"OggS") {
        bump(AudioFormat::Ogg, 60);
    }
    if header.len() >= 8 && &header[4..8] == b"ftyp" {
        bump(AudioFormat::Mp4, 95);
        bump(AudioFormat::M4a, 95);
    }
    if header.len() >= 16 && header[0..16] == ASF_HEADER_GUID {
        bump(AudioFormat::Asf, 100);
    }
    for (magic, format) in PREFIX_MAGICS {
        if header.starts_with(magic) {
            bump(*format, 100);
        }
    }
    if header.starts_with(b"APET") {
        bump(AudioFormat::Apev2, 90);
    }
    if header.len() >= 2 && header[0] == 0xFF && (header[1] & 0xF0) == 0xF0 {
        bump(AudioFormat::Aac, 65);
        bump(AudioFormat::Mp3, 30);
    }
    if header.len() >= 2 && header[0] == 0x0B && header[1] == 0x77 {
        bump(AudioFormat::Ac3, 100);
        bump(AudioFormat::Eac3, 100);
    }

    if let Some(ext) = extension_of(name_hint) {
        for format in AudioFormat::all() {
            if format.extensions().contains(&ext.as_str()) {
                bump(*format, 25);
            }
        }
    }

    let mut candidates: Vec<Candidate> = scores
        .into_iter()
        .map(|(format, score)| Candidate { format, score })
        .collect();
    candidates.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.format.name().cmp(b.format.name()))
    });
    candidates
}

fn extension_of(name_hint: Option<&str>) -> Option<String> {
    let (stem, ext) = name_hint?.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}
