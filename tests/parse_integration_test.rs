//! End-to-end parse scenarios and cross-cutting invariants
//!
//! Exercises the engine through every public entry point over in-memory
//! fixtures, and pins the invariants that hold across formats: source
//! equivalence, digest stability, the binary-embedding gate, reader
//! bounds and Ogg packet reconstruction.

use std::io::Write;

use audioprobe::reader::WindowedReader;
use audioprobe::source::MemorySource;
use audioprobe::tag::parse_synchsafe_int;
use audioprobe::{AudioFormat, Engine, ErrorKind, ParseOptions, ParsedAudioMetadata, TagValue};

#[path = "common/mod.rs"]
mod common;

use common::*;

// ============================================================================
// Concrete scenarios
// ============================================================================

#[test]
fn test_minimal_flac_scenario() {
    let metadata = Engine::new()
        .parse_bytes(minimal_flac(), Some("a.flac"))
        .unwrap();
    assert_eq!(metadata.format, AudioFormat::Flac);
    assert_eq!(metadata.core.sample_rate, Some(44100));
    assert_eq!(metadata.core.channels, Some(2));
    assert_eq!(metadata.core.bits_per_sample, Some(16));
    assert!((metadata.core.length.unwrap() - 10.0).abs() < 1e-9);
}

#[test]
fn test_id3v2_text_frame_scenario() {
    let tag = id3_tag(3, &id3_frame(b"TIT2", &utf8_text_body("Hi")));
    let metadata = Engine::new().parse_bytes(tag, None).unwrap();
    assert_eq!(
        metadata.tags.get("TIT2"),
        Some(&TagValue::Text(vec!["Hi".to_string()]))
    );
    assert!(!metadata.extensions.contains_key("flac_metadata_truncated"));
}

#[test]
fn test_mp3_xing_vbr_scenario() {
    let metadata = Engine::new()
        .parse_bytes(mp3_with_xing(1000, 200_000), Some("c.mp3"))
        .unwrap();
    assert_eq!(metadata.format, AudioFormat::Mp3);

    let length = metadata.core.length.unwrap();
    assert!((length - 1000.0 * 1152.0 / 44100.0).abs() < 0.01, "{}", length);

    let bitrate = metadata.core.bitrate.unwrap();
    assert!((61_000..61_500).contains(&bitrate), "{}", bitrate);

    assert_eq!(
        metadata.extensions.get("bitrate_mode"),
        Some(&TagValue::Text(vec!["VBR".to_string()]))
    );
}

#[test]
fn test_wave_pcm_scenario() {
    let metadata = Engine::new()
        .parse_bytes(wave_pcm(1, 16000, 16, 32000), Some("d.wav"))
        .unwrap();
    assert_eq!(metadata.format, AudioFormat::Wave);
    assert!((metadata.core.length.unwrap() - 1.0).abs() < 1e-9);
    assert_eq!(metadata.core.bitrate, Some(256_000));
    assert_eq!(metadata.core.bits_per_sample, Some(16));
}

#[test]
fn test_m4a_covr_scenario() {
    let jpeg = b"\xFF\xD8\xFF\xE0 fixture cover art payload";

    // default options: digest only
    let metadata = Engine::new()
        .parse_bytes(m4a_with_covr(jpeg), Some("e.m4a"))
        .unwrap();
    let digest = metadata.tags.get("covr").unwrap().as_binary().unwrap();
    assert!(digest.size > 0);
    assert!(digest.data.is_none());

    // embedding enabled and within bounds: payload included
    let engine = Engine::with_options(ParseOptions {
        include_binary_data: true,
        max_binary_tag_bytes: 4 * 1024 * 1024,
        ..ParseOptions::default()
    });
    let metadata = engine
        .parse_bytes(m4a_with_covr(jpeg), Some("e.m4a"))
        .unwrap();
    let digest = metadata.tags.get("covr").unwrap().as_binary().unwrap();
    assert_eq!(digest.data.as_ref().unwrap().len() as u64, digest.size);
}

#[test]
fn test_ogg_opus_scenario() {
    let metadata = Engine::new()
        .parse_bytes(ogg_opus(2, 312, 1_440_312), Some("f.opus"))
        .unwrap();
    assert_eq!(metadata.format, AudioFormat::OggOpus);
    assert!((metadata.core.length.unwrap() - 30.0).abs() < 1e-9);
    assert_eq!(metadata.core.channels, Some(2));
}

// ============================================================================
// Source equivalence
// ============================================================================

fn assert_equivalent(a: &ParsedAudioMetadata, b: &ParsedAudioMetadata) {
    assert_eq!(a.format, b.format);
    assert_eq!(a.core, b.core);
    assert_eq!(a.tags, b.tags);
    assert_eq!(a.extensions, b.extensions);
}

#[test]
fn test_source_equivalence() {
    let fixtures: Vec<(Vec<u8>, &str)> = vec![
        (minimal_flac(), "x.flac"),
        (mp3_with_xing(500, 100_000), "x.mp3"),
        (wave_pcm(2, 44100, 16, 44100), "x.wav"),
        (ogg_opus(2, 0, 480_000), "x.opus"),
        (m4a_with_covr(b"\xFF\xD8cover"), "x.m4a"),
    ];

    let engine = Engine::new();
    for (bytes, name) in fixtures {
        let suffix = format!(".{}", name.rsplit('.').next().unwrap());
        let mut file = tempfile::Builder::new().suffix(&suffix).tempfile().unwrap();
        file.write_all(&bytes).unwrap();

        let from_path = engine.parse_path(file.path()).unwrap();
        let from_bytes = engine.parse_bytes(bytes.clone(), Some(name)).unwrap();
        let from_stream = engine.parse_stream(&bytes[..], Some(name)).unwrap();

        assert_equivalent(&from_path, &from_bytes);
        assert_equivalent(&from_bytes, &from_stream);
    }
}

// ============================================================================
// Digest stability and the embedding gate
// ============================================================================

#[test]
fn test_digest_independent_of_embedding() {
    let jpeg = b"\xFF\xD8\xFF\xE0 stable digest payload";
    let file = m4a_with_covr(jpeg);

    let plain = Engine::new().parse_bytes(file.clone(), None).unwrap();
    let embedded = Engine::with_options(ParseOptions {
        include_binary_data: true,
        ..ParseOptions::default()
    })
    .parse_bytes(file, None)
    .unwrap();

    let plain_digest = plain.tags.get("covr").unwrap().as_binary().unwrap();
    let embedded_digest = embedded.tags.get("covr").unwrap().as_binary().unwrap();
    assert_eq!(plain_digest.sha256, embedded_digest.sha256);
    assert_eq!(plain_digest.size, embedded_digest.size);
}

#[test]
fn test_embedding_gate_size_cap() {
    let jpeg = vec![0xABu8; 256];
    let file = m4a_with_covr(&jpeg);

    // cap below the payload size: digest only
    let engine = Engine::with_options(ParseOptions {
        include_binary_data: true,
        max_binary_tag_bytes: 100,
        ..ParseOptions::default()
    });
    let metadata = engine.parse_bytes(file.clone(), None).unwrap();
    assert!(metadata.tags.get("covr").unwrap().as_binary().unwrap().data.is_none());

    // cap at the payload size: embedded
    let engine = Engine::with_options(ParseOptions {
        include_binary_data: true,
        max_binary_tag_bytes: 256,
        ..ParseOptions::default()
    });
    let metadata = engine.parse_bytes(file, None).unwrap();
    assert!(metadata.tags.get("covr").unwrap().as_binary().unwrap().data.is_some());
}

// ============================================================================
// Reader bounds and caching
// ============================================================================

#[test]
fn test_read_bound_enforced_without_io() {
    let options = ParseOptions::default();
    let mut reader = WindowedReader::new(
        Box::new(MemorySource::new(vec![0u8; 1024], None)),
        &options,
    );
    let err = reader
        .read(0, options.effective_max_read_bytes() + 1)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::IoFailure);
    assert_eq!(reader.bytes_read(), 0);
}

#[test]
fn test_window_cache_serves_second_read() {
    let options = ParseOptions::default();
    let mut reader = WindowedReader::new(
        Box::new(MemorySource::new(pseudo_random_bytes(8192, 7), None)),
        &options,
    );
    let first = reader.read(100, 64).unwrap();
    let fetched = reader.bytes_read();
    let second = reader.read(100, 64).unwrap();
    assert_eq!(first, second);
    assert_eq!(reader.bytes_read(), fetched);
}

// ============================================================================
// Synchsafe round trip
// ============================================================================

#[test]
fn test_synchsafe_round_trip_random() {
    let mut state = 0x1234_5678_9ABC_DEF0u64;
    for _ in 0..1000 {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let value = (state >> 32) as u32 & 0x0FFF_FFFF;
        assert_eq!(parse_synchsafe_int(synchsafe(value)), value);
    }
}

// ============================================================================
// Vorbis comment semantics
// ============================================================================

#[test]
fn test_vorbis_keys_uppercased_and_multivalued() {
    let mut data = b"fLaC".to_vec();
    data.extend_from_slice(&flac_block(0, false, &flac_streaminfo(44100, 2, 16, 0)));
    data.extend_from_slice(&flac_block(
        4,
        true,
        &vorbis_comments(&["genre=Jazz", "Genre=Swing", "artist=Solo"]),
    ));

    let metadata = Engine::new().parse_bytes(data, Some("v.flac")).unwrap();
    for key in metadata.tags.keys() {
        assert_eq!(key, &key.to_uppercase());
    }
    assert_eq!(
        metadata.tags.get("GENRE"),
        Some(&TagValue::Text(vec!["Jazz".to_string(), "Swing".to_string()]))
    );
}

// ============================================================================
// Ogg packet reconstruction
// ============================================================================

#[test]
fn test_packet_reconstruction_across_pages() {
    // an OpusTags packet of 255 + 255 + 90 bytes split across two pages
    // one comment whose length pads the whole packet to exactly 600 bytes
    // (8 extra bytes per comment: 4-byte length prefix + "pad=")
    let empty_len = opus_tags(&[]).len();
    let padding = "p".repeat(600 - empty_len - 8);
    let padded = format!("pad={}", padding);
    let comments = opus_tags(&[&padded]);
    assert_eq!(comments.len(), 600);

    let mut data = ogg_page(1, 0, 0, 0x02, &[&opus_head(2, 0)]);

    // page with the first 510 bytes in two 255 segments (continues)
    let mut p1 = Vec::new();
    p1.extend_from_slice(b"OggS");
    p1.push(0);
    p1.push(0);
    p1.extend_from_slice(&u64::MAX.to_le_bytes());
    p1.extend_from_slice(&1u32.to_le_bytes());
    p1.extend_from_slice(&1u32.to_le_bytes());
    p1.extend_from_slice(&0u32.to_le_bytes());
    p1.push(2);
    p1.push(255);
    p1.push(255);
    p1.extend_from_slice(&comments[..510]);
    data.extend_from_slice(&p1);

    // closing page with the 90-byte tail
    let mut p2 = Vec::new();
    p2.extend_from_slice(b"OggS");
    p2.push(0);
    p2.push(0x01); // continuation
    p2.extend_from_slice(&0u64.to_le_bytes());
    p2.extend_from_slice(&1u32.to_le_bytes());
    p2.extend_from_slice(&2u32.to_le_bytes());
    p2.extend_from_slice(&0u32.to_le_bytes());
    p2.push(1);
    p2.push(90);
    p2.extend_from_slice(&comments[510..]);
    data.extend_from_slice(&p2);

    data.extend_from_slice(&ogg_page(1, 3, 48_000, 0x04, &[b"x"]));

    let metadata = Engine::new().parse_bytes(data, None).unwrap();
    assert_eq!(metadata.format, AudioFormat::OggOpus);
    // the reassembled comment packet decoded cleanly
    let value = metadata.tags.get("PAD").unwrap().as_text().unwrap();
    assert_eq!(value[0].len(), padding.len());
}

// ============================================================================
// Options
// ============================================================================

#[test]
fn test_parse_tags_disabled_keeps_core_info() {
    let engine = Engine::with_options(ParseOptions {
        parse_tags: false,
        ..ParseOptions::default()
    });

    let mut data = b"fLaC".to_vec();
    data.extend_from_slice(&flac_block(0, false, &flac_streaminfo(48000, 2, 24, 480_000)));
    data.extend_from_slice(&flac_block(4, true, &vorbis_comments(&["title=Hidden"])));

    let metadata = engine.parse_bytes(data, Some("t.flac")).unwrap();
    assert!(metadata.tags.is_empty());
    assert_eq!(metadata.core.sample_rate, Some(48000));
    assert!((metadata.core.length.unwrap() - 10.0).abs() < 1e-9);
}

#[test]
fn test_diagnostics_populated() {
    let metadata = Engine::new()
        .parse_bytes(minimal_flac(), Some("d.flac"))
        .unwrap();
    assert_eq!(metadata.diagnostics.parser_name, "flac");
    assert!(metadata.diagnostics.bytes_read >= minimal_flac().len() as u64);
}

#[test]
fn test_json_round_trip_shape() {
    let metadata = Engine::new()
        .parse_bytes(minimal_flac(), Some("j.flac"))
        .unwrap();
    let json = metadata.to_json().unwrap();
    assert!(json.contains("\"format\": \"flac\""));
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["core"]["sample_rate"], 44100);
}
