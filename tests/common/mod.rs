//! Common test utilities for audioprobe integration tests
//!
//! Byte-level fixture builders for every container the integration suites
//! exercise. Builders produce minimal but structurally valid files.

#![allow(dead_code)]

// ============================================================================
// ID3v2
// ============================================================================

/// Encode a 28-bit value as a synchsafe integer
pub fn synchsafe(value: u32) -> [u8; 4] {
    [
        ((value >> 21) & 0x7F) as u8,
        ((value >> 14) & 0x7F) as u8,
        ((value >> 7) & 0x7F) as u8,
        (value & 0x7F) as u8,
    ]
}

/// One ID3v2.3 frame (plain big-endian size)
pub fn id3_frame(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(id);
    data.extend_from_slice(&(body.len() as u32).to_be_bytes());
    data.extend_from_slice(&[0, 0]);
    data.extend_from_slice(body);
    data
}

/// A UTF-8 text frame body
pub fn utf8_text_body(text: &str) -> Vec<u8> {
    let mut body = vec![3u8];
    body.extend_from_slice(text.as_bytes());
    body
}

/// A complete ID3v2 block
pub fn id3_tag(major: u8, frames: &[u8]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"ID3");
    data.push(major);
    data.push(0);
    data.push(0);
    data.extend_from_slice(&synchsafe(frames.len() as u32));
    data.extend_from_slice(frames);
    data
}

// ============================================================================
// FLAC
// ============================================================================

/// A 34-byte STREAMINFO body
pub fn flac_streaminfo(rate: u32, channels: u32, bits: u32, total_samples: u64) -> Vec<u8> {
    let mut body = vec![0u8; 34];
    body[0..2].copy_from_slice(&4096u16.to_be_bytes());
    body[2..4].copy_from_slice(&4096u16.to_be_bytes());
    body[10] = (rate >> 12) as u8;
    body[11] = (rate >> 4) as u8;
    body[12] =
        (((rate & 0x0F) as u8) << 4) | (((channels - 1) as u8) << 1) | (((bits - 1) >> 4) as u8);
    body[13] = ((((bits - 1) & 0x0F) as u8) << 4) | (((total_samples >> 32) & 0x0F) as u8);
    body[14..18].copy_from_slice(&(total_samples as u32).to_be_bytes());
    body
}

/// One FLAC metadata block
pub fn flac_block(block_type: u8, last: bool, body: &[u8]) -> Vec<u8> {
    let mut data = Vec::new();
    data.push(block_type | if last { 0x80 } else { 0 });
    let len = body.len() as u32;
    data.push((len >> 16) as u8);
    data.push((len >> 8) as u8);
    data.push(len as u8);
    data.extend_from_slice(body);
    data
}

/// A minimal FLAC file: magic + lone STREAMINFO
pub fn minimal_flac() -> Vec<u8> {
    let mut data = b"fLaC".to_vec();
    data.extend_from_slice(&flac_block(0, true, &flac_streaminfo(44100, 2, 16, 441_000)));
    data
}

/// A Vorbis comment packet body (no framing)
pub fn vorbis_comments(comments: &[&str]) -> Vec<u8> {
    let vendor = b"test vendor";
    let mut data = Vec::new();
    data.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    data.extend_from_slice(vendor);
    data.extend_from_slice(&(comments.len() as u32).to_le_bytes());
    for comment in comments {
        data.extend_from_slice(&(comment.len() as u32).to_le_bytes());
        data.extend_from_slice(comment.as_bytes());
    }
    data
}

// ============================================================================
// MP3
// ============================================================================

/// MPEG-1 Layer III, 128 kbps, 44100 Hz, joint stereo frame header
pub const MP3_FRAME_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0x40];

/// A VBR MP3: empty ID3v2 block, then a frame with a
/// Xing header carrying a frame and byte count
pub fn mp3_with_xing(frame_count: u32, byte_count: u32) -> Vec<u8> {
    let mut data = id3_tag(3, &[]); // 10-byte header, size 0
    data.extend_from_slice(&MP3_FRAME_HEADER);
    data.extend_from_slice(&[0u8; 32]); // stereo MPEG-1 side info
    data.extend_from_slice(b"Xing");
    data.extend_from_slice(&3u32.to_be_bytes()); // frames + bytes flags
    data.extend_from_slice(&frame_count.to_be_bytes());
    data.extend_from_slice(&byte_count.to_be_bytes());
    data.extend_from_slice(&vec![0u8; 256]);
    data
}

// ============================================================================
// WAVE
// ============================================================================

pub fn riff_chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(id);
    data.extend_from_slice(&(body.len() as u32).to_le_bytes());
    data.extend_from_slice(body);
    if body.len() % 2 != 0 {
        data.push(0);
    }
    data
}

pub fn wave_fmt(channels: u16, rate: u32, bits: u16) -> Vec<u8> {
    let mut body = vec![0u8; 16];
    body[0..2].copy_from_slice(&1u16.to_le_bytes());
    body[2..4].copy_from_slice(&channels.to_le_bytes());
    body[4..8].copy_from_slice(&rate.to_le_bytes());
    let byte_rate = rate * channels as u32 * bits as u32 / 8;
    body[8..12].copy_from_slice(&byte_rate.to_le_bytes());
    body[12..14].copy_from_slice(&(channels * bits / 8).to_le_bytes());
    body[14..16].copy_from_slice(&bits.to_le_bytes());
    riff_chunk(b"fmt ", &body)
}

/// A PCM WAVE file with a zero-filled data chunk of the given size
pub fn wave_pcm(channels: u16, rate: u32, bits: u16, data_size: usize) -> Vec<u8> {
    let chunks = [
        wave_fmt(channels, rate, bits),
        riff_chunk(b"data", &vec![0u8; data_size]),
    ]
    .concat();
    let mut data = Vec::new();
    data.extend_from_slice(b"RIFF");
    data.extend_from_slice(&((chunks.len() + 4) as u32).to_le_bytes());
    data.extend_from_slice(b"WAVE");
    data.extend_from_slice(&chunks);
    data
}

// ============================================================================
// Ogg
// ============================================================================

/// One Ogg page carrying whole packets (segments derived automatically)
pub fn ogg_page(serial: u32, seq: u32, granule: u64, header_type: u8, packets: &[&[u8]]) -> Vec<u8> {
    let mut segments = Vec::new();
    let mut payload = Vec::new();
    for packet in packets {
        let mut remaining = packet.len();
        loop {
            let seg = remaining.min(255);
            segments.push(seg as u8);
            remaining -= seg;
            if seg < 255 {
                break;
            }
        }
        payload.extend_from_slice(packet);
    }

    let mut data = Vec::new();
    data.extend_from_slice(b"OggS");
    data.push(0);
    data.push(header_type);
    data.extend_from_slice(&granule.to_le_bytes());
    data.extend_from_slice(&serial.to_le_bytes());
    data.extend_from_slice(&seq.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.push(segments.len() as u8);
    data.extend_from_slice(&segments);
    data.extend_from_slice(&payload);
    data
}

pub fn opus_head(channels: u8, pre_skip: u16) -> Vec<u8> {
    let mut packet = b"OpusHead".to_vec();
    packet.push(1);
    packet.push(channels);
    packet.extend_from_slice(&pre_skip.to_le_bytes());
    packet.extend_from_slice(&48000u32.to_le_bytes());
    packet.extend_from_slice(&[0, 0, 0]);
    packet
}

pub fn opus_tags(comments: &[&str]) -> Vec<u8> {
    let mut packet = b"OpusTags".to_vec();
    packet.extend_from_slice(&vorbis_comments(comments));
    packet
}

/// An Ogg Opus stream ending at the given granule
pub fn ogg_opus(channels: u8, pre_skip: u16, final_granule: u64) -> Vec<u8> {
    let mut data = ogg_page(4242, 0, 0, 0x02, &[&opus_head(channels, pre_skip)]);
    data.extend_from_slice(&ogg_page(4242, 1, 0, 0, &[&opus_tags(&["title=Fixture"])]));
    data.extend_from_slice(&ogg_page(4242, 2, final_granule, 0x04, &[b"audio"]));
    data
}

// ============================================================================
// MP4 / M4A
// ============================================================================

pub fn mp4_atom(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&((body.len() + 8) as u32).to_be_bytes());
    data.extend_from_slice(kind);
    data.extend_from_slice(body);
    data
}

fn mp4_data_atom(type_code: u32, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&type_code.to_be_bytes());
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(payload);
    mp4_atom(b"data", &body)
}

/// An m4a with one audio track and the given ilst items
pub fn m4a_file(ilst_items: &[Vec<u8>]) -> Vec<u8> {
    let mut entry = vec![0u8; 36];
    entry[0..4].copy_from_slice(&36u32.to_be_bytes());
    entry[4..8].copy_from_slice(b"mp4a");
    entry[24..26].copy_from_slice(&2u16.to_be_bytes());
    entry[26..28].copy_from_slice(&16u16.to_be_bytes());
    entry[32..36].copy_from_slice(&(44100u32 << 16).to_be_bytes());
    let mut stsd_body = vec![0u8; 8];
    stsd_body[4..8].copy_from_slice(&1u32.to_be_bytes());
    stsd_body.extend_from_slice(&entry);

    let mut mdhd_body = vec![0u8; 24];
    mdhd_body[12..16].copy_from_slice(&44100u32.to_be_bytes());
    mdhd_body[16..20].copy_from_slice(&441_000u32.to_be_bytes());

    let mut hdlr_body = vec![0u8; 24];
    hdlr_body[8..12].copy_from_slice(b"soun");

    let stbl = mp4_atom(b"stbl", &mp4_atom(b"stsd", &stsd_body));
    let minf = mp4_atom(b"minf", &stbl);
    let mdia_body = [
        mp4_atom(b"hdlr", &hdlr_body),
        mp4_atom(b"mdhd", &mdhd_body),
        minf,
    ]
    .concat();
    let trak = mp4_atom(b"trak", &mp4_atom(b"mdia", &mdia_body));

    let ilst = mp4_atom(b"ilst", &ilst_items.concat());
    let mut meta_body = vec![0u8; 4];
    meta_body.extend_from_slice(&ilst);
    let udta = mp4_atom(b"udta", &mp4_atom(b"meta", &meta_body));

    let moov = mp4_atom(b"moov", &[trak, udta].concat());
    let ftyp = mp4_atom(b"ftyp", b"M4A \x00\x00\x02\x00M4A mp42isom");
    [ftyp, moov].concat()
}

/// An m4a with a JPEG cover item
pub fn m4a_with_covr(jpeg: &[u8]) -> Vec<u8> {
    m4a_file(&[mp4_atom(b"covr", &mp4_data_atom(13, jpeg))])
}

// ============================================================================
// Misc
// ============================================================================

/// Deterministic pseudo-random bytes for fuzzing-style tests
pub fn pseudo_random_bytes(size: usize, seed: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state = seed;
    for _ in 0..size {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        data.push((state >> 56) as u8);
    }
    data
}
