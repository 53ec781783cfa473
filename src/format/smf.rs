//! Standard MIDI File parsing
//!
//! Duration is musical, not sampled: delta ticks convert to seconds
//! through the tempo map (`FF 51` meta events, microseconds per quarter
//! note) against the ticks-per-quarter division from the header. Tempo
//! events from every track merge into one map; the longest track decides
//! the length.

use crate::error::{Error, Result};
use crate::format::{extension_matches, FormatParser, ParseContext};
use crate::metadata::{AudioFormat, ParsedAudioMetadata, TagValue};
use crate::reader::WindowedReader;

/// Default tempo: 120 bpm
const DEFAULT_TEMPO: u32 = 500_000;

pub struct SmfParser;

impl FormatParser for SmfParser {
    fn format(&self) -> AudioFormat {
        AudioFormat::Smf
    }

    fn can_parse(&self, header: &[u8], name_hint: Option<&str>) -> bool {
        header.starts_with(b"MThd") || extension_matches(name_hint, AudioFormat::Smf)
    }

    fn parse(
        &self,
        reader: &mut WindowedReader,
        _ctx: &ParseContext,
    ) -> Result<ParsedAudioMetadata> {
        let header = reader
            .read_exact(0, 14)
            .map_err(|_| Error::invalid_header("file too short for an MThd header"))?;
        if &header[0..4] != b"MThd" {
            return Err(Error::invalid_header("missing MThd magic"));
        }

        let header_len = u32::from_be_bytes(header[4..8].try_into().expect("4-byte slice"));
        let format = u16::from_be_bytes([header[8], header[9]]);
        let track_count = u16::from_be_bytes([header[10], header[11]]);
        let division = u16::from_be_bytes([header[12], header[13]]);

        let mut metadata = ParsedAudioMetadata::new(AudioFormat::Smf);
        metadata
            .extensions
            .insert("version".to_string(), TagValue::Int(format as i64));
        metadata
            .extensions
            .insert("tracks".to_string(), TagValue::Int(track_count as i64));

        if division & 0x8000 != 0 {
            metadata.warn("SMPTE division timing not supported".to_string());
            return Ok(metadata);
        }
        let ticks_per_quarter = division as u64;

        let mut tempos: Vec<(u64, u32)> = Vec::new();
        let mut max_tick = 0u64;
        let mut pos = 8 + header_len as u64;

        loop {
            let chunk_header = reader.read(pos, 8)?;
            if chunk_header.is_empty() {
                break;
            }
            if chunk_header.len() < 8 {
                metadata.warn("trailing bytes too short for a chunk header".to_string());
                break;
            }
            let chunk_size = u32::from_be_bytes(
                chunk_header[4..8].try_into().expect("4-byte slice"),
            ) as u64;

            if &chunk_header[0..4] == b"MTrk" {
                let body = reader.read(pos + 8, chunk_size as usize)?;
                let (end_tick, mut track_tempos) = walk_track(&body);
                max_tick = max_tick.max(end_tick);
                tempos.append(&mut track_tempos);
            }
            pos += 8 + chunk_size;
        }

        if ticks_per_quarter > 0 && max_tick > 0 {
            tempos.sort_by_key(|&(tick, _)| tick);
            metadata.core.length = Some(tempo_map_seconds(&tempos, max_tick, ticks_per_quarter));
        }

        Ok(metadata)
    }
}

/// Walk one track's events; returns its end tick and tempo changes
fn walk_track(body: &[u8]) -> (u64, Vec<(u64, u32)>) {
    let mut pos = 0usize;
    let mut tick = 0u64;
    let mut tempos = Vec::new();
    let mut running_status = 0u8;

    while pos < body.len() {
        let Some(delta) = read_varlen(body, &mut pos) else {
            break;
        };
        tick += delta;

        let Some(&first) = body.get(pos) else {
            break;
        };
        let status = if first & 0x80 != 0 {
            pos += 1;
            first
        } else {
            running_status
        };

        match status {
            0xFF => {
                let Some(&meta_type) = body.get(pos) else {
                    break;
                };
                pos += 1;
                let Some(len) = read_varlen(body, &mut pos) else {
                    break;
                };
                if meta_type == 0x51 && len == 3 {
                    if let Some(data) = body.get(pos..pos + 3) {
                        let tempo = ((data[0] as u32) << 16)
                            | ((data[1] as u32) << 8)
                            | data[2] as u32;
                        tempos.push((tick, tempo));
                    }
                }
                pos += len as usize;
                if meta_type == 0x2F {
                    break; // end of track
                }
            }
            0xF0 | 0xF7 => {
                let Some(len) = read_varlen(body, &mut pos) else {
                    break;
                };
                pos += len as usize;
            }
            0x80..=0xEF => {
                running_status = status;
                let data_bytes = match status & 0xF0 {
                    0xC0 | 0xD0 => 1,
                    _ => 2,
                };
                pos += data_bytes;
            }
            _ => break, // no running status to apply
        }
    }

    (tick, tempos)
}

/// Integrate ticks through the tempo map into seconds
fn tempo_map_seconds(tempos: &[(u64, u32)], end_tick: u64, ticks_per_quarter: u64) -> f64 {
    let mut seconds = 0.0;
    let mut last_tick = 0u64;
    let mut tempo = DEFAULT_TEMPO;

    for &(tick, next_tempo) in tempos {
        let tick = tick.min(end_tick);
        seconds += (tick - last_tick) as f64 / ticks_per_quarter as f64 * tempo as f64 / 1e6;
        last_tick = tick;
        tempo = next_tempo;
    }
    seconds += (end_tick - last_tick) as f64 / ticks_per_quarter as f64 * tempo as f64 / 1e6;
    seconds
}

/// MIDI variable-length quantity: 7 bits per byte, MSB is continuation
fn read_varlen(body: &[u8], pos: &mut usize) -> Option<u64> {
    let mut value = 0u64;
    for _ in 0..4 {
        let byte = *body.get(*pos)?;
        *pos += 1;
        value = (value << 7) | (byte & 0x7F) as u64;
        if byte & 0x80 == 0 {
            return Some(value);
        }
    }
    None
}
