//! AC-3 and E-AC-3 sync frame parsing
//!
//! Both share the `0B 77` sync word; the bitstream id at byte 5 picks the
//! layout. bsid 10 and below is classic AC-3 with table-driven bitrate,
//! above 10 (through 16) is E-AC-3 where the bitrate derives from the
//! frame size and block count.

use crate::error::{Error, Result};
use crate::format::{extension_matches, FormatParser, ParseContext};
use crate::metadata::{AudioFormat, ParsedAudioMetadata, TagValue};
use crate::reader::WindowedReader;

const AC3_SAMPLE_RATES: [u32; 3] = [48000, 44100, 32000];
const EAC3_REDUCED_RATES: [u32; 3] = [24000, 22050, 16000];

/// kbps indexed by frmsizecod >> 1
const AC3_BITRATES: [u32; 19] = [
    32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 448, 512, 576, 640,
];

/// Full-bandwidth channels per acmod
const ACMOD_CHANNELS: [u32; 8] = [2, 1, 2, 3, 3, 4, 4, 5];

/// MSB-first bit cursor over a byte slice
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize, // in bits
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8], bit_offset: usize) -> Self {
        BitReader {
            data,
            pos: bit_offset,
        }
    }

    fn read(&mut self, count: usize) -> Option<u32> {
        let mut value = 0u32;
        for _ in 0..count {
            let byte = *self.data.get(self.pos / 8)?;
            let bit = (byte >> (7 - self.pos % 8)) & 1;
            value = (value << 1) | bit as u32;
            self.pos += 1;
        }
        Some(value)
    }

    fn skip(&mut self, count: usize) {
        self.pos += count;
    }
}

pub struct Ac3Parser;

impl FormatParser for Ac3Parser {
    fn format(&self) -> AudioFormat {
        AudioFormat::Ac3
    }

    fn can_parse(&self, header: &[u8], name_hint: Option<&str>) -> bool {
        if header.len() >= 2 && header[0] == 0x0B && header[1] == 0x77 {
            return true;
        }
        extension_matches(name_hint, AudioFormat::Ac3)
            || extension_matches(name_hint, AudioFormat::Eac3)
    }

    fn parse(
        &self,
        reader: &mut WindowedReader,
        _ctx: &ParseContext,
    ) -> Result<ParsedAudioMetadata> {
        let header = reader
            .read_exact(0, 8)
            .map_err(|_| Error::invalid_header("file too short for an AC-3 sync frame"))?;
        if header[0] != 0x0B || header[1] != 0x77 {
            return Err(Error::invalid_header("missing AC-3 sync word"));
        }

        let bsid = header[5] >> 3;
        let mut metadata = if bsid <= 10 {
            decode_ac3(&header)?
        } else if bsid <= 16 {
            decode_eac3(&header)?
        } else {
            return Err(Error::invalid_header(format!("unsupported bsid {}", bsid)));
        };

        metadata
            .extensions
            .insert("bsid".to_string(), TagValue::Int(bsid as i64));

        // the stream is CBR: length follows from the file size
        if let (Some(bitrate), Some(file_len)) = (metadata.core.bitrate, reader.len()) {
            if bitrate > 0 {
                metadata.core.length = Some(file_len as f64 * 8.0 / bitrate as f64);
            }
        }

        Ok(metadata)
    }
}

fn decode_ac3(header: &[u8]) -> Result<ParsedAudioMetadata> {
    let fscod = (header[4] >> 6) as usize;
    if fscod == 3 {
        return Err(Error::invalid_header("reserved AC-3 sample rate code"));
    }
    let frmsizecod = (header[4] & 0x3F) as usize;
    let bitrate_index = frmsizecod >> 1;
    if bitrate_index >= AC3_BITRATES.len() {
        return Err(Error::invalid_header("AC-3 frame size code out of range"));
    }

    let mut metadata = ParsedAudioMetadata::new(AudioFormat::Ac3);
    metadata.core.sample_rate = Some(AC3_SAMPLE_RATES[fscod]);
    metadata.core.bitrate = Some(AC3_BITRATES[bitrate_index] * 1000);

    // acmod is the top three bits of byte 6; the lfeon bit floats behind
    // the mix-level fields whose presence depends on acmod
    let acmod = (header[6] >> 5) as usize;
    let mut bits = BitReader::new(&header[6..], 3);
    if acmod & 0x1 != 0 && acmod != 0x1 {
        bits.skip(2); // cmixlev
    }
    if acmod & 0x4 != 0 {
        bits.skip(2); // surmixlev
    }
    if acmod == 0x2 {
        bits.skip(2); // dsurmod
    }
    let lfeon = bits.read(1).unwrap_or(0);

    metadata.core.channels = Some(ACMOD_CHANNELS[acmod] + lfeon);
    Ok(metadata)
}

fn decode_eac3(header: &[u8]) -> Result<ParsedAudioMetadata> {
    // frmsiz is in 16-bit words minus one
    let frame_bytes = ((((header[2] & 0x07) as u32) << 8 | header[3] as u32) + 1) * 2;

    let fscod = (header[4] >> 6) as usize;
    let (sample_rate, num_blocks) = if fscod == 3 {
        let fscod2 = ((header[4] >> 4) & 0x03) as usize;
        if fscod2 == 3 {
            return Err(Error::invalid_header("reserved E-AC-3 sample rate code"));
        }
        (EAC3_REDUCED_RATES[fscod2], 6u32)
    } else {
        let numblkscod = ((header[4] >> 4) & 0x03) as usize;
        (AC3_SAMPLE_RATES[fscod], [1u32, 2, 3, 6][numblkscod])
    };

    let acmod = ((header[4] >> 1) & 0x07) as usize;
    let lfeon = (header[4] & 0x01) as u32;

    let mut metadata = ParsedAudioMetadata::new(AudioFormat::Eac3);
    metadata.core.sample_rate = Some(sample_rate);
    metadata.core.channels = Some(ACMOD_CHANNELS[acmod] + lfeon);
    metadata.core.bitrate =
        Some((frame_bytes as u64 * 8 * sample_rate as u64 / (num_blocks as u64 * 256)) as u32);
    Ok(metadata)
}
