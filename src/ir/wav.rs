//! Minimal RIFF/WAVE decoder.
//!
//! Handles PCM (8-bit unsigned, 16/24/32-bit signed), IEEE float (32/64-bit)
//! and `WAVE_FORMAT_EXTENSIBLE` wrapping either.  Anything else is rejected
//! with [`IrError::UnsupportedAudio`].

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use super::{AudioDecoder, DecodedAudio, IrError};

const FORMAT_PCM:        u16 = 0x0001;
const FORMAT_IEEE_FLOAT: u16 = 0x0003;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

#[derive(Debug, Clone, Copy)]
enum SampleFormat {
    Int(u16),
    Float(u16),
}

#[derive(Debug, Clone, Copy)]
struct Format {
    channels:    u16,
    sample_rate: u32,
    block_align: u16,
    sample:      SampleFormat,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WavDecoder;

impl AudioDecoder for WavDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio, IrError> {
        let mut cur = Cursor::new(bytes);
        let mut riff = [0u8; 4];
        let mut wave = [0u8; 4];
        cur.read_exact(&mut riff).map_err(|_| not_wav())?;
        let _riff_len = cur.read_u32::<LittleEndian>().map_err(|_| not_wav())?;
        cur.read_exact(&mut wave).map_err(|_| not_wav())?;
        if &riff != b"RIFF" || &wave != b"WAVE" {
            return Err(not_wav());
        }

        let mut format = None;
        loop {
            let mut id = [0u8; 4];
            if cur.read_exact(&mut id).is_err() {
                return Err(IrError::Malformed("no data chunk".into()));
            }
            let len = cur.read_u32::<LittleEndian>()? as usize;
            let start = cur.position() as usize;
            let end = start.saturating_add(len).min(bytes.len());
            let body = &bytes[start..end];

            match &id {
                b"fmt " => format = Some(parse_fmt(body)?),
                b"data" => {
                    let fmt = format.ok_or_else(|| IrError::Malformed("data chunk before fmt chunk".into()))?;
                    return decode_samples(&fmt, body);
                }
                _ => {}
            }
            // Chunks are word aligned.
            cur.set_position((end + (len & 1)) as u64);
        }
    }
}

fn not_wav() -> IrError {
    IrError::UnsupportedAudio("not a RIFF/WAVE file".into())
}

fn parse_fmt(body: &[u8]) -> Result<Format, IrError> {
    let mut r = Cursor::new(body);
    let short = |_| IrError::Malformed("fmt chunk too short".into());
    let tag = r.read_u16::<LittleEndian>().map_err(short)?;
    let channels = r.read_u16::<LittleEndian>().map_err(short)?;
    let sample_rate = r.read_u32::<LittleEndian>().map_err(short)?;
    let _byte_rate = r.read_u32::<LittleEndian>().map_err(short)?;
    let block_align = r.read_u16::<LittleEndian>().map_err(short)?;
    let bits = r.read_u16::<LittleEndian>().map_err(short)?;

    let tag = if tag == FORMAT_EXTENSIBLE {
        let _cb_size = r.read_u16::<LittleEndian>().map_err(short)?;
        let _valid_bits = r.read_u16::<LittleEndian>().map_err(short)?;
        let _channel_mask = r.read_u32::<LittleEndian>().map_err(short)?;
        // First two bytes of the sub-format GUID carry the real format tag.
        r.read_u16::<LittleEndian>().map_err(short)?
    } else {
        tag
    };

    let sample = match (tag, bits) {
        (FORMAT_PCM, 8 | 16 | 24 | 32) => SampleFormat::Int(bits),
        (FORMAT_IEEE_FLOAT, 32 | 64)   => SampleFormat::Float(bits),
        _ => {
            return Err(IrError::UnsupportedAudio(format!(
                "format tag {tag:#06x} with {bits} bits per sample"
            )))
        }
    };
    if channels == 0 {
        return Err(IrError::Malformed("zero channels".into()));
    }
    let min_align = channels as usize * (bits as usize / 8);
    if (block_align as usize) < min_align {
        return Err(IrError::Malformed(format!("block align {block_align} below {min_align}")));
    }
    Ok(Format { channels, sample_rate, block_align, sample })
}

fn decode_samples(fmt: &Format, data: &[u8]) -> Result<DecodedAudio, IrError> {
    let n_ch = fmt.channels as usize;
    let frames = data.len() / fmt.block_align as usize;
    let width = match fmt.sample {
        SampleFormat::Int(b) | SampleFormat::Float(b) => b as usize / 8,
    };

    let mut channels = vec![Vec::with_capacity(frames); n_ch];
    for frame in data.chunks_exact(fmt.block_align as usize) {
        for (ch, out) in channels.iter_mut().enumerate() {
            let s = &frame[ch * width..(ch + 1) * width];
            out.push(to_f32(fmt.sample, s));
        }
    }

    Ok(DecodedAudio { sample_rate: fmt.sample_rate as f64, channels })
}

fn to_f32(format: SampleFormat, s: &[u8]) -> f32 {
    match format {
        SampleFormat::Int(8)    => (s[0] as f32 - 128.0) / 128.0,
        SampleFormat::Int(16)   => i16::from_le_bytes([s[0], s[1]]) as f32 / 32_768.0,
        SampleFormat::Int(24)   => {
            let v = i32::from_le_bytes([0, s[0], s[1], s[2]]) >> 8;
            v as f32 / 8_388_608.0
        }
        SampleFormat::Int(_)    => i32::from_le_bytes([s[0], s[1], s[2], s[3]]) as f32 / 2_147_483_648.0,
        SampleFormat::Float(32) => f32::from_le_bytes([s[0], s[1], s[2], s[3]]),
        SampleFormat::Float(_)  => {
            f64::from_le_bytes([s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7]]) as f32
        }
    }
}
