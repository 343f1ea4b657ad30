//! AIFF and AIFF-C decoder.
//!
//! Big-endian signed PCM of 8 to 32 bits, plus the AIFF-C compression types
//! `NONE`/`twos` (big-endian PCM), `sowt` (little-endian PCM) and
//! `fl32`/`fl64` (IEEE float).  Anything else is [`IrError::UnsupportedAudio`].

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use super::{AudioDecoder, DecodedAudio, IrError};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Encoding {
    IntBe,
    IntLe,
    Float32,
    Float64,
}

#[derive(Debug, Clone, Copy)]
struct Common {
    channels:    u16,
    frames:      u32,
    bits:        u16,
    sample_rate: f64,
    encoding:    Encoding,
}

impl Common {
    fn sample_width(&self) -> usize {
        match self.encoding {
            Encoding::Float32                 => 4,
            Encoding::Float64                 => 8,
            Encoding::IntBe | Encoding::IntLe => (self.bits as usize).div_ceil(8),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AiffDecoder;

impl AudioDecoder for AiffDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio, IrError> {
        let mut cur = Cursor::new(bytes);
        let mut form = [0u8; 4];
        let mut kind = [0u8; 4];
        cur.read_exact(&mut form).map_err(|_| not_aiff())?;
        let _form_len = cur.read_u32::<BigEndian>().map_err(|_| not_aiff())?;
        cur.read_exact(&mut kind).map_err(|_| not_aiff())?;
        let is_aifc = match (&form, &kind) {
            (b"FORM", b"AIFF") => false,
            (b"FORM", b"AIFC") => true,
            _ => return Err(not_aiff()),
        };

        let mut common = None;
        loop {
            let mut id = [0u8; 4];
            if cur.read_exact(&mut id).is_err() {
                return Err(IrError::Malformed("no SSND chunk".into()));
            }
            let len = cur.read_u32::<BigEndian>()? as usize;
            let start = cur.position() as usize;
            let end = start.saturating_add(len).min(bytes.len());
            let body = &bytes[start..end];

            match &id {
                b"COMM" => common = Some(parse_comm(body, is_aifc)?),
                b"SSND" => {
                    let comm = common.ok_or_else(|| IrError::Malformed("SSND chunk before COMM chunk".into()))?;
                    return decode_ssnd(&comm, body);
                }
                _ => {}
            }
            // Chunks are padded to an even length.
            cur.set_position((end + (len & 1)) as u64);
        }
    }
}

fn not_aiff() -> IrError {
    IrError::UnsupportedAudio("not an AIFF/AIFF-C file".into())
}

fn parse_comm(body: &[u8], is_aifc: bool) -> Result<Common, IrError> {
    let mut r = Cursor::new(body);
    let short = |_| IrError::Malformed("COMM chunk too short".into());
    let channels = r.read_u16::<BigEndian>().map_err(short)?;
    let frames = r.read_u32::<BigEndian>().map_err(short)?;
    let bits = r.read_u16::<BigEndian>().map_err(short)?;
    let mut rate = [0u8; 10];
    r.read_exact(&mut rate).map_err(short)?;

    let encoding = if is_aifc {
        let mut tag = [0u8; 4];
        r.read_exact(&mut tag).map_err(short)?;
        match &tag {
            b"NONE" | b"twos" => Encoding::IntBe,
            b"sowt"           => Encoding::IntLe,
            b"fl32" | b"FL32" => Encoding::Float32,
            b"fl64" | b"FL64" => Encoding::Float64,
            other => {
                return Err(IrError::UnsupportedAudio(format!(
                    "AIFF-C compression {:?}",
                    String::from_utf8_lossy(other)
                )))
            }
        }
    } else {
        Encoding::IntBe
    };

    if channels == 0 {
        return Err(IrError::Malformed("zero channels".into()));
    }
    if matches!(encoding, Encoding::IntBe | Encoding::IntLe) && !(1..=32).contains(&bits) {
        return Err(IrError::UnsupportedAudio(format!("{bits} bits per sample")));
    }
    Ok(Common {
        channels,
        frames,
        bits,
        sample_rate: extended_to_f64(&rate),
        encoding,
    })
}

/// IEEE 754 80-bit extended (big-endian, explicit integer bit) to `f64`.
fn extended_to_f64(b: &[u8; 10]) -> f64 {
    let sign = if b[0] & 0x80 != 0 { -1.0 } else { 1.0 };
    let exponent = (((b[0] & 0x7F) as i32) << 8) | b[1] as i32;
    let mantissa = b[2..].iter().fold(0u64, |m, &x| (m << 8) | x as u64);
    if exponent == 0 && mantissa == 0 {
        return 0.0;
    }
    sign * mantissa as f64 * 2f64.powi(exponent - 16_383 - 63)
}

fn decode_ssnd(comm: &Common, body: &[u8]) -> Result<DecodedAudio, IrError> {
    let mut r = Cursor::new(body);
    let short = |_| IrError::Malformed("SSND chunk too short".into());
    let offset = r.read_u32::<BigEndian>().map_err(short)? as usize;
    let _block_size = r.read_u32::<BigEndian>().map_err(short)?;
    let data = body.get(8 + offset..).unwrap_or(&[]);

    let n_ch = comm.channels as usize;
    let width = comm.sample_width();
    let frame_len = n_ch * width;
    let frames = (comm.frames as usize).min(data.len() / frame_len);

    let mut channels = vec![Vec::with_capacity(frames); n_ch];
    for frame in data.chunks_exact(frame_len).take(frames) {
        for (ch, out) in channels.iter_mut().enumerate() {
            out.push(to_f32(comm.encoding, &frame[ch * width..(ch + 1) * width]));
        }
    }

    Ok(DecodedAudio { sample_rate: comm.sample_rate, channels })
}

fn to_f32(encoding: Encoding, s: &[u8]) -> f32 {
    match encoding {
        Encoding::IntBe   => int_to_f32(s.iter().fold(0i64, |v, &b| (v << 8) | b as i64), s.len()),
        Encoding::IntLe   => int_to_f32(s.iter().rev().fold(0i64, |v, &b| (v << 8) | b as i64), s.len()),
        Encoding::Float32 => f32::from_be_bytes([s[0], s[1], s[2], s[3]]),
        Encoding::Float64 => {
            f64::from_be_bytes([s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7]]) as f32
        }
    }
}

/// Sign-extend a `width`-byte integer and scale it to [-1, 1).
fn int_to_f32(raw: i64, width: usize) -> f32 {
    let bits = width as u32 * 8;
    let v = (raw << (64 - bits)) >> (64 - bits);
    v as f32 / (1i64 << (bits - 1)) as f32
}
