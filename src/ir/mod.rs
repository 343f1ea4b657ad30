//! Derived impulse-response (`.irp`) files.
//!
//! An `.irp` file is a peak-normalised dump of decoded audio:
//!
//! ```text
//! signature    [4]  "IRP\0"
//! version      u32  1
//! num_channels u32
//! num_samples  u32  (frames per channel)
//! sample_rate  f64
//! payload      f32 × num_channels × num_samples, planar: all of channel 0, then channel 1, …
//! ```
//!
//! All fields are little-endian.  Decoding the source audio goes through the
//! [`AudioDecoder`] trait.  [`wav::WavDecoder`] and [`aiff::AiffDecoder`] are
//! built in; [`AutoDecoder`] picks between them by container signature.

pub mod aiff;
pub mod wav;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

pub use aiff::AiffDecoder;
pub use wav::WavDecoder;

pub const IR_MAGIC: &[u8; 4] = b"IRP\0";
pub const IR_VERSION: u32 = 1;
pub const IR_HEADER_SIZE: usize = 24;
/// Channel ceiling, matching the 16-bit channel field of WAV and AIFF.
pub const MAX_IR_CHANNELS: u32 = u16::MAX as u32;

#[derive(Error, Debug)]
pub enum IrError {
    #[error("Unsupported audio format: {0}")]
    UnsupportedAudio(String),
    #[error("Malformed audio data: {0}")]
    Malformed(String),
    #[error("Invalid IR signature")]
    InvalidSignature,
    #[error("Unsupported IR version: {0}")]
    UnsupportedVersion(u32),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Decoded audio in planar layout: one `Vec<f32>` per channel, all equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: f64,
    pub channels:    Vec<Vec<f32>>,
}

impl DecodedAudio {
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn num_samples(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Largest absolute sample value across all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flatten()
            .fold(0.0f32, |m, s| m.max(s.abs()))
    }

    /// Scale so the peak is exactly 1.0.  Silent or already-normalised audio
    /// is left alone.  Returns the gain applied.
    pub fn normalize(&mut self) -> f32 {
        let peak = self.peak();
        if peak == 0.0 || peak == 1.0 {
            return 1.0;
        }
        let gain = 1.0 / peak;
        for s in self.channels.iter_mut().flatten() {
            *s *= gain;
        }
        gain
    }
}

/// Source-audio decoding seam.
pub trait AudioDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio, IrError>;
}

/// Dispatches on the first four bytes: `RIFF` to WAV, `FORM` to AIFF.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoDecoder;

impl AudioDecoder for AutoDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio, IrError> {
        match bytes.get(..4) {
            Some(b"RIFF") => WavDecoder.decode(bytes),
            Some(b"FORM") => AiffDecoder.decode(bytes),
            _             => Err(IrError::UnsupportedAudio("unrecognised audio container".into())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IrHeader {
    pub signature:    [u8; 4],
    pub version:      u32,
    pub num_channels: u32,
    pub num_samples:  u32,
    pub sample_rate:  f64,
}

impl IrHeader {
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.signature)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_u32::<LittleEndian>(self.num_channels)?;
        writer.write_u32::<LittleEndian>(self.num_samples)?;
        writer.write_f64::<LittleEndian>(self.sample_rate)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self, IrError> {
        let mut signature = [0u8; 4];
        reader.read_exact(&mut signature)?;
        if &signature != IR_MAGIC {
            return Err(IrError::InvalidSignature);
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != IR_VERSION {
            return Err(IrError::UnsupportedVersion(version));
        }
        let header = Self {
            signature,
            version,
            num_channels: reader.read_u32::<LittleEndian>()?,
            num_samples:  reader.read_u32::<LittleEndian>()?,
            sample_rate:  reader.read_f64::<LittleEndian>()?,
        };
        header.validate()?;
        Ok(header)
    }

    /// Reject channel counts no decoder can produce.  Checked before any
    /// buffer is sized from the header.
    pub fn validate(&self) -> Result<(), IrError> {
        if self.num_channels == 0 || self.num_channels > MAX_IR_CHANNELS {
            return Err(IrError::Malformed(format!(
                "channel count {} outside 1..={MAX_IR_CHANNELS}",
                self.num_channels
            )));
        }
        Ok(())
    }

    /// Payload length in bytes.
    pub fn payload_len(&self) -> u64 {
        self.num_channels as u64 * self.num_samples as u64 * 4
    }
}

/// A parsed `.irp` file.
#[derive(Debug, Clone, PartialEq)]
pub struct IrFile {
    pub header: IrHeader,
    pub audio:  DecodedAudio,
}

impl IrFile {
    /// Build from already-normalised audio.
    pub fn from_audio(audio: DecodedAudio) -> Result<Self, IrError> {
        let count = |n: usize, what: &str| {
            u32::try_from(n).map_err(|_| IrError::Malformed(format!("too many {what}: {n}")))
        };
        let header = IrHeader {
            signature:    *IR_MAGIC,
            version:      IR_VERSION,
            num_channels: count(audio.num_channels(), "channels")?,
            num_samples:  count(audio.num_samples(), "samples")?,
            sample_rate:  audio.sample_rate,
        };
        header.validate()?;
        Ok(Self { header, audio })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        self.header.write(&mut writer)?;
        for channel in &self.audio.channels {
            for &s in channel {
                writer.write_f32::<LittleEndian>(s)?;
            }
        }
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self, IrError> {
        let header = IrHeader::read(&mut reader)?;
        let mut payload = Vec::new();
        (&mut reader).take(header.payload_len()).read_to_end(&mut payload)?;
        if payload.len() as u64 != header.payload_len() {
            return Err(IrError::Malformed(format!(
                "payload truncated: expected {} bytes, found {}",
                header.payload_len(),
                payload.len()
            )));
        }
        let frames = header.num_samples as usize;
        let mut samples = payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]));
        let channels = (0..header.num_channels)
            .map(|_| samples.by_ref().take(frames).collect::<Vec<f32>>())
            .collect();
        Ok(Self {
            header,
            audio: DecodedAudio { sample_rate: header.sample_rate, channels },
        })
    }
}

/// Decode `input`, normalise it and write the result to `output` as `.irp`.
///
/// `output` is only created once decoding has succeeded.
pub fn convert_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input:   P,
    output:  Q,
    decoder: &dyn AudioDecoder,
) -> Result<IrHeader, IrError> {
    let input = input.as_ref();
    let output = output.as_ref();

    let bytes = fs::read(input)?;
    let mut audio = decoder.decode(&bytes)?;
    let gain = audio.normalize();
    debug!(
        channels = audio.num_channels(),
        samples = audio.num_samples(),
        gain,
        "audio decoded"
    );

    let ir = IrFile::from_audio(audio)?;
    let mut writer = BufWriter::new(File::create(output)?);
    ir.write(&mut writer)?;
    writer.flush()?;

    info!(input = %input.display(), output = %output.display(), "impulse response written");
    Ok(ir.header)
}

/// [`convert_file`] with the built-in WAV and AIFF decoders.
pub fn convert<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> Result<IrHeader, IrError> {
    convert_file(input, output, &AutoDecoder)
}

/// Read and validate an `.irp` file from disk.
pub fn read_ir_file<P: AsRef<Path>>(path: P) -> Result<IrFile, IrError> {
    IrFile::read(BufReader::new(File::open(path)?))
}
