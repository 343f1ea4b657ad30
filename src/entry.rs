use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{self, Read, Write};
use std::path::Path;
use thiserror::Error;

/// Longest filename accepted when reading an entry record.
pub const MAX_NAME_LEN: u32 = 4096;

/// Bytes following the filename: offset + original + compressed + crc + type.
pub const ENTRY_FIXED_SIZE: usize = 8 + 4 + 4 + 4 + 1;

#[derive(Error, Debug)]
pub enum EntryError {
    #[error("Invalid entry name: {0:?}")]
    InvalidName(String),
    #[error("Unknown file type tag {0}")]
    UnknownFileType(u8),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Payload kinds an archive may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Wav  = 0,
    Aiff = 1,
    /// Derived impulse response (`.irp`).
    Ir   = 2,
}

impl FileType {
    /// Classify by extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "wav"          => Some(FileType::Wav),
            "aif" | "aiff" => Some(FileType::Aiff),
            "irp"          => Some(FileType::Ir),
            _              => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FileType::Wav  => "wav",
            FileType::Aiff => "aiff",
            FileType::Ir   => "ir",
        }
    }
}

impl TryFrom<u8> for FileType {
    type Error = EntryError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(FileType::Wav),
            1 => Ok(FileType::Aiff),
            2 => Ok(FileType::Ir),
            t => Err(EntryError::UnknownFileType(t)),
        }
    }
}

/// Metadata record written in front of every sealed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub filename:        String,
    /// Stream position of this record; informational only.
    pub offset:          u64,
    pub original_size:   u32,
    /// Length of the sealed payload (ciphertext plus tag).
    pub compressed_size: u32,
    /// CRC-32 of the uncompressed plaintext.
    pub crc32:           u32,
    pub file_type:       FileType,
}

impl FileEntry {
    /// Serialized length of this record, excluding the payload.
    pub fn record_len(&self) -> u64 {
        (4 + self.filename.len() + ENTRY_FIXED_SIZE) as u64
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.filename.len() as u32)?;
        writer.write_all(self.filename.as_bytes())?;
        writer.write_u64::<LittleEndian>(self.offset)?;
        writer.write_u32::<LittleEndian>(self.original_size)?;
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        writer.write_u32::<LittleEndian>(self.crc32)?;
        writer.write_u8(self.file_type as u8)?;
        Ok(())
    }

    /// Read one record.  The payload that follows is left in `reader`.
    pub fn read<R: Read>(mut reader: R) -> Result<Self, EntryError> {
        let name_len = reader.read_u32::<LittleEndian>()?;
        if name_len > MAX_NAME_LEN {
            return Err(EntryError::InvalidName(format!("<{name_len} bytes>")));
        }
        let mut name = vec![0u8; name_len as usize];
        reader.read_exact(&mut name)?;
        let filename = String::from_utf8(name)
            .map_err(|e| EntryError::InvalidName(String::from_utf8_lossy(e.as_bytes()).into_owned()))?;
        validate_name(&filename)?;

        let offset = reader.read_u64::<LittleEndian>()?;
        let original_size = reader.read_u32::<LittleEndian>()?;
        let compressed_size = reader.read_u32::<LittleEndian>()?;
        let crc32 = reader.read_u32::<LittleEndian>()?;
        let file_type = FileType::try_from(reader.read_u8()?)?;
        Ok(Self {
            filename,
            offset,
            original_size,
            compressed_size,
            crc32,
            file_type,
        })
    }
}

/// Entry names are bare file names: no separators, no dot components.
pub fn validate_name(name: &str) -> Result<(), EntryError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(|c: char| matches!(c, '/' | '\\' | '\0'));
    if bad {
        return Err(EntryError::InvalidName(name.to_owned()));
    }
    Ok(())
}
