//! Fixed-size archive header.
//!
//! Layout (100 bytes, little-endian):
//!
//! | Offset | Size | Field          |
//! |--------|------|----------------|
//! | 0      | 8    | signature      |
//! | 8      | 4    | version        |
//! | 12     | 4    | num_files      |
//! | 16     | 4    | flags          |
//! | 20     | 32   | salt           |
//! | 52     | 16   | nonce          |
//! | 68     | 32   | reserved_hash  |

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use thiserror::Error;

use crate::crypto::{NONCE_LEN, SALT_LEN};

pub const MAGIC: &[u8; 8] = b"APKG2024";
pub const HEADER_SIZE: usize = 100;
pub const RESERVED_HASH_LEN: usize = 32;

/// On-disk format revision.  The byte layout is the same for both; they
/// differ in how each entry payload is sealed.
///
/// Readers that predate V2 do not check the version field.  They open a V2
/// entry with the archive nonce and no associated data, which fails the tag
/// check and surfaces as a wrong password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    /// Archive nonce reused verbatim for every entry, no associated data.
    V1 = 1,
    /// Entry `i` is sealed under the archive nonce with `le64(i)` XORed into
    /// its last 8 bytes.  Associated data is
    /// `filename ‖ le32 original_size ‖ le32 crc32 ‖ u8 file_type`.
    V2 = 2,
}

impl FormatVersion {
    pub const CURRENT: FormatVersion = FormatVersion::V2;

    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(FormatVersion::V1),
            2 => Some(FormatVersion::V2),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        FormatVersion::CURRENT
    }
}

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Invalid archive signature")]
    InvalidSignature,
    #[error("Unsupported archive version: {0}")]
    UnsupportedVersion(u32),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub signature:     [u8; 8],
    pub version:       u32,
    pub num_files:     u32,
    pub flags:         u32,
    pub salt:          [u8; SALT_LEN],
    pub nonce:         [u8; NONCE_LEN],
    /// Whole-archive digest slot.  Written as zeroes, carried through on read.
    pub reserved_hash: [u8; RESERVED_HASH_LEN],
}

impl ArchiveHeader {
    pub fn new(version: FormatVersion, salt: [u8; SALT_LEN], nonce: [u8; NONCE_LEN]) -> Self {
        Self {
            signature:     *MAGIC,
            version:       version.as_u32(),
            num_files:     0,
            flags:         0,
            salt,
            nonce,
            reserved_hash: [0u8; RESERVED_HASH_LEN],
        }
    }

    /// The nonce policy this header declares, if the version is known.
    pub fn format(&self) -> Option<FormatVersion> {
        FormatVersion::from_u32(self.version)
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.signature)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_u32::<LittleEndian>(self.num_files)?;
        writer.write_u32::<LittleEndian>(self.flags)?;
        writer.write_all(&self.salt)?;
        writer.write_all(&self.nonce)?;
        writer.write_all(&self.reserved_hash)?;
        Ok(())
    }

    /// Read a header, rejecting a bad signature before anything else is parsed.
    ///
    /// The version is returned as stored; use [`ArchiveHeader::read_supported`]
    /// to also reject unknown versions.
    pub fn read<R: Read>(mut reader: R) -> Result<Self, HeaderError> {
        let mut signature = [0u8; 8];
        reader.read_exact(&mut signature)?;
        if &signature != MAGIC {
            return Err(HeaderError::InvalidSignature);
        }
        let version = reader.read_u32::<LittleEndian>()?;
        let num_files = reader.read_u32::<LittleEndian>()?;
        let flags = reader.read_u32::<LittleEndian>()?;
        let mut salt = [0u8; SALT_LEN];
        reader.read_exact(&mut salt)?;
        let mut nonce = [0u8; NONCE_LEN];
        reader.read_exact(&mut nonce)?;
        let mut reserved_hash = [0u8; RESERVED_HASH_LEN];
        reader.read_exact(&mut reserved_hash)?;
        Ok(Self {
            signature,
            version,
            num_files,
            flags,
            salt,
            nonce,
            reserved_hash,
        })
    }

    pub fn read_supported<R: Read>(reader: R) -> Result<(Self, FormatVersion), HeaderError> {
        let header = Self::read(reader)?;
        let format = header
            .format()
            .ok_or(HeaderError::UnsupportedVersion(header.version))?;
        Ok((header, format))
    }
}
