//! Pack, unpack and list: the primary embedding surface.
//!
//! ```no_run
//! use apkg::archive::{pack, unpack};
//!
//! let report = pack(&["kick.wav", "hall.irp"], "kit.apkg", "correct-horse")?;
//! assert_eq!(report.entries.len(), 2);
//!
//! let written = unpack("kit.apkg", "out", "correct-horse")?;
//! assert_eq!(written.len(), 2);
//! # Ok::<(), apkg::archive::ArchiveError>(())
//! ```
//!
//! # Pipeline
//! Pack:   read → CRC-32 → deflate → AES-256-GCM seal → write record + payload.
//! Unpack: read record → open (tag check) → inflate → CRC-32 check → write file.
//!
//! Any failure after the header is fatal for the whole call.  Files already
//! extracted are left on disk; nothing is rolled back.  On pack, inputs that
//! are missing, unreadable or of an unsupported type are skipped and reported
//! in [`PackReport::skipped`].

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::checksum;
use crate::codec::{CodecError, DeflateCodec, DEFAULT_LEVEL};
use crate::crypto::{derive_key, entry_nonce, random_salt_and_nonce, CryptoError, EntryCipher, NONCE_LEN};
use crate::entry::{validate_name, EntryError, FileEntry, FileType};
use crate::header::{ArchiveHeader, FormatVersion, HeaderError, HEADER_SIZE};

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Invalid archive signature")]
    InvalidSignature,
    #[error("Unsupported archive version: {0}")]
    UnsupportedVersion(u32),
    #[error("Authentication failed for '{name}': wrong password or corrupted data")]
    AuthenticationFailure { name: String },
    #[error("Integrity check failed for '{name}': stored crc32 {expected:08x}, computed {actual:08x}")]
    IntegrityMismatch { name: String, expected: u32, actual: u32 },
    /// Raised by [`classify`]; pack turns it into a skip, never a failure.
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("Crypto initialisation failed: {0}")]
    CryptoInit(String),
    #[error("Invalid entry name: {0:?}")]
    InvalidEntryName(String),
    #[error("Unknown file type tag {0}")]
    UnknownFileType(u8),
    #[error("'{name}' is too large for the package format ({size} bytes)")]
    EntryTooLarge { name: String, size: u64 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<HeaderError> for ArchiveError {
    fn from(e: HeaderError) -> Self {
        match e {
            HeaderError::InvalidSignature      => ArchiveError::InvalidSignature,
            HeaderError::UnsupportedVersion(v) => ArchiveError::UnsupportedVersion(v),
            HeaderError::Io(e)                 => ArchiveError::Io(e),
        }
    }
}

impl From<EntryError> for ArchiveError {
    fn from(e: EntryError) -> Self {
        match e {
            EntryError::InvalidName(n)     => ArchiveError::InvalidEntryName(n),
            EntryError::UnknownFileType(t) => ArchiveError::UnknownFileType(t),
            EntryError::Io(e)              => ArchiveError::Io(e),
        }
    }
}

impl From<CodecError> for ArchiveError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Compression(e) => ArchiveError::Io(e),
        }
    }
}

impl From<CryptoError> for ArchiveError {
    fn from(e: CryptoError) -> Self {
        ArchiveError::CryptoInit(e.to_string())
    }
}

// ── PackOptions ───────────────────────────────────────────────────────────────

/// Configuration for [`pack_with_options`].
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// zlib level, 0–9.
    pub compression_level: u32,
    /// Nonce policy written into the header.  `V1` reuses the archive nonce
    /// for every entry and exists for compatibility with older readers.
    pub format:            FormatVersion,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_LEVEL,
            format:            FormatVersion::CURRENT,
        }
    }
}

// ── Reports ───────────────────────────────────────────────────────────────────

/// Entry metadata as seen by callers; never contains key material or payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    pub name:            String,
    pub file_type:       FileType,
    pub offset:          u64,
    pub original_size:   u32,
    pub compressed_size: u32,
    pub crc32:           u32,
}

impl From<&FileEntry> for EntryInfo {
    fn from(e: &FileEntry) -> Self {
        EntryInfo {
            name:            e.filename.clone(),
            file_type:       e.file_type,
            offset:          e.offset,
            original_size:   e.original_size,
            compressed_size: e.compressed_size,
            crc32:           e.crc32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Missing,
    Unreadable,
    UnsupportedFileType,
    InvalidName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedInput {
    pub path:   PathBuf,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default)]
pub struct PackReport {
    pub entries: Vec<EntryInfo>,
    pub skipped: Vec<SkippedInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveListing {
    pub version:   u32,
    pub flags:     u32,
    pub num_files: u32,
    /// Archive salt, hex encoded.
    pub salt:      String,
    pub entries:   Vec<EntryInfo>,
}

// ── Pack ──────────────────────────────────────────────────────────────────────

struct SourceFile {
    name:      String,
    file_type: FileType,
    data:      Vec<u8>,
}

struct SealedEntry {
    entry:   FileEntry,
    payload: Vec<u8>,
}

struct Prepared {
    header:  ArchiveHeader,
    entries: Vec<SealedEntry>,
    skipped: Vec<SkippedInput>,
}

/// Pack `inputs` into `output` with default [`PackOptions`].
pub fn pack<P: AsRef<Path>, Q: AsRef<Path>>(
    inputs:   &[P],
    output:   Q,
    password: &str,
) -> Result<PackReport, ArchiveError> {
    pack_with_options(inputs, output, password, &PackOptions::default())
}

/// Pack `inputs` into `output`.
///
/// All inputs are read and sealed before `output` is created, so a failure
/// while sealing leaves any existing file at `output` untouched.
pub fn pack_with_options<P: AsRef<Path>, Q: AsRef<Path>>(
    inputs:   &[P],
    output:   Q,
    password: &str,
    opts:     &PackOptions,
) -> Result<PackReport, ArchiveError> {
    let output = output.as_ref();
    let prepared = prepare(inputs, password, opts)?;
    let mut writer = BufWriter::new(File::create(output)?);
    let report = emit(prepared, &mut writer)?;
    writer.flush()?;
    info!(
        output = %output.display(),
        entries = report.entries.len(),
        skipped = report.skipped.len(),
        "package written"
    );
    Ok(report)
}

/// Pack `inputs` into an arbitrary writer.
pub fn pack_to_writer<P: AsRef<Path>, W: Write>(
    inputs:   &[P],
    writer:   W,
    password: &str,
    opts:     &PackOptions,
) -> Result<PackReport, ArchiveError> {
    let prepared = prepare(inputs, password, opts)?;
    emit(prepared, writer)
}

fn prepare<P: AsRef<Path>>(inputs: &[P], password: &str, opts: &PackOptions) -> Result<Prepared, ArchiveError> {
    let (salt, nonce) = random_salt_and_nonce()?;
    let key = derive_key(password.as_bytes(), &salt);
    let cipher = EntryCipher::new(&key)?;
    let codec = DeflateCodec::new(opts.compression_level);

    let (sources, skipped) = collect_sources(inputs);
    let entries = seal_all(&sources, &codec, &cipher, &nonce, opts.format)?;

    let mut header = ArchiveHeader::new(opts.format, salt, nonce);
    header.num_files = entries.len() as u32;
    Ok(Prepared { header, entries, skipped })
}

/// Payload type of an input path, judged by its extension.
pub fn classify(path: &Path) -> Result<FileType, ArchiveError> {
    FileType::from_path(path).ok_or_else(|| ArchiveError::UnsupportedFileType(path.display().to_string()))
}

fn collect_sources<P: AsRef<Path>>(inputs: &[P]) -> (Vec<SourceFile>, Vec<SkippedInput>) {
    let mut sources = Vec::with_capacity(inputs.len());
    let mut skipped = Vec::new();

    for input in inputs {
        let path = input.as_ref();
        let mut skip = |reason: SkipReason| {
            warn!(path = %path.display(), ?reason, "skipping input");
            skipped.push(SkippedInput { path: path.to_owned(), reason });
        };

        if !path.is_file() {
            skip(SkipReason::Missing);
            continue;
        }
        let file_type = match classify(path) {
            Ok(t)  => t,
            Err(e) => {
                debug!(error = %e, "input rejected");
                skip(SkipReason::UnsupportedFileType);
                continue;
            }
        };
        // Names must survive the trip into the archive unchanged.
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_owned(),
            None    => { skip(SkipReason::InvalidName); continue; }
        };
        if validate_name(&name).is_err() || name.len() > crate::entry::MAX_NAME_LEN as usize {
            skip(SkipReason::InvalidName);
            continue;
        }
        let data = match fs::read(path) {
            Ok(d)  => d,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "read failed");
                skip(SkipReason::Unreadable);
                continue;
            }
        };
        sources.push(SourceFile { name, file_type, data });
    }
    (sources, skipped)
}

fn seal_all(
    sources: &[SourceFile],
    codec:   &DeflateCodec,
    cipher:  &EntryCipher,
    nonce:   &[u8; NONCE_LEN],
    format:  FormatVersion,
) -> Result<Vec<SealedEntry>, ArchiveError> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        sources
            .par_iter()
            .enumerate()
            .map(|(i, src)| seal_one(i as u64, src, codec, cipher, nonce, format))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        sources
            .iter()
            .enumerate()
            .map(|(i, src)| seal_one(i as u64, src, codec, cipher, nonce, format))
            .collect()
    }
}

fn seal_one(
    index:  u64,
    src:    &SourceFile,
    codec:  &DeflateCodec,
    cipher: &EntryCipher,
    nonce:  &[u8; NONCE_LEN],
    format: FormatVersion,
) -> Result<SealedEntry, ArchiveError> {
    let too_large = |size: usize| ArchiveError::EntryTooLarge { name: src.name.clone(), size: size as u64 };

    let original_size = u32::try_from(src.data.len()).map_err(|_| too_large(src.data.len()))?;
    let mut entry = FileEntry {
        filename:        src.name.clone(),
        offset:          0,
        original_size,
        compressed_size: 0,
        crc32:           checksum::crc32(&src.data),
        file_type:       src.file_type,
    };

    let compressed = codec.compress(&src.data)?;
    let payload = cipher.seal(
        &nonce_for(format, nonce, index),
        &compressed,
        &associated_data(format, &entry),
    )?;
    entry.compressed_size = u32::try_from(payload.len()).map_err(|_| too_large(payload.len()))?;

    debug!(
        name = %entry.filename,
        original = entry.original_size,
        deflated = compressed.len(),
        sealed = entry.compressed_size,
        crc32 = format_args!("{:08x}", entry.crc32),
        "entry sealed"
    );
    Ok(SealedEntry { entry, payload })
}

fn emit<W: Write>(prepared: Prepared, mut writer: W) -> Result<PackReport, ArchiveError> {
    let Prepared { header, entries, skipped } = prepared;
    header.write(&mut writer)?;

    let mut offset = HEADER_SIZE as u64;
    let mut infos = Vec::with_capacity(entries.len());
    for SealedEntry { mut entry, payload } in entries {
        entry.offset = offset;
        entry.write(&mut writer)?;
        writer.write_all(&payload)?;
        offset += entry.record_len() + payload.len() as u64;
        infos.push(EntryInfo::from(&entry));
    }
    Ok(PackReport { entries: infos, skipped })
}

// ── Nonce / associated data policy ────────────────────────────────────────────

fn nonce_for(format: FormatVersion, base: &[u8; NONCE_LEN], index: u64) -> [u8; NONCE_LEN] {
    match format {
        FormatVersion::V1 => *base,
        FormatVersion::V2 => entry_nonce(base, index),
    }
}

/// V2 binds the entry's name, size, checksum and type to its payload.
/// `offset` and `compressed_size` are excluded: both are only known after sealing.
fn associated_data(format: FormatVersion, entry: &FileEntry) -> Vec<u8> {
    match format {
        FormatVersion::V1 => Vec::new(),
        FormatVersion::V2 => {
            let mut aad = Vec::with_capacity(entry.filename.len() + 9);
            aad.extend_from_slice(entry.filename.as_bytes());
            aad.extend_from_slice(&entry.original_size.to_le_bytes());
            aad.extend_from_slice(&entry.crc32.to_le_bytes());
            aad.push(entry.file_type as u8);
            aad
        }
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// A verified, decompressed entry.
#[derive(Debug, Clone)]
pub struct UnpackedEntry {
    pub entry: FileEntry,
    pub data:  Vec<u8>,
}

/// Sequential entry reader.
///
/// Yields one `Result` per declared entry, in stream order, and stops after
/// the first error.
pub struct PackageReader<R: Read> {
    reader:     R,
    header:     ArchiveHeader,
    format:     FormatVersion,
    cipher:     EntryCipher,
    codec:      DeflateCodec,
    next_index: u32,
    failed:     bool,
}

impl<R: Read> PackageReader<R> {
    /// Parse and validate the header, then derive the archive key.
    ///
    /// The signature is checked before any key derivation or decryption.
    pub fn new(mut reader: R, password: &str) -> Result<Self, ArchiveError> {
        let (header, format) = ArchiveHeader::read_supported(&mut reader)?;
        let key = derive_key(password.as_bytes(), &header.salt);
        let cipher = EntryCipher::new(&key)?;
        Ok(Self {
            reader,
            header,
            format,
            cipher,
            codec: DeflateCodec::default(),
            next_index: 0,
            failed: false,
        })
    }

    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    fn read_entry(&mut self) -> Result<UnpackedEntry, ArchiveError> {
        let index = self.next_index as u64;
        self.next_index += 1;

        let entry = FileEntry::read(&mut self.reader)?;
        let sealed = read_payload(&mut self.reader, entry.compressed_size)?;

        let compressed = self
            .cipher
            .open(
                &nonce_for(self.format, &self.header.nonce, index),
                &sealed,
                &associated_data(self.format, &entry),
            )
            .map_err(|e| match e {
                CryptoError::DecryptionFailed | CryptoError::TooShort => {
                    ArchiveError::AuthenticationFailure { name: entry.filename.clone() }
                }
                other => other.into(),
            })?;

        let data = self.codec.decompress(&compressed, entry.original_size);
        let actual = checksum::crc32(&data);
        if actual != entry.crc32 {
            return Err(ArchiveError::IntegrityMismatch {
                name:     entry.filename.clone(),
                expected: entry.crc32,
                actual,
            });
        }

        debug!(name = %entry.filename, size = data.len(), "entry verified");
        Ok(UnpackedEntry { entry, data })
    }
}

impl<R: Read> Iterator for PackageReader<R> {
    type Item = Result<UnpackedEntry, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.next_index >= self.header.num_files {
            return None;
        }
        let result = self.read_entry();
        self.failed = result.is_err();
        Some(result)
    }
}

fn read_payload<R: Read>(reader: &mut R, len: u32) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len as usize {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("payload truncated: expected {len} bytes, found {}", buf.len()),
        ));
    }
    Ok(buf)
}

// ── Unpack ────────────────────────────────────────────────────────────────────

/// Extract every entry of `archive` into `output_dir`, creating it if needed.
///
/// Returns the paths written, in archive order.
pub fn unpack<P: AsRef<Path>, Q: AsRef<Path>>(
    archive:    P,
    output_dir: Q,
    password:   &str,
) -> Result<Vec<PathBuf>, ArchiveError> {
    let archive = archive.as_ref();
    let output_dir = output_dir.as_ref();

    let reader = PackageReader::new(BufReader::new(File::open(archive)?), password)?;
    fs::create_dir_all(output_dir)?;

    let mut written = Vec::with_capacity(reader.header().num_files as usize);
    for item in reader {
        let UnpackedEntry { entry, data } = item?;
        let path = output_dir.join(&entry.filename);
        File::create(&path)?.write_all(&data)?;
        written.push(path);
    }

    info!(
        archive = %archive.display(),
        output = %output_dir.display(),
        files = written.len(),
        "package extracted"
    );
    Ok(written)
}

// ── List ──────────────────────────────────────────────────────────────────────

/// Read entry metadata without a password.  Payloads are skipped, not verified.
pub fn list<P: AsRef<Path>>(archive: P) -> Result<ArchiveListing, ArchiveError> {
    list_from_reader(BufReader::new(File::open(archive)?))
}

pub fn list_from_reader<R: Read>(mut reader: R) -> Result<ArchiveListing, ArchiveError> {
    let header = ArchiveHeader::read(&mut reader)?;
    let mut entries = Vec::new();
    for _ in 0..header.num_files {
        let entry = FileEntry::read(&mut reader)?;
        let skipped = io::copy(&mut (&mut reader).take(entry.compressed_size as u64), &mut io::sink())?;
        if skipped != entry.compressed_size as u64 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "payload truncated").into());
        }
        entries.push(EntryInfo::from(&entry));
    }
    Ok(ArchiveListing {
        version:   header.version,
        flags:     header.flags,
        num_files: header.num_files,
        salt:      hex::encode(header.salt),
        entries,
    })
}
