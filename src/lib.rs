//! Password-protected, compressed packages of audio files and derived
//! impulse responses (`.apkg`).
//!
//! Each entry is CRC-32 checked, deflated and sealed with AES-256-GCM under
//! a PBKDF2-SHA256 key derived from the package password.

pub mod header;
pub mod entry;
pub mod checksum;
pub mod codec;
pub mod crypto;
pub mod archive;
pub mod ir;

pub use header::{ArchiveHeader, FormatVersion};
pub use entry::{FileEntry, FileType};
pub use archive::{pack, pack_with_options, unpack, list, ArchiveError, PackOptions, PackReport};
