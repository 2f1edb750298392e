//! The ZIP container of an APK, held fully in memory while it is being edited.
//!
//! Entries are addressed by their archive path. A binary XML entry that was rewritten during
//! the session is kept as a [ArchiveEntry::Pending] document until the owning apk is
//! finalized, so later readers see the edited text instead of a binary form that could not
//! resolve references to resources created afterwards.

pub mod lock_table;

use indexmap::IndexMap;
use memmap2::Mmap;
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::archive::lock_table::LockTable;
use crate::xml::XmlDocument;

pub const RESOURCE_TABLE_PATH: &str = "resources.arsc";
pub const MANIFEST_PATH: &str = "AndroidManifest.xml";

/// Extensions of content that is already compressed.
const STORED_EXTENSIONS: [&str; 14] = [
    "png", "jpg", "jpeg", "gif", "webp", "ogg", "mp3", "mp4", "m4a", "wav", "aac", "mid",
    "arsc", "zip",
];

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("zip error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0} still holds an unencoded document")]
    PendingDocument(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ArchiveEntry {
    /// Bytes as loaded from disk.
    Original(Vec<u8>),
    /// An edited binary XML document awaiting encoding.
    Pending(XmlDocument),
    /// Bytes written during this session.
    Flushed(Vec<u8>),
}

impl ArchiveEntry {
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            ArchiveEntry::Original(bytes) | ArchiveEntry::Flushed(bytes) => Some(bytes),
            ArchiveEntry::Pending(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ArchiveEntry::Pending(_))
    }
}

#[derive(Debug)]
struct StoredEntry {
    content: ArchiveEntry,
    compression: CompressionMethod,
}

#[derive(Debug, Default)]
pub struct Archive {
    entries: IndexMap<String, StoredEntry>,
    locks: LockTable,
    /// Compression of entries added during the session. Picked by extension when unset.
    new_entry_compression: Option<CompressionMethod>,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path).map_err(ArchiveError::IoError)?;
        let mmap = unsafe { Mmap::map(&file).map_err(ArchiveError::IoError)? };
        Self::from_reader(Cursor::new(&mmap[..]))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ArchiveError> {
        Self::from_reader(Cursor::new(data))
    }

    fn from_reader<R: Read + Seek>(reader: R) -> Result<Self, ArchiveError> {
        let mut zip = ZipArchive::new(reader)?;
        let mut entries = IndexMap::with_capacity(zip.len());
        for index in 0..zip.len() {
            let mut file = zip.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            let mut buffer = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut buffer)?;
            entries.insert(
                file.name().to_string(),
                StoredEntry {
                    content: ArchiveEntry::Original(buffer),
                    compression: file.compression(),
                },
            );
        }
        Ok(Self {
            entries,
            locks: LockTable::new(),
            new_entry_compression: None,
        })
    }

    pub fn set_new_entry_compression(&mut self, compression: Option<CompressionMethod>) {
        self.new_entry_compression = compression;
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn entry(&self, path: &str) -> Option<&ArchiveEntry> {
        self.entries.get(path).map(|stored| &stored.content)
    }

    /// Stored bytes of `path`. `None` for missing and pending entries.
    pub fn bytes(&self, path: &str) -> Option<&[u8]> {
        self.entry(path).and_then(ArchiveEntry::bytes)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Stores `bytes` at `path`. The last write wins.
    pub fn put(&mut self, path: &str, bytes: Vec<u8>) {
        self.store(path, ArchiveEntry::Flushed(bytes));
    }

    pub fn put_pending(&mut self, path: &str, document: XmlDocument) {
        self.store(path, ArchiveEntry::Pending(document));
    }

    fn store(&mut self, path: &str, content: ArchiveEntry) {
        match self.entries.get_mut(path) {
            Some(stored) => stored.content = content,
            None => {
                self.entries.insert(
                    path.to_string(),
                    StoredEntry {
                        content,
                        compression: self
                            .new_entry_compression
                            .unwrap_or_else(|| default_compression(path)),
                    },
                );
            }
        }
    }

    pub fn remove(&mut self, path: &str) -> Option<ArchiveEntry> {
        self.entries.shift_remove(path).map(|stored| stored.content)
    }

    pub fn pending_paths(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, stored)| stored.content.is_pending())
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn write<W: Write + Seek>(&self, writer: W) -> Result<W, ArchiveError> {
        let mut zip = ZipWriter::new(writer);
        for (path, stored) in &self.entries {
            let bytes = stored
                .content
                .bytes()
                .ok_or_else(|| ArchiveError::PendingDocument(path.clone()))?;
            let options = FileOptions::default().compression_method(stored.compression);
            if stored.compression == CompressionMethod::Stored {
                zip.start_file_aligned(path, options, 4)?;
            } else {
                zip.start_file(path, options)?;
            }
            zip.write_all(bytes)?;
        }
        Ok(zip.finish()?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ArchiveError> {
        Ok(self.write(Cursor::new(Vec::new()))?.into_inner())
    }

    pub fn save(&self, path: &Path) -> Result<(), ArchiveError> {
        let file = File::create(path).map_err(ArchiveError::IoError)?;
        self.write(file)?;
        Ok(())
    }
}

fn default_compression(path: &str) -> CompressionMethod {
    let extension = path.rsplit_once('.').map(|(_, extension)| extension.to_ascii_lowercase());
    match extension {
        Some(extension) if STORED_EXTENSIONS.contains(&extension.as_str()) => CompressionMethod::Stored,
        _ => CompressionMethod::Deflated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlElement;

    #[test]
    fn test_archive_round_trip() -> Result<(), ArchiveError> {
        let mut archive = Archive::new();
        archive.put(MANIFEST_PATH, vec![3, 0, 8, 0]);
        archive.put(RESOURCE_TABLE_PATH, vec![2, 0, 12, 0]);
        archive.put("res/drawable/icon.png", vec![0x89, b'P', b'N', b'G']);

        let read = Archive::from_bytes(&archive.to_bytes()?)?;
        assert_eq!(read.paths().count(), 3);
        assert_eq!(read.bytes("res/drawable/icon.png"), Some(&[0x89, b'P', b'N', b'G'][..]));
        assert!(matches!(read.entry(MANIFEST_PATH), Some(ArchiveEntry::Original(_))));
        Ok(())
    }

    #[test]
    fn test_pending_entries_block_writing() {
        let mut archive = Archive::new();
        archive.put_pending("res/layout/main.xml", XmlDocument::new(XmlElement::new("LinearLayout")));
        assert_eq!(archive.pending_paths(), vec!["res/layout/main.xml".to_string()]);
        assert!(archive.bytes("res/layout/main.xml").is_none());
        assert!(matches!(
            archive.to_bytes(),
            Err(ArchiveError::PendingDocument(path)) if path == "res/layout/main.xml"
        ));
    }

    #[test]
    fn test_compression_defaults() {
        assert_eq!(default_compression(RESOURCE_TABLE_PATH), CompressionMethod::Stored);
        assert_eq!(default_compression("res/raw/intro.OGG"), CompressionMethod::Stored);
        assert_eq!(default_compression("classes.dex"), CompressionMethod::Deflated);
        assert_eq!(default_compression("LICENSE"), CompressionMethod::Deflated);
    }
}
