use std::io::{self, Cursor, Write};

use crate::apk::ApkError;
use crate::resource::backend::FileBackend;
use crate::resource::container::Resources;
use crate::resource::path_resolver::Registration;
use crate::xml::XmlDocument;

/// Where an open file lives.
#[derive(Clone, Debug, PartialEq)]
pub struct FileHandle {
    /// Normalized path the file was opened with. The file is locked under this path.
    pub virtual_path: String,
    pub archive_path: String,
    /// Table entry to create once the file is written, for files the table does not know.
    pub registration: Option<Registration>,
}

/// A file opened for editing.
///
/// The contents are decoded once when the file is opened. Nothing is written back to the apk
/// until [ResourceFile::close] is called, and only if the contents were replaced or written to.
#[derive(Debug)]
pub struct ResourceFile {
    handle: FileHandle,
    backend: Box<dyn FileBackend>,
    contents: Vec<u8>,
    changed: bool,
    exists: bool,
}

impl ResourceFile {
    /// Reads the file through `backend`. The caller holds the lock of the handle's path.
    pub(crate) fn load(
        handle: FileHandle,
        backend: Box<dyn FileBackend>,
        resources: &Resources,
    ) -> Result<Self, ApkError> {
        let exists = backend.exists(resources);
        let contents = match exists {
            true => {
                log::info!("Decoding file: {}", handle.virtual_path);
                backend.load(resources)?
            }
            false => vec![],
        };
        Ok(Self {
            handle,
            backend,
            contents,
            changed: false,
            exists,
        })
    }

    pub fn path(&self) -> &str {
        &self.handle.virtual_path
    }

    pub fn handle(&self) -> &FileHandle {
        &self.handle
    }

    /// Whether the file existed when it was opened.
    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    pub fn read_text(&self) -> String {
        String::from_utf8_lossy(&self.contents).into_owned()
    }

    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(self.contents.as_slice())
    }

    /// Truncates the contents and appends whatever is written. Marks the file as changed
    /// even if nothing is written.
    pub fn writer(&mut self) -> ContentsWriter<'_> {
        self.contents.clear();
        self.changed = true;
        ContentsWriter {
            contents: &mut self.contents,
        }
    }

    pub fn set_contents(&mut self, contents: impl Into<Vec<u8>>) {
        self.contents = contents.into();
        self.changed = true;
    }

    pub fn write_text(&mut self, text: &str) {
        self.set_contents(text.as_bytes());
    }

    /// Parses the contents as a textual XML document.
    pub fn document(&self) -> Result<XmlDocument, ApkError> {
        XmlDocument::parse(&self.contents).map_err(|error| ApkError::Decode {
            path: self.handle.virtual_path.clone(),
            source: error.into(),
        })
    }

    pub fn set_document(&mut self, document: &XmlDocument) -> Result<(), ApkError> {
        let contents = document.to_bytes().map_err(|error| ApkError::Encode {
            path: self.handle.virtual_path.clone(),
            source: error.into(),
        })?;
        self.set_contents(contents);
        Ok(())
    }

    /// Writes the contents back if they changed and releases the lock. The lock is released
    /// even when encoding fails.
    pub fn close(self, resources: &mut Resources) -> Result<(), ApkError> {
        let result = self.commit(resources);
        resources.archive().locks().unlock(&self.handle.archive_path);
        result
    }

    fn commit(&self, resources: &mut Resources) -> Result<(), ApkError> {
        if !self.changed {
            return Ok(());
        }
        log::info!("Encoding file: {}", self.handle.virtual_path);
        self.backend.save(resources, &self.contents)?;
        if let Some(registration) = &self.handle.registration {
            resources.register(registration).map_err(|source| ApkError::Encode {
                path: self.handle.virtual_path.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

pub struct ContentsWriter<'f> {
    contents: &'f mut Vec<u8>,
}

impl Write for ContentsWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.contents.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
