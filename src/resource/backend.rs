//! Storage of file contents inside an apk.
//!
//! Every virtual path is served by one backend: plain archive entries are copied as is,
//! binary XML is decoded to text on load and kept as a pending document after a save, and
//! `res/values*/*.xml` files are views over blocks of the resource table.

use std::collections::HashSet;
use std::fmt;

use crate::apk::ApkError;
use crate::archive::ArchiveEntry;
use crate::resource::container::Resources;
use crate::resource::values::ValuesDecoder;
use crate::resource::ResourceError;
use crate::table::config::ResConfig;
use crate::xml::{axml, XmlDocument};

pub trait FileBackend: fmt::Debug + Send {
    fn exists(&self, resources: &Resources) -> bool;

    /// Decoded contents of the file. Only called when the file exists.
    fn load(&self, resources: &Resources) -> Result<Vec<u8>, ApkError>;

    fn save(&self, resources: &mut Resources, contents: &[u8]) -> Result<(), ApkError>;
}

fn decode_error(path: &str, source: impl Into<ResourceError>) -> ApkError {
    ApkError::Decode {
        path: path.to_string(),
        source: source.into(),
    }
}

fn encode_error(path: &str, source: impl Into<ResourceError>) -> ApkError {
    ApkError::Encode {
        path: path.to_string(),
        source: source.into(),
    }
}

#[derive(Debug)]
pub struct RawBackend {
    archive_path: String,
}

impl RawBackend {
    pub fn new(archive_path: &str) -> Self {
        Self {
            archive_path: archive_path.to_string(),
        }
    }
}

impl FileBackend for RawBackend {
    fn exists(&self, resources: &Resources) -> bool {
        resources.archive().contains(&self.archive_path)
    }

    fn load(&self, resources: &Resources) -> Result<Vec<u8>, ApkError> {
        match resources.archive().entry(&self.archive_path) {
            Some(ArchiveEntry::Pending(document)) => document
                .to_bytes()
                .map_err(|error| decode_error(&self.archive_path, error)),
            Some(entry) => Ok(entry.bytes().unwrap_or_default().to_vec()),
            None => Ok(vec![]),
        }
    }

    fn save(&self, resources: &mut Resources, contents: &[u8]) -> Result<(), ApkError> {
        resources.archive_mut().put(&self.archive_path, contents.to_vec());
        Ok(())
    }
}

#[derive(Debug)]
pub struct BinaryXmlBackend {
    virtual_path: String,
    archive_path: String,
}

impl BinaryXmlBackend {
    pub fn new(virtual_path: &str, archive_path: &str) -> Self {
        Self {
            virtual_path: virtual_path.to_string(),
            archive_path: archive_path.to_string(),
        }
    }
}

impl FileBackend for BinaryXmlBackend {
    fn exists(&self, resources: &Resources) -> bool {
        resources.archive().contains(&self.archive_path)
    }

    fn load(&self, resources: &Resources) -> Result<Vec<u8>, ApkError> {
        let document = match resources.archive().entry(&self.archive_path) {
            // Edited earlier in this session, may reference resources the binary form could not.
            Some(ArchiveEntry::Pending(document)) => document.clone(),
            Some(entry) => {
                let bytes = entry.bytes().unwrap_or_default();
                if !axml::is_binary_xml(bytes) {
                    return Ok(bytes.to_vec());
                }
                axml::decode(bytes, &resources.entry_store())
                    .map_err(|error| decode_error(&self.virtual_path, error))?
            }
            None => return Ok(vec![]),
        };
        document
            .to_bytes()
            .map_err(|error| decode_error(&self.virtual_path, error))
    }

    fn save(&self, resources: &mut Resources, contents: &[u8]) -> Result<(), ApkError> {
        let document =
            XmlDocument::parse(contents).map_err(|error| encode_error(&self.virtual_path, error))?;
        resources
            .archive_mut()
            .put_pending(&self.archive_path, document);
        Ok(())
    }
}

/// A `res/values*/<type>s.xml` file, backed by the `type_name` block in `config`.
#[derive(Debug)]
pub struct ComplexValuesBackend {
    virtual_path: String,
    config: ResConfig,
    type_name: String,
}

impl ComplexValuesBackend {
    pub fn new(virtual_path: &str, config: ResConfig, type_name: &str) -> Self {
        Self {
            virtual_path: virtual_path.to_string(),
            config,
            type_name: type_name.to_string(),
        }
    }
}

impl FileBackend for ComplexValuesBackend {
    fn exists(&self, resources: &Resources) -> bool {
        let has_block = resources
            .package()
            .and_then(|package| package.type_spec(&self.type_name))
            .is_some_and(|spec| spec.block(&self.config).is_some());
        has_block
            || resources
                .deferred()
                .pending(&self.config, &self.type_name)
                .is_some()
    }

    fn load(&self, resources: &Resources) -> Result<Vec<u8>, ApkError> {
        let (Some(table), Some(package)) = (resources.table(), resources.package()) else {
            return Err(decode_error(&self.virtual_path, ResourceError::NoResourceTable));
        };
        let pending = resources.deferred().pending(&self.config, &self.type_name);
        let pending_names: HashSet<&str> = pending
            .iter()
            .flat_map(|deferred| deferred.document.root.elements())
            .filter_map(|element| element.attribute("name"))
            .collect();

        let store = resources.entry_store();
        let mut document = ValuesDecoder::new(table.strings(), &store).decode(
            package,
            &self.type_name,
            &self.config,
            |name| pending_names.contains(name),
        );
        if let Some(deferred) = pending {
            for element in deferred.document.root.elements() {
                document.root.push_child(element.clone());
            }
        }
        document
            .to_bytes()
            .map_err(|error| decode_error(&self.virtual_path, error))
    }

    fn save(&self, resources: &mut Resources, contents: &[u8]) -> Result<(), ApkError> {
        let document =
            XmlDocument::parse(contents).map_err(|error| encode_error(&self.virtual_path, error))?;
        resources.encode_values(&self.virtual_path, &self.config, &self.type_name, document)
    }
}
