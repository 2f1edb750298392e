//! The resources of one apk.
//!
//! [ResourceContainer] owns the resource table and the deferred values documents of an apk.
//! Edits go through [Resources], a view that pairs the container with the apk's archive, the
//! tables of the other members of the bundle and the linked frameworks.

use std::mem;

use crate::apk::ApkError;
use crate::archive::{Archive, ArchiveEntry, MANIFEST_PATH, RESOURCE_TABLE_PATH};
use crate::resource::backend::{BinaryXmlBackend, ComplexValuesBackend, FileBackend, RawBackend};
use crate::resource::deferral::{DeferralQueue, DeferredDocument};
use crate::resource::encode_materials::EncodeMaterials;
use crate::resource::entry_store::EntryStore;
use crate::resource::framework::FrameworkTables;
use crate::resource::path_resolver::{PathResolver, Registration};
use crate::resource::resource_file::{FileHandle, ResourceFile};
use crate::resource::value::Resource;
use crate::resource::values;
use crate::resource::ResourceError;
use crate::table::config::ResConfig;
use crate::table::resource_id::ResourceId;
use crate::table::{Package, ResourceTable};
use crate::utils::{normalize_path, ResPath};
use crate::xml::{axml, XmlDocument, NEW_ID_PREFIX};

#[derive(Debug, Default)]
pub struct ResourceContainer {
    table: Option<ResourceTable>,
    package_index: usize,
    deferred: DeferralQueue,
    /// Set once the table may have been modified.
    dirty: bool,
}

impl ResourceContainer {
    /// Picks the package named `package_name` when the table holds more than one.
    pub fn new(table: Option<ResourceTable>, package_name: Option<&str>) -> Self {
        let package_index = table
            .as_ref()
            .and_then(|table| table.pick(package_name))
            .unwrap_or(0);
        Self {
            table,
            package_index,
            deferred: DeferralQueue::new(),
            dirty: false,
        }
    }

    pub fn has_table(&self) -> bool {
        self.table.is_some()
    }

    pub fn table(&self) -> Option<&ResourceTable> {
        self.table.as_ref()
    }

    pub fn package(&self) -> Option<&Package> {
        self.table.as_ref()?.packages().get(self.package_index)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

pub struct Resources<'a> {
    archive: &'a mut Archive,
    container: &'a mut ResourceContainer,
    linked: Vec<&'a ResourceTable>,
    frameworks: &'a FrameworkTables,
}

impl<'a> Resources<'a> {
    pub fn new(
        archive: &'a mut Archive,
        container: &'a mut ResourceContainer,
        linked: Vec<&'a ResourceTable>,
        frameworks: &'a FrameworkTables,
    ) -> Self {
        Self {
            archive,
            container,
            linked,
            frameworks,
        }
    }

    pub fn has_table(&self) -> bool {
        self.container.has_table()
    }

    pub fn table(&self) -> Option<&ResourceTable> {
        self.container.table()
    }

    pub fn package(&self) -> Option<&Package> {
        self.container.package()
    }

    pub fn archive(&self) -> &Archive {
        &*self.archive
    }

    pub(crate) fn archive_mut(&mut self) -> &mut Archive {
        &mut *self.archive
    }

    pub(crate) fn deferred(&self) -> &DeferralQueue {
        &self.container.deferred
    }

    /// Decode-time lookups over this apk, the other members of the bundle and the frameworks.
    pub fn entry_store(&self) -> EntryStore<'_> {
        let tables = self
            .container
            .table
            .iter()
            .chain(self.linked.iter().copied())
            .collect();
        EntryStore::new(tables, self.frameworks)
    }

    pub(crate) fn materials(&mut self) -> EncodeMaterials<'_> {
        self.container.dirty = true;
        EncodeMaterials::new(
            self.container.table.as_mut(),
            self.container.package_index,
            &self.linked,
            self.frameworks,
        )
    }

    fn config(qualifiers: &str) -> Result<ResConfig, ApkError> {
        Ok(ResConfig::parse(qualifiers).map_err(ResourceError::from)?)
    }

    fn handle_for(&self, path: &str) -> Result<(FileHandle, Box<dyn FileBackend>), ApkError> {
        let decode_error = |source| ApkError::Decode {
            path: path.to_string(),
            source,
        };

        if let Some(res_path) = ResPath::parse(path).filter(ResPath::is_values) {
            if PathResolver::is_reserved(path) {
                return Err(decode_error(ResourceError::ReservedPath(path.to_string())));
            }
            if !self.has_table() {
                return Err(decode_error(ResourceError::NoResourceTable));
            }
            let config = ResConfig::parse(res_path.qualifiers).map_err(|error| decode_error(error.into()))?;
            let handle = FileHandle {
                virtual_path: path.to_string(),
                archive_path: path.to_string(),
                registration: None,
            };
            let backend = ComplexValuesBackend::new(path, config, res_path.values_type());
            return Ok((handle, Box::new(backend)));
        }

        let resolved = PathResolver::new(self.table(), self.container.package_index)
            .resolve(path)
            .map_err(decode_error)?;
        let archive_path = resolved.archive_path;
        let is_xml = match self.archive.entry(&archive_path) {
            Some(entry) if entry.is_pending() => true,
            Some(entry) => entry.bytes().is_some_and(axml::is_binary_xml),
            None => {
                path == MANIFEST_PATH
                    || (path.starts_with("res/") && !path.starts_with("res/raw") && path.ends_with(".xml"))
            }
        };
        let backend: Box<dyn FileBackend> = match is_xml {
            true => Box::new(BinaryXmlBackend::new(path, &archive_path)),
            false => Box::new(RawBackend::new(&archive_path)),
        };
        let handle = FileHandle {
            virtual_path: path.to_string(),
            archive_path,
            registration: resolved.registration,
        };
        Ok((handle, backend))
    }

    /// Opens `path` for editing. The archive entry behind it stays locked until the returned
    /// file is closed, whichever path it was opened through.
    pub fn open_file(&mut self, path: &str) -> Result<ResourceFile, ApkError> {
        let path = normalize_path(path);
        let (handle, backend) = self.handle_for(&path)?;
        let archive_path = handle.archive_path.clone();
        self.archive.locks().lock(&archive_path)?;
        match ResourceFile::load(handle, backend, self) {
            Ok(file) => Ok(file),
            Err(error) => {
                self.archive.locks().unlock(&archive_path);
                Err(error)
            }
        }
    }

    /// Whether `path` exists, without opening it.
    pub fn exists(&self, path: &str) -> Result<bool, ApkError> {
        let path = normalize_path(path);
        let (_, backend) = self.handle_for(&path)?;
        Ok(backend.exists(self))
    }

    /// Removes the archive entry behind `path`. Table entries pointing at it are kept.
    pub fn delete(&mut self, path: &str) -> Result<bool, ApkError> {
        let path = normalize_path(path);
        let (handle, _) = self.handle_for(&path)?;
        self.archive.locks().lock(&handle.archive_path)?;
        let removed = match ResPath::parse(&path).is_some_and(|res_path| res_path.is_values()) {
            true => false,
            false => self.archive.remove(&handle.archive_path).is_some(),
        };
        self.archive.locks().unlock(&handle.archive_path);
        if removed {
            log::debug!("Deleted {} ({})", path, handle.archive_path);
        }
        Ok(removed)
    }

    pub(crate) fn register(&mut self, registration: &Registration) -> Result<(), ResourceError> {
        registration.apply(&mut self.materials())
    }

    /// Encodes a values document into the table. A document referencing a resource nothing
    /// declared yet is queued and retried after every later successful encode.
    pub(crate) fn encode_values(
        &mut self,
        path: &str,
        config: &ResConfig,
        type_name: &str,
        document: XmlDocument,
    ) -> Result<(), ApkError> {
        let result = values::encode(&document, config, &mut self.materials());
        match result {
            Ok(()) => {
                self.container.deferred.remove(config, type_name);
                self.retry_deferred()
            }
            Err(ResourceError::Reference { reference }) => {
                self.container.deferred.push(DeferredDocument {
                    path: path.to_string(),
                    config: config.clone(),
                    type_name: type_name.to_string(),
                    document,
                    reference,
                });
                Ok(())
            }
            Err(source) => Err(ApkError::Encode {
                path: path.to_string(),
                source,
            }),
        }
    }

    fn retry_deferred(&mut self) -> Result<(), ApkError> {
        if self.container.deferred.is_empty() {
            return Ok(());
        }
        let mut queue = mem::take(&mut self.container.deferred);
        let result = queue.retry(|deferred| {
            values::encode(&deferred.document, &deferred.config, &mut self.materials())
        });
        self.container.deferred = queue;
        result
    }

    /// Sets `type_name/name` in the configuration `qualifiers` (`""` for the default one),
    /// creating the entry if needed. Nothing is written when the value cannot be encoded.
    pub fn set(
        &mut self,
        type_name: &str,
        name: &str,
        value: &Resource,
        qualifiers: &str,
    ) -> Result<ResourceId, ApkError> {
        let config = self.table_config(qualifiers)?;
        let id = self.write_or_restore(|resources| {
            let mut materials = resources.materials();
            let id = materials.get_or_create(&config, type_name, name)?;
            let value = value.write(&mut materials)?;
            materials.set_entry(id, &config, value)?;
            Ok(id)
        })?;
        self.retry_deferred()?;
        Ok(id)
    }

    /// Sets several entries of one type at once. Every entry is declared before any value is
    /// written, so the values may reference each other. When one value fails the whole group
    /// is discarded.
    pub fn set_group<'v, I>(
        &mut self,
        type_name: &str,
        entries: I,
        qualifiers: &str,
    ) -> Result<Vec<ResourceId>, ApkError>
    where
        I: IntoIterator<Item = (&'v str, &'v Resource)>,
    {
        let config = self.table_config(qualifiers)?;
        let entries: Vec<_> = entries.into_iter().collect();
        let ids = self.write_or_restore(|resources| {
            let mut materials = resources.materials();
            let ids = entries
                .iter()
                .map(|(name, _)| materials.get_or_create(&config, type_name, name))
                .collect::<Result<Vec<_>, _>>()?;
            for ((_, value), id) in entries.iter().zip(&ids) {
                let value = value.write(&mut materials)?;
                materials.set_entry(*id, &config, value)?;
            }
            Ok(ids)
        })?;
        self.retry_deferred()?;
        Ok(ids)
    }

    fn table_config(&self, qualifiers: &str) -> Result<ResConfig, ApkError> {
        if !self.has_table() {
            return Err(ApkError::NoResourceTable);
        }
        Self::config(qualifiers)
    }

    /// Runs `write` against the table, putting the table back as it was if `write` fails.
    fn write_or_restore<T>(
        &mut self,
        write: impl FnOnce(&mut Self) -> Result<T, ResourceError>,
    ) -> Result<T, ApkError> {
        let snapshot = (self.container.table.clone(), self.container.dirty);
        write(self).map_err(|error| {
            (self.container.table, self.container.dirty) = snapshot;
            ApkError::from(error)
        })
    }

    /// Value of `type_name/name` in exactly the configuration `qualifiers`.
    pub fn get(&self, type_name: &str, name: &str, qualifiers: &str) -> Result<Option<Resource>, ApkError> {
        let config = Self::config(qualifiers)?;
        let (Some(table), Some(package)) = (self.table(), self.package()) else {
            return Err(ApkError::NoResourceTable);
        };
        let Some(entry) = package
            .find(type_name, name)
            .and_then(|id| package.entry(id, &config))
        else {
            return Ok(None);
        };
        let store = self.entry_store();
        Ok(Resource::from_entry(type_name, entry, table.strings(), &store))
    }

    /// Id of `type_name/name` in this apk or another member of its bundle.
    pub fn find(&self, type_name: &str, name: &str) -> Option<ResourceId> {
        self.package()
            .and_then(|package| package.find(type_name, name))
            .or_else(|| {
                self.linked
                    .iter()
                    .flat_map(|table| table.packages())
                    .find_map(|package| package.find(type_name, name))
            })
    }

    pub fn resolve(&self, type_name: &str, name: &str) -> Result<ResourceId, ApkError> {
        self.find(type_name, name).ok_or_else(|| ApkError::Reference {
            reference: format!("@{type_name}/{name}"),
        })
    }

    /// Commits the session: flushes deferred documents, registers inline ids, encodes every
    /// pending binary XML document and writes the table back when it changed.
    pub(crate) fn finalize(&mut self) -> Result<(), ApkError> {
        for path in self.archive.locks().locked() {
            log::warn!(
                "File {path} was never closed! File modifications will not be applied if you do not close them."
            );
        }

        let pending: Vec<(String, XmlDocument)> = self
            .archive
            .pending_paths()
            .into_iter()
            .filter_map(|path| {
                let document = self.pending_document(&path)?;
                Some((path, document))
            })
            .collect();

        // Inline ids are declared before the deferred documents are retried.
        if self.has_table() {
            let mut materials = self.materials();
            for (path, document) in &pending {
                for name in document.new_ids() {
                    materials
                        .resolve(&format!("{NEW_ID_PREFIX}{name}"))
                        .map_err(|source| encode_failure(path, source))?;
                }
            }
        }

        self.retry_deferred()?;
        let unresolved = self.container.deferred.drain_unresolved();
        if !unresolved.is_empty() {
            return Err(ApkError::UnresolvedReferences(unresolved));
        }

        for (path, mut document) in pending {
            if self.has_table() {
                document.strip_new_ids();
            }
            let bytes = axml::encode(&document, &mut self.materials())
                .map_err(|source| encode_failure(&path, source))?;
            self.archive.put(&path, bytes);
        }

        self.refresh_package_name()?;

        if self.container.dirty {
            if let Some(table) = &self.container.table {
                self.archive.put(RESOURCE_TABLE_PATH, table.write()?);
            }
            self.container.dirty = false;
        }
        Ok(())
    }

    fn pending_document(&self, path: &str) -> Option<XmlDocument> {
        match self.archive.entry(path) {
            Some(ArchiveEntry::Pending(document)) => Some(document.clone()),
            _ => None,
        }
    }

    /// Renames the package block after the manifest's `package` attribute.
    fn refresh_package_name(&mut self) -> Result<(), ApkError> {
        let Some(bytes) = self.archive.bytes(MANIFEST_PATH) else {
            return Ok(());
        };
        if !axml::is_binary_xml(bytes) || !self.has_table() {
            return Ok(());
        }
        let manifest = axml::decode(bytes, &self.entry_store()).map_err(|error| ApkError::Decode {
            path: MANIFEST_PATH.to_string(),
            source: error.into(),
        })?;
        let Some(name) = manifest.root.attribute("package").map(str::to_string) else {
            return Ok(());
        };
        let index = self.container.package_index;
        if let Some(package) = self
            .container
            .table
            .as_mut()
            .and_then(|table| table.packages_mut().get_mut(index))
        {
            if package.name != name {
                log::debug!("Renaming package {} to {}", package.name, name);
                package.name = name;
                self.container.dirty = true;
            }
        }
        Ok(())
    }
}

fn encode_failure(path: &str, source: ResourceError) -> ApkError {
    ApkError::Encode {
        path: path.to_string(),
        source,
    }
}
