//! Apks and bundles of apks.
//!
//! An [Apk] owns its archive and its [ResourceContainer]. All edits go through the
//! [Resources] view handed out by [Apk::resources], and are committed by [Apk::finalize]
//! before the archive is written back with [Apk::save].

pub mod bundle;

use itertools::Itertools;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use zip::CompressionMethod;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::archive::lock_table::LockError;
use crate::archive::{Archive, ArchiveError, MANIFEST_PATH, RESOURCE_TABLE_PATH};
use crate::resource::container::{ResourceContainer, Resources};
use crate::resource::deferral::UnresolvedReference;
use crate::resource::entry_store::EntryStore;
use crate::resource::framework::FrameworkTables;
use crate::resource::ResourceError;
use crate::table::config::ResConfig;
use crate::table::{ResourceTable, TableError};
use crate::xml::axml;
use crate::xml::XmlDocument;

#[derive(Debug, Error)]
pub enum ApkError {
    #[error("Failed to decode {path}: {source}")]
    Decode { path: String, source: ResourceError },

    #[error("Failed to encode {path}: {source}")]
    Encode { path: String, source: ResourceError },

    #[error("Path is locked: {0}")]
    Lock(#[from] LockError),

    #[error("Reference {reference} could not be resolved")]
    Reference { reference: String },

    #[error("Unresolved references: {}", .0.iter().join(", "))]
    UnresolvedReferences(Vec<UnresolvedReference>),

    #[error("Apk does not have a resource table")]
    NoResourceTable,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Resource table error: {0}")]
    Table(#[from] TableError),

    #[error("Resource error: {0}")]
    Resource(ResourceError),

    #[error("Cannot figure out the split type of: {0}")]
    InvalidSplit(String),

    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),

    #[error("Apk has already been finalized")]
    AlreadyFinalized,
}

impl From<ResourceError> for ApkError {
    fn from(error: ResourceError) -> Self {
        match error {
            ResourceError::Reference { reference } => ApkError::Reference { reference },
            ResourceError::NoResourceTable => ApkError::NoResourceTable,
            error => ApkError::Resource(error),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SplitKind {
    Language,
    Library,
    Asset,
}

const ARCHITECTURES: [&str; 4] = ["armeabi_v7a", "arm64_v8a", "x86", "x86_64"];

impl SplitKind {
    /// Kind of the split configured for `config`, `en`, `arm64_v8a` or `xxhdpi`.
    pub fn from_config(config: &str) -> Option<Self> {
        if config.len() == 2 {
            return Some(SplitKind::Language);
        }
        if ARCHITECTURES.contains(&config) {
            return Some(SplitKind::Library);
        }
        ResConfig::parse(config)
            .is_ok_and(|config| config.is_density_only())
            .then_some(SplitKind::Asset)
    }
}

impl fmt::Display for SplitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SplitKind::Language => "language",
            SplitKind::Library => "library",
            SplitKind::Asset => "asset",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ApkRole {
    Base,
    Split { kind: SplitKind, config: String },
}

impl ApkRole {
    /// Role of the split named `name` in its manifest, `config.en`.
    pub fn split(name: &str) -> Result<Self, ApkError> {
        let config = name.strip_prefix("config.").unwrap_or(name);
        let kind = SplitKind::from_config(config).ok_or_else(|| ApkError::InvalidSplit(config.to_string()))?;
        Ok(ApkRole::Split {
            kind,
            config: config.to_string(),
        })
    }

    pub fn is_base(&self) -> bool {
        matches!(self, ApkRole::Base)
    }

    pub fn config(&self) -> Option<&str> {
        match self {
            ApkRole::Base => None,
            ApkRole::Split { config, .. } => Some(config),
        }
    }

    pub fn file_name(&self) -> String {
        match self {
            ApkRole::Base => "base.apk".to_string(),
            ApkRole::Split { config, .. } => format!("split_config.{config}.apk"),
        }
    }
}

impl fmt::Display for ApkRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApkRole::Base => f.write_str("base"),
            ApkRole::Split { kind, config } => write!(f, "{kind}_{config}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PackageMetadata {
    pub package_name: String,
    pub package_version: String,
    pub version_code: Option<u32>,
}

impl Default for PackageMetadata {
    fn default() -> Self {
        Self {
            package_name: "unnamed split apk file".to_string(),
            package_version: "0.0.0".to_string(),
            version_code: None,
        }
    }
}

impl PackageMetadata {
    /// Splits usually carry no version name and keep the defaults.
    pub fn from_manifest(manifest: &XmlDocument) -> Self {
        let root = &manifest.root;
        let mut metadata = Self::default();
        if let Some(version) = root.attribute("android:versionName") {
            metadata.package_version = version.to_string();
            if let Some(name) = root.attribute("package") {
                metadata.package_name = name.to_string();
            }
            metadata.version_code = root
                .attribute("android:versionCode")
                .and_then(|code| code.parse().ok());
        }
        metadata
    }
}

/// Compression of entries added to an archive during the session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EntryCompression {
    /// Stores media, archives and resource tables and deflates everything else.
    #[default]
    Auto,
    Stored,
    Deflated,
}

impl EntryCompression {
    fn method(self) -> Option<CompressionMethod> {
        match self {
            EntryCompression::Auto => None,
            EntryCompression::Stored => Some(CompressionMethod::Stored),
            EntryCompression::Deflated => Some(CompressionMethod::Deflated),
        }
    }
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ApkOptions {
    pub compression: EntryCompression,
    /// Links the builtin `android` table. Loaded frameworks take precedence over it.
    pub builtin_framework: bool,
    /// `resources.arsc` files or framework apks to link.
    pub framework_files: Vec<PathBuf>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub framework_tables: Vec<ResourceTable>,
}

impl Default for ApkOptions {
    fn default() -> Self {
        Self {
            compression: EntryCompression::Auto,
            builtin_framework: true,
            framework_files: vec![],
            framework_tables: vec![],
        }
    }
}

impl ApkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression(&mut self, compression: EntryCompression) -> &mut Self {
        self.compression = compression;
        self
    }

    pub fn with_builtin_framework(&mut self, enabled: bool) -> &mut Self {
        self.builtin_framework = enabled;
        self
    }

    pub fn with_framework_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.framework_files.push(path.into());
        self
    }

    pub fn with_framework_table(&mut self, table: ResourceTable) -> &mut Self {
        self.framework_tables.push(table);
        self
    }

    /// Loads every configured framework.
    pub fn frameworks(&self) -> Result<FrameworkTables, ApkError> {
        let mut frameworks = FrameworkTables::new();
        for path in &self.framework_files {
            frameworks.push(FrameworkTables::load_file(path)?);
        }
        for table in &self.framework_tables {
            frameworks.push(table.clone());
        }
        if self.builtin_framework {
            frameworks.push(crate::resource::framework::builtin_android_table()?);
        }
        Ok(frameworks)
    }
}

#[derive(Debug)]
pub struct Apk {
    role: ApkRole,
    metadata: PackageMetadata,
    archive: Archive,
    container: ResourceContainer,
    frameworks: Arc<FrameworkTables>,
    finalized: bool,
}

impl Apk {
    pub fn open(path: &Path, options: &ApkOptions) -> Result<Self, ApkError> {
        let frameworks = Arc::new(options.frameworks()?);
        Self::open_linked(path, options, frameworks)
    }

    pub fn from_bytes(data: &[u8], options: &ApkOptions) -> Result<Self, ApkError> {
        let frameworks = Arc::new(options.frameworks()?);
        Self::from_archive(Archive::from_bytes(data)?, options, frameworks)
    }

    pub(crate) fn open_linked(
        path: &Path,
        options: &ApkOptions,
        frameworks: Arc<FrameworkTables>,
    ) -> Result<Self, ApkError> {
        Self::from_archive(Archive::open(path)?, options, frameworks)
    }

    pub(crate) fn from_archive(
        mut archive: Archive,
        options: &ApkOptions,
        frameworks: Arc<FrameworkTables>,
    ) -> Result<Self, ApkError> {
        archive.set_new_entry_compression(options.compression.method());
        let table = archive
            .bytes(RESOURCE_TABLE_PATH)
            .map(ResourceTable::read)
            .transpose()?;
        let manifest = read_manifest(&archive, table.as_ref(), &frameworks)?;

        let role = match manifest.as_ref().and_then(|manifest| manifest.root.attribute("split")) {
            Some(split) => ApkRole::split(split)?,
            None => ApkRole::Base,
        };
        let metadata = manifest
            .as_ref()
            .map(PackageMetadata::from_manifest)
            .unwrap_or_default();
        let package_name = manifest
            .as_ref()
            .and_then(|manifest| manifest.root.attribute("package"));
        let container = ResourceContainer::new(table, package_name);
        log::debug!("Loaded {} apk {}", role, metadata.package_name);

        Ok(Self {
            role,
            metadata,
            archive,
            container,
            frameworks,
            finalized: false,
        })
    }

    pub fn role(&self) -> &ApkRole {
        &self.role
    }

    pub fn metadata(&self) -> &PackageMetadata {
        &self.metadata
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    pub fn container(&self) -> &ResourceContainer {
        &self.container
    }

    pub fn table(&self) -> Option<&ResourceTable> {
        self.container.table()
    }

    pub fn frameworks(&self) -> &FrameworkTables {
        &self.frameworks
    }

    pub fn file_name(&self) -> String {
        self.role.file_name()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// The resources of this apk on its own. Use [bundle::ApkBundle::resources] to resolve
    /// names declared by the other members of a bundle.
    pub fn resources(&mut self) -> Resources<'_> {
        self.resources_linked(vec![])
    }

    pub(crate) fn resources_linked<'a>(&'a mut self, linked: Vec<&'a ResourceTable>) -> Resources<'a> {
        Resources::new(&mut self.archive, &mut self.container, linked, &self.frameworks)
    }

    /// Commits every edit into the archive. Can only run once.
    pub fn finalize(&mut self) -> Result<(), ApkError> {
        self.finalize_linked(vec![])
    }

    pub(crate) fn finalize_linked(&mut self, linked: Vec<&ResourceTable>) -> Result<(), ApkError> {
        if self.finalized {
            return Err(ApkError::AlreadyFinalized);
        }
        log::info!("Finalizing {}", self.role);
        self.resources_linked(linked).finalize()?;
        if let Some(manifest) = read_manifest(&self.archive, self.container.table(), &self.frameworks)? {
            self.metadata = PackageMetadata::from_manifest(&manifest);
        }
        self.finalized = true;
        Ok(())
    }

    /// Writes the archive. Binary XML edited since the last finalize cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), ApkError> {
        Ok(self.archive.save(path)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ApkError> {
        Ok(self.archive.to_bytes()?)
    }
}

fn read_manifest(
    archive: &Archive,
    table: Option<&ResourceTable>,
    frameworks: &FrameworkTables,
) -> Result<Option<XmlDocument>, ApkError> {
    let Some(bytes) = archive.bytes(MANIFEST_PATH) else {
        return Ok(None);
    };
    if !axml::is_binary_xml(bytes) {
        return Ok(None);
    }
    let store = EntryStore::new(table.into_iter().collect(), frameworks);
    let manifest = axml::decode(bytes, &store).map_err(|error| ApkError::Decode {
        path: MANIFEST_PATH.to_string(),
        source: error.into(),
    })?;
    Ok(Some(manifest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_roles() -> Result<(), ApkError> {
        let language = ApkRole::split("config.de")?;
        assert_eq!(language.to_string(), "language_de");
        assert_eq!(language.file_name(), "split_config.de.apk");

        let library = ApkRole::split("config.arm64_v8a")?;
        assert!(matches!(library, ApkRole::Split { kind: SplitKind::Library, .. }));

        let asset = ApkRole::split("config.xxhdpi")?;
        assert_eq!(asset.to_string(), "asset_xxhdpi");
        assert_eq!(asset.config(), Some("xxhdpi"));

        assert!(matches!(ApkRole::split("config.feature_camera"), Err(ApkError::InvalidSplit(_))));
        assert_eq!(ApkRole::Base.to_string(), "base");
        assert_eq!(ApkRole::Base.file_name(), "base.apk");
        Ok(())
    }

    #[test]
    fn test_metadata_defaults() {
        let split = XmlDocument::new(
            crate::xml::XmlElement::new("manifest")
                .with_attribute("package", "com.example")
                .with_attribute("split", "config.en"),
        );
        assert_eq!(PackageMetadata::from_manifest(&split), PackageMetadata::default());

        let base = XmlDocument::new(
            crate::xml::XmlElement::new("manifest")
                .with_attribute("package", "com.example")
                .with_attribute("android:versionCode", "42")
                .with_attribute("android:versionName", "1.2.3"),
        );
        let metadata = PackageMetadata::from_manifest(&base);
        assert_eq!(metadata.package_name, "com.example");
        assert_eq!(metadata.package_version, "1.2.3");
        assert_eq!(metadata.version_code, Some(42));
    }

    #[test]
    fn test_error_conversion() {
        assert!(matches!(
            ApkError::from(ResourceError::reference("@string/a")),
            ApkError::Reference { reference } if reference == "@string/a"
        ));
        assert!(matches!(
            ApkError::from(ResourceError::NoResourceTable),
            ApkError::NoResourceTable
        ));
    }
}
