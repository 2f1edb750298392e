//! Maps virtual `res/` paths onto the archive paths recorded in the resource table.
//!
//! Shrunk apks store files under opaque names (`res/a0.png`) and only the table knows which
//! entry they belong to, so a file is looked up by the `(type, name, config)` its virtual
//! path spells out.

use crate::resource::encode_materials::EncodeMaterials;
use crate::resource::ResourceError;
use crate::table::config::ResConfig;
use crate::table::res_value::{ResValue, ValueType};
use crate::table::{EntryValue, ResourceTable};
use crate::utils::ResPath;

/// Creates the table entry of a file that had none, once the file has been written.
#[derive(Clone, Debug, PartialEq)]
pub struct Registration {
    pub type_name: String,
    pub name: String,
    pub config: ResConfig,
    pub archive_path: String,
}

impl Registration {
    pub fn apply(&self, materials: &mut EncodeMaterials) -> Result<(), ResourceError> {
        let id = materials.get_or_create(&self.config, &self.type_name, &self.name)?;
        let path = materials.intern(&self.archive_path)?;
        materials.set_entry(id, &self.config, EntryValue::Simple(ResValue::string(path)))?;
        log::debug!(
            "Registered {} as {}/{} ({}) with id {}",
            self.archive_path,
            self.type_name,
            self.name,
            self.config,
            id
        );
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedPath {
    pub archive_path: String,
    pub registration: Option<Registration>,
}

impl ResolvedPath {
    fn unregistered(path: &str) -> Self {
        Self {
            archive_path: path.to_string(),
            registration: None,
        }
    }
}

pub struct PathResolver<'t> {
    table: Option<&'t ResourceTable>,
    package_index: usize,
}

impl<'t> PathResolver<'t> {
    pub fn new(table: Option<&'t ResourceTable>, package_index: usize) -> Self {
        Self {
            table,
            package_index,
        }
    }

    /// `res/values*/public.xml` mirrors the table's id assignments and is not a file.
    pub fn is_reserved(path: &str) -> bool {
        ResPath::parse(path).is_some_and(|res_path| res_path.is_values() && res_path.file_name == "public.xml")
    }

    /// Resolves the normalized virtual `path`. Paths outside `res/<type>/` and apks without a
    /// table map onto themselves.
    pub fn resolve(&self, path: &str) -> Result<ResolvedPath, ResourceError> {
        let (Some(table), Some(res_path)) = (self.table, ResPath::parse(path)) else {
            return Ok(ResolvedPath::unregistered(path));
        };
        let Some(package) = table.packages().get(self.package_index) else {
            return Ok(ResolvedPath::unregistered(path));
        };
        let config = ResConfig::parse(res_path.qualifiers)?;
        let name = res_path.name();

        if let Some(id) = package.find(res_path.directory, name) {
            let matches: Vec<_> = package
                .entry_configs(id)
                .into_iter()
                .filter(|(entry_config, _)| **entry_config == config)
                .collect();
            if let [(_, entry)] = matches.as_slice() {
                let archive_path = entry
                    .value()
                    .filter(|value| value.data_type == ValueType::String)
                    .and_then(|value| table.string_value(value));
                if let Some(archive_path) = archive_path {
                    log::debug!("Resolved {} to {}", path, archive_path);
                    return Ok(ResolvedPath::unregistered(archive_path));
                }
            }
        }

        Ok(ResolvedPath {
            archive_path: path.to_string(),
            registration: Some(Registration {
                type_name: res_path.directory.to_string(),
                name: name.to_string(),
                config,
                archive_path: path.to_string(),
            }),
        })
    }
}
