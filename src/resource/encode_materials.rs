//! Encode-time symbol resolution.
//!
//! Names are resolved against the package being edited first, then against the sibling
//! packages of the bundle and finally against the linked frameworks. Only the package being
//! edited is ever written to: `@+type/name` references and declarations create entries
//! there, placed so their ids do not collide with ids the siblings already hand out.

use crate::resource::entry_store::{AttrDefinition, ResourceLookup};
use crate::resource::framework::FrameworkTables;
use crate::resource::value_codec::{self, Reference, ReferenceResolver};
use crate::resource::ResourceError;
use crate::table::config::ResConfig;
use crate::table::res_value::{AttrFormat, ResValue};
use crate::table::resource_id::ResourceId;
use crate::table::string_pool::StringPool;
use crate::table::{AllocationHint, EntryValue, Package, ResourceTable};
use crate::xml::axml::{AxmlEncoder, EncodedValue};
use crate::xml::ANDROID_NAMESPACE;

const RES_AUTO_NAMESPACE: &str = "http://schemas.android.com/apk/res-auto";
const APP_NAMESPACE_PREFIX: &str = "http://schemas.android.com/apk/res/";

pub struct EncodeMaterials<'m> {
    table: Option<&'m mut ResourceTable>,
    package_index: usize,
    linked: &'m [&'m ResourceTable],
    frameworks: &'m FrameworkTables,
}

impl<'m> EncodeMaterials<'m> {
    /// Materials writing into package `package_index` of `table`. Without a table only
    /// linked and framework names resolve and nothing can be created.
    pub fn new(
        table: Option<&'m mut ResourceTable>,
        package_index: usize,
        linked: &'m [&'m ResourceTable],
        frameworks: &'m FrameworkTables,
    ) -> Self {
        Self {
            table,
            package_index,
            linked,
            frameworks,
        }
    }

    pub fn has_table(&self) -> bool {
        self.table.is_some()
    }

    pub fn package(&self) -> Option<&Package> {
        self.table.as_deref()?.packages().get(self.package_index)
    }

    fn package_mut(&mut self) -> Result<&mut Package, ResourceError> {
        let index = self.package_index;
        self.table
            .as_deref_mut()
            .and_then(|table| table.packages_mut().get_mut(index))
            .ok_or(ResourceError::NoResourceTable)
    }

    fn linked_packages(&self) -> impl Iterator<Item = &Package> {
        self.linked.iter().flat_map(|table| table.packages().iter())
    }

    /// Looks up `type_name/name` without creating anything. `android` names only resolve
    /// against the frameworks.
    pub fn find(&self, package: Option<&str>, type_name: &str, name: &str) -> Option<ResourceId> {
        if package == Some("android") {
            return self.frameworks.find(package, type_name, name);
        }
        let accepts = |candidate: &Package| package.map_or(true, |package| candidate.name == package);
        self.package()
            .filter(|current| package.is_none() || accepts(*current))
            .and_then(|current| current.find(type_name, name))
            .or_else(|| {
                self.linked_packages()
                    .filter(|candidate| accepts(*candidate))
                    .find_map(|candidate| candidate.find(type_name, name))
            })
            .or_else(|| self.frameworks.find(package, type_name, name))
    }

    fn allocation_hint(&self, type_name: &str) -> AllocationHint {
        let mut hint = AllocationHint::default();
        let Some(package_id) = self.package().map(|package| package.id) else {
            return hint;
        };
        for sibling in self.linked_packages().filter(|sibling| sibling.id == package_id) {
            if let Some(spec) = sibling.type_spec(type_name) {
                hint.type_id.get_or_insert(spec.id);
                hint.min_entry = hint.min_entry.max(spec.entry_count() as u16);
            }
        }
        hint
    }

    /// Id of `type_name/name`, creating it in the edited package (with an undefined entry in
    /// `config`) when no package declares it.
    pub fn get_or_create(
        &mut self,
        config: &ResConfig,
        type_name: &str,
        name: &str,
    ) -> Result<ResourceId, ResourceError> {
        let current = self.package().and_then(|package| package.find(type_name, name));
        let hint = match current {
            Some(_) => AllocationHint::default(),
            None => {
                let shared = self.linked_packages().find_map(|sibling| {
                    sibling
                        .find(type_name, name)
                        .filter(|id| Some(id.package()) == self.package().map(|package| package.id))
                });
                if let Some(id) = shared {
                    return Ok(id);
                }
                self.allocation_hint(type_name)
            }
        };
        Ok(self.package_mut()?.get_or_create_with(config, type_name, name, hint)?)
    }

    pub fn set_entry(
        &mut self,
        id: ResourceId,
        config: &ResConfig,
        value: EntryValue,
    ) -> Result<(), ResourceError> {
        Ok(self.package_mut()?.set_entry(id, config, value)?)
    }

    /// Interns `value` into the string pool of the edited table.
    pub fn intern(&mut self, value: &str) -> Result<u32, ResourceError> {
        let table = self.table.as_deref_mut().ok_or(ResourceError::NoResourceTable)?;
        Ok(table.strings_mut().get_or_insert(value))
    }

    /// Resolves a textual reference such as `@string/app_name` or `@+id/button`.
    pub fn resolve(&mut self, text: &str) -> Result<ResourceId, ResourceError> {
        let reference = Reference::parse(text).ok_or_else(|| ResourceError::reference(text))?;
        self.resolve_reference(&reference)
    }

    /// Id of an attribute named as in style items: `android:textColor` or `colorAccent`.
    pub fn attribute_by_name(&self, name: &str) -> Result<ResourceId, ResourceError> {
        let (package, local) = match name.split_once(':') {
            Some((package, local)) => (Some(package), local),
            None => (None, name),
        };
        let package = package.filter(|package| *package == "android");
        self.find(package, "attr", local).ok_or_else(|| {
            let reference = match package {
                Some(package) => format!("@{package}:attr/{local}"),
                None => format!("@attr/{local}"),
            };
            ResourceError::reference(&reference)
        })
    }

    pub fn attribute_definition(&self, id: ResourceId) -> AttrDefinition {
        self.attribute(id).unwrap_or_default()
    }
}

impl ResourceLookup for EncodeMaterials<'_> {
    fn packages(&self) -> Vec<&Package> {
        self.table
            .as_deref()
            .into_iter()
            .flat_map(|table| table.packages().iter())
            .chain(self.linked_packages())
            .chain(self.frameworks.packages())
            .collect()
    }

    fn strings_for(&self, id: ResourceId) -> Option<&StringPool> {
        self.table
            .as_deref()
            .into_iter()
            .chain(self.linked.iter().copied())
            .chain(self.frameworks.tables())
            .find(|table| table.package(id.package()).is_some())
            .map(ResourceTable::strings)
    }
}

impl ReferenceResolver for EncodeMaterials<'_> {
    fn resolve_reference(&mut self, reference: &Reference<'_>) -> Result<ResourceId, ResourceError> {
        let type_name = reference.resource_type();
        if let Some(id) = self.find(reference.package, type_name, reference.name) {
            return Ok(id);
        }
        if !reference.create || reference.is_framework() || !self.has_table() {
            return Err(ResourceError::reference(&reference.to_string()));
        }
        let default = ResConfig::default();
        let id = self.get_or_create(&default, type_name, reference.name)?;
        if type_name == "id" {
            self.set_entry(id, &default, EntryValue::Simple(ResValue::boolean(false)))?;
        }
        log::trace!("Created {} as {}", reference, id);
        Ok(id)
    }
}

impl AxmlEncoder for EncodeMaterials<'_> {
    type Error = ResourceError;

    fn attribute_id(&mut self, namespace: Option<&str>, name: &str) -> Result<Option<u32>, ResourceError> {
        match namespace {
            Some(ANDROID_NAMESPACE) => self
                .frameworks
                .find(Some("android"), "attr", name)
                .map(|id| Some(id.value()))
                .ok_or_else(|| ResourceError::reference(&format!("@android:attr/{name}"))),
            Some(namespace) if namespace == RES_AUTO_NAMESPACE || namespace.starts_with(APP_NAMESPACE_PREFIX) => {
                Ok(self.find(None, "attr", name).map(|id| id.value()))
            }
            _ => Ok(None),
        }
    }

    fn encode_value(&mut self, attribute: Option<u32>, value: &str) -> Result<EncodedValue, ResourceError> {
        match attribute {
            Some(id) => {
                let definition = self.attribute_definition(ResourceId::from(id));
                value_codec::encode_value(value, definition.format, &definition.symbols, self)
            }
            None if Reference::parse(value.trim()).is_some() => {
                value_codec::encode_value(value, AttrFormat::any(), &[], self)
            }
            None => Ok(EncodedValue::String(value.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TableError;

    fn split_table() -> Result<ResourceTable, TableError> {
        let mut table = ResourceTable::new(0x7f, "com.example");
        let package = &mut table.packages_mut()[0];
        package.get_or_create(&ResConfig::default(), "string", "app_name")?;
        package.get_or_create(&ResConfig::default(), "id", "shared")?;
        Ok(table)
    }

    #[test]
    fn test_resolution_order() -> Result<(), Box<dyn std::error::Error>> {
        let frameworks = FrameworkTables::with_builtin()?;
        let base = split_table()?;
        let linked = [&base];
        let mut table = ResourceTable::new(0x7f, "com.example");
        let mut materials = EncodeMaterials::new(Some(&mut table), 0, &linked, &frameworks);

        assert_eq!(materials.resolve("@string/app_name")?, ResourceId::from(0x7f010000));
        assert_eq!(materials.resolve("@android:attr/label")?, ResourceId::from(0x01010001));
        assert_eq!(materials.resolve("?android:attr/label")?, ResourceId::from(0x01010001));
        assert!(matches!(
            materials.resolve("@string/missing"),
            Err(ResourceError::Reference { reference }) if reference == "@string/missing"
        ));
        Ok(())
    }

    #[test]
    fn test_create_avoids_sibling_ids() -> Result<(), Box<dyn std::error::Error>> {
        let frameworks = FrameworkTables::new();
        let base = split_table()?;
        let linked = [&base];
        let mut table = ResourceTable::new(0x7f, "com.example");
        let mut materials = EncodeMaterials::new(Some(&mut table), 0, &linked, &frameworks);

        assert_eq!(materials.resolve("@+id/shared")?, ResourceId::from(0x7f020000));
        let created = materials.resolve("@+id/button")?;
        assert_eq!(created, ResourceId::from(0x7f020001));
        assert_eq!(materials.resolve("@id/button")?, created);
        assert!(materials.resolve("@+android:id/button").is_err());
        Ok(())
    }

    #[test]
    fn test_tableless_materials() -> Result<(), Box<dyn std::error::Error>> {
        let frameworks = FrameworkTables::with_builtin()?;
        let mut materials = EncodeMaterials::new(None, 0, &[], &frameworks);

        assert_eq!(
            materials.attribute_id(Some(ANDROID_NAMESPACE), "versionCode")?,
            Some(0x0101021b)
        );
        assert_eq!(
            materials.encode_value(Some(0x0101021b), "42")?,
            EncodedValue::Typed(ResValue::int(42))
        );
        assert!(materials.resolve("@+id/button").is_err());
        assert!(materials.attribute_id(Some(ANDROID_NAMESPACE), "notAnAttribute").is_err());
        Ok(())
    }
}
