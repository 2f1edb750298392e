//! Read-only lookups across every table visible from a package: its own, the sibling
//! packages of a bundle and the linked frameworks.

use crate::resource::framework::FrameworkTables;
use crate::resource::value_codec;
use crate::table::config::ResConfig;
use crate::table::res_value::{AttrFormat, ResValue, ATTR_L10N, ATTR_MAX, ATTR_MIN, ATTR_TYPE};
use crate::table::resource_id::ResourceId;
use crate::table::string_pool::StringPool;
use crate::table::{Entry, Package, ResourceTable};
use crate::xml::axml::AxmlDecoder;

pub const FRAMEWORK_PACKAGE_ID: u8 = 0x01;

/// The symbolic name of a resource id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceName {
    pub package_id: u8,
    pub package_name: String,
    pub type_name: String,
    pub name: String,
}

impl ResourceName {
    /// The reference form, `@string/app_name` or `?android:attr/textColor`.
    pub fn reference(&self, sigil: char) -> String {
        match self.package_id {
            FRAMEWORK_PACKAGE_ID => format!("{sigil}android:{}/{}", self.type_name, self.name),
            _ => format!("{sigil}{}/{}", self.type_name, self.name),
        }
    }

    /// The attribute form used for style items and xml attributes, `android:textColor`.
    pub fn attribute(&self) -> String {
        match self.package_id {
            FRAMEWORK_PACKAGE_ID => format!("android:{}", self.name),
            _ => self.name.clone(),
        }
    }
}

/// What an `attr` resource accepts.
#[derive(Clone, Debug, PartialEq)]
pub struct AttrDefinition {
    pub format: AttrFormat,
    /// Enum or flag symbols with their values.
    pub symbols: Vec<(String, u32)>,
    pub min: Option<i32>,
    pub max: Option<i32>,
}

impl Default for AttrDefinition {
    fn default() -> Self {
        Self {
            format: AttrFormat::any(),
            symbols: vec![],
            min: None,
            max: None,
        }
    }
}

impl AttrDefinition {
    pub fn symbol_value(&self, name: &str) -> Option<u32> {
        self.symbols
            .iter()
            .find(|(symbol, _)| symbol == name)
            .map(|(_, value)| *value)
    }

    pub fn symbol_name(&self, value: u32) -> Option<&str> {
        self.symbols
            .iter()
            .find(|(_, symbol_value)| *symbol_value == value)
            .map(|(symbol, _)| symbol.as_str())
    }
}

/// Name and entry lookups over an ordered set of packages.
pub trait ResourceLookup {
    /// Packages in resolution order.
    fn packages(&self) -> Vec<&Package>;

    /// String pool of the table that holds `id`.
    fn strings_for(&self, id: ResourceId) -> Option<&StringPool>;

    fn name_of(&self, id: ResourceId) -> Option<ResourceName> {
        self.packages()
            .into_iter()
            .filter(|package| package.id == id.package())
            .find_map(|package| {
                package.name_of(id).map(|(type_name, name)| ResourceName {
                    package_id: package.id,
                    package_name: package.name.clone(),
                    type_name: type_name.to_string(),
                    name: name.to_string(),
                })
            })
    }

    /// The entry of `id`, preferring the default configuration.
    fn entry(&self, id: ResourceId) -> Option<&Entry> {
        let packages: Vec<&Package> = self
            .packages()
            .into_iter()
            .filter(|package| package.id == id.package())
            .collect();
        packages
            .iter()
            .copied()
            .find_map(|package| package.entry(id, &ResConfig::default()))
            .or_else(|| {
                packages
                    .iter()
                    .copied()
                    .find_map(|package| package.entry_configs(id).first().map(|(_, entry)| *entry))
            })
    }

    fn attribute(&self, id: ResourceId) -> Option<AttrDefinition> {
        let entry = self.entry(id)?;
        if !entry.is_complex() {
            return None;
        }
        let mut definition = AttrDefinition {
            format: AttrFormat::new(),
            ..Default::default()
        };
        for (key, value) in entry.items() {
            match *key {
                ATTR_TYPE => definition.format = AttrFormat::from_bits(value.data),
                ATTR_MIN => definition.min = Some(value.data as i32),
                ATTR_MAX => definition.max = Some(value.data as i32),
                ATTR_L10N => {}
                symbol => {
                    if let Some(name) = self.name_of(ResourceId::from(symbol)) {
                        definition.symbols.push((name.name, value.data));
                    }
                }
            }
        }
        Some(definition)
    }
}

/// Decode-time view over a set of tables.
pub struct EntryStore<'s> {
    tables: Vec<&'s ResourceTable>,
    frameworks: &'s FrameworkTables,
}

impl<'s> EntryStore<'s> {
    pub fn new(tables: Vec<&'s ResourceTable>, frameworks: &'s FrameworkTables) -> Self {
        Self { tables, frameworks }
    }

    pub fn tables(&self) -> &[&'s ResourceTable] {
        &self.tables
    }
}

impl ResourceLookup for EntryStore<'_> {
    fn packages(&self) -> Vec<&Package> {
        self.tables
            .iter()
            .flat_map(|table| table.packages().iter())
            .chain(self.frameworks.packages())
            .collect()
    }

    fn strings_for(&self, id: ResourceId) -> Option<&StringPool> {
        self.tables
            .iter()
            .copied()
            .chain(self.frameworks.tables())
            .find(|table| table.package(id.package()).is_some())
            .map(ResourceTable::strings)
    }
}

impl AxmlDecoder for EntryStore<'_> {
    fn attribute_name(&self, id: u32) -> Option<String> {
        self.name_of(ResourceId::from(id)).map(|name| name.name)
    }

    fn decode_value(&self, attribute: Option<u32>, value: &ResValue) -> String {
        let definition = attribute.and_then(|id| self.attribute(ResourceId::from(id)));
        value_codec::decode_value(value, None, self, definition.as_ref())
    }
}
