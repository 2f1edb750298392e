//! Structured resource values, for code that sets entries without going through a values
//! XML document.

use indexmap::IndexMap;

use crate::resource::encode_materials::EncodeMaterials;
use crate::resource::entry_store::ResourceLookup;
use crate::resource::value_codec::{self, Reference, ValueError};
use crate::resource::ResourceError;
use crate::table::res_value::{array_key, plural_key, plural_quantity, ResValue, ValueType};
use crate::table::resource_id::ResourceId;
use crate::table::string_pool::StringPool;
use crate::table::{Entry, EntryValue};

/// A value that fits in a single entry slot.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    /// Interned into the table's string pool when written.
    String(String),
    /// A symbolic reference such as `@string/app_name`, resolved when written.
    Reference(String),
    Typed(ResValue),
}

impl Scalar {
    pub fn string(value: impl Into<String>) -> Self {
        Scalar::String(value.into())
    }

    pub fn reference(reference: impl Into<String>) -> Self {
        Scalar::Reference(reference.into())
    }

    pub fn color(text: &str) -> Result<Self, ValueError> {
        value_codec::parse_color(text)
            .map(Scalar::Typed)
            .ok_or_else(|| invalid(text, "color"))
    }

    pub fn dimension(text: &str) -> Result<Self, ValueError> {
        value_codec::parse_dimension(text)
            .map(Scalar::Typed)
            .ok_or_else(|| invalid(text, "dimension"))
    }

    pub fn float(value: f32) -> Self {
        Scalar::Typed(ResValue::new(ValueType::Float, value.to_bits()))
    }

    pub fn integer(value: i32) -> Self {
        Scalar::Typed(ResValue::int(value))
    }

    pub fn boolean(value: bool) -> Self {
        Scalar::Typed(ResValue::boolean(value))
    }

    pub(crate) fn encode(&self, materials: &mut EncodeMaterials) -> Result<ResValue, ResourceError> {
        match self {
            Scalar::String(value) => Ok(ResValue::string(materials.intern(value)?)),
            Scalar::Reference(text) if text == "@null" => Ok(ResValue::reference(0)),
            Scalar::Reference(text) => {
                let reference = Reference::parse(text).ok_or_else(|| invalid(text, "reference"))?;
                let id = materials.resolve(text)?;
                let data_type = match reference.attribute {
                    true => ValueType::Attribute,
                    false => ValueType::Reference,
                };
                Ok(ResValue::new(data_type, id.value()))
            }
            Scalar::Typed(value) => Ok(*value),
        }
    }

    fn decode(value: &ResValue, strings: &StringPool, lookup: &dyn ResourceLookup) -> Self {
        match value.data_type {
            ValueType::String => Scalar::String(strings.get(value.data).unwrap_or_default().to_string()),
            ValueType::Reference | ValueType::Attribute | ValueType::DynamicReference => {
                Scalar::Reference(value_codec::decode_value(value, Some(strings), lookup, None))
            }
            _ => Scalar::Typed(*value),
        }
    }
}

fn invalid(text: &str, expected: &str) -> ValueError {
    ValueError::InvalidValue {
        value: text.to_string(),
        expected: expected.to_string(),
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::string(value)
    }
}

/// A resource entry value.
#[derive(Clone, Debug, PartialEq)]
pub enum Resource {
    Scalar(Scalar),
    Array(Vec<Scalar>),
    Style {
        /// Reference to the parent style, `@style/Theme.Base`.
        parent: Option<String>,
        /// Attribute name, `android:textColor` or `colorAccent`, and value.
        items: Vec<(String, Scalar)>,
    },
    /// Quantity (`one`, `other`...) to value.
    Plurals(IndexMap<String, Scalar>),
}

impl From<Scalar> for Resource {
    fn from(value: Scalar) -> Self {
        Resource::Scalar(value)
    }
}

impl Resource {
    /// Complex resources are stored as a map of items instead of a single value.
    pub fn is_complex(&self) -> bool {
        !matches!(self, Resource::Scalar(_))
    }

    pub(crate) fn write(&self, materials: &mut EncodeMaterials) -> Result<EntryValue, ResourceError> {
        Ok(match self {
            Resource::Scalar(scalar) => EntryValue::Simple(scalar.encode(materials)?),
            Resource::Array(items) => EntryValue::Complex {
                parent: 0,
                items: items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| Ok((array_key(index), item.encode(materials)?)))
                    .collect::<Result<_, ResourceError>>()?,
            },
            Resource::Style { parent, items } => {
                let parent = match parent {
                    Some(parent) => materials.resolve(parent)?.value(),
                    None => 0,
                };
                let items = items
                    .iter()
                    .map(|(name, value)| {
                        let key = materials.attribute_by_name(name)?;
                        Ok((key.value(), value.encode(materials)?))
                    })
                    .collect::<Result<_, ResourceError>>()?;
                EntryValue::Complex { parent, items }
            }
            Resource::Plurals(quantities) => EntryValue::Complex {
                parent: 0,
                items: quantities
                    .iter()
                    .map(|(quantity, value)| {
                        let key = plural_key(quantity).ok_or_else(|| invalid(quantity, "plural quantity"))?;
                        Ok((key, value.encode(materials)?))
                    })
                    .collect::<Result<_, ResourceError>>()?,
            },
        })
    }

    /// Rebuilds the value of an entry of type `type_name`. `None` for complex entries that are
    /// not arrays, styles or plurals.
    pub(crate) fn from_entry(
        type_name: &str,
        entry: &Entry,
        strings: &StringPool,
        lookup: &dyn ResourceLookup,
    ) -> Option<Self> {
        if let Some(value) = entry.value() {
            return Some(Resource::Scalar(Scalar::decode(value, strings, lookup)));
        }
        let items = entry.items();
        match type_name {
            "array" => Some(Resource::Array(
                items
                    .iter()
                    .map(|(_, value)| Scalar::decode(value, strings, lookup))
                    .collect(),
            )),
            "style" => Some(Resource::Style {
                parent: entry
                    .parent()
                    .filter(|parent| *parent != 0)
                    .and_then(|parent| lookup.name_of(ResourceId::from(parent)))
                    .map(|name| name.reference('@')),
                items: items
                    .iter()
                    .filter_map(|(key, value)| {
                        let name = lookup.name_of(ResourceId::from(*key))?;
                        Some((name.attribute(), Scalar::decode(value, strings, lookup)))
                    })
                    .collect(),
            }),
            "plurals" => Some(Resource::Plurals(
                items
                    .iter()
                    .filter_map(|(key, value)| {
                        Some((
                            plural_quantity(*key)?.to_string(),
                            Scalar::decode(value, strings, lookup),
                        ))
                    })
                    .collect(),
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::entry_store::EntryStore;
    use crate::resource::framework::FrameworkTables;
    use crate::table::config::ResConfig;
    use crate::table::ResourceTable;

    #[test]
    fn test_write_and_read_back() -> Result<(), Box<dyn std::error::Error>> {
        let frameworks = FrameworkTables::with_builtin()?;
        let mut table = ResourceTable::new(0x7f, "com.example");
        let default = ResConfig::default();

        let resources = [
            ("string", "greeting", Resource::from(Scalar::string("hello"))),
            (
                "array",
                "planets",
                Resource::Array(vec!["Mercury".into(), "Venus".into(), Scalar::integer(3)]),
            ),
            (
                "style",
                "AppTheme",
                Resource::Style {
                    parent: Some("@android:style/Theme.Light".to_string()),
                    items: vec![("android:textColor".to_string(), Scalar::color("#ff0000")?)],
                },
            ),
            (
                "plurals",
                "songs",
                Resource::Plurals(IndexMap::from([
                    ("one".to_string(), Scalar::string("%d song")),
                    ("other".to_string(), Scalar::string("%d songs")),
                ])),
            ),
        ];

        let mut ids = vec![];
        {
            let mut materials = EncodeMaterials::new(Some(&mut table), 0, &[], &frameworks);
            for (type_name, name, resource) in &resources {
                let id = materials.get_or_create(&default, type_name, name)?;
                let value = resource.write(&mut materials)?;
                assert_eq!(resource.is_complex(), matches!(value, EntryValue::Complex { .. }));
                materials.set_entry(id, &default, value)?;
                ids.push(id);
            }
        }

        let store = EntryStore::new(vec![&table], &frameworks);
        let package = &table.packages()[0];
        for ((type_name, _, resource), id) in resources.iter().zip(ids) {
            let entry = package.entry(id, &default).ok_or("entry missing")?;
            if let Resource::Array(items) = resource {
                assert_eq!(entry.items().len(), items.len());
            }
            let read = Resource::from_entry(type_name, entry, table.strings(), &store);
            assert_eq!(read.as_ref(), Some(resource));
        }
        Ok(())
    }

    #[test]
    fn test_invalid_values() {
        assert!(Scalar::color("red").is_err());
        assert!(Scalar::dimension("12").is_err());
        let frameworks = FrameworkTables::new();
        let mut table = ResourceTable::new(0x7f, "com.example");
        let mut materials = EncodeMaterials::new(Some(&mut table), 0, &[], &frameworks);
        let plurals = Resource::Plurals(IndexMap::from([("several".to_string(), Scalar::string("x"))]));
        assert!(matches!(plurals.write(&mut materials), Err(ResourceError::Value(_))));
        assert!(matches!(
            Scalar::reference("@string/nowhere").encode(&mut materials),
            Err(ResourceError::Reference { .. })
        ));
    }
}
