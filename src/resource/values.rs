//! The `res/values*/` view of a type block: one XML element per entry.
//!
//! Encoding runs in two passes. Every element is declared first so references between
//! elements of the same document resolve regardless of their order, then each element is
//! encoded into its entry.

use crate::resource::encode_materials::EncodeMaterials;
use crate::resource::entry_store::{AttrDefinition, ResourceLookup};
use crate::resource::value_codec::{self, ValueError};
use crate::resource::ResourceError;
use crate::table::config::ResConfig;
use crate::table::res_value::{
    array_key, plural_key, plural_quantity, AttrFormat, ResValue, ValueType, ATTR_L10N, ATTR_MAX,
    ATTR_MIN, ATTR_TYPE,
};
use crate::table::resource_id::ResourceId;
use crate::table::string_pool::StringPool;
use crate::table::{Entry, EntryValue, Package};
use crate::xml::axml::EncodedValue;
use crate::xml::{XmlAttribute, XmlDocument, XmlElement};

pub const ROOT_ELEMENT: &str = "resources";

/// Types written with their own tag instead of `<item type="...">`.
const SIMPLE_TAGS: [&str; 7] = ["string", "bool", "color", "dimen", "integer", "fraction", "drawable"];

pub struct ValuesDecoder<'d> {
    strings: &'d StringPool,
    lookup: &'d dyn ResourceLookup,
}

impl<'d> ValuesDecoder<'d> {
    pub fn new(strings: &'d StringPool, lookup: &'d dyn ResourceLookup) -> Self {
        Self { strings, lookup }
    }

    /// Builds the document of the `type_name` block in `config`, leaving out entries
    /// `skip` returns true for.
    pub fn decode<F: Fn(&str) -> bool>(
        &self,
        package: &Package,
        type_name: &str,
        config: &ResConfig,
        skip: F,
    ) -> XmlDocument {
        let mut root = XmlElement::new(ROOT_ELEMENT);
        if let Some(spec) = package.type_spec(type_name) {
            for (id, entry) in package.entries_of(type_name, config) {
                let Some(name) = spec.entry_name(id.entry()) else {
                    continue;
                };
                if skip(name) {
                    continue;
                }
                if let Some(mut element) = self.decode_entry(type_name, name, entry) {
                    element.resource_id = Some(id.value());
                    root.push_child(element);
                }
            }
        }
        XmlDocument::new(root)
    }

    fn text(&self, value: &ResValue, definition: Option<&AttrDefinition>) -> String {
        match value.data_type {
            ValueType::String => value_codec::escape_string(self.strings.get(value.data).unwrap_or_default()),
            _ => value_codec::decode_value(value, Some(self.strings), self.lookup, definition),
        }
    }

    fn item(&self, value: &ResValue, definition: Option<&AttrDefinition>) -> XmlElement {
        XmlElement::new("item").with_text(&self.text(value, definition))
    }

    pub fn decode_entry(&self, type_name: &str, name: &str, entry: &Entry) -> Option<XmlElement> {
        if let Some(value) = entry.value() {
            let mut element = match type_name {
                "id" => {
                    let element = XmlElement::new("item").with_attribute("type", "id");
                    match value.data_type {
                        ValueType::Reference if value.data != 0 => element.with_text(&self.text(value, None)),
                        _ => element,
                    }
                }
                _ if SIMPLE_TAGS.contains(&type_name) => XmlElement::new(type_name).with_text(&self.text(value, None)),
                _ => XmlElement::new("item")
                    .with_attribute("type", type_name)
                    .with_text(&self.text(value, None)),
            };
            element.attributes.insert(0, XmlAttribute::new("name", name));
            return Some(element);
        }

        let items = entry.items();
        let element = match type_name {
            "array" => {
                let tag = if items.iter().all(|(_, value)| value.data_type == ValueType::String) {
                    "string-array"
                } else if items
                    .iter()
                    .all(|(_, value)| matches!(value.data_type, ValueType::IntDec | ValueType::IntHex))
                {
                    "integer-array"
                } else {
                    "array"
                };
                let mut element = XmlElement::new(tag).with_attribute("name", name);
                for (_, value) in items {
                    element.push_child(self.item(value, None));
                }
                element
            }
            "style" => {
                let mut element = XmlElement::new("style").with_attribute("name", name);
                if let Some(parent) = entry.parent() {
                    let parent = self
                        .lookup
                        .name_of(ResourceId::from(parent))
                        .map(|parent| parent.reference('@'))
                        .unwrap_or_else(|| format!("@{:#010x}", parent));
                    element.set_attribute("parent", &parent);
                }
                for (key, value) in items {
                    let key = ResourceId::from(*key);
                    let Some(attribute) = self.lookup.name_of(key) else {
                        log::debug!("Dropping style item with unknown attribute {}", key);
                        continue;
                    };
                    let definition = self.lookup.attribute(key);
                    element.push_child(
                        self.item(value, definition.as_ref())
                            .with_attribute("name", &attribute.attribute()),
                    );
                }
                element
            }
            "plurals" => {
                let mut element = XmlElement::new("plurals").with_attribute("name", name);
                for (key, value) in items {
                    if let Some(quantity) = plural_quantity(*key) {
                        element.push_child(self.item(value, None).with_attribute("quantity", quantity));
                    }
                }
                element
            }
            "attr" => self.decode_attr(name, items),
            _ => {
                log::debug!("No values form for complex {}/{}", type_name, name);
                return None;
            }
        };
        Some(element)
    }

    fn decode_attr(&self, name: &str, items: &[(u32, ResValue)]) -> XmlElement {
        let mut element = XmlElement::new("attr").with_attribute("name", name);
        let mut format = AttrFormat::any();
        for (key, value) in items {
            match *key {
                ATTR_TYPE => format = AttrFormat::from_bits(value.data),
                ATTR_MIN => element.set_attribute("min", &(value.data as i32).to_string()),
                ATTR_MAX => element.set_attribute("max", &(value.data as i32).to_string()),
                ATTR_L10N => {}
                symbol => {
                    let Some(symbol) = self.lookup.name_of(ResourceId::from(symbol)) else {
                        continue;
                    };
                    let (tag, text) = match format.flags() {
                        true => ("flag", format!("{:#x}", value.data)),
                        false => ("enum", (value.data as i32).to_string()),
                    };
                    element.push_child(
                        XmlElement::new(tag)
                            .with_attribute("name", &symbol.name)
                            .with_attribute("value", &text),
                    );
                }
            }
        }
        let names: Vec<_> = format
            .names()
            .into_iter()
            .filter(|name| *name != "enum" && *name != "flags")
            .collect();
        if format != AttrFormat::any() && !names.is_empty() {
            element.attributes.insert(1, XmlAttribute::new("format", &names.join("|")));
        }
        element
    }
}

fn invalid_document(message: String) -> ResourceError {
    ResourceError::InvalidDocument(message)
}

fn required<'e>(element: &'e XmlElement, attribute: &str) -> Result<&'e str, ResourceError> {
    element
        .attribute(attribute)
        .ok_or_else(|| invalid_document(format!("<{}> without {attribute}", element.name)))
}

/// The resource type an element of a values document declares. `None` for elements that
/// only group or annotate others.
fn element_type<'e>(element: &'e XmlElement) -> Option<&'e str> {
    match element.name.as_str() {
        "item" => element.attribute("type"),
        "string-array" | "integer-array" | "array" => Some("array"),
        "declare-styleable" | "eat-comment" | "skip" => None,
        tag => Some(tag),
    }
}

fn simple_format(type_name: &str) -> AttrFormat {
    let formats = match type_name {
        "string" => "string|reference",
        "bool" => "boolean|reference",
        "color" => "color|reference",
        "dimen" => "dimension|reference",
        "integer" => "integer|reference",
        "fraction" => "fraction|reference",
        "id" => "reference",
        _ => return AttrFormat::any(),
    };
    AttrFormat::parse(formats).unwrap_or_else(AttrFormat::any)
}

/// Encodes element text into a value, interning string results.
fn encode_text(
    text: &str,
    format: AttrFormat,
    symbols: &[(String, u32)],
    materials: &mut EncodeMaterials,
) -> Result<ResValue, ResourceError> {
    match value_codec::encode_value(text.trim(), format, symbols, materials)? {
        EncodedValue::Typed(value) => Ok(value),
        EncodedValue::String(_) => {
            let index = materials.intern(&value_codec::unescape_string(text))?;
            Ok(ResValue::string(index))
        }
    }
}

/// Attributes declared inside a `<declare-styleable>` that carry their own definition.
fn defines_attr(element: &XmlElement) -> bool {
    element.name == "attr"
        && element.attribute("name").is_some_and(|name| !name.starts_with("android:"))
        && (element.attribute("format").is_some() || element.elements().next().is_some())
}

fn attrs_of(element: &XmlElement) -> Vec<&XmlElement> {
    match element.name.as_str() {
        "declare-styleable" => element.elements().filter(|child| defines_attr(child)).collect(),
        "attr" if !element.attribute("name").is_some_and(|name| name.starts_with("android:")) => vec![element],
        _ => vec![],
    }
}

/// Creates the entries every element of `document` declares, without values.
pub fn declare(
    document: &XmlDocument,
    config: &ResConfig,
    materials: &mut EncodeMaterials,
) -> Result<(), ResourceError> {
    let default = ResConfig::default();
    for element in document.root.elements() {
        for attr in attrs_of(element) {
            materials.get_or_create(config, "attr", required(attr, "name")?)?;
            for symbol in attr.elements() {
                materials.get_or_create(&default, "id", required(symbol, "name")?)?;
            }
        }
        if element.name == "attr" || element.name == "declare-styleable" {
            continue;
        }
        if let Some(type_name) = element_type(element) {
            materials.get_or_create(config, type_name, required(element, "name")?)?;
        }
    }
    Ok(())
}

/// Declares and encodes every element of `document` into the `config` blocks.
pub fn encode(
    document: &XmlDocument,
    config: &ResConfig,
    materials: &mut EncodeMaterials,
) -> Result<(), ResourceError> {
    if document.root.name != ROOT_ELEMENT {
        return Err(invalid_document(format!(
            "expected <{ROOT_ELEMENT}>, found <{}>",
            document.root.name
        )));
    }
    declare(document, config, materials)?;
    for element in document.root.elements() {
        for attr in attrs_of(element) {
            encode_attr(attr, config, materials)?;
        }
        if element.name == "attr" || element.name == "declare-styleable" {
            continue;
        }
        let Some(type_name) = element_type(element) else {
            continue;
        };
        let name = required(element, "name")?;
        let value = match type_name {
            "array" => encode_array(element, materials)?,
            "style" => encode_style(element, name, materials)?,
            "plurals" => encode_plurals(element, materials)?,
            _ => encode_simple(element, type_name, materials)?,
        };
        let id = materials.get_or_create(config, type_name, name)?;
        materials.set_entry(id, config, value)?;
    }
    Ok(())
}

fn encode_simple(
    element: &XmlElement,
    type_name: &str,
    materials: &mut EncodeMaterials,
) -> Result<EntryValue, ResourceError> {
    let text = element.text();
    if type_name == "id" && text.trim().is_empty() {
        return Ok(EntryValue::Simple(ResValue::boolean(false)));
    }
    let format = match element.attribute("format") {
        Some(format) => AttrFormat::parse(format)
            .ok_or_else(|| ValueError::InvalidValue {
                value: format.to_string(),
                expected: "attribute format".to_string(),
            })?
            .with_reference(true),
        None => simple_format(type_name),
    };
    Ok(EntryValue::Simple(encode_text(&text, format, &[], materials)?))
}

fn encode_array(element: &XmlElement, materials: &mut EncodeMaterials) -> Result<EntryValue, ResourceError> {
    let format = match element.name.as_str() {
        "string-array" => simple_format("string"),
        "integer-array" => simple_format("integer"),
        _ => AttrFormat::any(),
    };
    let mut items = vec![];
    for (index, item) in element.elements().filter(|item| item.name == "item").enumerate() {
        items.push((array_key(index), encode_text(&item.text(), format, &[], materials)?));
    }
    Ok(EntryValue::Complex { parent: 0, items })
}

/// `parent="Theme.Base"` and `parent="android:Theme"` are shorthands for style references.
fn parent_reference(parent: &str) -> String {
    if parent.starts_with(['@', '?']) {
        return parent.to_string();
    }
    match parent.split_once(':') {
        Some((package, name)) => format!("@{package}:style/{name}"),
        None => format!("@style/{parent}"),
    }
}

fn encode_style(
    element: &XmlElement,
    name: &str,
    materials: &mut EncodeMaterials,
) -> Result<EntryValue, ResourceError> {
    let parent = match element.attribute("parent") {
        Some("") => 0,
        Some(parent) => materials.resolve(&parent_reference(parent))?.value(),
        None => name
            .rsplit_once('.')
            .and_then(|(implicit, _)| materials.find(None, "style", implicit))
            .map_or(0, |id| id.value()),
    };

    let mut items = vec![];
    for item in element.elements().filter(|item| item.name == "item") {
        let key = materials.attribute_by_name(required(item, "name")?)?;
        let definition = materials.attribute_definition(key);
        let value = encode_text(&item.text(), definition.format, &definition.symbols, materials)?;
        items.push((key.value(), value));
    }
    Ok(EntryValue::Complex { parent, items })
}

fn encode_plurals(element: &XmlElement, materials: &mut EncodeMaterials) -> Result<EntryValue, ResourceError> {
    let format = simple_format("string");
    let mut items = vec![];
    for item in element.elements().filter(|item| item.name == "item") {
        let quantity = required(item, "quantity")?;
        let key = plural_key(quantity).ok_or_else(|| ValueError::InvalidValue {
            value: quantity.to_string(),
            expected: "plural quantity".to_string(),
        })?;
        items.push((key, encode_text(&item.text(), format, &[], materials)?));
    }
    Ok(EntryValue::Complex { parent: 0, items })
}

fn encode_attr(element: &XmlElement, config: &ResConfig, materials: &mut EncodeMaterials) -> Result<(), ResourceError> {
    let name = required(element, "name")?;
    let mut format = match element.attribute("format") {
        Some(format) => AttrFormat::parse(format).ok_or_else(|| ValueError::InvalidValue {
            value: format.to_string(),
            expected: "attribute format".to_string(),
        })?,
        None => AttrFormat::new(),
    };
    let symbols: Vec<&XmlElement> = element
        .elements()
        .filter(|child| child.name == "enum" || child.name == "flag")
        .collect();
    if symbols.iter().any(|symbol| symbol.name == "flag") {
        format.set_flags(true);
    } else if !symbols.is_empty() {
        format.set_enumeration(true);
    }
    if format.into_bits() == 0 {
        format = AttrFormat::any();
    }

    let mut items = vec![(ATTR_TYPE, ResValue::new(ValueType::IntDec, format.into_bits()))];
    for (key, bound) in [(ATTR_MIN, "min"), (ATTR_MAX, "max")] {
        if let Some(text) = element.attribute(bound) {
            let value = value_codec::parse_int(text).ok_or_else(|| ValueError::InvalidValue {
                value: text.to_string(),
                expected: "integer".to_string(),
            })?;
            items.push((key, ResValue::int(value.data as i32)));
        }
    }

    let default = ResConfig::default();
    for symbol in symbols {
        let text = required(symbol, "value")?;
        let value = value_codec::parse_int(text).ok_or_else(|| ValueError::InvalidValue {
            value: text.to_string(),
            expected: "integer".to_string(),
        })?;
        let id = materials.get_or_create(&default, "id", required(symbol, "name")?)?;
        materials.set_entry(id, &default, EntryValue::Simple(ResValue::boolean(false)))?;
        let data_type = match format.flags() {
            true => ValueType::IntHex,
            false => ValueType::IntDec,
        };
        items.push((id.value(), ResValue::new(data_type, value.data)));
    }

    let id = materials.get_or_create(config, "attr", name)?;
    materials.set_entry(id, config, EntryValue::Complex { parent: 0, items })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::entry_store::EntryStore;
    use crate::resource::framework::FrameworkTables;
    use crate::table::ResourceTable;

    fn encode_into(table: &mut ResourceTable, frameworks: &FrameworkTables, source: &str) -> Result<(), ResourceError> {
        let document = XmlDocument::parse(source.as_bytes())?;
        let mut materials = EncodeMaterials::new(Some(table), 0, &[], frameworks);
        encode(&document, &ResConfig::default(), &mut materials)
    }

    fn decode_block(table: &ResourceTable, frameworks: &FrameworkTables, type_name: &str) -> XmlDocument {
        let store = EntryStore::new(vec![table], frameworks);
        ValuesDecoder::new(table.strings(), &store).decode(
            &table.packages()[0],
            type_name,
            &ResConfig::default(),
            |_| false,
        )
    }

    #[test]
    fn test_strings_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let frameworks = FrameworkTables::with_builtin()?;
        let mut table = ResourceTable::new(0x7f, "com.example");
        encode_into(
            &mut table,
            &frameworks,
            r#"<resources>
                <string name="app_name">Example</string>
                <string name="title">@string/app_name</string>
                <string name="quote">Don\'t \"panic\"</string>
                <string name="number">42</string>
            </resources>"#,
        )?;

        let document = decode_block(&table, &frameworks, "string");
        let texts: Vec<(String, String)> = document
            .root
            .elements()
            .map(|element| (element.attribute("name").unwrap_or_default().to_string(), element.text()))
            .collect();
        assert_eq!(
            texts,
            vec![
                ("app_name".to_string(), "Example".to_string()),
                ("title".to_string(), "@string/app_name".to_string()),
                ("quote".to_string(), "Don\\'t \\\"panic\\\"".to_string()),
                ("number".to_string(), "42".to_string()),
            ]
        );
        let quote = table.packages()[0].find("string", "quote").ok_or("quote missing")?;
        let entry = table.packages()[0]
            .entry(quote, &ResConfig::default())
            .ok_or("entry missing")?;
        assert_eq!(table.string_value(entry.value().ok_or("not simple")?), Some("Don't \"panic\""));
        Ok(())
    }

    #[test]
    fn test_complex_elements() -> Result<(), Box<dyn std::error::Error>> {
        let frameworks = FrameworkTables::with_builtin()?;
        let mut table = ResourceTable::new(0x7f, "com.example");
        encode_into(
            &mut table,
            &frameworks,
            r#"<resources>
                <attr name="shape" format="integer">
                    <enum name="circle" value="0"/>
                    <enum name="square" value="1"/>
                </attr>
                <declare-styleable name="ShapeView">
                    <attr name="corner" format="dimension"/>
                    <attr name="android:text"/>
                </declare-styleable>
                <style name="AppTheme" parent="android:Theme.Light">
                    <item name="android:textColor">#ff0000</item>
                    <item name="shape">square</item>
                </style>
                <style name="AppTheme.Dark"/>
                <string-array name="planets">
                    <item>Mercury</item>
                    <item>Venus</item>
                    <item>Earth</item>
                </string-array>
                <plurals name="songs">
                    <item quantity="one">%d song</item>
                    <item quantity="other">%d songs</item>
                </plurals>
                <item type="id" name="anchor"/>
            </resources>"#,
        )?;

        let package = &table.packages()[0];
        let default = ResConfig::default();
        let planets = package.find("array", "planets").ok_or("planets missing")?;
        assert_eq!(package.entry(planets, &default).ok_or("entry")?.items().len(), 3);
        let dark = package.find("style", "AppTheme.Dark").ok_or("dark missing")?;
        assert_eq!(
            package.entry(dark, &default).ok_or("entry")?.parent(),
            package.find("style", "AppTheme").map(|id| id.value())
        );
        assert!(package.find("attr", "corner").is_some());
        assert!(package.find("attr", "text").is_none());
        assert!(package.find("id", "square").is_some());

        let styles = decode_block(&table, &frameworks, "style");
        let theme = styles.root.child("style").ok_or("style missing")?;
        assert_eq!(theme.attribute("parent"), Some("@android:style/Theme.Light"));
        let items: Vec<_> = theme
            .elements()
            .map(|item| (item.attribute("name").unwrap_or_default().to_string(), item.text()))
            .collect();
        assert_eq!(
            items,
            vec![
                ("android:textColor".to_string(), "#ff0000".to_string()),
                ("shape".to_string(), "square".to_string()),
            ]
        );

        let arrays = decode_block(&table, &frameworks, "array");
        assert_eq!(arrays.root.child("string-array").map(|array| array.elements().count()), Some(3));
        let attrs = decode_block(&table, &frameworks, "attr");
        let shape = attrs.root.elements().find(|attr| attr.attribute("name") == Some("shape"));
        assert_eq!(shape.and_then(|shape| shape.attribute("format")), Some("integer"));
        Ok(())
    }

    #[test]
    fn test_reference_errors() -> Result<(), Box<dyn std::error::Error>> {
        let frameworks = FrameworkTables::new();
        let mut table = ResourceTable::new(0x7f, "com.example");
        let result = encode_into(
            &mut table,
            &frameworks,
            r#"<resources><string name="title">@string/undeclared</string></resources>"#,
        );
        assert!(matches!(
            result,
            Err(ResourceError::Reference { reference }) if reference == "@string/undeclared"
        ));

        let result = encode_into(&mut table, &frameworks, r#"<layout/>"#);
        assert!(matches!(result, Err(ResourceError::InvalidDocument(_))));
        Ok(())
    }
}
