//! Binary XML ("AXML") as used for the manifest and compiled `res/` documents.
//!
//! Decoding turns the chunk stream back into an [XmlDocument]; attribute names that were
//! stripped from the string pool and typed attribute values are rendered through an
//! [AxmlDecoder]. Encoding asks an [AxmlEncoder] for attribute resource ids and typed values,
//! so the codec itself knows nothing about resource tables.

use binrw::BinRead;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Seek, Write};
use thiserror::Error;

use crate::table::chunk::{ChunkHeader, ChunkType, ChunkWriter, NO_ENTRY};
use crate::table::res_value::{ResValue, ValueType};
use crate::table::string_pool::StringPool;
use crate::table::TableError;
use crate::xml::{XmlAttribute, XmlDocument, XmlElement, XmlNode, ANDROID_NAMESPACE};

#[derive(Debug, Error)]
pub enum AxmlError {
    #[error("Not a binary xml document")]
    NotBinaryXml,

    #[error("Malformed binary xml: {0}")]
    Table(#[from] TableError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parsing error: {0}")]
    ParsingError(#[from] binrw::Error),

    #[error("String {0} is not in the string pool")]
    MissingString(u32),

    #[error("Unbalanced element </{0}>")]
    Unbalanced(String),

    #[error("Namespace prefix {0} is not declared")]
    UnknownPrefix(String),

    #[error("Document has no root element")]
    NoRoot,
}

/// Renders values that the binary form only stores as numbers.
pub trait AxmlDecoder {
    /// Name of the attribute with resource id `id`, without namespace prefix.
    fn attribute_name(&self, id: u32) -> Option<String>;

    /// Textual form of a typed attribute value. `attribute` is the attribute's resource id.
    fn decode_value(&self, attribute: Option<u32>, value: &ResValue) -> String;
}

/// The binary form of an attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum EncodedValue {
    String(String),
    Typed(ResValue),
}

pub trait AxmlEncoder {
    type Error: From<AxmlError>;

    /// Resource id of the attribute `name` in `namespace`, if it is a resource attribute.
    fn attribute_id(&mut self, namespace: Option<&str>, name: &str) -> Result<Option<u32>, Self::Error>;

    fn encode_value(&mut self, attribute: Option<u32>, value: &str) -> Result<EncodedValue, Self::Error>;
}

/// Checks whether `data` starts with a binary xml chunk header.
pub fn is_binary_xml(data: &[u8]) -> bool {
    data.len() >= 8 && data[0..2] == [0x03, 0x00] && data[2..4] == [0x08, 0x00]
}

const NO_STRING: u32 = NO_ENTRY;
const ATTRIBUTE_SIZE: u16 = 20;

pub fn decode<D: AxmlDecoder + ?Sized>(data: &[u8], decoder: &D) -> Result<XmlDocument, AxmlError> {
    if !is_binary_xml(data) {
        return Err(AxmlError::NotBinaryXml);
    }
    let header = ChunkHeader::read(&mut Cursor::new(data))?;
    let end = (header.size as usize).min(data.len());

    let mut strings = StringPool::new(true);
    let mut resource_map: Vec<u32> = vec![];
    let mut namespaces: Vec<(u32, u32)> = vec![];
    let mut pending_namespaces: Vec<(u32, u32)> = vec![];
    let mut stack: Vec<XmlElement> = vec![];
    let mut root = None;

    let string = |strings: &StringPool, index: u32| -> Result<String, AxmlError> {
        strings
            .get(index)
            .map(str::to_string)
            .ok_or(AxmlError::MissingString(index))
    };

    let mut position = header.header_size as usize;
    while position + ChunkHeader::SIZE as usize <= end {
        let chunk = ChunkHeader::read(&mut Cursor::new(&data[position..]))?;
        if chunk.size < ChunkHeader::SIZE as u32 {
            return Err(TableError::Truncated(position).into());
        }
        let slice = data
            .get(position..position + chunk.size as usize)
            .ok_or(TableError::Truncated(position))?;
        let mut reader = Cursor::new(slice);
        reader.set_position(chunk.header_size as u64);

        match chunk.chunk_type() {
            Some(ChunkType::StringPool) => strings = StringPool::read(slice)?,
            Some(ChunkType::XmlResourceMap) => {
                let count = (chunk.size - chunk.header_size as u32) / 4;
                resource_map = (0..count)
                    .map(|_| reader.read_u32::<LittleEndian>())
                    .collect::<Result<_, _>>()?;
            }
            Some(ChunkType::XmlStartNamespace) => {
                let prefix = reader.read_u32::<LittleEndian>()?;
                let uri = reader.read_u32::<LittleEndian>()?;
                namespaces.push((prefix, uri));
                pending_namespaces.push((prefix, uri));
            }
            Some(ChunkType::XmlEndNamespace) => {
                namespaces.pop();
            }
            Some(ChunkType::XmlStartElement) => {
                let _namespace = reader.read_u32::<LittleEndian>()?;
                let name = reader.read_u32::<LittleEndian>()?;
                let attribute_start = reader.read_u16::<LittleEndian>()?;
                let attribute_size = reader.read_u16::<LittleEndian>()?;
                let attribute_count = reader.read_u16::<LittleEndian>()?;

                let mut element = XmlElement::new(&string(&strings, name)?);
                for (prefix, uri) in pending_namespaces.drain(..) {
                    let prefix = string(&strings, prefix)?;
                    let uri = string(&strings, uri)?;
                    element.attributes.push(XmlAttribute::new(&format!("xmlns:{prefix}"), &uri));
                }

                let attributes_at = chunk.header_size as u64 + attribute_start as u64;
                for index in 0..attribute_count as u64 {
                    reader.set_position(attributes_at + index * attribute_size as u64);
                    let namespace = reader.read_u32::<LittleEndian>()?;
                    let name = reader.read_u32::<LittleEndian>()?;
                    let raw = reader.read_u32::<LittleEndian>()?;
                    let value = ResValue::read(&mut reader)?;

                    let resource_id = resource_map.get(name as usize).copied();
                    let mut local = strings.get(name).unwrap_or_default().to_string();
                    if local.is_empty() {
                        local = resource_id
                            .and_then(|id| decoder.attribute_name(id))
                            .ok_or(AxmlError::MissingString(name))?;
                    }
                    let qualified = match namespace {
                        NO_STRING => local,
                        uri => {
                            let prefix = namespaces
                                .iter()
                                .rev()
                                .find(|(_, declared)| *declared == uri)
                                .and_then(|(prefix, _)| strings.get(*prefix))
                                .map(str::to_string);
                            match prefix {
                                Some(prefix) => format!("{prefix}:{local}"),
                                None if strings.get(uri) == Some(ANDROID_NAMESPACE) => {
                                    format!("android:{local}")
                                }
                                None => local,
                            }
                        }
                    };

                    let text = if raw != NO_STRING && matches!(value.data_type, ValueType::String | ValueType::Null) {
                        string(&strings, raw)?
                    } else if value.data_type == ValueType::String {
                        string(&strings, value.data)?
                    } else {
                        decoder.decode_value(resource_id, &value)
                    };
                    element.attributes.push(XmlAttribute {
                        name: qualified,
                        value: text,
                    });
                }
                stack.push(element);
            }
            Some(ChunkType::XmlEndElement) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| AxmlError::Unbalanced(format!("chunk at {position:#x}")))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Element(element)),
                    None => root = Some(element),
                }
            }
            Some(ChunkType::XmlCdata) => {
                let text = string(&strings, reader.read_u32::<LittleEndian>()?)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlNode::Text(text));
                }
            }
            _ => log::debug!("Skipping xml chunk {:#06x} at {:#x}", chunk.ty, position),
        }
        position += chunk.size as usize;
    }

    root.map(XmlDocument::new).ok_or(AxmlError::NoRoot)
}

struct FlatAttribute {
    namespace: u32,
    name: u32,
    raw: u32,
    value: ResValue,
}

struct FlatElement {
    namespace: u32,
    name: u32,
    attributes: Vec<FlatAttribute>,
    id_index: u16,
    class_index: u16,
    style_index: u16,
    children: Vec<FlatNode>,
}

enum FlatNode {
    Element(FlatElement),
    Text(u32),
}

/// A string pool whose first entries are the names of resource attributes, in the order
/// of the resource map.
struct Interner {
    pool: StringPool,
    mapped: usize,
    seen: HashMap<String, u32>,
}

impl Interner {
    fn intern(&mut self, value: &str) -> u32 {
        if let Some(index) = self.seen.get(value) {
            return *index;
        }
        let index = self.pool.push(value.to_string());
        self.seen.insert(value.to_string(), index);
        index
    }
}

struct Flattener<'e, E: AxmlEncoder> {
    encoder: &'e mut E,
    namespaces: HashMap<String, String>,
    ids: HashMap<(Option<String>, String), Option<u32>>,
}

impl<E: AxmlEncoder> Flattener<'_, E> {
    fn namespace_of(&self, attribute: &XmlAttribute) -> Result<Option<String>, AxmlError> {
        match attribute.prefix() {
            None => Ok(None),
            Some(prefix) => match self.namespaces.get(prefix) {
                Some(uri) => Ok(Some(uri.clone())),
                None if prefix == "android" => Ok(Some(ANDROID_NAMESPACE.to_string())),
                None => Err(AxmlError::UnknownPrefix(prefix.to_string())),
            },
        }
    }

    fn collect_ids(&mut self, element: &XmlElement) -> Result<(), E::Error> {
        for attribute in element.attributes.iter().filter(|a| !a.is_namespace_declaration()) {
            let namespace = self.namespace_of(attribute)?;
            let key = (namespace, attribute.local_name().to_string());
            if !self.ids.contains_key(&key) {
                let id = self.encoder.attribute_id(key.0.as_deref(), &key.1)?;
                self.ids.insert(key, id);
            }
        }
        for child in element.elements() {
            self.collect_ids(child)?;
        }
        Ok(())
    }

    fn flatten(
        &mut self,
        element: &XmlElement,
        interner: &mut Interner,
        mapped: &BTreeMap<u32, u32>,
    ) -> Result<FlatElement, E::Error> {
        let mut attributes = vec![];
        for attribute in element.attributes.iter().filter(|a| !a.is_namespace_declaration()) {
            let namespace = self.namespace_of(attribute)?;
            let local = attribute.local_name().to_string();
            let id = self
                .ids
                .get(&(namespace.clone(), local.clone()))
                .copied()
                .flatten();
            let name = match id.and_then(|id| mapped.get(&id)) {
                Some(index) => *index,
                None => interner.intern(&local),
            };
            let (raw, value) = match self.encoder.encode_value(id, &attribute.value)? {
                EncodedValue::String(text) => {
                    let index = interner.intern(&text);
                    (index, ResValue::string(index))
                }
                EncodedValue::Typed(value) => (NO_STRING, value),
            };
            attributes.push((
                id,
                local,
                FlatAttribute {
                    namespace: namespace.map_or(NO_STRING, |uri| interner.intern(&uri)),
                    name,
                    raw,
                    value,
                },
            ));
        }
        attributes.sort_by(|(a_id, a_name, _), (b_id, b_name, _)| {
            (a_id.is_none(), a_id, a_name).cmp(&(b_id.is_none(), b_id, b_name))
        });

        let plain_index = |wanted: &str| -> u16 {
            attributes
                .iter()
                .position(|(_, name, flat)| flat.namespace == NO_STRING && name == wanted)
                .map_or(0, |index| index as u16 + 1)
        };
        let (id_index, class_index, style_index) =
            (plain_index("id"), plain_index("class"), plain_index("style"));

        let mut children = vec![];
        for child in &element.children {
            children.push(match child {
                XmlNode::Element(child) => FlatNode::Element(self.flatten(child, interner, mapped)?),
                XmlNode::Text(text) => FlatNode::Text(interner.intern(text)),
            });
        }

        Ok(FlatElement {
            namespace: NO_STRING,
            name: interner.intern(&element.name),
            attributes: attributes.into_iter().map(|(_, _, flat)| flat).collect(),
            id_index,
            class_index,
            style_index,
            children,
        })
    }
}

pub fn encode<E: AxmlEncoder>(document: &XmlDocument, encoder: &mut E) -> Result<Vec<u8>, E::Error> {
    let mut declarations: Vec<(String, String)> = vec![];
    document.root.walk(&mut |element| {
        for attribute in element.attributes.iter().filter(|a| a.is_namespace_declaration()) {
            let prefix = attribute.local_name().to_string();
            if !declarations.iter().any(|(declared, _)| *declared == prefix) {
                declarations.push((prefix, attribute.value.clone()));
            }
        }
    });

    let mut flattener = Flattener {
        encoder,
        namespaces: declarations.iter().cloned().collect(),
        ids: HashMap::new(),
    };
    flattener.collect_ids(&document.root)?;

    let mut resource_attributes: BTreeMap<u32, String> = BTreeMap::new();
    for ((_, name), id) in &flattener.ids {
        if let Some(id) = id {
            resource_attributes.entry(*id).or_insert_with(|| name.clone());
        }
    }
    let mut interner = Interner {
        pool: StringPool::from_strings(resource_attributes.values().cloned(), true),
        mapped: resource_attributes.len(),
        seen: HashMap::new(),
    };
    let mapped: BTreeMap<u32, u32> = resource_attributes
        .keys()
        .enumerate()
        .map(|(index, id)| (*id, index as u32))
        .collect();

    let namespace_indices: Vec<(u32, u32)> = declarations
        .iter()
        .map(|(prefix, uri)| (interner.intern(prefix), interner.intern(uri)))
        .collect();
    let root = flattener.flatten(&document.root, &mut interner, &mapped)?;
    debug_assert!(interner.pool.len() >= interner.mapped);

    write_document(&interner.pool, &mapped, &namespace_indices, &root).map_err(E::Error::from)
}

fn write_document(
    strings: &StringPool,
    mapped: &BTreeMap<u32, u32>,
    namespaces: &[(u32, u32)],
    root: &FlatElement,
) -> Result<Vec<u8>, AxmlError> {
    let mut writer = Cursor::new(Vec::new());
    let mut document = ChunkWriter::start(ChunkType::Xml, &mut writer)?;
    document.end_header(&mut writer)?;
    strings.write(&mut writer)?;

    if !mapped.is_empty() {
        let mut chunk = ChunkWriter::start(ChunkType::XmlResourceMap, &mut writer)?;
        chunk.end_header(&mut writer)?;
        for id in mapped.keys() {
            writer.write_u32::<LittleEndian>(*id)?;
        }
        chunk.finish(&mut writer)?;
    }

    let mut line = 1;
    for (prefix, uri) in namespaces {
        write_namespace(&mut writer, ChunkType::XmlStartNamespace, *prefix, *uri, line)?;
    }
    write_element(&mut writer, root, &mut line)?;
    for (prefix, uri) in namespaces.iter().rev() {
        write_namespace(&mut writer, ChunkType::XmlEndNamespace, *prefix, *uri, line)?;
    }

    document.finish(&mut writer)?;
    Ok(writer.into_inner())
}

fn start_node<W: Write + Seek>(writer: &mut W, ty: ChunkType, line: u32) -> Result<ChunkWriter, AxmlError> {
    let mut chunk = ChunkWriter::start(ty, writer)?;
    writer.write_u32::<LittleEndian>(line)?;
    writer.write_u32::<LittleEndian>(NO_STRING)?;
    chunk.end_header(writer)?;
    Ok(chunk)
}

fn write_namespace<W: Write + Seek>(
    writer: &mut W,
    ty: ChunkType,
    prefix: u32,
    uri: u32,
    line: u32,
) -> Result<(), AxmlError> {
    let chunk = start_node(writer, ty, line)?;
    writer.write_u32::<LittleEndian>(prefix)?;
    writer.write_u32::<LittleEndian>(uri)?;
    chunk.finish(writer)?;
    Ok(())
}

fn write_element<W: Write + Seek>(
    writer: &mut W,
    element: &FlatElement,
    line: &mut u32,
) -> Result<(), AxmlError> {
    let chunk = start_node(writer, ChunkType::XmlStartElement, *line)?;
    writer.write_u32::<LittleEndian>(element.namespace)?;
    writer.write_u32::<LittleEndian>(element.name)?;
    writer.write_u16::<LittleEndian>(ATTRIBUTE_SIZE)?;
    writer.write_u16::<LittleEndian>(ATTRIBUTE_SIZE)?;
    writer.write_u16::<LittleEndian>(element.attributes.len() as u16)?;
    writer.write_u16::<LittleEndian>(element.id_index)?;
    writer.write_u16::<LittleEndian>(element.class_index)?;
    writer.write_u16::<LittleEndian>(element.style_index)?;
    for attribute in &element.attributes {
        writer.write_u32::<LittleEndian>(attribute.namespace)?;
        writer.write_u32::<LittleEndian>(attribute.name)?;
        writer.write_u32::<LittleEndian>(attribute.raw)?;
        binrw::BinWrite::write(&attribute.value, writer)?;
    }
    chunk.finish(writer)?;
    *line += 1;

    for child in &element.children {
        match child {
            FlatNode::Element(child) => write_element(writer, child, line)?,
            FlatNode::Text(text) => {
                let chunk = start_node(writer, ChunkType::XmlCdata, *line)?;
                writer.write_u32::<LittleEndian>(*text)?;
                binrw::BinWrite::write(&ResValue::null(), writer)?;
                chunk.finish(writer)?;
            }
        }
    }

    let chunk = start_node(writer, ChunkType::XmlEndElement, *line)?;
    writer.write_u32::<LittleEndian>(element.namespace)?;
    writer.write_u32::<LittleEndian>(element.name)?;
    chunk.finish(writer)?;
    *line += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Knows two android attributes and renders typed values as integers.
    struct Attributes;

    impl AxmlDecoder for Attributes {
        fn attribute_name(&self, id: u32) -> Option<String> {
            match id {
                0x0101021b => Some("versionCode".into()),
                0x01010003 => Some("name".into()),
                _ => None,
            }
        }

        fn decode_value(&self, _attribute: Option<u32>, value: &ResValue) -> String {
            value.data.to_string()
        }
    }

    impl AxmlEncoder for Attributes {
        type Error = AxmlError;

        fn attribute_id(&mut self, namespace: Option<&str>, name: &str) -> Result<Option<u32>, AxmlError> {
            Ok(match (namespace, name) {
                (Some(ANDROID_NAMESPACE), "versionCode") => Some(0x0101021b),
                (Some(ANDROID_NAMESPACE), "name") => Some(0x01010003),
                _ => None,
            })
        }

        fn encode_value(&mut self, attribute: Option<u32>, value: &str) -> Result<EncodedValue, AxmlError> {
            Ok(match (attribute, value.parse::<i32>()) {
                (Some(0x0101021b), Ok(number)) => EncodedValue::Typed(ResValue::int(number)),
                _ => EncodedValue::String(value.to_string()),
            })
        }
    }

    fn manifest() -> XmlDocument {
        XmlDocument::new(
            XmlElement::new("manifest")
                .with_attribute("xmlns:android", ANDROID_NAMESPACE)
                .with_attribute("android:versionCode", "42")
                .with_attribute("package", "com.example")
                .with_child(
                    XmlElement::new("application")
                        .with_child(XmlElement::new("activity").with_attribute("android:name", ".Main")),
                ),
        )
    }

    #[test]
    fn test_encode_decode() -> Result<(), AxmlError> {
        let bytes = encode(&manifest(), &mut Attributes)?;
        assert!(is_binary_xml(&bytes));
        assert_eq!(bytes.len() % 4, 0);

        let decoded = decode(&bytes, &Attributes)?;
        let root = &decoded.root;
        assert_eq!(root.name, "manifest");
        assert_eq!(root.attribute("xmlns:android"), Some(ANDROID_NAMESPACE));
        assert_eq!(root.attribute("android:versionCode"), Some("42"));
        assert_eq!(root.attribute("package"), Some("com.example"));

        let activity = root
            .child("application")
            .and_then(|application| application.child("activity"))
            .ok_or(AxmlError::NoRoot)?;
        assert_eq!(activity.attribute("android:name"), Some(".Main"));
        Ok(())
    }

    #[test]
    fn test_resource_map_leads_string_pool() -> Result<(), AxmlError> {
        let bytes = encode(&manifest(), &mut Attributes)?;
        let pool_at = ChunkHeader::SIZE as usize;
        let strings = StringPool::read(&bytes[pool_at..])?;
        // Resource attributes are sorted by id: name (0x01010003) before versionCode.
        assert_eq!(strings.get(0), Some("name"));
        assert_eq!(strings.get(1), Some("versionCode"));
        Ok(())
    }

    #[test]
    fn test_rejects_text_xml() {
        assert!(matches!(
            decode(b"<manifest/>", &Attributes),
            Err(AxmlError::NotBinaryXml)
        ));
    }
}
