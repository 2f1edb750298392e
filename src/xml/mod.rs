//! Textual XML documents as exposed to callers, and the binary XML codec in [axml].

pub mod axml;

use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;
use thiserror::Error;

pub const ANDROID_NAMESPACE: &str = "http://schemas.android.com/apk/res/android";
pub const NEW_ID_PREFIX: &str = "@+id/";

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("Malformed xml: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed attribute: {0}")]
    Attr(#[from] AttrError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Document is not valid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Unbalanced closing tag </{0}>")]
    Unbalanced(String),

    #[error("Document has no root element")]
    NoRoot,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XmlAttribute {
    /// Qualified name, `android:label` or `name`.
    pub name: String,
    pub value: String,
}

impl XmlAttribute {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    pub fn is_namespace_declaration(&self) -> bool {
        self.name == "xmlns" || self.name.starts_with("xmlns:")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlNode>,
    /// Id of the table entry this element was decoded from. Not serialized.
    pub resource_id: Option<u32>,
}

impl XmlElement {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.set_text(text);
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attribute| attribute.name == name)
            .map(|attribute| attribute.value.as_str())
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|attribute| attribute.name == name) {
            Some(attribute) => attribute.value = value.to_string(),
            None => self.attributes.push(XmlAttribute::new(name, value)),
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let position = self.attributes.iter().position(|attribute| attribute.name == name)?;
        Some(self.attributes.remove(position).value)
    }

    pub fn push_child(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|child| match child {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|child| match child {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    /// First child element named `name`.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|element| element.name == name)
    }

    /// Concatenated character data of this element and its descendants.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for child in &self.children {
            match child {
                XmlNode::Text(value) => text.push_str(value),
                XmlNode::Element(element) => text.push_str(&element.text()),
            }
        }
        text
    }

    pub fn set_text(&mut self, text: &str) {
        self.children.clear();
        if !text.is_empty() {
            self.children.push(XmlNode::Text(text.to_string()));
        }
    }

    /// Visits this element and every descendant, parents first.
    pub fn walk<F: FnMut(&XmlElement)>(&self, visit: &mut F) {
        visit(self);
        for element in self.elements() {
            element.walk(visit);
        }
    }

    pub fn walk_mut<F: FnMut(&mut XmlElement)>(&mut self, visit: &mut F) {
        visit(self);
        for element in self.elements_mut() {
            element.walk_mut(visit);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XmlDocument {
    pub root: XmlElement,
}

impl XmlDocument {
    pub fn new(root: XmlElement) -> Self {
        Self { root }
    }

    pub fn parse(data: &[u8]) -> Result<Self, XmlError> {
        let text = std::str::from_utf8(data)?;
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = vec![];
        let mut root = None;
        loop {
            match reader.read_event()? {
                Event::Start(start) => stack.push(element_from(&start)?),
                Event::Empty(start) => {
                    let element = element_from(&start)?;
                    attach(&mut stack, &mut root, element);
                }
                Event::End(end) => {
                    let element = stack.pop().ok_or_else(|| {
                        XmlError::Unbalanced(String::from_utf8_lossy(end.name().as_ref()).into_owned())
                    })?;
                    attach(&mut stack, &mut root, element);
                }
                Event::Text(text) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::Text(text.unescape()?.into_owned()));
                    }
                }
                Event::CData(data) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                        parent.children.push(XmlNode::Text(text));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        root.map(XmlDocument::new).ok_or(XmlError::NoRoot)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, XmlError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 4);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        write_element(&mut writer, &self.root)?;
        Ok(writer.into_inner().into_inner())
    }

    /// Names of the ids declared inline with `@+id/name` attribute values.
    pub fn new_ids(&self) -> Vec<String> {
        let mut ids = vec![];
        self.root.walk(&mut |element| {
            for attribute in &element.attributes {
                if let Some(name) = attribute.value.strip_prefix(NEW_ID_PREFIX) {
                    if !ids.iter().any(|id| id == name) {
                        ids.push(name.to_string());
                    }
                }
            }
        });
        ids
    }

    /// Rewrites every `@+id/name` value into a plain `@id/name` reference.
    pub fn strip_new_ids(&mut self) {
        self.root.walk_mut(&mut |element| {
            for attribute in element.attributes.iter_mut() {
                if let Some(name) = attribute.value.strip_prefix(NEW_ID_PREFIX) {
                    attribute.value = format!("@id/{name}");
                }
            }
        });
    }
}

fn element_from(start: &BytesStart) -> Result<XmlElement, XmlError> {
    let mut element = XmlElement::new(&String::from_utf8_lossy(start.name().as_ref()));
    for attribute in start.attributes() {
        let attribute = attribute?;
        element.attributes.push(XmlAttribute {
            name: String::from_utf8_lossy(attribute.key.as_ref()).into_owned(),
            value: attribute.unescape_value()?.into_owned(),
        });
    }
    Ok(element)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None => *root = Some(element),
    }
}

fn write_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    element: &XmlElement,
) -> Result<(), XmlError> {
    let mut start = BytesStart::new(element.name.as_str());
    for attribute in &element.attributes {
        start.push_attribute((attribute.name.as_str(), attribute.value.as_str()));
    }
    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        match child {
            XmlNode::Element(child) => write_element(writer, child)?,
            XmlNode::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_serialize() -> Result<(), XmlError> {
        let source = br#"<?xml version="1.0" encoding="utf-8"?>
<resources>
    <string name="greeting">Hello &amp; welcome</string>
    <item type="id" name="anchor"/>
</resources>"#;
        let document = XmlDocument::parse(source)?;
        assert_eq!(document.root.name, "resources");
        let greeting = document.root.child("string").ok_or(XmlError::NoRoot)?;
        assert_eq!(greeting.attribute("name"), Some("greeting"));
        assert_eq!(greeting.text(), "Hello & welcome");

        let reparsed = XmlDocument::parse(&document.to_bytes()?)?;
        assert_eq!(reparsed, document);
        Ok(())
    }

    #[test]
    fn test_new_ids() -> Result<(), XmlError> {
        let mut document = XmlDocument::parse(
            br#"<LinearLayout xmlns:android="http://schemas.android.com/apk/res/android">
                <TextView android:id="@+id/title"/>
                <TextView android:id="@+id/title" android:layout_below="@id/other"/>
                <Button android:id="@+id/ok"/>
            </LinearLayout>"#,
        )?;
        assert_eq!(document.new_ids(), vec!["title", "ok"]);

        document.strip_new_ids();
        assert!(document.new_ids().is_empty());
        let button = document.root.child("Button").ok_or(XmlError::NoRoot)?;
        assert_eq!(button.attribute("android:id"), Some("@id/ok"));
        Ok(())
    }

    #[test]
    fn test_unbalanced_document() {
        assert!(XmlDocument::parse(b"<a></b>").is_err());
        assert!(matches!(XmlDocument::parse(b""), Err(XmlError::NoRoot)));
    }
}
