//! Owned XML element tree.
//!
//! `xml-rs` only offers streaming events; manifests and string resources are
//! edited in place, so events are folded into a small tree and streamed back
//! out unchanged apart from the edits. Whitespace and comments are kept as
//! nodes, which keeps diffs of rewritten files minimal.

use std::borrow::Cow;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use xml::attribute::{Attribute, OwnedAttribute};
use xml::common::XmlVersion;
use xml::name::OwnedName;
use xml::namespace::Namespace;
use xml::reader::{ParserConfig, XmlEvent as ReadEvent};
use xml::writer::{EmitterConfig, EventWriter, XmlEvent as WriteEvent};

use super::error::{ManifestError, ManifestResult};

/// `android:` attribute namespace
pub const ANDROID_NS: &str = "http://schemas.android.com/apk/res/android";
const ANDROID_PREFIX: &str = "android";

/// Child node of an element
#[derive(Debug, Clone)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
    Whitespace(String),
}

/// Element with its attributes, in-scope namespaces and children
#[derive(Debug, Clone)]
pub struct XmlElement {
    pub name: OwnedName,
    pub attributes: Vec<OwnedAttribute>,
    pub namespace: Namespace,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn local_name(&self) -> &str {
        &self.name.local_name
    }

    /// Attribute value by namespace URI and local name
    pub fn attribute(&self, namespace: Option<&str>, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name.local_name == local && attr.name.namespace.as_deref() == namespace)
            .map(|attr| attr.value.as_str())
    }

    pub fn android_attribute(&self, local: &str) -> Option<&str> {
        self.attribute(Some(ANDROID_NS), local)
    }

    /// Replace the attribute with the same namespace and local name, or append it
    pub fn set_attribute(&mut self, name: OwnedName, value: impl Into<String>) {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|attr| attr.name.local_name == name.local_name && attr.name.namespace == name.namespace)
        {
            Some(existing) => existing.value = value,
            None => self.attributes.push(OwnedAttribute::new(name, value)),
        }
    }

    pub fn set_android_attribute(&mut self, local: &str, value: impl Into<String>) {
        self.set_attribute(OwnedName::qualified(local, ANDROID_NS, Some(ANDROID_PREFIX)), value);
    }

    /// Remove an `android:` attribute, reporting whether it was present
    pub fn remove_android_attribute(&mut self, local: &str) -> bool {
        let before = self.attributes.len();
        self.attributes
            .retain(|attr| !(attr.name.local_name == local && attr.name.namespace.as_deref() == Some(ANDROID_NS)));
        self.attributes.len() != before
    }

    /// Direct child elements
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            _ => None,
        })
    }

    /// First direct child with the given local name
    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.elements().find(|element| element.local_name() == local)
    }

    pub fn child_mut(&mut self, local: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|element| element.local_name() == local)
    }

    /// All descendant elements in document order, excluding `self`
    pub fn descendants(&self) -> Vec<&XmlElement> {
        let mut found = Vec::new();
        for child in self.elements() {
            found.push(child);
            found.extend(child.descendants());
        }
        found
    }

    /// Visit `self` and every descendant element mutably, in document order
    pub fn walk_mut(&mut self, visit: &mut dyn FnMut(&mut XmlElement)) {
        visit(self);
        for child in self.elements_mut() {
            child.walk_mut(visit);
        }
    }

    /// Drop direct child elements for which `keep` is false, returning how many went
    pub fn retain_elements(&mut self, mut keep: impl FnMut(&XmlElement) -> bool) -> usize {
        let before = self.children.len();
        self.children.retain(|node| match node {
            XmlNode::Element(element) => keep(element),
            _ => true,
        });
        before - self.children.len()
    }

    /// Concatenated text and CDATA content of direct children
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(text) | XmlNode::CData(text) | XmlNode::Whitespace(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Replace all children with a single text node
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![XmlNode::Text(text.into())];
    }
}

/// Parsed XML file
#[derive(Debug, Clone)]
pub struct XmlDocument {
    pub root: XmlElement,
    pub standalone: Option<bool>,
}

impl XmlDocument {
    /// Parse a document from any reader
    pub fn parse<R: Read>(source: R) -> ManifestResult<Self> {
        let reader = ParserConfig::new()
            .trim_whitespace(false)
            .whitespace_to_characters(false)
            .cdata_to_characters(false)
            .ignore_comments(false)
            .create_reader(source);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root = None;
        let mut standalone = None;

        for event in reader {
            match event? {
                ReadEvent::StartDocument { standalone: declared, .. } => standalone = declared,
                ReadEvent::StartElement {
                    name,
                    attributes,
                    namespace,
                } => stack.push(XmlElement {
                    name,
                    attributes,
                    namespace,
                    children: Vec::new(),
                }),
                ReadEvent::EndElement { .. } => {
                    let element = stack.pop().ok_or(ManifestError::EmptyDocument)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(XmlNode::Element(element)),
                        None => root = Some(element),
                    }
                }
                ReadEvent::Characters(text) => push_node(&mut stack, XmlNode::Text(text)),
                ReadEvent::CData(text) => push_node(&mut stack, XmlNode::CData(text)),
                ReadEvent::Comment(text) => push_node(&mut stack, XmlNode::Comment(text)),
                ReadEvent::Whitespace(text) => push_node(&mut stack, XmlNode::Whitespace(text)),
                _ => {}
            }
        }

        let root = root.ok_or(ManifestError::EmptyDocument)?;
        Ok(Self { root, standalone })
    }

    pub fn parse_str(xml: &str) -> ManifestResult<Self> {
        Self::parse(xml.as_bytes())
    }

    pub fn load(path: &Path) -> ManifestResult<Self> {
        let bytes = fs::read(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(bytes.as_slice())
    }

    /// Stream the tree back out as UTF-8 XML
    pub fn write<W: Write>(&self, sink: W) -> ManifestResult<()> {
        let mut writer = EmitterConfig::new()
            .perform_indent(false)
            .write_document_declaration(true)
            .create_writer(sink);

        writer.write(WriteEvent::StartDocument {
            version: XmlVersion::Version10,
            encoding: Some("utf-8"),
            standalone: self.standalone,
        })?;
        write_element(&mut writer, &self.root)?;
        Ok(())
    }

    pub fn to_xml_string(&self) -> ManifestResult<String> {
        let mut buffer = Vec::new();
        self.write(&mut buffer)?;
        buffer.push(b'\n');
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Serialize fully in memory, then replace the file
    pub fn save(&self, path: &Path) -> ManifestResult<()> {
        let xml = self.to_xml_string()?;
        fs::write(path, xml).map_err(|source| ManifestError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn push_node(stack: &mut [XmlElement], node: XmlNode) {
    // Prolog/epilog text has no parent and is dropped
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

fn write_element<W: Write>(writer: &mut EventWriter<W>, element: &XmlElement) -> Result<(), xml::writer::Error> {
    let attributes: Vec<Attribute<'_>> = element.attributes.iter().map(OwnedAttribute::borrow).collect();
    writer.write(WriteEvent::StartElement {
        name: element.name.borrow(),
        attributes: Cow::Owned(attributes),
        namespace: Cow::Borrowed(&element.namespace),
    })?;

    for child in &element.children {
        match child {
            XmlNode::Element(nested) => write_element(writer, nested)?,
            XmlNode::Text(text) | XmlNode::Whitespace(text) => writer.write(WriteEvent::Characters(text))?,
            XmlNode::CData(text) => writer.write(WriteEvent::CData(text))?,
            XmlNode::Comment(text) => writer.write(WriteEvent::Comment(text))?,
        }
    }

    writer.write(WriteEvent::EndElement {
        name: Some(element.name.borrow()),
    })
}
