//! Ordered XML element tree
//!
//! This module provides a small mutable XML tree used by all converters.
//! Unlike a typed XML binding, the tree preserves attribute order and
//! mixed-content child order exactly, which is what the round-trip
//! guarantee rests on. Parsing and escaping are done with quick-xml.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

/// A node in the tree: a child element, character data, or a CDATA
/// section. CDATA is kept distinct so it survives serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Child element
    Element(Element),
    /// Character data (unescaped)
    Text(String),
    /// CDATA section (verbatim)
    CData(String),
}

impl Node {
    /// The contained element, if this node is one
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    /// True for a text node that is entirely whitespace
    pub fn is_whitespace(&self) -> bool {
        match self {
            Node::Text(t) => t.trim().is_empty(),
            _ => false,
        }
    }
}

/// An XML element with ordered attributes and ordered children
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    /// Tag name, including any prefix (e.g. `xml:lang` stays as-is)
    pub name: String,
    /// Attributes in document/insertion order
    pub attributes: IndexMap<String, String>,
    /// Child nodes in document order
    pub children: Vec<Node>,
}

impl Element {
    /// Create an empty element
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder-style attribute setter
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Builder-style text content setter
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Get an attribute value
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    /// Set an attribute value
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Set an attribute only when the value is non-empty
    pub fn set_attr_opt(&mut self, name: &str, value: &str) {
        if !value.is_empty() {
            self.attributes.insert(name.to_string(), value.to_string());
        }
    }

    /// Remove an attribute, returning its previous value
    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        self.attributes.shift_remove(name)
    }

    /// Append a child element
    pub fn push_element(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Append character data
    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(Node::Text(text.into()));
    }

    /// Append a CDATA section
    pub fn push_cdata(&mut self, data: impl Into<String>) {
        self.children.push(Node::CData(data.into()));
    }

    /// Iterate over child elements in order
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Mutable iteration over child elements in order
    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// First child element with the given name
    pub fn find_child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.name == name)
    }

    /// All child elements with the given name
    pub fn find_children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.child_elements().filter(move |e| e.name == name)
    }

    /// Depth-first search for the first element (self included)
    /// matching the predicate
    pub fn find_first<'a>(&'a self, pred: &dyn Fn(&Element) -> bool) -> Option<&'a Element> {
        if pred(self) {
            return Some(self);
        }
        for child in self.child_elements() {
            if let Some(found) = child.find_first(pred) {
                return Some(found);
            }
        }
        None
    }

    /// Concatenated character data of direct children (CDATA included)
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                Node::Text(t) => out.push_str(t),
                Node::CData(t) => out.push_str(t),
                Node::Element(_) => {}
            }
        }
        out
    }

    /// Leading character data, stopping at the first child element.
    ///
    /// Returns `None` when there are no children or the element content
    /// starts with a child element before any non-whitespace text.
    pub fn leading_cdata(&self) -> Option<String> {
        if self.children.is_empty() {
            return None;
        }
        let mut buf = String::new();
        for child in &self.children {
            match child {
                Node::Text(t) => {
                    if t.trim().is_empty() {
                        continue;
                    }
                    buf.push_str(t);
                }
                Node::CData(t) => buf.push_str(t),
                Node::Element(_) => {
                    if buf.is_empty() {
                        return None;
                    }
                    return Some(buf);
                }
            }
        }
        Some(buf)
    }

    /// True when the element has no attributes and no children beyond
    /// whitespace
    pub fn is_effectively_empty(&self) -> bool {
        self.attributes.is_empty() && self.children.iter().all(Node::is_whitespace)
    }

    /// Serialize the children only (the "inner XML" of the element)
    pub fn inner_xml(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            write_node(&mut out, child);
        }
        out
    }

    /// Serialize the element itself
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        write_element(&mut out, self);
        out
    }
}

fn write_element(out: &mut String, element: &Element) {
    out.push('<');
    out.push_str(&element.name);
    for (name, value) in &element.attributes {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape(value.as_str()));
        out.push('"');
    }
    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &element.children {
        write_node(out, child);
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

fn write_node(out: &mut String, node: &Node) {
    match node {
        Node::Element(e) => write_element(out, e),
        Node::Text(t) => out.push_str(&escape(t.as_str())),
        Node::CData(t) => {
            out.push_str("<![CDATA[");
            out.push_str(t);
            out.push_str("]]>");
        }
    }
}

/// Parse a complete XML document and return its root element
pub fn parse(input: &str) -> Result<Element> {
    let nodes = parse_nodes(input)?;
    let mut root = None;
    for node in nodes {
        match node {
            Node::Element(e) => {
                if root.is_some() {
                    return Err(Error::Xml("multiple root elements".to_string()));
                }
                root = Some(e);
            }
            n if n.is_whitespace() => {}
            _ => return Err(Error::Xml("text content outside root element".to_string())),
        }
    }
    root.ok_or_else(|| Error::Xml("no root element found".to_string()))
}

/// Parse an XML fragment: a sequence of sibling nodes with no single
/// root. The fragment is wrapped in a synthetic element for parsing.
pub fn parse_fragment(input: &str) -> Result<Vec<Node>> {
    let wrapped = format!("<x-fragment-root>{}</x-fragment-root>", input);
    let root = parse(&wrapped)?;
    Ok(root.children)
}

fn parse_nodes(input: &str) -> Result<Vec<Node>> {
    let mut reader = Reader::from_str(input);
    reader.trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut top: Vec<Node> = Vec::new();

    macro_rules! attach {
        ($node:expr) => {
            match stack.last_mut() {
                Some(parent) => parent.children.push($node),
                None => top.push($node),
            }
        };
    }

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let element = element_from_start(&start)?;
                stack.push(element);
            }
            Ok(Event::Empty(start)) => {
                let element = element_from_start(&start)?;
                attach!(Node::Element(element));
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| Error::Xml("unexpected closing tag".to_string()))?;
                attach!(Node::Element(element));
            }
            Ok(Event::Text(text)) => {
                let unescaped = text
                    .unescape()
                    .map_err(|e| Error::Xml(e.to_string()))?
                    .into_owned();
                if !unescaped.is_empty() {
                    attach!(Node::Text(unescaped));
                }
            }
            Ok(Event::CData(data)) => {
                let raw = String::from_utf8_lossy(data.as_ref()).into_owned();
                attach!(Node::CData(raw));
            }
            Ok(Event::Eof) => break,
            Ok(Event::Decl(_)) | Ok(Event::Comment(_)) | Ok(Event::PI(_)) | Ok(Event::DocType(_)) => {}
            Err(e) => return Err(Error::Xml(e.to_string())),
        }
    }

    if !stack.is_empty() {
        return Err(Error::Xml("unclosed element".to_string()));
    }

    Ok(top)
}

fn element_from_start(start: &quick_xml::events::BytesStart<'_>) -> Result<Element> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::Xml(e.to_string()))?
            .into_owned();
        element.attributes.insert(key, value);
    }
    Ok(element)
}
