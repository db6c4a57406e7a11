//! Minimal XML element tree for NETCONF payloads
//!
//! NETCONF content is element-only in practice, so each element carries a
//! single optional text value instead of a mixed-content node list.

use crate::{ProtocolError, Result};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fmt;
use std::str::FromStr;

/// An XML element with attributes, child elements and text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written on the wire (e.g. `data` or `nc:data`)
    pub name: String,

    /// Attributes in document order, namespace declarations included
    pub attributes: Vec<(String, String)>,

    /// Child elements in document order
    pub children: Vec<Element>,

    /// Text content, if any
    pub text: Option<String>,
}

impl Element {
    /// Create an empty element
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Declare the default namespace
    pub fn with_namespace(self, namespace: impl Into<String>) -> Self {
        self.with_attr("xmlns", namespace)
    }

    /// Set an attribute, replacing an existing one with the same key
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Set text content.
    ///
    /// Text is stored the way [`Element::parse`] would produce it: empty text
    /// is no text, and whitespace-only text is dropped once the element has
    /// children.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self.normalize_text();
        self
    }

    /// Append a child element
    pub fn with_child(mut self, child: Element) -> Self {
        self.push_child(child);
        self
    }

    /// Append a child element in place
    pub fn push_child(&mut self, child: Element) {
        self.children.push(child);
        self.normalize_text();
    }

    fn normalize_text(&mut self) {
        if let Some(text) = self.text.take() {
            self.text = finish_text(self, text);
        }
    }

    /// Set an attribute in place
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    /// Name without its namespace prefix
    pub fn local_name(&self) -> &str {
        match self.name.split_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    /// Namespace prefix, if the name carries one
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    /// Look up an attribute value
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Namespace declared on this element for its own prefix.
    ///
    /// Inherited declarations are not tracked.
    pub fn namespace(&self) -> Option<&str> {
        match self.prefix() {
            Some(prefix) => self.attr(&format!("xmlns:{}", prefix)),
            None => self.attr("xmlns"),
        }
    }

    /// First child with the given local name
    pub fn child(&self, local_name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.local_name() == local_name)
    }

    /// All children with the given local name
    pub fn children_named<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children
            .iter()
            .filter(move |c| c.local_name() == local_name)
    }

    /// Text content, or the empty string
    pub fn text_content(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Text content of the named child, trimmed
    pub fn child_text(&self, local_name: &str) -> Option<&str> {
        self.child(local_name).map(|c| c.text_content().trim())
    }

    /// Parse a document containing exactly one root element
    pub fn parse(input: &str) -> Result<Self> {
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<(Element, String)> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    if root.is_some() {
                        return Err(ProtocolError::InvalidFormat(
                            "content after root element".to_string(),
                        ));
                    }
                    stack.push((element_from_start(&start)?, String::new()));
                }
                Event::Empty(start) => {
                    let element = element_from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    let text = text.unescape()?;
                    append_text(&mut stack, &text)?;
                }
                Event::CData(data) => {
                    let raw = data.into_inner();
                    let text = std::str::from_utf8(&raw)?;
                    append_text(&mut stack, text)?;
                }
                Event::End(_) => {
                    let (mut element, text) = stack.pop().ok_or_else(|| {
                        ProtocolError::Xml("unbalanced end tag".to_string())
                    })?;
                    element.text = finish_text(&element, text);
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(ProtocolError::Xml("unexpected end of document".to_string()));
        }

        root.ok_or_else(|| ProtocolError::InvalidFormat("document has no root element".to_string()))
    }

    /// Parse from raw bytes, which must be UTF-8
    pub fn parse_bytes(input: &[u8]) -> Result<Self> {
        Self::parse(std::str::from_utf8(input)?)
    }

    /// Serialize without an XML declaration
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }

        if self.children.is_empty() && self.text.is_none() {
            out.push_str("/>");
            return;
        }

        out.push('>');
        if let Some(text) = &self.text {
            out.push_str(&escape(text.as_str()));
        }
        for child in &self.children {
            child.write_to(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml())
    }
}

impl FromStr for Element {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element> {
    let name = std::str::from_utf8(start.name().as_ref())?.to_string();
    let mut element = Element::new(name);
    for attr in start.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn append_text(stack: &mut [(Element, String)], text: &str) -> Result<()> {
    match stack.last_mut() {
        Some((_, buf)) => {
            buf.push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(ProtocolError::InvalidFormat(
            "text outside root element".to_string(),
        )),
    }
}

// Whitespace between child elements is layout, not content.
fn finish_text(element: &Element, text: String) -> Option<String> {
    if text.is_empty() || (!element.children.is_empty() && text.trim().is_empty()) {
        None
    } else {
        Some(text)
    }
}

fn attach(
    stack: &mut [(Element, String)],
    root: &mut Option<Element>,
    element: Element,
) -> Result<()> {
    match stack.last_mut() {
        Some((parent, _)) => {
            parent.children.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(ProtocolError::InvalidFormat(
            "multiple root elements".to_string(),
        )),
    }
}
