//! In-memory XML element tree for report definitions
//!
//! Elements carry a namespace-qualified name; lookups use the `rd:` prefix
//! convention for the designer namespace and plain names for the report
//! definition namespace. Text passes the sanitization filter when it enters
//! the tree, so serialization never has to repair content.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::{sanitize_text, NS_DESIGNER, NS_REPORTDEFINITION};
use crate::error::CompileResult;

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub namespace: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    /// Element in the report-definition namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: NS_REPORTDEFINITION.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Element in the designer namespace, serialized with the `rd:` prefix.
    pub fn designer(name: impl Into<String>) -> Self {
        Self {
            namespace: NS_DESIGNER.to_string(),
            ..Self::new(name)
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.children.push(XmlNode::Text(sanitize_text(text)));
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Append a child element and return a reference to it.
    pub fn add_element(&mut self, child: XmlElement) -> &mut XmlElement {
        self.children.push(XmlNode::Element(child));
        match self.children.last_mut() {
            Some(XmlNode::Element(element)) => element,
            _ => unreachable!("just pushed an element"),
        }
    }

    /// Insert a child element at a position, clamped to the child count.
    pub fn insert_element(&mut self, index: usize, child: XmlElement) -> &mut XmlElement {
        let index = index.min(self.children.len());
        self.children.insert(index, XmlNode::Element(child));
        match &mut self.children[index] {
            XmlNode::Element(element) => element,
            _ => unreachable!("just inserted an element"),
        }
    }

    /// Append a text node, sanitized on the way in.
    pub fn add_text(&mut self, text: &str) {
        self.children.push(XmlNode::Text(sanitize_text(text)));
    }

    /// Replace all content with a single sanitized text node.
    pub fn set_text(&mut self, text: &str) {
        self.children.clear();
        self.add_text(text);
    }

    /// Concatenated text content of direct children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(text) => Some(text.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Whether this element matches a qualified name (`rd:` prefix selects
    /// the designer namespace).
    fn matches(&self, qualified: &str) -> bool {
        match qualified.strip_prefix("rd:") {
            Some(local) => self.namespace == NS_DESIGNER && self.name == local,
            None => self.namespace == NS_REPORTDEFINITION && self.name == qualified,
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    pub fn find(&self, qualified: &str) -> Option<&XmlElement> {
        self.child_elements().find(|e| e.matches(qualified))
    }

    pub fn find_mut(&mut self, qualified: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find_map(|node| match node {
            XmlNode::Element(element) if element.matches(qualified) => Some(element),
            _ => None,
        })
    }

    /// First direct child with the qualified name and a matching attribute.
    pub fn find_where(&self, qualified: &str, attr: &str, value: &str) -> Option<&XmlElement> {
        self.child_elements()
            .find(|e| e.matches(qualified) && e.attr(attr) == Some(value))
    }

    pub fn find_where_mut(
        &mut self,
        qualified: &str,
        attr: &str,
        value: &str,
    ) -> Option<&mut XmlElement> {
        self.children.iter_mut().find_map(|node| match node {
            XmlNode::Element(element)
                if element.matches(qualified) && element.attr(attr) == Some(value) =>
            {
                Some(element)
            }
            _ => None,
        })
    }

    /// Descend one qualified name per path segment.
    pub fn find_path(&self, path: &[&str]) -> Option<&XmlElement> {
        let mut current = self;
        for segment in path {
            current = current.find(segment)?;
        }
        Some(current)
    }

    pub fn find_path_mut(&mut self, path: &[&str]) -> Option<&mut XmlElement> {
        let mut current = self;
        for segment in path {
            current = current.find_mut(segment)?;
        }
        Some(current)
    }

    /// Serialize the tree as UTF-8 XML with a standard declaration.
    ///
    /// The root element declares the report-definition namespace as the
    /// default and the designer namespace under the `rd` prefix.
    pub fn to_xml(&self) -> CompileResult<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        self.write_element(&mut writer, true)?;
        Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
    }

    fn write_element(&self, writer: &mut Writer<Vec<u8>>, is_root: bool) -> CompileResult<()> {
        let tag = self.qualified_tag();
        let mut start = BytesStart::new(tag.as_str());
        if is_root {
            start.push_attribute(("xmlns", NS_REPORTDEFINITION));
            start.push_attribute(("xmlns:rd", NS_DESIGNER));
        }
        for (name, value) in &self.attributes {
            start.push_attribute((name.as_str(), value.as_str()));
        }
        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        writer.write_event(Event::Start(start))?;
        for child in &self.children {
            match child {
                XmlNode::Element(element) => element.write_element(writer, false)?,
                XmlNode::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
            }
        }
        writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
        Ok(())
    }

    fn qualified_tag(&self) -> String {
        if self.namespace == NS_DESIGNER {
            format!("rd:{}", self.name)
        } else {
            self.name.clone()
        }
    }
}
