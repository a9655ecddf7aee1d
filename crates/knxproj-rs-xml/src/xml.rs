// crates/knxproj-rs-xml/src/xml.rs

//! An owned element tree built from the `quick-xml` event stream.
//!
//! ETS documents carry almost all of their information in attributes, so the
//! tree keeps element names, attributes and children only. Names are stored
//! without namespace prefix; the default namespace of the root is kept on the
//! document to derive the schema version.

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::error::KnxprojError;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::str::FromStr;

/// One XML element with its attributes in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Returns the value of an attribute, if present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the value of an attribute or an empty string.
    pub fn attr_or_empty(&self, name: &str) -> &str {
        self.attr(name).unwrap_or_default()
    }

    /// Returns an attribute as an owned string, treating empty values as absent.
    pub fn attr_string(&self, name: &str) -> Option<String> {
        self.attr(name).filter(|v| !v.is_empty()).map(str::to_string)
    }

    /// Parses an optional attribute into `T`.
    ///
    /// A missing attribute yields `Ok(None)`; a present but malformed one is an
    /// `InvalidAttributeFormat` error.
    pub fn parse_attr<T: FromStr>(&self, name: &'static str) -> Result<Option<T>, KnxprojError> {
        match self.attr(name) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|_| KnxprojError::InvalidAttributeFormat {
                    element: self.name.clone(),
                    attribute: name,
                    value: raw.to_string(),
                }),
        }
    }

    /// Parses an optional attribute, recording a malformed value as an
    /// `InvalidValue` diagnostic and treating it as absent.
    pub(crate) fn parse_attr_or_report<T: FromStr>(
        &self,
        name: &'static str,
        diagnostics: &mut Diagnostics,
    ) -> Option<T> {
        self.parse_attr(name).unwrap_or_else(|e| {
            let subject = self.attr("Id").unwrap_or(&self.name);
            diagnostics.push(Diagnostic::new(DiagnosticKind::InvalidValue, subject, e.to_string()));
            None
        })
    }

    /// Returns the first direct child with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Iterates the direct children with the given name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follows a path of child names, taking the first match at every step.
    pub fn path(&self, path: &[&str]) -> Option<&XmlElement> {
        path.iter().try_fold(self, |el, name| el.child(name))
    }

    /// Collects every element reachable through the path of child names.
    pub fn find_all<'a>(&'a self, path: &[&'a str]) -> Vec<&'a XmlElement> {
        let mut current: Vec<&XmlElement> = vec![self];
        for name in path {
            current = current
                .into_iter()
                .flat_map(|el| el.children_named(name))
                .collect();
        }
        current
    }

    /// Collects all descendants (not including `self`) with the given name, in
    /// document order. Matching elements are not searched further.
    pub fn descendants_named<'a>(&'a self, name: &str) -> Vec<&'a XmlElement> {
        let mut result = Vec::new();
        let mut stack: Vec<&XmlElement> = self.children.iter().rev().collect();
        while let Some(el) = stack.pop() {
            if el.name == name {
                result.push(el);
            } else {
                stack.extend(el.children.iter().rev());
            }
        }
        result
    }
}

/// A parsed, named XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    /// The archive path of the document (e.g. `P-0123/0.xml`).
    pub name: String,
    /// Default namespace declared on the root element.
    pub namespace: Option<String>,
    pub root: XmlElement,
}

impl XmlDocument {
    /// Parses a complete XML document.
    ///
    /// # Errors
    /// Returns a `KnxprojError` tagged with the document name if the input is
    /// not well-formed or has no root element.
    pub fn parse(name: &str, xml: &str) -> Result<Self, KnxprojError> {
        parse_tree(xml)
            .map(|(namespace, root)| XmlDocument {
                name: name.to_string(),
                namespace,
                root,
            })
            .map_err(|e| e.in_document(name))
    }

    /// Builds a document from an already constructed tree.
    pub fn from_root(name: &str, root: XmlElement) -> Self {
        XmlDocument {
            name: name.to_string(),
            namespace: None,
            root,
        }
    }

    /// Schema version derived from the namespace (`http://knx.org/xml/project/21` => 21).
    pub fn schema_version(&self) -> Option<u32> {
        self.namespace
            .as_deref()
            .and_then(|ns| ns.trim_end_matches('/').rsplit('/').next())
            .and_then(|v| v.parse().ok())
    }
}

fn local_name_of(e: &BytesStart<'_>) -> Result<String, KnxprojError> {
    Ok(std::str::from_utf8(e.local_name().as_ref())?.to_string())
}

/// Reads the attributes of a start tag, dropping namespace declarations.
fn read_element(
    e: &BytesStart<'_>,
    namespace: &mut Option<String>,
) -> Result<XmlElement, KnxprojError> {
    let mut element = XmlElement::new(&local_name_of(e)?);
    for attr in e.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?;
        let value = attr
            .unescape_value()
            .map_err(|err| KnxprojError::AttributeValue {
                attribute: key.to_string(),
                reason: err.to_string(),
            })?
            .into_owned();
        if key == "xmlns" {
            if namespace.is_none() {
                *namespace = Some(value);
            }
            continue;
        }
        if key.starts_with("xmlns:") {
            continue;
        }
        let local = std::str::from_utf8(attr.key.local_name().as_ref())?.to_string();
        element.attributes.push((local, value));
    }
    Ok(element)
}

/// Places a finished element either under its parent or as the root.
fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        // Only the first top-level element is the document root.
        None if root.is_none() => *root = Some(element),
        None => {}
    }
}

fn parse_tree(xml: &str) -> Result<(Option<String>, XmlElement), KnxprojError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;
    let mut namespace: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let element = read_element(&e, &mut namespace)?;
                stack.push(element);
            }
            Event::Empty(e) => {
                let element = read_element(&e, &mut namespace)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::Eof => break,
            // Text, comments, declarations and processing instructions carry
            // nothing the resolvers use.
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(KnxprojError::UnclosedElement {
            element: open.name.clone(),
        });
    }
    root.map(|r| (namespace, r))
        .ok_or(KnxprojError::EmptyDocument)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<KNX xmlns="http://knx.org/xml/project/21" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" CreatedBy="ETS6">
  <!-- comment -->
  <Project Id="P-0001">
    <Installations>
      <Installation Name="Home &amp; Garden">
        <Topology>
          <Area Id="A-1" Address="1"><Line Id="L-1" Address="1"/></Area>
          <Area Id="A-2" Address="2"/>
        </Topology>
      </Installation>
    </Installations>
  </Project>
</KNX>"#;

    #[test]
    fn test_parse_tree_structure() {
        let doc = XmlDocument::parse("0.xml", SAMPLE).unwrap();
        assert_eq!(doc.root.name, "KNX");
        assert_eq!(doc.schema_version(), Some(21));
        assert_eq!(doc.root.attr("CreatedBy"), Some("ETS6"));
        // Namespace declarations are not attributes.
        assert_eq!(doc.root.attributes.len(), 1);

        let installation = doc
            .root
            .path(&["Project", "Installations", "Installation"])
            .unwrap();
        assert_eq!(installation.attr("Name"), Some("Home & Garden"));

        let areas = doc.root.find_all(&["Project", "Installations", "Installation", "Topology", "Area"]);
        assert_eq!(areas.len(), 2);
        assert_eq!(areas[1].attr("Id"), Some("A-2"));
        assert_eq!(doc.root.descendants_named("Line").len(), 1);
    }

    #[test]
    fn test_parse_attr() {
        let doc = XmlDocument::parse("0.xml", SAMPLE).unwrap();
        let area = doc.root.descendants_named("Area")[0];
        assert_eq!(area.parse_attr::<u8>("Address").unwrap(), Some(1));
        assert_eq!(area.parse_attr::<u8>("Missing").unwrap(), None);
        assert!(matches!(
            area.parse_attr::<u8>("Id"),
            Err(KnxprojError::InvalidAttributeFormat { attribute: "Id", .. })
        ));
    }

    #[test]
    fn test_parse_attr_or_report() {
        let doc = XmlDocument::parse("0.xml", SAMPLE).unwrap();
        let area = doc.root.descendants_named("Area")[0];
        let mut diagnostics = Diagnostics::new();
        assert_eq!(area.parse_attr_or_report::<u8>("Address", &mut diagnostics), Some(1));
        assert_eq!(area.parse_attr_or_report::<u8>("Id", &mut diagnostics), None);
        let reported: Vec<_> = diagnostics.of_kind(DiagnosticKind::InvalidValue).collect();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].subject, "A-1");
    }

    #[test]
    fn test_malformed_documents() {
        let err = XmlDocument::parse("bad.xml", "<KNX><Project></KNX>").unwrap_err();
        assert!(
            matches!(&err, KnxprojError::InDocument { document, .. } if document == "bad.xml"),
            "got {:?}",
            err
        );

        let err = XmlDocument::parse("empty.xml", "   ").unwrap_err();
        match err {
            KnxprojError::InDocument { source, .. } => {
                assert!(matches!(*source, KnxprojError::EmptyDocument))
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
