// crates/knxproj-rs-xml/src/error.rs

use core::num::{ParseFloatError, ParseIntError};
use core::str::Utf8Error;
use hex::FromHexError;
use quick_xml::Error as XmlError;
use quick_xml::events::attributes::AttrError;
use std::fmt;

/// Errors that abort the extraction of a document.
///
/// Anything that only affects part of a document (a missing reference, an
/// inconsistent memory layout) is reported as a [`crate::Diagnostic`] instead.
#[derive(Debug)]
pub enum KnxprojError {
    /// An error from the underlying `quick-xml` reader (not well-formed input).
    XmlParsing(XmlError),

    /// A malformed attribute (e.g. duplicated or unquoted).
    XmlAttribute(AttrError),

    /// An element or attribute name was not valid UTF-8.
    Utf8(Utf8Error),

    /// An attribute value could not be unescaped.
    AttributeValue { attribute: String, reason: String },

    /// The document ended while elements were still open.
    UnclosedElement { element: String },

    /// The document contains no root element.
    EmptyDocument,

    /// The root element is not the expected one (e.g. `KNX`).
    UnexpectedRoot {
        expected: &'static str,
        found: String,
    },

    /// A required XML element was missing (e.g. `Project`).
    MissingElement { element: &'static str },

    /// An attribute had an invalid format.
    InvalidAttributeFormat {
        element: String,
        attribute: &'static str,
        value: String,
    },

    /// A numeric value could not be parsed.
    InvalidNumber(String),

    /// A raw-data value contained invalid hex.
    HexParsing(FromHexError),

    /// A product document set contained no application program.
    NoApplicationProgram,

    /// An error raised while handling a named document.
    InDocument {
        document: String,
        source: Box<KnxprojError>,
    },
}

impl KnxprojError {
    /// Attaches the name of the document being processed.
    pub fn in_document(self, document: &str) -> Self {
        match self {
            // Keep the innermost document name.
            e @ KnxprojError::InDocument { .. } => e,
            e => KnxprojError::InDocument {
                document: document.to_string(),
                source: Box::new(e),
            },
        }
    }
}

impl From<XmlError> for KnxprojError {
    fn from(e: XmlError) -> Self {
        KnxprojError::XmlParsing(e)
    }
}

impl From<AttrError> for KnxprojError {
    fn from(e: AttrError) -> Self {
        KnxprojError::XmlAttribute(e)
    }
}

impl From<Utf8Error> for KnxprojError {
    fn from(e: Utf8Error) -> Self {
        KnxprojError::Utf8(e)
    }
}

impl From<FromHexError> for KnxprojError {
    fn from(e: FromHexError) -> Self {
        KnxprojError::HexParsing(e)
    }
}

impl From<ParseIntError> for KnxprojError {
    fn from(e: ParseIntError) -> Self {
        KnxprojError::InvalidNumber(e.to_string())
    }
}

impl From<ParseFloatError> for KnxprojError {
    fn from(e: ParseFloatError) -> Self {
        KnxprojError::InvalidNumber(e.to_string())
    }
}

impl fmt::Display for KnxprojError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnxprojError::XmlParsing(e) => write!(f, "XML parsing error: {}", e),
            KnxprojError::XmlAttribute(e) => write!(f, "XML attribute error: {}", e),
            KnxprojError::Utf8(e) => write!(f, "Invalid UTF-8 in XML name: {}", e),
            KnxprojError::AttributeValue { attribute, reason } => {
                write!(f, "Invalid value for attribute {}: {}", attribute, reason)
            }
            KnxprojError::UnclosedElement { element } => {
                write!(f, "Unexpected end of document inside <{}>", element)
            }
            KnxprojError::EmptyDocument => write!(f, "Document has no root element"),
            KnxprojError::UnexpectedRoot { expected, found } => {
                write!(f, "Expected root element <{}>, found <{}>", expected, found)
            }
            KnxprojError::MissingElement { element } => {
                write!(f, "Missing required XML element: {}", element)
            }
            KnxprojError::InvalidAttributeFormat {
                element,
                attribute,
                value,
            } => write!(
                f,
                "Invalid format for attribute {}@{}: '{}'",
                element, attribute, value
            ),
            KnxprojError::InvalidNumber(msg) => write!(f, "Invalid number: {}", msg),
            KnxprojError::HexParsing(e) => write!(f, "Hex parsing error: {}", e),
            KnxprojError::NoApplicationProgram => {
                write!(f, "No application program found in the product documents")
            }
            KnxprojError::InDocument { document, source } => write!(f, "{}: {}", document, source),
        }
    }
}

impl std::error::Error for KnxprojError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KnxprojError::XmlParsing(e) => Some(e),
            KnxprojError::XmlAttribute(e) => Some(e),
            KnxprojError::Utf8(e) => Some(e),
            KnxprojError::HexParsing(e) => Some(e),
            KnxprojError::InDocument { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::KnxprojError;
    use std::error::Error;

    #[test]
    fn test_from_xml_error() {
        let xml_err = quick_xml::Error::Syntax(quick_xml::errors::SyntaxError::UnclosedTag);
        let err: KnxprojError = xml_err.into();
        assert!(matches!(err, KnxprojError::XmlParsing(_)));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_from_hex_error() {
        let hex_err = hex::decode("Z").unwrap_err();
        let err: KnxprojError = hex_err.into();
        assert!(matches!(err, KnxprojError::HexParsing(_)));
    }

    #[test]
    fn test_from_parse_int_error() {
        let parse_err = "not a number".parse::<u32>().unwrap_err();
        let err: KnxprojError = parse_err.into();
        assert!(matches!(err, KnxprojError::InvalidNumber(_)));
    }

    #[test]
    fn test_from_parse_float_error() {
        let parse_err = "1.2.3".parse::<f64>().unwrap_err();
        let err: KnxprojError = parse_err.into();
        assert!(matches!(err, KnxprojError::InvalidNumber(_)));
    }

    #[test]
    fn test_in_document_keeps_innermost_name() {
        let err = KnxprojError::EmptyDocument
            .in_document("M-0083/M-0083_A-0001.xml")
            .in_document("outer.xml");
        match &err {
            KnxprojError::InDocument { document, source } => {
                assert_eq!(document, "M-0083/M-0083_A-0001.xml");
                assert!(matches!(source.as_ref(), KnxprojError::EmptyDocument));
            }
            other => panic!("Expected InDocument, got {:?}", other),
        }
        assert_eq!(
            err.to_string(),
            "M-0083/M-0083_A-0001.xml: Document has no root element"
        );
    }
}
