// crates/knxproj-rs-xml/src/parser.rs

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Parsed};
use crate::error::KnxprojError;
use crate::options::ParseOptions;
use crate::resolver::{resolve_product, resolve_project};
use crate::types::{ProductDescription, Project};
use crate::xml::XmlDocument;

/// Name under which the installation document is registered.
pub const INSTALLATION_DOCUMENT: &str = "0.xml";
/// Name under which the project metadata document is registered.
pub const PROJECT_DOCUMENT: &str = "project.xml";
/// Name under which the master data document is registered.
pub const MASTER_DOCUMENT: &str = "knx_master.xml";

/// The XML documents of one project or product archive.
///
/// Definition documents (master data, manufacturer data, translations) are
/// indexed in the order they were added; the first document declaring an
/// identifier owns it. A definition document that is not well-formed is
/// recorded as a diagnostic and left out.
#[derive(Debug, Clone, Default)]
pub struct DocumentSet {
    installation: Option<XmlDocument>,
    project_meta: Option<XmlDocument>,
    definitions: Vec<XmlDocument>,
    diagnostics: Diagnostics,
}

impl DocumentSet {
    /// An empty set, e.g. for the documents of a product file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a project set from its installation document (`0.xml`).
    ///
    /// # Errors
    /// Returns a `KnxprojError` if the document is not well-formed.
    pub fn from_project_str(xml: &str) -> Result<Self, KnxprojError> {
        Ok(Self {
            installation: Some(XmlDocument::parse(INSTALLATION_DOCUMENT, xml)?),
            ..Self::default()
        })
    }

    /// Adds `project.xml`, which carries the project information.
    pub fn with_project_meta_str(mut self, xml: &str) -> Self {
        self.project_meta = self.parse_optional(PROJECT_DOCUMENT, xml);
        self
    }

    /// Adds `knx_master.xml`.
    pub fn with_master_str(self, xml: &str) -> Self {
        self.with_definition_str(MASTER_DOCUMENT, xml)
    }

    /// Adds a manufacturer document (hardware, catalog or application
    /// program) under its archive path.
    pub fn with_manufacturer_str(self, name: &str, xml: &str) -> Self {
        self.with_definition_str(name, xml)
    }

    /// Adds a translation document under its archive path.
    pub fn with_language_str(self, name: &str, xml: &str) -> Self {
        self.with_definition_str(name, xml)
    }

    /// Adds an already parsed definition document.
    pub fn with_document(mut self, document: XmlDocument) -> Self {
        self.definitions.push(document);
        self
    }

    /// Problems found while adding documents.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn definitions(&self) -> impl Iterator<Item = &XmlDocument> {
        self.definitions.iter()
    }

    fn with_definition_str(mut self, name: &str, xml: &str) -> Self {
        if let Some(document) = self.parse_optional(name, xml) {
            self.definitions.push(document);
        }
        self
    }

    fn parse_optional(&mut self, name: &str, xml: &str) -> Option<XmlDocument> {
        match XmlDocument::parse(name, xml) {
            Ok(document) => Some(document),
            Err(e) => {
                self.diagnostics.push(
                    Diagnostic::new(DiagnosticKind::Structural, name, e.to_string()).in_document(name),
                );
                None
            }
        }
    }
}

/// Extracts a project from its document set.
///
/// Missing references never abort the parse: the affected devices, objects
/// and parameters are still returned and the gaps are listed in the
/// diagnostics.
///
/// # Arguments
/// * `documents` - The installation document plus any definition documents.
/// * `options` - Locale, parameterization and threading.
///
/// # Errors
/// Returns a `KnxprojError` if the set has no installation document, or if
/// that document has no `KNX/Project/Installations/Installation`.
pub fn load_project(documents: &DocumentSet, options: &ParseOptions) -> Result<Parsed<Project>, KnxprojError> {
    let installation = documents.installation.as_ref().ok_or(KnxprojError::MissingElement {
        element: INSTALLATION_DOCUMENT,
    })?;
    let parsed = resolve_project(
        installation,
        documents.project_meta.as_ref(),
        &documents.definitions,
        options,
    )?;
    Ok(with_set_diagnostics(documents, parsed))
}

/// Extracts the hardware and the resolved application programs of a product
/// file.
///
/// # Errors
/// Returns [`KnxprojError::NoApplicationProgram`] if no document of the set
/// declares an application program.
pub fn load_product(
    documents: &DocumentSet,
    options: &ParseOptions,
) -> Result<Parsed<ProductDescription>, KnxprojError> {
    let parsed = resolve_product(&documents.definitions, options)?;
    Ok(with_set_diagnostics(documents, parsed))
}

fn with_set_diagnostics<T>(documents: &DocumentSet, parsed: Parsed<T>) -> Parsed<T> {
    let mut diagnostics = documents.diagnostics.clone();
    diagnostics.extend(parsed.diagnostics);
    Parsed::new(parsed.value, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broken_definition_is_diagnostic() {
        let set = DocumentSet::from_project_str("<KNX />")
            .unwrap()
            .with_master_str("<KNX><MasterData>")
            .with_language_str("M-0083/Lang.xml", "<KNX />");
        assert_eq!(set.definitions().count(), 1);
        assert_eq!(set.diagnostics().of_kind(DiagnosticKind::Structural).count(), 1);
    }

    #[test]
    fn test_with_prebuilt_document() {
        let mut root = crate::xml::XmlElement::new("KNX");
        root.children.push(crate::xml::XmlElement::new("MasterData"));
        let set = DocumentSet::new().with_document(XmlDocument::from_root(MASTER_DOCUMENT, root));
        assert_eq!(
            set.definitions().next().map(|d| d.name.as_str()),
            Some("knx_master.xml")
        );
        assert!(set.diagnostics().is_empty());
    }

    #[test]
    fn test_broken_installation_is_fatal() {
        assert!(DocumentSet::from_project_str("<KNX>").is_err());
        let err = load_project(&DocumentSet::new(), &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, KnxprojError::MissingElement { element: "0.xml" }));
    }

    #[test]
    fn test_product_without_program() {
        let set = DocumentSet::new().with_manufacturer_str("M-0083/Hardware.xml", "<KNX />");
        assert!(matches!(
            load_product(&set, &ParseOptions::default()),
            Err(KnxprojError::NoApplicationProgram)
        ));
    }
}
