// crates/knxproj-rs-xml/src/diagnostics.rs

//! Non-fatal findings collected while resolving a document set.

use serde::Serialize;
use std::fmt;

/// Category of a non-fatal finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DiagnosticKind {
    /// A document (or part of it) could not be used at all.
    Structural,
    /// An identifier was declared twice within one definition kind.
    DuplicateIdentifier,
    /// A cross-reference could not be resolved.
    ResolutionGap,
    /// Overlapping segments or parameters placed outside their segment.
    LayoutInconsistency,
    /// A parameter type violates its own constraints.
    InvalidType,
    /// A value could not be decoded against its type.
    InvalidValue,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::Structural => "structural",
            DiagnosticKind::DuplicateIdentifier => "duplicate-identifier",
            DiagnosticKind::ResolutionGap => "resolution-gap",
            DiagnosticKind::LayoutInconsistency => "layout-inconsistency",
            DiagnosticKind::InvalidType => "invalid-type",
            DiagnosticKind::InvalidValue => "invalid-value",
        }
    }
}

/// A single finding, attributed to a document and a subject identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub document: Option<String>,
    /// Identifier of the affected entity (device address, parameter id, ...).
    pub subject: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            document: None,
            subject: subject.into(),
            message: message.into(),
        }
    }

    pub fn in_document(mut self, document: &str) -> Self {
        self.document = Some(document.to_string());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.document {
            Some(doc) => write!(
                f,
                "[{}] {} ({}): {}",
                self.kind.as_str(),
                self.subject,
                doc,
                self.message
            ),
            None => write!(f, "[{}] {}: {}", self.kind.as_str(), self.subject, self.message),
        }
    }
}

/// An ordered list of diagnostics owned by one resolution task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a diagnostic and logs it. Gaps are expected in real projects
    /// and log at `debug`; everything else logs at `warn`.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.kind {
            DiagnosticKind::ResolutionGap => log::debug!("{}", diagnostic),
            _ => log::warn!("{}", diagnostic),
        }
        self.0.push(diagnostic);
    }

    pub fn gap(&mut self, subject: impl Into<String>, message: impl Into<String>) {
        self.push(Diagnostic::new(DiagnosticKind::ResolutionGap, subject, message));
    }

    /// Appends all diagnostics of another task, preserving their order.
    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(move |d| d.kind == kind)
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A value together with the diagnostics produced while building it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parsed<T> {
    pub value: T,
    pub diagnostics: Diagnostics,
}

impl<T> Parsed<T> {
    pub fn new(value: T, diagnostics: Diagnostics) -> Self {
        Self { value, diagnostics }
    }

    /// Diagnostics describing unresolved cross-references.
    pub fn gaps(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.of_kind(DiagnosticKind::ResolutionGap)
    }
}
