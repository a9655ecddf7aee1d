// crates/knxproj-rs-xml/src/lib.rs

#![doc = "Extracts KNX ETS project (`.knxproj`) and product (`.knxprod`) XML documents"]
#![doc = "into typed models."]
#![doc = ""]
#![doc = "The caller hands over the already extracted documents of an archive as a"]
#![doc = "`DocumentSet`. Parsing never stops at a missing reference: every result comes"]
#![doc = "with the `Diagnostics` that were found on the way."]
#![doc = ""]
#![doc = "It supports:"]
#![doc = "- `load_project`: topology, devices, communication objects, group addresses,"]
#![doc = "  locations and (optionally) the parameter memory map of every device."]
#![doc = "- `load_product`: hardware, products and the resolved application programs"]
#![doc = "  of a product file."]

// --- Crate Modules ---

mod diagnostics;
mod error;
mod index;
mod language;
mod log;
mod model;
mod options;
mod parser;
mod resolver;
mod types;
mod xml;

// --- Public API Re-exports ---

pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Parsed};
pub use error::KnxprojError;
pub use language::{LanguageCatalog, LanguageResolver};
pub use options::ParseOptions;
pub use parser::{
    DocumentSet, INSTALLATION_DOCUMENT, MASTER_DOCUMENT, PROJECT_DOCUMENT, load_product, load_project,
};
pub use types::*;
pub use xml::{XmlDocument, XmlElement};

pub use knxproj_rs::{ComObjectFlags, DatapointType, GroupAddressStyle, IndividualAddress, MediumType};
