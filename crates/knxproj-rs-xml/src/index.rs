// crates/knxproj-rs-xml/src/index.rs

//! Identifier-keyed lookup tables over every loaded definition document.
//!
//! Each document is first collected into its own staging tables. A document
//! declaring an identifier twice (or re-declaring one already registered by
//! an earlier document) is rejected as a whole and none of its definitions
//! are registered.

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Parsed};
use crate::error::KnxprojError;
use crate::language::LanguageCatalog;
use crate::log::{LogContext, ctx_debug, ctx_info, ctx_warn};
use crate::model::application::ApplicationProgramDef;
use crate::model::hardware::{
    DatapointTypeDef, Hardware2ProgramDef, HardwareDef, ManufacturerDef, MediumTypeDef, ProductDef,
    TextDef, parse_datapoint_type,
};
use crate::xml::XmlDocument;
use knxproj_rs::DatapointType;
use std::collections::BTreeMap;

/// The kinds of definitions held by the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum DefinitionKind {
    Manufacturer,
    Hardware,
    Product,
    Hardware2Program,
    ApplicationProgram,
    DatapointType,
    MediumType,
    SpaceUsage,
    FunctionType,
}

impl DefinitionKind {
    fn as_str(&self) -> &'static str {
        match self {
            DefinitionKind::Manufacturer => "Manufacturer",
            DefinitionKind::Hardware => "Hardware",
            DefinitionKind::Product => "Product",
            DefinitionKind::Hardware2Program => "Hardware2Program",
            DefinitionKind::ApplicationProgram => "ApplicationProgram",
            DefinitionKind::DatapointType => "DatapointType",
            DefinitionKind::MediumType => "MediumType",
            DefinitionKind::SpaceUsage => "SpaceUsage",
            DefinitionKind::FunctionType => "FunctionType",
        }
    }
}

/// A borrowed definition returned by [`ReferenceIndex::resolve`].
#[derive(Debug, Clone, Copy)]
pub(crate) enum Definition<'a> {
    Manufacturer(&'a ManufacturerDef),
    Hardware(&'a HardwareDef),
    Product(&'a ProductDef),
    Hardware2Program(&'a Hardware2ProgramDef),
    ApplicationProgram(&'a ApplicationProgramDef),
    DatapointType(&'a DatapointTypeDef),
    MediumType(&'a MediumTypeDef),
    SpaceUsage(&'a TextDef),
    FunctionType(&'a TextDef),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ReferenceIndex {
    pub manufacturers: BTreeMap<String, ManufacturerDef>,
    pub hardware: BTreeMap<String, HardwareDef>,
    pub products: BTreeMap<String, ProductDef>,
    pub hardware2programs: BTreeMap<String, Hardware2ProgramDef>,
    pub application_programs: BTreeMap<String, ApplicationProgramDef>,
    pub datapoint_types: BTreeMap<String, DatapointTypeDef>,
    pub medium_types: BTreeMap<String, MediumTypeDef>,
    pub space_usages: BTreeMap<String, TextDef>,
    pub function_types: BTreeMap<String, TextDef>,
    pub languages: LanguageCatalog,
    /// Documents whose definitions were not registered.
    pub rejected_documents: Vec<String>,
}

/// Definitions of a single document before they are committed.
#[derive(Default)]
struct Staging {
    index: ReferenceIndex,
    duplicates: Vec<(DefinitionKind, String)>,
}

impl Staging {
    fn insert<T>(
        &mut self,
        kind: DefinitionKind,
        id: String,
        value: T,
        registered: &ReferenceIndex,
        map: impl FnOnce(&mut ReferenceIndex) -> &mut BTreeMap<String, T>,
    ) {
        let already_registered = registered.contains(kind, &id);
        let target = map(&mut self.index);
        if already_registered || target.contains_key(&id) {
            self.duplicates.push((kind, id));
            return;
        }
        target.insert(id, value);
    }
}

impl ReferenceIndex {
    /// Builds the index from definition documents (manufacturer data, master
    /// data and language documents).
    ///
    /// Documents are processed in the given order; the first document
    /// declaring an identifier owns it.
    pub(crate) fn load<'a>(documents: impl IntoIterator<Item = &'a XmlDocument>) -> Parsed<Self> {
        let mut index = ReferenceIndex::default();
        let mut diagnostics = Diagnostics::new();

        for document in documents {
            let ctx = LogContext::new("index", &document.name);
            let mut document_diagnostics = Diagnostics::new();
            let staging = match stage_document(document, &index, &mut document_diagnostics) {
                Ok(staging) => staging,
                Err(e) => {
                    diagnostics.push(
                        Diagnostic::new(DiagnosticKind::Structural, document.name.clone(), e.to_string())
                            .in_document(&document.name),
                    );
                    index.rejected_documents.push(document.name.clone());
                    continue;
                }
            };

            if !staging.duplicates.is_empty() {
                for (kind, id) in &staging.duplicates {
                    diagnostics.push(
                        Diagnostic::new(
                            DiagnosticKind::DuplicateIdentifier,
                            id.clone(),
                            format!("{} declared more than once", kind.as_str()),
                        )
                        .in_document(&document.name),
                    );
                }
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::Structural,
                        document.name.clone(),
                        "document rejected because of duplicate identifiers",
                    )
                    .in_document(&document.name),
                );
                ctx_warn!(ctx, "Rejected with {} duplicate identifiers", staging.duplicates.len());
                index.rejected_documents.push(document.name.clone());
                continue;
            }

            for d in &document_diagnostics {
                diagnostics.push(d.clone().in_document(&document.name));
            }
            let translations = index.languages.add_document(document);
            ctx_debug!(
                ctx,
                "Registered {} application programs, {} hardware, {} translations",
                staging.index.application_programs.len(),
                staging.index.hardware.len(),
                translations
            );
            index.commit(staging.index);
        }

        let ctx = LogContext::new("index", "*");
        ctx_info!(
            ctx,
            "Indexed {} application programs, {} products, {} datapoint types ({} documents rejected)",
            index.application_programs.len(),
            index.products.len(),
            index.datapoint_types.len(),
            index.rejected_documents.len()
        );
        Parsed::new(index, diagnostics)
    }

    fn commit(&mut self, staged: ReferenceIndex) {
        self.manufacturers.extend(staged.manufacturers);
        self.hardware.extend(staged.hardware);
        self.products.extend(staged.products);
        self.hardware2programs.extend(staged.hardware2programs);
        self.application_programs.extend(staged.application_programs);
        self.datapoint_types.extend(staged.datapoint_types);
        self.medium_types.extend(staged.medium_types);
        self.space_usages.extend(staged.space_usages);
        self.function_types.extend(staged.function_types);
    }

    fn contains(&self, kind: DefinitionKind, id: &str) -> bool {
        self.resolve(kind, id).is_some()
    }

    /// Looks up a definition by kind and identifier.
    pub(crate) fn resolve(&self, kind: DefinitionKind, id: &str) -> Option<Definition<'_>> {
        match kind {
            DefinitionKind::Manufacturer => self.manufacturers.get(id).map(Definition::Manufacturer),
            DefinitionKind::Hardware => self.hardware.get(id).map(Definition::Hardware),
            DefinitionKind::Product => self.products.get(id).map(Definition::Product),
            DefinitionKind::Hardware2Program => self
                .hardware2programs
                .get(id)
                .map(Definition::Hardware2Program),
            DefinitionKind::ApplicationProgram => self
                .application_programs
                .get(id)
                .map(Definition::ApplicationProgram),
            DefinitionKind::DatapointType => self.datapoint_types.get(id).map(Definition::DatapointType),
            DefinitionKind::MediumType => self.medium_types.get(id).map(Definition::MediumType),
            DefinitionKind::SpaceUsage => self.space_usages.get(id).map(Definition::SpaceUsage),
            DefinitionKind::FunctionType => self.function_types.get(id).map(Definition::FunctionType),
        }
    }

    pub(crate) fn product(&self, id: &str) -> Option<&ProductDef> {
        match self.resolve(DefinitionKind::Product, id)? {
            Definition::Product(def) => Some(def),
            _ => None,
        }
    }

    pub(crate) fn hardware_def(&self, id: &str) -> Option<&HardwareDef> {
        match self.resolve(DefinitionKind::Hardware, id)? {
            Definition::Hardware(def) => Some(def),
            _ => None,
        }
    }

    pub(crate) fn hardware2program(&self, id: &str) -> Option<&Hardware2ProgramDef> {
        match self.resolve(DefinitionKind::Hardware2Program, id)? {
            Definition::Hardware2Program(def) => Some(def),
            _ => None,
        }
    }

    pub(crate) fn application_program(&self, id: &str) -> Option<&ApplicationProgramDef> {
        match self.resolve(DefinitionKind::ApplicationProgram, id)? {
            Definition::ApplicationProgram(def) => Some(def),
            _ => None,
        }
    }

    /// Name of a manufacturer from the master data, empty if unknown.
    pub(crate) fn manufacturer_name(&self, id: &str) -> &str {
        match self.resolve(DefinitionKind::Manufacturer, id) {
            Some(Definition::Manufacturer(m)) => m.name.as_str(),
            _ => "",
        }
    }

    /// Master data entry of a datapoint type.
    pub(crate) fn datapoint_type(&self, dpt: &DatapointType) -> Option<&DatapointTypeDef> {
        self.datapoint_types.values().find(|d| d.dpt == *dpt)
    }
}

fn stage_document(
    document: &XmlDocument,
    registered: &ReferenceIndex,
    diagnostics: &mut Diagnostics,
) -> Result<Staging, KnxprojError> {
    let mut staging = Staging::default();
    let root = &document.root;

    for master in root.children_named("MasterData") {
        for el in master.find_all(&["DatapointTypes", "DatapointType"]) {
            for def in parse_datapoint_type(el)? {
                staging.insert(DefinitionKind::DatapointType, def.id.clone(), def, registered, |i| {
                    &mut i.datapoint_types
                });
            }
        }
        for el in master.find_all(&["MediumTypes", "MediumType"]) {
            let def = MediumTypeDef {
                id: el.attr_or_empty("Id").to_string(),
                name: el.attr_or_empty("Name").to_string(),
                text: el.attr_or_empty("Text").to_string(),
            };
            staging.insert(DefinitionKind::MediumType, def.id.clone(), def, registered, |i| {
                &mut i.medium_types
            });
        }
        for el in master.find_all(&["SpaceUsages", "SpaceUsage"]) {
            let def = text_def(el);
            staging.insert(DefinitionKind::SpaceUsage, def.id.clone(), def, registered, |i| {
                &mut i.space_usages
            });
        }
        for el in master.find_all(&["FunctionTypes", "FunctionType"]) {
            let def = text_def(el);
            staging.insert(DefinitionKind::FunctionType, def.id.clone(), def, registered, |i| {
                &mut i.function_types
            });
        }
        for el in master.find_all(&["Manufacturers", "Manufacturer"]) {
            let def = ManufacturerDef {
                id: el.attr_or_empty("Id").to_string(),
                name: el.attr_or_empty("Name").to_string(),
            };
            staging.insert(DefinitionKind::Manufacturer, def.id.clone(), def, registered, |i| {
                &mut i.manufacturers
            });
        }
    }

    for manufacturer in root.find_all(&["ManufacturerData", "Manufacturer"]) {
        let manufacturer_id = manufacturer.attr_or_empty("RefId");
        for el in manufacturer.find_all(&["Hardware", "Hardware"]) {
            let hardware = HardwareDef::from_element(el, manufacturer_id)?;
            for product in &hardware.products {
                staging.insert(
                    DefinitionKind::Product,
                    product.id.clone(),
                    product.clone(),
                    registered,
                    |i| &mut i.products,
                );
            }
            for h2p in &hardware.hardware2programs {
                staging.insert(
                    DefinitionKind::Hardware2Program,
                    h2p.id.clone(),
                    h2p.clone(),
                    registered,
                    |i| &mut i.hardware2programs,
                );
            }
            staging.insert(DefinitionKind::Hardware, hardware.id.clone(), hardware, registered, |i| {
                &mut i.hardware
            });
        }
        for el in manufacturer.find_all(&["ApplicationPrograms", "ApplicationProgram"]) {
            let program = ApplicationProgramDef::from_element(el, manufacturer_id, diagnostics)?;
            staging.insert(
                DefinitionKind::ApplicationProgram,
                program.id.clone(),
                program,
                registered,
                |i| &mut i.application_programs,
            );
        }
    }

    Ok(staging)
}

fn text_def(el: &crate::xml::XmlElement) -> TextDef {
    TextDef {
        id: el.attr_or_empty("Id").to_string(),
        text: el.attr_or_empty("Text").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HARDWARE: &str = r#"<KNX xmlns="http://knx.org/xml/project/21"><ManufacturerData>
      <Manufacturer RefId="M-0083">
        <Hardware>
          <Hardware Id="M-0083_H-1" Name="Actuator" SerialNumber="1" VersionNumber="1">
            <Products><Product Id="M-0083_H-1_P-1" Text="Actuator 4x" OrderNumber="A4" /></Products>
            <Hardware2Programs>
              <Hardware2Program Id="M-0083_H-1_HP-1"><ApplicationProgramRef RefId="M-0083_A-1" /></Hardware2Program>
            </Hardware2Programs>
          </Hardware>
        </Hardware>
      </Manufacturer>
    </ManufacturerData></KNX>"#;

    const MASTER: &str = r#"<KNX><MasterData>
      <DatapointTypes>
        <DatapointType Id="DPT-1" Number="1" Name="1.xxx" Text="1-bit" SizeInBit="1">
          <DatapointSubtypes><DatapointSubtype Id="DPST-1-1" Number="1" Name="DPT_Switch" Text="switch" /></DatapointSubtypes>
        </DatapointType>
      </DatapointTypes>
      <MediumTypes><MediumType Id="MT-0" Name="TP" Text="Twisted Pair" /></MediumTypes>
      <SpaceUsages><SpaceUsage Id="SU-1" Text="Kitchen" /></SpaceUsages>
      <Manufacturers><Manufacturer Id="M-0083" Name="MDT technologies" /></Manufacturers>
    </MasterData></KNX>"#;

    fn doc(name: &str, xml: &str) -> XmlDocument {
        XmlDocument::parse(name, xml).unwrap()
    }

    #[test]
    fn test_load_and_resolve() {
        let docs = [doc("knx_master.xml", MASTER), doc("M-0083/Hardware.xml", HARDWARE)];
        let parsed = ReferenceIndex::load(&docs);
        assert!(parsed.diagnostics.is_empty());
        let index = parsed.value;
        assert!(matches!(
            index.resolve(DefinitionKind::Product, "M-0083_H-1_P-1"),
            Some(Definition::Product(p)) if p.order_number == "A4"
        ));
        assert!(index.resolve(DefinitionKind::Hardware2Program, "M-0083_H-1_HP-1").is_some());
        assert!(index.resolve(DefinitionKind::ApplicationProgram, "M-0083_A-1").is_none());
        assert_eq!(index.manufacturer_name("M-0083"), "MDT technologies");
        assert_eq!(
            index
                .datapoint_type(&DatapointType::new(1, Some(1)))
                .map(|d| d.name.as_str()),
            Some("DPT_Switch")
        );
        assert!(index.resolve(DefinitionKind::SpaceUsage, "SU-1").is_some());
    }

    #[test]
    fn test_duplicate_rejects_whole_document() {
        let duplicated = HARDWARE.replace("M-0083_H-1_P-1", "M-0083_H-1_HP-1_P");
        let again = doc("M-0083/Hardware2.xml", HARDWARE);
        let docs = [doc("M-0083/Hardware.xml", &duplicated), again];
        let parsed = ReferenceIndex::load(&docs);
        // The second document re-declares the hardware of the first.
        assert_eq!(parsed.value.rejected_documents, vec!["M-0083/Hardware2.xml"]);
        assert!(parsed.value.products.contains_key("M-0083_H-1_HP-1_P"));
        assert!(!parsed.value.products.contains_key("M-0083_H-1_P-1"));
        assert_eq!(
            parsed
                .diagnostics
                .of_kind(DiagnosticKind::DuplicateIdentifier)
                .count(),
            2
        );
        assert_eq!(parsed.diagnostics.of_kind(DiagnosticKind::Structural).count(), 1);
    }

    #[test]
    fn test_malformed_program_is_structural() {
        let xml = r#"<KNX><ManufacturerData><Manufacturer RefId="M-0083"><ApplicationPrograms>
          <ApplicationProgram Id="M-0083_A-1" ApplicationVersion="x" />
        </ApplicationPrograms></Manufacturer></ManufacturerData></KNX>"#;
        let docs = [doc("M-0083/M-0083_A-1.xml", xml)];
        let parsed = ReferenceIndex::load(&docs);
        assert!(parsed.value.application_programs.is_empty());
        let structural: Vec<_> = parsed.diagnostics.of_kind(DiagnosticKind::Structural).collect();
        assert_eq!(structural.len(), 1);
        assert_eq!(structural[0].document.as_deref(), Some("M-0083/M-0083_A-1.xml"));
    }
}
