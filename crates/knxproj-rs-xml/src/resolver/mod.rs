// crates/knxproj-rs-xml/src/resolver/mod.rs

//! Turns the parsed documents into the public `types`.
//!
//! `resolve_project` runs the passes in a fixed order. Every pass returns its
//! own diagnostics, which are merged in pass order so a parallel run reports
//! exactly what a sequential run does.

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Parsed};
use crate::error::KnxprojError;
use crate::index::ReferenceIndex;
use crate::log::{LogContext, ctx_debug, ctx_info};
use crate::options::ParseOptions;
use crate::types::{ProductDescription, Project, ProjectInfo};
use crate::xml::{XmlDocument, XmlElement};
use knxproj_rs::GroupAddressStyle;
use std::collections::BTreeMap;
use std::thread;

// --- Sub-modules ---

mod application;
mod assembler;
mod group_address;
mod location;
mod memory;
mod modules;
mod topology;
mod utils;

use assembler::{DeviceEnvironment, ProjectParts};

/// Root element of every ETS document.
const ROOT_ELEMENT: &str = "KNX";

/// Resolves a project from its installation document and the definition
/// documents (master data, manufacturer data, translations).
///
/// # Errors
/// Returns a `KnxprojError` if the installation document has no `KNX` root or
/// no `Project/Installations/Installation`.
pub(crate) fn resolve_project<'a>(
    installation_doc: &XmlDocument,
    project_meta: Option<&XmlDocument>,
    definitions: impl IntoIterator<Item = &'a XmlDocument>,
    options: &ParseOptions,
) -> Result<Parsed<Project>, KnxprojError> {
    let document = installation_doc.name.as_str();
    let ctx = LogContext::new("project", document);
    let mut diagnostics = Diagnostics::new();

    // --- Pass 1: Validate the installation document ---
    let installation = installation_element(installation_doc).map_err(|e| e.in_document(document))?;

    // --- Pass 2: Reference index ---
    let index = ReferenceIndex::load(definitions);
    diagnostics.extend(index.diagnostics);
    let index = index.value;
    let lang = index.languages.resolver(options.language.as_deref());

    // --- Pass 3: Project information ---
    let info = project_info(installation_doc, project_meta, options);
    diagnostics.extend(info.diagnostics);
    let info = info.value;
    let style = info.group_address_style;

    // --- Pass 4: Topology, group addresses and com object catalogs ---
    let (topology, group_addresses, catalogs) = if options.parallel {
        thread::scope(|s| {
            let topology = s.spawn(|| topology::parse_topology(installation, document));
            let group_addresses =
                s.spawn(|| group_address::parse_group_addresses(installation, style, document));
            let catalogs = assembler::build_catalogs(&index, lang);
            (join(topology), join(group_addresses), catalogs)
        })
    } else {
        (
            topology::parse_topology(installation, document),
            group_address::parse_group_addresses(installation, style, document),
            assembler::build_catalogs(&index, lang),
        )
    };
    diagnostics.extend(topology.diagnostics);
    diagnostics.extend(group_addresses.diagnostics);
    diagnostics.extend(catalogs.diagnostics);
    let (topology, group_addresses, catalogs) = (topology.value, group_addresses.value, catalogs.value);

    // --- Pass 5: Locations and functions ---
    let device_ids: BTreeMap<String, _> = topology
        .devices
        .iter()
        .map(|d| (d.identifier.clone(), d.address))
        .collect();
    let locations = location::parse_locations(
        installation,
        &index,
        lang,
        &device_ids,
        &group_addresses.by_id,
        document,
    );
    diagnostics.extend(locations.diagnostics);

    // --- Pass 6: Devices and communication objects ---
    let env = DeviceEnvironment {
        index: &index,
        catalogs: &catalogs,
        group_addresses: &group_addresses.by_id,
        lang,
    };
    let mut devices = Vec::with_capacity(topology.devices.len());
    for record in &topology.devices {
        let device = assembler::resolve_device(record, env);
        diagnostics.extend(device.diagnostics);
        devices.push(device.value);
    }

    // --- Pass 7: Parameter memory ---
    let mut parameterization = BTreeMap::new();
    if options.parameterize {
        for device in &devices {
            let Some(program) = device
                .device
                .application_program_ref
                .as_ref()
                .and_then(|id| index.application_program(id))
            else {
                continue;
            };
            let memory = assembler::parameterize_device(device, program, lang, options.parallel);
            diagnostics.extend(memory.diagnostics);
            parameterization.insert(device.device.identifier.clone(), memory.value);
        }
        ctx_debug!(ctx, "Parameterized {} devices", parameterization.len());
    }

    // --- Pass 8: Assemble ---
    let project = assembler::assemble_project(
        ProjectParts {
            info,
            topology,
            group_addresses,
            locations: locations.value,
            devices,
            parameterization,
        },
        &index,
        lang,
        document,
    );
    diagnostics.extend(project.diagnostics);

    ctx_info!(ctx, "Resolved project with {} diagnostics", diagnostics.len());
    Ok(Parsed::new(project.value, diagnostics))
}

/// Resolves the hardware and application programs of a product.
///
/// # Errors
/// Returns [`KnxprojError::NoApplicationProgram`] if none of the documents
/// declares an application program.
pub(crate) fn resolve_product<'a>(
    definitions: impl IntoIterator<Item = &'a XmlDocument>,
    options: &ParseOptions,
) -> Result<Parsed<ProductDescription>, KnxprojError> {
    let mut diagnostics = Diagnostics::new();
    let index = ReferenceIndex::load(definitions);
    diagnostics.extend(index.diagnostics);
    let index = index.value;
    let lang = index.languages.resolver(options.language.as_deref());

    let product = assembler::assemble_product(&index, lang, options.parallel)?;
    diagnostics.extend(product.diagnostics);
    Ok(Parsed::new(product.value, diagnostics))
}

fn installation_element(doc: &XmlDocument) -> Result<&XmlElement, KnxprojError> {
    if doc.root.name != ROOT_ELEMENT {
        return Err(KnxprojError::UnexpectedRoot {
            expected: ROOT_ELEMENT,
            found: doc.root.name.clone(),
        });
    }
    doc.root
        .path(&["Project", "Installations", "Installation"])
        .ok_or(KnxprojError::MissingElement {
            element: "Project/Installations/Installation",
        })
}

/// Reads `Project/ProjectInformation`, preferring `project.xml` over the
/// installation document.
fn project_info(
    installation_doc: &XmlDocument,
    project_meta: Option<&XmlDocument>,
    options: &ParseOptions,
) -> Parsed<ProjectInfo> {
    let mut diagnostics = Diagnostics::new();
    let source = project_meta
        .filter(|m| m.root.child("Project").is_some())
        .unwrap_or(installation_doc);
    let project = source.root.child("Project");
    let information = project.and_then(|p| p.child("ProjectInformation"));
    let attr = |name: &str| {
        information
            .and_then(|i| i.attr_string(name))
            .unwrap_or_default()
    };

    let group_address_style = match information.and_then(|i| i.attr("GroupAddressStyle")) {
        Some(value) => value.parse().unwrap_or_else(|e| {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::InvalidValue,
                    "GroupAddressStyle",
                    format!("{}, using three-level addresses", e),
                )
                .in_document(&source.name),
            );
            GroupAddressStyle::ThreeLevel
        }),
        None => GroupAddressStyle::default(),
    };

    let info = ProjectInfo {
        project_id: project.map(|p| p.attr_or_empty("Id").to_string()).unwrap_or_default(),
        name: attr("Name"),
        last_modified: information.and_then(|i| i.attr_string("LastModified")),
        group_address_style,
        guid: attr("Guid"),
        created_by: source.root.attr_or_empty("CreatedBy").to_string(),
        schema_version: source.schema_version().or(installation_doc.schema_version()),
        tool_version: source.root.attr_or_empty("ToolVersion").to_string(),
        language: options.language.clone(),
    };
    Parsed::new(info, diagnostics)
}

fn join<T>(handle: thread::ScopedJoinHandle<'_, T>) -> T {
    handle.join().unwrap_or_else(|e| std::panic::resume_unwind(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_foreign_root() {
        let doc = XmlDocument::parse("0.xml", "<Iso15745ProfileContainer />").unwrap();
        let err = resolve_project(&doc, None, Vec::<&XmlDocument>::new(), &ParseOptions::default()).unwrap_err();
        assert!(err.to_string().contains("KNX"));
    }

    #[test]
    fn test_project_info_prefers_metadata() {
        let installation = XmlDocument::parse(
            "0.xml",
            r#"<KNX xmlns="http://knx.org/xml/project/21" CreatedBy="ETS6" ToolVersion="6.1">
                 <Project Id="P-0001"><Installations><Installation /></Installations></Project>
               </KNX>"#,
        )
        .unwrap();
        let meta = XmlDocument::parse(
            "project.xml",
            r#"<KNX xmlns="http://knx.org/xml/project/21" CreatedBy="ETS6" ToolVersion="6.1">
                 <Project Id="P-0001">
                   <ProjectInformation Name="Home" GroupAddressStyle="TwoLevel" Guid="g-1" />
                 </Project>
               </KNX>"#,
        )
        .unwrap();

        let info = project_info(&installation, Some(&meta), &ParseOptions::new().language("de-DE"));
        assert!(info.diagnostics.is_empty());
        let info = info.value;
        assert_eq!(info.project_id, "P-0001");
        assert_eq!(info.name, "Home");
        assert_eq!(info.group_address_style, GroupAddressStyle::TwoLevel);
        assert_eq!(info.schema_version, Some(21));
        assert_eq!(info.tool_version, "6.1");
        assert_eq!(info.language.as_deref(), Some("de-DE"));

        let bad = XmlDocument::parse(
            "project.xml",
            r#"<KNX><Project Id="P-1"><ProjectInformation GroupAddressStyle="Five" /></Project></KNX>"#,
        )
        .unwrap();
        let info = project_info(&installation, Some(&bad), &ParseOptions::default());
        assert_eq!(info.value.group_address_style, GroupAddressStyle::ThreeLevel);
        assert_eq!(info.diagnostics.of_kind(DiagnosticKind::InvalidValue).count(), 1);
    }
}
