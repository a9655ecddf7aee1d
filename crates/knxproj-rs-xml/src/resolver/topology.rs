// crates/knxproj-rs-xml/src/resolver/topology.rs

//! Areas, lines (with ETS6 segments) and device instances of an installation.

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Parsed};
use crate::error::KnxprojError;
use crate::log::{LogContext, ctx_debug};
use crate::types::{Area, Line};
use crate::xml::XmlElement;
use knxproj_rs::{IndividualAddress, MediumType};
use std::collections::BTreeSet;

/// A device instance with an individual address, before its references are
/// resolved.
#[derive(Debug, Clone)]
pub(crate) struct DeviceRecord<'a> {
    pub element: &'a XmlElement,
    pub address: IndividualAddress,
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub project_uid: Option<u32>,
    pub last_modified: Option<String>,
    pub product_ref: String,
    pub hardware2program_ref: String,
    pub additional_addresses: Vec<IndividualAddress>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct TopologyResult<'a> {
    pub areas: Vec<Area>,
    /// All addressed devices in document order.
    pub devices: Vec<DeviceRecord<'a>>,
}

/// Walks `Topology/Area/Line[/Segment]/DeviceInstance`.
pub(crate) fn parse_topology<'a>(installation: &'a XmlElement, document: &str) -> Parsed<TopologyResult<'a>> {
    let ctx = LogContext::new("topology", document);
    let mut diagnostics = Diagnostics::new();
    let mut result = TopologyResult::default();
    let mut seen = BTreeSet::new();

    for area_el in installation.find_all(&["Topology", "Area"]) {
        let area_address = match address_part(area_el) {
            Ok(a) => a,
            Err(e) => {
                structural(&mut diagnostics, document, area_el.attr_or_empty("Id"), e);
                continue;
            }
        };
        let mut area = Area {
            address: area_address,
            name: area_el.attr_or_empty("Name").to_string(),
            description: area_el.attr_string("Description"),
            lines: Vec::new(),
        };

        for line_el in area_el.children_named("Line") {
            let line_address = match address_part(line_el) {
                Ok(a) => a,
                Err(e) => {
                    structural(&mut diagnostics, document, line_el.attr_or_empty("Id"), e);
                    continue;
                }
            };
            let medium_type_id = line_el
                .attr_string("MediumTypeRefId")
                .or_else(|| line_el.child("Segment").and_then(|s| s.attr_string("MediumTypeRefId")));
            let mut line = Line {
                address: line_address,
                name: line_el.attr_or_empty("Name").to_string(),
                description: line_el.attr_string("Description"),
                medium_type: medium_type_id.as_deref().and_then(MediumType::from_ref_id),
                medium_type_id,
                devices: Vec::new(),
            };

            for device_el in line_el.descendants_named("DeviceInstance") {
                let identifier = device_el.attr_or_empty("Id");
                let Some(raw) = device_el.attr("Address") else {
                    ctx_debug!(ctx, "Skipping device {} without individual address", identifier);
                    continue;
                };
                let address = match device_address(area_address, line_address, raw) {
                    Ok(a) => a,
                    Err(e) => {
                        structural(&mut diagnostics, document, identifier, e);
                        continue;
                    }
                };
                if !seen.insert(address) {
                    diagnostics.push(
                        Diagnostic::new(
                            DiagnosticKind::DuplicateIdentifier,
                            address.to_string(),
                            format!("individual address also used by device {}", identifier),
                        )
                        .in_document(document),
                    );
                    continue;
                }

                let additional_addresses = device_el
                    .find_all(&["AdditionalAddresses", "Address"])
                    .into_iter()
                    .filter_map(|a| a.attr("Address"))
                    .filter_map(|raw| match device_address(area_address, line_address, raw) {
                        Ok(a) => Some(a),
                        Err(e) => {
                            structural(&mut diagnostics, document, identifier, e);
                            None
                        }
                    })
                    .collect();

                line.devices.push(address);
                result.devices.push(DeviceRecord {
                    element: device_el,
                    address,
                    identifier: identifier.to_string(),
                    name: device_el.attr_or_empty("Name").to_string(),
                    description: device_el.attr_or_empty("Description").to_string(),
                    project_uid: device_el.attr("Puid").and_then(|p| p.parse().ok()),
                    last_modified: device_el.attr_string("LastModified"),
                    product_ref: device_el.attr_or_empty("ProductRefId").to_string(),
                    hardware2program_ref: device_el.attr_or_empty("Hardware2ProgramRefId").to_string(),
                    additional_addresses,
                });
            }
            area.lines.push(line);
        }
        result.areas.push(area);
    }

    ctx_debug!(
        ctx,
        "Found {} areas and {} addressed devices",
        result.areas.len(),
        result.devices.len()
    );
    Parsed::new(result, diagnostics)
}

fn address_part(el: &XmlElement) -> Result<u8, KnxprojError> {
    el.parse_attr::<u8>("Address")?
        .ok_or(KnxprojError::MissingElement { element: "Address" })
}

fn device_address(area: u8, line: u8, raw: &str) -> Result<IndividualAddress, KnxprojError> {
    let device: u16 = raw.trim().parse()?;
    IndividualAddress::new(u16::from(area), u16::from(line), device).map_err(|e| {
        KnxprojError::InvalidAttributeFormat {
            element: "DeviceInstance".to_string(),
            attribute: "Address",
            value: format!("{} ({})", raw, e),
        }
    })
}

fn structural(diagnostics: &mut Diagnostics, document: &str, subject: &str, error: KnxprojError) {
    diagnostics.push(
        Diagnostic::new(DiagnosticKind::Structural, subject, error.to_string()).in_document(document),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlDocument;

    const INSTALLATION: &str = r#"<Installation>
      <Topology>
        <Area Id="P-1_A-1" Address="1" Name="Building">
          <Line Id="P-1_L-1" Address="1" Name="Floor" MediumTypeRefId="MT-0">
            <DeviceInstance Id="P-1_DI-1" Address="1" Name="Actuator" ProductRefId="M-0083_H-1_P-1" Hardware2ProgramRefId="M-0083_H-1_HP-1" Puid="10">
              <AdditionalAddresses><Address Address="20" /></AdditionalAddresses>
            </DeviceInstance>
            <DeviceInstance Id="P-1_DI-2" Name="Power supply" />
            <DeviceInstance Id="P-1_DI-3" Address="1" Name="Copy" />
          </Line>
        </Area>
        <Area Id="P-1_A-2" Address="2" Name="Garage">
          <Line Id="P-1_L-2" Address="0" Name="Main">
            <Segment Id="P-1_S-1" MediumTypeRefId="MT-5">
              <DeviceInstance Id="P-1_DI-4" Address="300" />
              <DeviceInstance Id="P-1_DI-5" Address="7" />
            </Segment>
          </Line>
        </Area>
      </Topology>
    </Installation>"#;

    #[test]
    fn test_topology() {
        let doc = XmlDocument::parse("0.xml", INSTALLATION).unwrap();
        let parsed = parse_topology(&doc.root, "0.xml");
        let topology = &parsed.value;

        assert_eq!(topology.areas.len(), 2);
        let line = &topology.areas[0].lines[0];
        assert_eq!(line.medium_type, Some(MediumType::TwistedPair));
        assert_eq!(line.devices, vec![IndividualAddress::new(1, 1, 1).unwrap()]);

        // Medium type of the segment.
        let segmented = &topology.areas[1].lines[0];
        assert_eq!(segmented.medium_type_id.as_deref(), Some("MT-5"));
        assert_eq!(segmented.devices.len(), 1);

        let device = &topology.devices[0];
        assert_eq!(device.project_uid, Some(10));
        assert_eq!(device.additional_addresses[0].to_string(), "1.1.20");
        assert_eq!(topology.devices[1].address.to_string(), "2.0.7");

        assert_eq!(parsed.diagnostics.of_kind(DiagnosticKind::DuplicateIdentifier).count(), 1);
        assert_eq!(parsed.diagnostics.of_kind(DiagnosticKind::Structural).count(), 1);
    }
}
