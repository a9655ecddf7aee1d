// crates/knxproj-rs-xml/src/resolver/group_address.rs

//! Group ranges and group addresses of an installation.

use super::utils::strip_project_prefix;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Parsed};
use crate::error::KnxprojError;
use crate::log::{LogContext, ctx_debug};
use crate::types::{GroupAddress, GroupRange};
use crate::xml::XmlElement;
use knxproj_rs::dpt::parse_dpt_types;
use knxproj_rs::GroupAddressStyle;
use std::collections::BTreeMap;

/// Three-level ranges spanning at least this many addresses are main groups.
const MAIN_GROUP_SPAN: u16 = 2046;

#[derive(Debug, Clone, Default)]
pub(crate) struct GroupAddressResult {
    /// Keyed by the formatted address.
    pub addresses: BTreeMap<String, GroupAddress>,
    /// Top-level ranges keyed by their formatted start.
    pub ranges: BTreeMap<String, GroupRange>,
    /// Identifier without project prefix → formatted address.
    pub by_id: BTreeMap<String, String>,
}

pub(crate) fn parse_group_addresses(
    installation: &XmlElement,
    style: GroupAddressStyle,
    document: &str,
) -> Parsed<GroupAddressResult> {
    let ctx = LogContext::new("group_addresses", document);
    let mut diagnostics = Diagnostics::new();
    let mut result = GroupAddressResult::default();

    let Some(container) = installation.child("GroupAddresses") else {
        ctx_debug!(ctx, "Installation has no group addresses");
        return Parsed::new(result, diagnostics);
    };

    for el in container.descendants_named("GroupAddress") {
        let address = match parse_group_address(el, style) {
            Ok(a) => a,
            Err(e) => {
                diagnostics.push(
                    Diagnostic::new(DiagnosticKind::Structural, el.attr_or_empty("Id"), e.to_string())
                        .in_document(document),
                );
                continue;
            }
        };
        if result.addresses.contains_key(&address.address) {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::DuplicateIdentifier,
                    address.address.clone(),
                    format!("group address also declared by {}", address.identifier),
                )
                .in_document(document),
            );
            continue;
        }
        result
            .by_id
            .insert(address.identifier.clone(), address.address.clone());
        result.addresses.insert(address.address.clone(), address);
    }

    for range_el in container.find_all(&["GroupRanges", "GroupRange"]) {
        match parse_group_range(range_el, style) {
            Ok(range) => {
                result.ranges.insert(range.address.clone(), range);
            }
            Err(e) => diagnostics.push(
                Diagnostic::new(DiagnosticKind::Structural, range_el.attr_or_empty("Id"), e.to_string())
                    .in_document(document),
            ),
        }
    }

    ctx_debug!(
        ctx,
        "Parsed {} group addresses in {} top-level ranges",
        result.addresses.len(),
        result.ranges.len()
    );
    Parsed::new(result, diagnostics)
}

fn raw_address(el: &XmlElement) -> Result<knxproj_rs::GroupAddress, KnxprojError> {
    let raw: u32 = el
        .parse_attr("Address")?
        .ok_or(KnxprojError::MissingElement {
            element: "GroupAddress@Address",
        })?;
    knxproj_rs::GroupAddress::try_from(raw).map_err(|e| KnxprojError::InvalidAttributeFormat {
        element: el.name.clone(),
        attribute: "Address",
        value: e.to_string(),
    })
}

fn parse_group_address(el: &XmlElement, style: GroupAddressStyle) -> Result<GroupAddress, KnxprojError> {
    let raw = raw_address(el)?;
    Ok(GroupAddress {
        identifier: strip_project_prefix(el.attr_or_empty("Id")).to_string(),
        raw_address: raw.0,
        address: raw.format(style),
        name: el.attr_or_empty("Name").to_string(),
        description: el.attr_or_empty("Description").to_string(),
        comment: el.attr_or_empty("Comment").to_string(),
        dpt: parse_dpt_types(el.attr("DatapointType")).into_iter().next(),
        central: el.attr("Central") == Some("true"),
        data_secure: el.attr_string("Key").is_some(),
        project_uid: el.parse_attr("Puid")?,
        communication_object_ids: Vec::new(),
    })
}

fn parse_group_range(el: &XmlElement, style: GroupAddressStyle) -> Result<GroupRange, KnxprojError> {
    let range_start: u16 = el.parse_attr("RangeStart")?.unwrap_or_default();
    let range_end: u16 = el.parse_attr("RangeEnd")?.unwrap_or_default();

    let group_addresses = el
        .children_named("GroupAddress")
        .map(|ga| raw_address(ga).map(|raw| raw.format(style)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut group_ranges = BTreeMap::new();
    for child in el.children_named("GroupRange") {
        let range = parse_group_range(child, style)?;
        group_ranges.insert(range.address.clone(), range);
    }

    Ok(GroupRange {
        name: el.attr_or_empty("Name").to_string(),
        address: range_address(range_start, range_end, style),
        range_start,
        range_end,
        comment: el.attr_or_empty("Comment").to_string(),
        group_addresses,
        group_ranges,
    })
}

/// Textual form of a range: `start...end` for free addresses, the main
/// group for two-level, and main or `main/middle` for three-level.
fn range_address(start: u16, end: u16, style: GroupAddressStyle) -> String {
    let formatted = knxproj_rs::GroupAddress(start).format(style);
    let mut parts = formatted.split('/');
    match style {
        GroupAddressStyle::Free => format!("{}...{}", start, end),
        GroupAddressStyle::TwoLevel => parts.next().unwrap_or_default().to_string(),
        GroupAddressStyle::ThreeLevel if end.saturating_sub(start) >= MAIN_GROUP_SPAN => {
            parts.next().unwrap_or_default().to_string()
        }
        GroupAddressStyle::ThreeLevel => parts.take(2).collect::<Vec<_>>().join("/"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlDocument;
    use knxproj_rs::DatapointType;

    const INSTALLATION: &str = r#"<Installation>
      <GroupAddresses>
        <GroupRanges>
          <GroupRange Id="P-1_GR-1" RangeStart="2048" RangeEnd="4095" Name="Lights">
            <GroupRange Id="P-1_GR-2" RangeStart="2560" RangeEnd="2815" Name="Kitchen">
              <GroupAddress Id="P-1_GA-1" Address="2563" Name="Temp" DatapointType="DPST-9-1" Puid="7" />
              <GroupAddress Id="P-1_GA-2" Address="2564" Name="Secure" Key="abc=" Central="true" />
              <GroupAddress Id="P-1_GA-3" Address="2563" Name="Twice" />
            </GroupRange>
          </GroupRange>
        </GroupRanges>
      </GroupAddresses>
    </Installation>"#;

    #[test]
    fn test_group_addresses_and_ranges() {
        let doc = XmlDocument::parse("0.xml", INSTALLATION).unwrap();
        let parsed = parse_group_addresses(&doc.root, GroupAddressStyle::ThreeLevel, "0.xml");
        let result = &parsed.value;

        let ga = &result.addresses["1/2/3"];
        assert_eq!(ga.identifier, "GA-1");
        assert_eq!(ga.dpt, Some(DatapointType::new(9, Some(1))));
        assert_eq!(ga.project_uid, Some(7));
        assert!(result.addresses["1/2/4"].data_secure);
        assert!(result.addresses["1/2/4"].central);
        assert_eq!(result.by_id["GA-2"], "1/2/4");
        assert_eq!(
            parsed.diagnostics.of_kind(DiagnosticKind::DuplicateIdentifier).count(),
            1
        );

        let main = &result.ranges["1"];
        let middle = &main.group_ranges["1/2"];
        assert_eq!(middle.name, "Kitchen");
        // Ranges list every address they contain, duplicates included.
        assert_eq!(middle.group_addresses, vec!["1/2/3", "1/2/4", "1/2/3"]);
    }

    #[test]
    fn test_range_address_styles() {
        assert_eq!(range_address(0, 2047, GroupAddressStyle::Free), "0...2047");
        assert_eq!(range_address(2048, 4095, GroupAddressStyle::TwoLevel), "1");
        assert_eq!(range_address(2560, 2815, GroupAddressStyle::ThreeLevel), "1/2");
    }
}
