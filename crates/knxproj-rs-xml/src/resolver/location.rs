// crates/knxproj-rs-xml/src/resolver/location.rs

//! The building structure (`Locations/Space`, ETS4 `Buildings/BuildingPart`)
//! and the functions declared in it.

use super::utils::strip_project_prefix;
use crate::diagnostics::{Diagnostics, Parsed};
use crate::index::ReferenceIndex;
use crate::language::LanguageResolver;
use crate::log::{LogContext, ctx_debug};
use crate::types::{Function, GroupAddressRef, Space, SpaceType};
use crate::xml::XmlElement;
use knxproj_rs::IndividualAddress;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub(crate) struct LocationResult {
    pub spaces: Vec<Space>,
    pub functions: BTreeMap<String, Function>,
}

struct LocationParser<'a> {
    element_name: &'static str,
    index: &'a ReferenceIndex,
    lang: LanguageResolver<'a>,
    /// Device instance id → individual address.
    devices: &'a BTreeMap<String, IndividualAddress>,
    /// Group address id without project prefix → formatted address.
    group_addresses: &'a BTreeMap<String, String>,
    functions: BTreeMap<String, Function>,
    diagnostics: Diagnostics,
}

pub(crate) fn parse_locations(
    installation: &XmlElement,
    index: &ReferenceIndex,
    lang: LanguageResolver<'_>,
    devices: &BTreeMap<String, IndividualAddress>,
    group_addresses: &BTreeMap<String, String>,
    document: &str,
) -> Parsed<LocationResult> {
    let ctx = LogContext::new("locations", document);
    let (container, element_name) = match installation.child("Locations") {
        Some(locations) => (Some(locations), "Space"),
        None => (installation.child("Buildings"), "BuildingPart"),
    };

    let mut parser = LocationParser {
        element_name,
        index,
        lang,
        devices,
        group_addresses,
        functions: BTreeMap::new(),
        diagnostics: Diagnostics::new(),
    };
    let spaces: Vec<Space> = container
        .map(|c| {
            c.children_named(element_name)
                .map(|el| parser.parse_space(el))
                .collect()
        })
        .unwrap_or_default();

    ctx_debug!(
        ctx,
        "Parsed {} top-level spaces and {} functions",
        spaces.len(),
        parser.functions.len()
    );
    Parsed::new(
        LocationResult {
            spaces,
            functions: parser.functions,
        },
        parser.diagnostics,
    )
}

impl LocationParser<'_> {
    fn parse_space(&mut self, el: &XmlElement) -> Space {
        let usage_id = el.attr_string("Usage");
        let usage_text = usage_id
            .as_deref()
            .map(|id| self.master_text(id, self.index.space_usages.get(id).map(|u| u.text.as_str())))
            .unwrap_or_default();
        let space_type = match el.attr("Type") {
            Some(t) => SpaceType::from_attr(t),
            // `BuildingPart`s carry no type attribute.
            None if self.element_name == "BuildingPart" => SpaceType::BuildingPart,
            None => SpaceType::Unknown,
        };

        let mut space = Space {
            identifier: el.attr_or_empty("Id").to_string(),
            name: el.attr_or_empty("Name").to_string(),
            space_type,
            usage_id,
            usage_text,
            number: el.attr_or_empty("Number").to_string(),
            description: el.attr_or_empty("Description").to_string(),
            project_uid: el.attr("Puid").and_then(|p| p.parse().ok()),
            devices: Vec::new(),
            spaces: Vec::new(),
            functions: Vec::new(),
        };

        for child in &el.children {
            match child.name.as_str() {
                name if name == self.element_name => space.spaces.push(self.parse_space(child)),
                "DeviceInstanceRef" => {
                    let ref_id = child.attr_or_empty("RefId");
                    match self.devices.get(ref_id) {
                        Some(address) => space.devices.push(*address),
                        None => self.diagnostics.gap(
                            space.identifier.clone(),
                            format!("device instance {} has no individual address", ref_id),
                        ),
                    }
                }
                "Function" => {
                    let function = self.parse_function(child, &space.identifier);
                    space.functions.push(function.identifier.clone());
                    self.functions.insert(function.identifier.clone(), function);
                }
                _ => {}
            }
        }
        space
    }

    fn parse_function(&mut self, el: &XmlElement, space_id: &str) -> Function {
        let identifier = strip_project_prefix(el.attr_or_empty("Id")).to_string();
        let function_type = el.attr_or_empty("Type").to_string();
        let usage_text = if function_type.is_empty() {
            String::new()
        } else {
            self.master_text(
                &function_type,
                self.index.function_types.get(&function_type).map(|f| f.text.as_str()),
            )
        };

        let group_addresses = el
            .children_named("GroupAddressRef")
            .map(|r| {
                let ref_id = strip_project_prefix(r.attr_or_empty("RefId")).to_string();
                let address = self.group_addresses.get(&ref_id).cloned();
                if address.is_none() {
                    self.diagnostics.gap(
                        identifier.clone(),
                        format!("group address {} not found", ref_id),
                    );
                }
                GroupAddressRef {
                    identifier: r.attr_or_empty("Id").to_string(),
                    ref_id,
                    name: r.attr_or_empty("Name").to_string(),
                    role: r.attr_or_empty("Role").to_string(),
                    project_uid: r.attr("Puid").and_then(|p| p.parse().ok()),
                    address,
                }
            })
            .collect();

        Function {
            name: el.attr_or_empty("Name").to_string(),
            function_type,
            usage_text,
            project_uid: el.attr("Puid").and_then(|p| p.parse().ok()),
            space_id: space_id.to_string(),
            group_addresses,
            identifier,
        }
    }

    fn master_text(&self, id: &str, base: Option<&str>) -> String {
        self.lang.text(id, "Text", base)
    }
}
