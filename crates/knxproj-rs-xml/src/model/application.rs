// crates/knxproj-rs-xml/src/model/application.rs

//! Application program definitions (`Manufacturer/ApplicationPrograms/ApplicationProgram`).
//!
//! Classic programs declare everything in one `Static` section. Module-based
//! programs additionally carry `ModuleDefs`, each with its own parameters,
//! arguments and dynamic section, instantiated per device. Both shapes are
//! kept as declared here; the memory resolver normalizes them into blocks.

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::error::KnxprojError;
use crate::types::{
    DialectKind, EnumerationValue, ParameterAccess, ParameterType, ParameterTypeKind, SegmentKind,
};
use crate::xml::XmlElement;
use knxproj_rs::dpt::parse_dpt_types;
use knxproj_rs::flags::parse_enable;
use knxproj_rs::{DatapointType, FlagOverrides};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ApplicationProgramDef {
    pub id: String,
    pub name: String,
    pub number: Option<u32>,
    pub version: Option<u32>,
    pub program_type: String,
    pub mask_version: String,
    pub default_language: Option<String>,
    pub manufacturer_id: String,
    pub dialect: ProgramDialect,
    pub segments: Vec<SegmentDef>,
    pub parameter_types: BTreeMap<String, ParameterType>,
    /// Static parameters and unions in document order.
    pub parameters: Vec<ParameterEntry>,
    /// Static parameter refs in document order.
    pub parameter_refs: Vec<ParameterRefDef>,
    /// Communication objects of the static section and all module definitions.
    pub com_objects: BTreeMap<String, ComObjectDef>,
    pub com_object_refs: BTreeMap<String, ComObjectRefDef>,
    pub allocators: BTreeMap<String, AllocatorDef>,
    /// Arguments of all module definitions, including submodules.
    pub arguments: BTreeMap<String, ArgumentDef>,
    /// Channels of the static dynamic section and all module definitions.
    pub channels: BTreeMap<String, ChannelDef>,
    pub dynamic: DynamicSection,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ProgramDialect {
    Classic,
    ModuleBased { module_defs: BTreeMap<String, ModuleDef> },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ModuleDef {
    pub id: String,
    pub parameters: Vec<ParameterEntry>,
    pub parameter_refs: Vec<ParameterRefDef>,
    pub dynamic: DynamicSection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SegmentDef {
    pub id: String,
    pub kind: SegmentKind,
    pub address: Option<u32>,
    pub offset: Option<u32>,
    pub size: u32,
    pub user_memory: bool,
    pub load_state_machine: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PlacementDecl {
    Memory {
        code_segment: String,
        offset: Option<u32>,
        bit_offset: Option<u8>,
        /// Module argument holding a byte offset added to `offset`.
        base_offset: Option<String>,
        /// `Offset` or `BitOffset` was present but not a number.
        malformed: bool,
    },
    Property {
        object_index: Option<u32>,
        object_type: Option<u32>,
        property_id: u32,
        offset: u32,
        bit_offset: u8,
    },
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParameterDef {
    pub id: String,
    pub name: String,
    pub text: String,
    pub type_id: String,
    pub value: Option<String>,
    pub access: ParameterAccess,
    pub placement: PlacementDecl,
    /// Position within the enclosing union.
    pub union_offset: Option<u32>,
    pub union_bit_offset: Option<u8>,
    pub default_union: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UnionDef {
    pub size_in_bit: u32,
    pub placement: PlacementDecl,
    pub members: Vec<ParameterDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ParameterEntry {
    Parameter(ParameterDef),
    Union(UnionDef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParameterRefDef {
    pub id: String,
    pub parameter_id: String,
    pub value: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ComObjectDef {
    pub id: String,
    pub name: String,
    pub text: String,
    pub function_text: String,
    pub number: u32,
    pub object_size: String,
    pub flags: FlagOverrides,
    pub dpts: Vec<DatapointType>,
    /// Module argument holding the base number (`BaseNumber`).
    pub base_number_argument: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ComObjectRefDef {
    pub id: String,
    pub com_object_id: String,
    pub name: Option<String>,
    pub text: Option<String>,
    pub function_text: Option<String>,
    pub object_size: Option<String>,
    pub flags: FlagOverrides,
    pub dpts: Vec<DatapointType>,
    pub text_parameter_ref_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AllocatorDef {
    pub id: String,
    pub start: u64,
    pub max_inclusive: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ArgumentDef {
    pub id: String,
    pub name: String,
    pub allocates: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChannelDef {
    pub id: String,
    pub name: String,
    pub number: String,
    pub text: String,
    pub text_parameter_ref_id: Option<String>,
    pub blocks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BlockDef {
    pub id: String,
    pub name: String,
    pub text: String,
    pub channel: Option<String>,
    pub parameter_refs: Vec<String>,
}

/// A `Module` instantiation inside a dynamic section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ModuleCallDef {
    pub id: String,
    pub module_def_id: String,
    pub numeric_args: Vec<NumericArgDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NumericArgDef {
    pub argument_id: String,
    pub value: Option<String>,
    pub allocator_ref_id: Option<String>,
}

/// Flattened view of a `Dynamic` section; `choose`/`when` branches are all
/// included.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct DynamicSection {
    pub channels: Vec<ChannelDef>,
    pub blocks: Vec<BlockDef>,
    pub com_object_ref_refs: Vec<String>,
    pub modules: Vec<ModuleCallDef>,
}

impl ApplicationProgramDef {
    /// Builds a program definition from its `ApplicationProgram` element.
    ///
    /// Type constraint violations and malformed attributes are recorded in
    /// `diagnostics`; a malformed attribute is treated as absent. Only a
    /// program without `Id` is rejected.
    pub(crate) fn from_element(
        el: &XmlElement,
        manufacturer_id: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self, KnxprojError> {
        let id = el.attr_string("Id").ok_or(KnxprojError::MissingElement {
            element: "ApplicationProgram@Id",
        })?;

        let mut program = ApplicationProgramDef {
            name: el.attr_or_empty("Name").to_string(),
            number: el.parse_attr_or_report("ApplicationNumber", diagnostics),
            version: el.parse_attr_or_report("ApplicationVersion", diagnostics),
            program_type: el.attr_or_empty("ProgramType").to_string(),
            mask_version: el.attr_or_empty("MaskVersion").to_string(),
            default_language: el.attr_string("DefaultLanguage"),
            manufacturer_id: manufacturer_id.to_string(),
            dialect: ProgramDialect::Classic,
            segments: Vec::new(),
            parameter_types: BTreeMap::new(),
            parameters: Vec::new(),
            parameter_refs: Vec::new(),
            com_objects: BTreeMap::new(),
            com_object_refs: BTreeMap::new(),
            allocators: BTreeMap::new(),
            arguments: BTreeMap::new(),
            channels: BTreeMap::new(),
            dynamic: DynamicSection::default(),
            id,
        };

        if let Some(stat) = el.child("Static") {
            program.segments = parse_segments(stat, diagnostics);
            for pt in stat.find_all(&["ParameterTypes", "ParameterType"]) {
                let parameter_type = parse_parameter_type(pt, diagnostics);
                program
                    .parameter_types
                    .entry(parameter_type.identifier.clone())
                    .or_insert(parameter_type);
            }
            program.parameters = parse_parameters(stat, diagnostics);
            program.parameter_refs = parse_parameter_refs(stat);
            program.add_com_objects(stat, diagnostics);
            for allocator in stat.find_all(&["Allocators", "Allocator"]) {
                let allocator = AllocatorDef {
                    id: allocator.attr_or_empty("Id").to_string(),
                    start: allocator.parse_attr_or_report("Start", diagnostics).unwrap_or_default(),
                    max_inclusive: allocator.parse_attr_or_report("maxInclusive", diagnostics),
                };
                program.allocators.insert(allocator.id.clone(), allocator);
            }
        }

        if let Some(dynamic) = el.child("Dynamic") {
            program.dynamic = parse_dynamic(dynamic);
            program.register_channels_of_static_dynamic();
        }

        if let Some(module_defs_el) = el.child("ModuleDefs") {
            let mut module_defs = BTreeMap::new();
            program.collect_module_defs(module_defs_el, &mut module_defs, diagnostics);
            program.dialect = ProgramDialect::ModuleBased { module_defs };
        }

        Ok(program)
    }

    pub(crate) fn dialect_kind(&self) -> DialectKind {
        match self.dialect {
            ProgramDialect::Classic => DialectKind::Classic,
            ProgramDialect::ModuleBased { .. } => DialectKind::ModuleBased,
        }
    }

    pub(crate) fn module_def(&self, id: &str) -> Option<&ModuleDef> {
        match &self.dialect {
            ProgramDialect::ModuleBased { module_defs } => module_defs.get(id),
            ProgramDialect::Classic => None,
        }
    }

    pub(crate) fn module_defs(&self) -> impl Iterator<Item = &ModuleDef> {
        let defs = match &self.dialect {
            ProgramDialect::ModuleBased { module_defs } => Some(module_defs.values()),
            ProgramDialect::Classic => None,
        };
        defs.into_iter().flatten()
    }

    fn register_channels_of_static_dynamic(&mut self) {
        for channel in &self.dynamic.channels {
            self.channels
                .entry(channel.id.clone())
                .or_insert_with(|| channel.clone());
        }
    }

    fn add_com_objects(&mut self, stat: &XmlElement, diagnostics: &mut Diagnostics) {
        // Module definitions use `ComObjects`, the program itself `ComObjectTable`.
        let tables = stat
            .find_all(&["ComObjectTable", "ComObject"])
            .into_iter()
            .chain(stat.find_all(&["ComObjects", "ComObject"]));
        for co in tables {
            let def = ComObjectDef {
                id: co.attr_or_empty("Id").to_string(),
                name: co.attr_or_empty("Name").to_string(),
                text: co.attr_or_empty("Text").to_string(),
                function_text: co.attr_or_empty("FunctionText").to_string(),
                number: co.parse_attr_or_report("Number", diagnostics).unwrap_or_default(),
                object_size: co.attr_or_empty("ObjectSize").to_string(),
                flags: parse_flags(co),
                dpts: parse_dpt_types(co.attr("DatapointType")),
                base_number_argument: co.attr_string("BaseNumber"),
            };
            self.com_objects.entry(def.id.clone()).or_insert(def);
        }
        for cr in stat.find_all(&["ComObjectRefs", "ComObjectRef"]) {
            let def = ComObjectRefDef {
                id: cr.attr_or_empty("Id").to_string(),
                com_object_id: cr.attr_or_empty("RefId").to_string(),
                name: cr.attr_string("Name"),
                text: cr.attr("Text").map(str::to_string),
                function_text: cr.attr("FunctionText").map(str::to_string),
                object_size: cr.attr_string("ObjectSize"),
                flags: parse_flags(cr),
                dpts: parse_dpt_types(cr.attr("DatapointType")),
                text_parameter_ref_id: cr.attr_string("TextParameterRefId"),
            };
            self.com_object_refs.entry(def.id.clone()).or_insert(def);
        }
    }

    /// Collects `ModuleDef`s, descending into `SubModuleDefs`.
    fn collect_module_defs(
        &mut self,
        container: &XmlElement,
        module_defs: &mut BTreeMap<String, ModuleDef>,
        diagnostics: &mut Diagnostics,
    ) {
        for md in container.children_named("ModuleDef") {
            for a in md.find_all(&["Arguments", "Argument"]) {
                let argument = ArgumentDef {
                    id: a.attr_or_empty("Id").to_string(),
                    name: a.attr_or_empty("Name").to_string(),
                    allocates: a.parse_attr_or_report("Allocates", diagnostics),
                };
                self.arguments.entry(argument.id.clone()).or_insert(argument);
            }

            let (parameters, parameter_refs) = match md.child("Static") {
                Some(stat) => {
                    self.add_com_objects(stat, diagnostics);
                    (parse_parameters(stat, diagnostics), parse_parameter_refs(stat))
                }
                None => (Vec::new(), Vec::new()),
            };
            let dynamic = md.child("Dynamic").map(parse_dynamic).unwrap_or_default();
            for channel in &dynamic.channels {
                self.channels
                    .entry(channel.id.clone())
                    .or_insert_with(|| channel.clone());
            }

            let def = ModuleDef {
                id: md.attr_or_empty("Id").to_string(),
                parameters,
                parameter_refs,
                dynamic,
            };
            module_defs.entry(def.id.clone()).or_insert(def);

            if let Some(sub) = md.child("SubModuleDefs") {
                self.collect_module_defs(sub, module_defs, diagnostics);
            }
        }
    }
}

fn parse_flags(el: &XmlElement) -> FlagOverrides {
    FlagOverrides {
        read: parse_enable(el.attr("ReadFlag")),
        write: parse_enable(el.attr("WriteFlag")),
        communication: parse_enable(el.attr("CommunicationFlag")),
        transmit: parse_enable(el.attr("TransmitFlag")),
        update: parse_enable(el.attr("UpdateFlag")),
        read_on_init: parse_enable(el.attr("ReadOnInitFlag")),
    }
}

fn parse_segments(stat: &XmlElement, diagnostics: &mut Diagnostics) -> Vec<SegmentDef> {
    let Some(code) = stat.child("Code") else {
        return Vec::new();
    };
    let mut segments = Vec::new();
    for seg in &code.children {
        let kind = match seg.name.as_str() {
            "AbsoluteSegment" => SegmentKind::Absolute,
            "RelativeSegment" => SegmentKind::Relative,
            _ => continue,
        };
        segments.push(SegmentDef {
            id: seg.attr_or_empty("Id").to_string(),
            kind,
            address: seg.parse_attr_or_report("Address", diagnostics),
            offset: seg.parse_attr_or_report("Offset", diagnostics),
            size: seg.parse_attr_or_report("Size", diagnostics).unwrap_or_default(),
            user_memory: seg.attr("UserMemory") == Some("true"),
            load_state_machine: seg.parse_attr_or_report("LoadStateMachine", diagnostics),
        });
    }
    segments
}

/// A `Memory` child whose offset is malformed is kept with the offset
/// missing, so the parameter stays unplaced.
fn parse_placement(el: &XmlElement, diagnostics: &mut Diagnostics) -> PlacementDecl {
    if let Some(memory) = el.child("Memory") {
        let reported = diagnostics.len();
        let offset = memory.parse_attr_or_report("Offset", diagnostics);
        let bit_offset = memory.parse_attr_or_report("BitOffset", diagnostics);
        return PlacementDecl::Memory {
            code_segment: memory.attr_or_empty("CodeSegment").to_string(),
            offset,
            bit_offset,
            base_offset: memory.attr_string("BaseOffset"),
            malformed: diagnostics.len() > reported,
        };
    }
    if let Some(property) = el.child("Property") {
        return PlacementDecl::Property {
            object_index: property.parse_attr_or_report("ObjectIndex", diagnostics),
            object_type: property.parse_attr_or_report("ObjectType", diagnostics),
            property_id: property
                .parse_attr_or_report("PropertyId", diagnostics)
                .unwrap_or_default(),
            offset: property.parse_attr_or_report("Offset", diagnostics).unwrap_or_default(),
            bit_offset: property
                .parse_attr_or_report("BitOffset", diagnostics)
                .unwrap_or_default(),
        };
    }
    PlacementDecl::None
}

fn parse_parameter(el: &XmlElement, diagnostics: &mut Diagnostics) -> ParameterDef {
    ParameterDef {
        id: el.attr_or_empty("Id").to_string(),
        name: el.attr_or_empty("Name").to_string(),
        text: el.attr_or_empty("Text").to_string(),
        type_id: el.attr_or_empty("ParameterType").to_string(),
        value: el.attr("Value").map(str::to_string),
        access: ParameterAccess::from_attr(el.attr("Access")),
        placement: parse_placement(el, diagnostics),
        union_offset: el.parse_attr_or_report("Offset", diagnostics),
        union_bit_offset: el.parse_attr_or_report("BitOffset", diagnostics),
        default_union: el.attr("DefaultUnionParameter") == Some("true"),
    }
}

fn parse_parameters(stat: &XmlElement, diagnostics: &mut Diagnostics) -> Vec<ParameterEntry> {
    let Some(parameters) = stat.child("Parameters") else {
        return Vec::new();
    };
    let mut entries = Vec::new();
    for child in &parameters.children {
        match child.name.as_str() {
            "Parameter" => entries.push(ParameterEntry::Parameter(parse_parameter(child, diagnostics))),
            "Union" => entries.push(ParameterEntry::Union(UnionDef {
                size_in_bit: child.parse_attr_or_report("SizeInBit", diagnostics).unwrap_or_default(),
                placement: parse_placement(child, diagnostics),
                members: child
                    .children_named("Parameter")
                    .map(|member| parse_parameter(member, diagnostics))
                    .collect(),
            })),
            _ => {}
        }
    }
    entries
}

fn parse_parameter_refs(stat: &XmlElement) -> Vec<ParameterRefDef> {
    stat.find_all(&["ParameterRefs", "ParameterRef"])
        .into_iter()
        .map(|r| ParameterRefDef {
            id: r.attr_or_empty("Id").to_string(),
            parameter_id: r.attr_or_empty("RefId").to_string(),
            value: r.attr("Value").map(str::to_string),
            text: r.attr("Text").map(str::to_string),
        })
        .collect()
}

/// Parses a `ParameterType` element.
///
/// Duplicate enumeration values and inverted numeric ranges are reported as
/// `InvalidType` diagnostics; the type is still returned. A restriction with a
/// malformed attribute becomes `Unsupported`.
pub(crate) fn parse_parameter_type(el: &XmlElement, diagnostics: &mut Diagnostics) -> ParameterType {
    let identifier = el.attr_or_empty("Id").to_string();
    let name = el.attr_or_empty("Name").to_string();
    let Some(restriction) = el.children.first() else {
        return ParameterType {
            identifier,
            name,
            kind: ParameterTypeKind::Unsupported {
                element: String::new(),
            },
        };
    };

    let kind = match parse_restriction(&identifier, restriction, diagnostics) {
        Ok(kind) => kind,
        Err(e) => {
            diagnostics.push(Diagnostic::new(DiagnosticKind::InvalidType, identifier.clone(), e.to_string()));
            ParameterTypeKind::Unsupported {
                element: restriction.name.clone(),
            }
        }
    };

    ParameterType {
        identifier,
        name,
        kind,
    }
}

fn parse_restriction(
    identifier: &str,
    restriction: &XmlElement,
    diagnostics: &mut Diagnostics,
) -> Result<ParameterTypeKind, KnxprojError> {
    let kind = match restriction.name.as_str() {
        "TypeNumber" => {
            let min: Option<i64> = restriction.parse_attr("minInclusive")?;
            let max: Option<i64> = restriction.parse_attr("maxInclusive")?;
            check_range(identifier, min, max, diagnostics);
            let number_type = restriction.attr_or_empty("Type");
            ParameterTypeKind::Number {
                size_in_bit: restriction.parse_attr("SizeInBit")?.unwrap_or_default(),
                signed: number_type == "signedInt" || number_type == "twosComplement",
                min,
                max,
            }
        }
        "TypeFloat" => {
            let min: Option<f64> = restriction.parse_attr("minInclusive")?;
            let max: Option<f64> = restriction.parse_attr("maxInclusive")?;
            check_range(identifier, min, max, diagnostics);
            let encoding = restriction.attr_or_empty("Encoding").to_string();
            let size_in_bit = match encoding.as_str() {
                "IEEE-754 Single" => 32,
                "IEEE-754 Double" => 64,
                _ => 16,
            };
            ParameterTypeKind::Float {
                encoding,
                size_in_bit,
                min,
                max,
            }
        }
        "TypeRestriction" => {
            let mut values = Vec::new();
            let mut seen = BTreeSet::new();
            for en in restriction.children_named("Enumeration") {
                let value: i64 = en.parse_attr("Value")?.unwrap_or_default();
                if !seen.insert(value) {
                    diagnostics.push(Diagnostic::new(
                        DiagnosticKind::InvalidType,
                        identifier,
                        format!("duplicate enumeration value {}", value),
                    ));
                }
                values.push(EnumerationValue {
                    value,
                    text: en.attr_or_empty("Text").to_string(),
                    identifier: en.attr_string("Id"),
                });
            }
            ParameterTypeKind::Enumeration {
                size_in_bit: restriction.parse_attr("SizeInBit")?.unwrap_or_default(),
                values,
            }
        }
        "TypeText" => ParameterTypeKind::Text {
            size_in_bit: restriction.parse_attr("SizeInBit")?.unwrap_or_default(),
        },
        "TypeTime" => ParameterTypeKind::Time {
            size_in_bit: restriction.parse_attr("SizeInBit")?.unwrap_or_default(),
            unit: restriction.attr_string("Unit"),
        },
        "TypeDate" => ParameterTypeKind::Date,
        "TypeIPAddress" => ParameterTypeKind::IpAddress {
            version: restriction.attr("Version").unwrap_or("IPv4").to_string(),
        },
        "TypeColor" => ParameterTypeKind::Color {
            space: restriction.attr("Space").unwrap_or("RGB").to_string(),
        },
        "TypeRawData" => ParameterTypeKind::RawData {
            max_size: restriction.parse_attr("MaxSize")?.unwrap_or_default(),
        },
        "TypePicture" => ParameterTypeKind::Picture {
            ref_id: restriction.attr_string("RefId"),
        },
        "TypeNone" => ParameterTypeKind::None,
        other => ParameterTypeKind::Unsupported {
            element: other.to_string(),
        },
    };
    Ok(kind)
}

fn check_range<T: PartialOrd + std::fmt::Display>(
    identifier: &str,
    min: Option<T>,
    max: Option<T>,
    diagnostics: &mut Diagnostics,
) {
    if let (Some(min), Some(max)) = (min, max)
        && min > max
    {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::InvalidType,
            identifier,
            format!("minInclusive {} is greater than maxInclusive {}", min, max),
        ));
    }
}

/// Flattens a `Dynamic` section.
pub(crate) fn parse_dynamic(el: &XmlElement) -> DynamicSection {
    let mut section = DynamicSection::default();
    walk_dynamic(el, None, None, &mut section);
    section
}

fn walk_dynamic(
    el: &XmlElement,
    channel: Option<usize>,
    block: Option<usize>,
    out: &mut DynamicSection,
) {
    for child in &el.children {
        match child.name.as_str() {
            "Channel" => {
                out.channels.push(ChannelDef {
                    id: child.attr_or_empty("Id").to_string(),
                    name: child.attr_or_empty("Name").to_string(),
                    number: child.attr_or_empty("Number").to_string(),
                    text: child.attr_or_empty("Text").to_string(),
                    text_parameter_ref_id: child.attr_string("TextParameterRefId"),
                    blocks: Vec::new(),
                });
                let index = out.channels.len() - 1;
                walk_dynamic(child, Some(index), None, out);
            }
            "ParameterBlock" => {
                let id = child.attr_or_empty("Id").to_string();
                out.blocks.push(BlockDef {
                    id: id.clone(),
                    name: child.attr_or_empty("Name").to_string(),
                    text: child.attr_or_empty("Text").to_string(),
                    channel: channel.map(|c| out.channels[c].id.clone()),
                    parameter_refs: Vec::new(),
                });
                if let Some(c) = channel {
                    out.channels[c].blocks.push(id);
                }
                let index = out.blocks.len() - 1;
                walk_dynamic(child, channel, Some(index), out);
            }
            "ParameterRefRef" => {
                if let (Some(b), Some(ref_id)) = (block, child.attr_string("RefId")) {
                    out.blocks[b].parameter_refs.push(ref_id);
                }
            }
            "ComObjectRefRef" => {
                if let Some(ref_id) = child.attr_string("RefId") {
                    out.com_object_ref_refs.push(ref_id);
                }
            }
            "Module" => out.modules.push(ModuleCallDef {
                id: child.attr_or_empty("Id").to_string(),
                module_def_id: child.attr_or_empty("RefId").to_string(),
                numeric_args: child
                    .children_named("NumericArg")
                    .map(|arg| NumericArgDef {
                        argument_id: arg.attr_or_empty("RefId").to_string(),
                        value: arg.attr_string("Value"),
                        allocator_ref_id: arg.attr_string("AllocatorRefId"),
                    })
                    .collect(),
            }),
            // ChannelIndependentBlock, choose, when, ...
            _ => walk_dynamic(child, channel, block, out),
        }
    }
}
