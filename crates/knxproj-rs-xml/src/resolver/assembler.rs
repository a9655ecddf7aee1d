// crates/knxproj-rs-xml/src/resolver/assembler.rs

//! Joins the partial results into the public `Project` and
//! `ProductDescription` types.

use super::application::{ApplicationContext, ComObjectCatalog, build_catalog, resolve_com_objects};
use super::group_address::GroupAddressResult;
use super::location::LocationResult;
use super::memory::{MemoryMap, resolve_memory};
use super::modules::{ModuleInstance, product_instances, project_instances};
use super::topology::{DeviceRecord, TopologyResult};
use crate::diagnostics::{DiagnosticKind, Diagnostics, Parsed};
use crate::error::KnxprojError;
use crate::index::ReferenceIndex;
use crate::language::LanguageResolver;
use crate::log::{LogContext, ctx_debug, ctx_info};
use crate::model::application::ApplicationProgramDef;
use crate::types::{
    CommunicationObjectInstance, Completeness, DatapointTypeInfo, Device, DeviceParameterization, HardwareInfo,
    ParameterBlockInfo,
    ProductDescription, ProductInfo, ProgramChannel, ProgramParameterization, Project, ProjectInfo,
};
use knxproj_rs::{DatapointType, IndividualAddress};
use std::collections::BTreeMap;

/// Read-only inputs shared by all devices of a project.
#[derive(Clone, Copy)]
pub(crate) struct DeviceEnvironment<'a> {
    pub index: &'a ReferenceIndex,
    /// Application program id → merged com object templates.
    pub catalogs: &'a BTreeMap<String, ComObjectCatalog>,
    pub group_addresses: &'a BTreeMap<String, String>,
    pub lang: LanguageResolver<'a>,
}

/// A device with its com objects and what the memory resolver needs.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedDevice {
    pub device: Device,
    pub objects: Vec<CommunicationObjectInstance>,
    pub module_instances: Vec<ModuleInstance>,
    pub parameter_values: BTreeMap<String, String>,
}

/// Resolves the product, hardware and application program references of a
/// device together with its communication objects.
///
/// Unresolvable references never drop the device; they are listed in its
/// completeness marker.
pub(crate) fn resolve_device(record: &DeviceRecord<'_>, env: DeviceEnvironment<'_>) -> Parsed<ResolvedDevice> {
    let subject = record.address.to_string();
    let mut diagnostics = Diagnostics::new();
    let index = env.index;

    let product = index.product(&record.product_ref);
    if product.is_none() {
        diagnostics.gap(subject.clone(), format!("product {} not found", record.product_ref));
    }
    let hardware = product.and_then(|p| {
        let hardware = index.hardware_def(&p.hardware_id);
        if hardware.is_none() {
            diagnostics.gap(subject.clone(), format!("hardware {} not found", p.hardware_id));
        }
        hardware
    });

    let parameter_values: BTreeMap<String, String> = record
        .element
        .find_all(&["ParameterInstanceRefs", "ParameterInstanceRef"])
        .into_iter()
        .filter_map(|p| Some((p.attr_string("RefId")?, p.attr_or_empty("Value").to_string())))
        .collect();

    let application_program_ref = match index.hardware2program(&record.hardware2program_ref) {
        Some(h2p) => h2p.application_program_refs.first().cloned(),
        None => {
            if !record.hardware2program_ref.is_empty() {
                diagnostics.gap(
                    subject.clone(),
                    format!("hardware2program {} not found", record.hardware2program_ref),
                );
            }
            // The first two segments of any parameter instance name the program.
            parameter_values.keys().next().and_then(|ref_id| {
                let mut segments = ref_id.splitn(3, '_');
                Some(format!("{}_{}", segments.next()?, segments.next()?))
            })
        }
    };
    if application_program_ref.is_none() {
        diagnostics.gap(subject.clone(), "no application program reference");
    }
    let program = application_program_ref.as_ref().and_then(|id| {
        let program = index.application_program(id);
        if program.is_none() {
            diagnostics.gap(subject.clone(), format!("application program {} not found", id));
        }
        program
    });

    let module_instances = program
        .map(|p| project_instances(record.element, &p.id))
        .unwrap_or_default();
    let com_objects = resolve_com_objects(
        record,
        ApplicationContext {
            program,
            catalog: program.and_then(|p| env.catalogs.get(&p.id)),
            module_instances: &module_instances,
            parameter_values: &parameter_values,
            group_addresses: env.group_addresses,
            lang: env.lang,
        },
    );
    diagnostics.extend(com_objects.diagnostics);
    let mut objects = com_objects.value.objects;
    for object in &mut objects {
        if object.dpts.is_empty()
            && let Some(dpt) = DatapointType::from_object_size(&object.object_size)
        {
            object.dpts.push(dpt);
        }
    }

    let product_name = product
        .map(|p| env.lang.text(&p.id, "Text", Some(&p.text)))
        .unwrap_or_default();
    let manufacturer_id = record
        .product_ref
        .split_once('_')
        .map(|(m, _)| m)
        .unwrap_or(&record.product_ref)
        .to_string();
    let gaps = diagnostics
        .of_kind(DiagnosticKind::ResolutionGap)
        .map(|d| d.message.clone())
        .collect();

    let device = Device {
        identifier: record.identifier.clone(),
        individual_address: record.address,
        name: if record.name.is_empty() {
            product_name.clone()
        } else {
            record.name.clone()
        },
        description: record.description.clone(),
        project_uid: record.project_uid,
        last_modified: record.last_modified.clone(),
        manufacturer_name: index.manufacturer_name(&manufacturer_id).to_string(),
        manufacturer_id,
        product_ref: record.product_ref.clone(),
        product_name,
        order_number: product.map(|p| p.order_number.clone()).unwrap_or_default(),
        hardware_name: hardware.map(|h| h.name.clone()).unwrap_or_default(),
        hardware2program_ref: record.hardware2program_ref.clone(),
        application_program_ref,
        channels: com_objects.value.channels,
        communication_object_ids: objects.iter().map(|o| o.identifier.clone()).collect(),
        additional_addresses: record.additional_addresses.clone(),
        completeness: Completeness::from_gaps(gaps),
    };

    Parsed::new(
        ResolvedDevice {
            device,
            objects,
            module_instances,
            parameter_values,
        },
        diagnostics,
    )
}

/// Builds the com object catalogs of every program used by the devices.
pub(crate) fn build_catalogs(
    index: &ReferenceIndex,
    lang: LanguageResolver<'_>,
) -> Parsed<BTreeMap<String, ComObjectCatalog>> {
    let mut diagnostics = Diagnostics::new();
    let catalogs = index
        .application_programs
        .values()
        .map(|program| {
            let catalog = build_catalog(program, lang);
            diagnostics.extend(catalog.diagnostics);
            (program.id.clone(), catalog.value)
        })
        .collect();
    Parsed::new(catalogs, diagnostics)
}

/// The memory map of one device.
pub(crate) fn parameterize_device(
    device: &ResolvedDevice,
    program: &ApplicationProgramDef,
    lang: LanguageResolver<'_>,
    parallel: bool,
) -> Parsed<DeviceParameterization> {
    let memory = resolve_memory(
        program,
        &device.module_instances,
        &device.parameter_values,
        lang,
        parallel,
    );
    let MemoryMap { segments, parameters } = memory.value;
    Parsed::new(
        DeviceParameterization {
            device_address: device.device.individual_address,
            application_program_ref: program.id.clone(),
            segments,
            parameters,
        },
        memory.diagnostics,
    )
}

/// Partial results of a project, in the order they were produced.
pub(crate) struct ProjectParts<'a> {
    pub info: ProjectInfo,
    pub topology: TopologyResult<'a>,
    pub group_addresses: GroupAddressResult,
    pub locations: LocationResult,
    pub devices: Vec<ResolvedDevice>,
    /// Device instance id → memory map.
    pub parameterization: BTreeMap<String, DeviceParameterization>,
}

/// Joins devices, communication objects and group addresses.
///
/// A group address without a declared datapoint type takes the first one
/// found on the objects linked to it, in device order.
pub(crate) fn assemble_project(
    parts: ProjectParts<'_>,
    index: &ReferenceIndex,
    lang: LanguageResolver<'_>,
    document: &str,
) -> Parsed<Project> {
    let ctx = LogContext::new("assembler", document);
    let mut diagnostics = Diagnostics::new();
    let mut group_addresses = parts.group_addresses.addresses;
    let mut devices: BTreeMap<IndividualAddress, Device> = BTreeMap::new();
    let mut communication_objects: BTreeMap<String, CommunicationObjectInstance> = BTreeMap::new();

    for resolved in parts.devices {
        for object in resolved.objects {
            if communication_objects.contains_key(&object.identifier) {
                diagnostics.gap(
                    object.identifier.clone(),
                    "com object instance declared twice on the device",
                );
                continue;
            }
            for address in &object.group_address_links {
                let Some(group_address) = group_addresses.get_mut(address) else {
                    continue;
                };
                if !group_address.communication_object_ids.contains(&object.identifier) {
                    group_address
                        .communication_object_ids
                        .push(object.identifier.clone());
                }
                if group_address.dpt.is_none() {
                    group_address.dpt = object.dpts.first().copied();
                }
            }
            communication_objects.insert(object.identifier.clone(), object);
        }
        devices.insert(resolved.device.individual_address, resolved.device);
    }

    let datapoint_types = group_addresses
        .values()
        .filter_map(|ga| ga.dpt)
        .chain(communication_objects.values().flat_map(|o| o.dpts.iter().copied()))
        .map(|dpt| (dpt.to_string(), datapoint_type_info(dpt, index, lang)))
        .collect();

    ctx_info!(
        ctx,
        "Assembled {} devices, {} com objects, {} group addresses",
        devices.len(),
        communication_objects.len(),
        group_addresses.len()
    );
    Parsed::new(
        Project {
            info: parts.info,
            topology: parts.topology.areas,
            devices,
            communication_objects,
            group_addresses,
            group_ranges: parts.group_addresses.ranges,
            locations: parts.locations.spaces,
            functions: parts.locations.functions,
            datapoint_types,
            parameterization: parts.parameterization,
        },
        diagnostics,
    )
}

/// Master data of a datapoint type, with the standard catalog filling in
/// what the master data does not declare.
fn datapoint_type_info(dpt: DatapointType, index: &ReferenceIndex, lang: LanguageResolver<'_>) -> DatapointTypeInfo {
    let standard = dpt.info();
    match index.datapoint_type(&dpt) {
        Some(def) => DatapointTypeInfo {
            dpt,
            name: def.name.clone(),
            text: lang.text(&def.id, "Text", Some(&def.text)),
            unit: standard.and_then(|s| s.unit).map(str::to_string),
            size_in_bit: def.size_in_bit.or(standard.map(|s| u32::from(s.size_in_bit))),
        },
        None => DatapointTypeInfo {
            dpt,
            name: standard.map(|s| s.name.to_string()).unwrap_or_default(),
            text: String::new(),
            unit: standard.and_then(|s| s.unit).map(str::to_string),
            size_in_bit: standard.map(|s| u32::from(s.size_in_bit)),
        },
    }
}

/// Builds the description of a product document set.
///
/// # Errors
/// Returns [`KnxprojError::NoApplicationProgram`] if the documents declare no
/// application program.
pub(crate) fn assemble_product(
    index: &ReferenceIndex,
    lang: LanguageResolver<'_>,
    parallel: bool,
) -> Result<Parsed<ProductDescription>, KnxprojError> {
    if index.application_programs.is_empty() {
        return Err(KnxprojError::NoApplicationProgram);
    }
    let mut diagnostics = Diagnostics::new();

    let hardware = index
        .hardware
        .values()
        .map(|h| HardwareInfo {
            identifier: h.id.clone(),
            name: h.name.clone(),
            serial_number: h.serial_number.clone(),
            version_number: h.version_number,
            products: h
                .products
                .iter()
                .map(|p| ProductInfo {
                    identifier: p.id.clone(),
                    text: lang.text(&p.id, "Text", Some(&p.text)),
                    order_number: p.order_number.clone(),
                })
                .collect(),
            application_program_refs: h
                .hardware2programs
                .iter()
                .flat_map(|h2p| h2p.application_program_refs.iter().cloned())
                .collect(),
            medium_types: h.hardware2programs.iter().fold(Vec::new(), |mut media, h2p| {
                for medium in &h2p.medium_types {
                    if !media.contains(medium) {
                        media.push(medium.clone());
                    }
                }
                media
            }),
        })
        .collect();

    let mut application_programs = BTreeMap::new();
    for program in index.application_programs.values() {
        let ctx = LogContext::new("product", &program.id);
        let instances = product_instances(program);
        let memory = resolve_memory(program, &instances, &BTreeMap::new(), lang, parallel);
        diagnostics.extend(memory.diagnostics);
        let catalog = build_catalog(program, lang);
        diagnostics.extend(catalog.diagnostics);

        let parameter_blocks = std::iter::once(&program.dynamic)
            .chain(program.module_defs().map(|m| &m.dynamic))
            .flat_map(|d| &d.blocks)
            .map(|b| ParameterBlockInfo {
                identifier: b.id.clone(),
                name: b.name.clone(),
                text: lang.text(&b.id, "Text", Some(&b.text)),
                channel: b.channel.clone(),
                parameter_refs: b.parameter_refs.clone(),
            })
            .collect();
        let channels = program
            .channels
            .values()
            .map(|c| ProgramChannel {
                identifier: c.id.clone(),
                name: c.name.clone(),
                number: c.number.clone(),
                text: lang.text(&c.id, "Text", Some(&c.text)),
                parameter_blocks: c.blocks.clone(),
            })
            .collect();

        let MemoryMap { segments, parameters } = memory.value;
        ctx_debug!(ctx, "Resolved {} parameters", parameters.len());
        application_programs.insert(
            program.id.clone(),
            ProgramParameterization {
                identifier: program.id.clone(),
                name: program.name.clone(),
                application_number: program.number,
                application_version: program.version,
                program_type: program.program_type.clone(),
                mask_version: program.mask_version.clone(),
                default_language: program.default_language.clone(),
                dialect: program.dialect_kind(),
                segments,
                parameter_types: program.parameter_types.clone(),
                parameters,
                parameter_blocks,
                channels,
                com_objects: catalog.value.values().map(|t| t.info()).collect(),
                dynamic_com_object_refs: program.dynamic.com_object_ref_refs.clone(),
            },
        );
    }

    let manufacturer_id = index
        .hardware
        .values()
        .map(|h| &h.manufacturer_id)
        .chain(index.application_programs.values().map(|p| &p.manufacturer_id))
        .find(|id| !id.is_empty())
        .cloned()
        .unwrap_or_default();
    Ok(Parsed::new(
        ProductDescription {
            manufacturer_name: index.manufacturer_name(&manufacturer_id).to_string(),
            manufacturer_id,
            hardware,
            application_programs,
        },
        diagnostics,
    ))
}
