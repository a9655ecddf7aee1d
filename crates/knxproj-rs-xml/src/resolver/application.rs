// crates/knxproj-rs-xml/src/resolver/application.rs

//! Communication objects and channels of a device instance.
//!
//! Every `ComObjectInstanceRef` of a device is merged with its `ComObjectRef`
//! and `ComObject` templates, attribute by attribute: a value set on the
//! instance wins over the reference, which wins over the object.

use super::modules::ModuleInstance;
use super::topology::DeviceRecord;
use super::utils::{
    replace_named_placeholders, replace_text_parameter, strip_module_instance, strip_project_prefix,
    text_parameter_instance_ref,
};
use crate::diagnostics::{Diagnostics, Parsed};
use crate::language::LanguageResolver;
use crate::log::{LogContext, ctx_debug, ctx_trace};
use crate::model::application::ApplicationProgramDef;
use crate::types::{Channel, ComObjectInfo, CommunicationObjectInstance, ModuleInstanceInfo};
use crate::xml::XmlElement;
use knxproj_rs::dpt::parse_dpt_types;
use knxproj_rs::flags::parse_enable;
use knxproj_rs::{DatapointType, FlagOverrides};
use std::collections::BTreeMap;

/// A `ComObjectRef` merged over its `ComObject`, with localized texts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ComObjectTemplate {
    pub ref_id: String,
    pub com_object_id: String,
    pub number: u32,
    pub name: String,
    pub text: String,
    pub function_text: String,
    pub object_size: String,
    pub flags: FlagOverrides,
    pub dpts: Vec<DatapointType>,
    pub text_parameter_ref_id: Option<String>,
    pub base_number_argument: Option<String>,
}

impl ComObjectTemplate {
    pub(crate) fn info(&self) -> ComObjectInfo {
        ComObjectInfo {
            identifier: self.ref_id.clone(),
            com_object_id: self.com_object_id.clone(),
            number: self.number,
            name: self.name.clone(),
            text: self.text.clone(),
            function_text: self.function_text.clone(),
            object_size: self.object_size.clone(),
            flags: self.flags.resolve(),
            dpts: self.dpts.clone(),
        }
    }
}

/// `ComObjectRef@Id` → merged template.
pub(crate) type ComObjectCatalog = BTreeMap<String, ComObjectTemplate>;

/// Merges every `ComObjectRef` of a program with its `ComObject`.
pub(crate) fn build_catalog(program: &ApplicationProgramDef, lang: LanguageResolver<'_>) -> Parsed<ComObjectCatalog> {
    let mut diagnostics = Diagnostics::new();
    let mut catalog = ComObjectCatalog::new();

    for com_ref in program.com_object_refs.values() {
        let Some(object) = program.com_objects.get(&com_ref.com_object_id) else {
            diagnostics.gap(
                com_ref.id.clone(),
                format!("com object {} not found", com_ref.com_object_id),
            );
            continue;
        };
        let text = match &com_ref.text {
            Some(text) => lang.text(&com_ref.id, "Text", Some(text)),
            None => lang.text(&object.id, "Text", Some(&object.text)),
        };
        let function_text = match &com_ref.function_text {
            Some(text) => lang.text(&com_ref.id, "FunctionText", Some(text)),
            None => lang.text(&object.id, "FunctionText", Some(&object.function_text)),
        };
        let dpts = if com_ref.dpts.is_empty() {
            object.dpts.clone()
        } else {
            com_ref.dpts.clone()
        };
        catalog.insert(
            com_ref.id.clone(),
            ComObjectTemplate {
                ref_id: com_ref.id.clone(),
                com_object_id: object.id.clone(),
                number: object.number,
                name: com_ref.name.clone().unwrap_or_else(|| object.name.clone()),
                text,
                function_text,
                object_size: com_ref
                    .object_size
                    .clone()
                    .unwrap_or_else(|| object.object_size.clone()),
                flags: com_ref.flags.or(object.flags),
                dpts,
                text_parameter_ref_id: com_ref.text_parameter_ref_id.clone(),
                base_number_argument: object.base_number_argument.clone(),
            },
        );
    }

    ctx_debug!(
        LogContext::new("application", &program.id),
        "Merged {} com object templates",
        catalog.len()
    );
    Parsed::new(catalog, diagnostics)
}

/// What a device contributes beyond its own attributes.
#[derive(Debug, Clone, Default)]
pub(crate) struct DeviceComObjects {
    pub objects: Vec<CommunicationObjectInstance>,
    pub channels: Vec<Channel>,
}

/// Shared inputs of the per-device resolution.
#[derive(Clone, Copy)]
pub(crate) struct ApplicationContext<'a> {
    pub program: Option<&'a ApplicationProgramDef>,
    pub catalog: Option<&'a ComObjectCatalog>,
    pub module_instances: &'a [ModuleInstance],
    /// `ParameterInstanceRef@RefId` → value of this device.
    pub parameter_values: &'a BTreeMap<String, String>,
    /// Group address id without project prefix → formatted address.
    pub group_addresses: &'a BTreeMap<String, String>,
    pub lang: LanguageResolver<'a>,
}

/// Resolves the communication objects and channels of one device.
///
/// Without a program the instances are still emitted from their own
/// attributes and marked unresolved.
pub(crate) fn resolve_com_objects(device: &DeviceRecord<'_>, context: ApplicationContext<'_>) -> Parsed<DeviceComObjects> {
    let subject = device.address.to_string();
    let ctx = LogContext::new("application", &device.identifier);
    let mut diagnostics = Diagnostics::new();
    let mut objects = Vec::new();

    for el in device
        .element
        .find_all(&["ComObjectInstanceRefs", "ComObjectInstanceRef"])
    {
        let ref_id = el.attr_or_empty("RefId");
        let (send, listen) = links(el);
        if send.is_empty() && listen.is_empty() {
            ctx_trace!(ctx, "Skipping unlinked com object instance {}", ref_id);
            continue;
        }

        let mut object = merge_instance(device, el, context, &mut diagnostics);
        for (ids, target) in [
            (send, &mut object.send_group_addresses),
            (listen, &mut object.listen_group_addresses),
        ] {
            for id in ids {
                match context.group_addresses.get(id) {
                    Some(address) => target.push(address.clone()),
                    None => diagnostics.gap(
                        subject.clone(),
                        format!("group address {} linked by {} not found", id, ref_id),
                    ),
                }
            }
        }
        object.group_address_links = object
            .send_group_addresses
            .iter()
            .chain(&object.listen_group_addresses)
            .cloned()
            .collect();
        objects.push(object);
    }

    let channels = match context.program {
        Some(program) => resolve_channels(device, program, context, &mut objects),
        None => Vec::new(),
    };

    ctx_debug!(
        ctx,
        "Resolved {} com objects and {} channels",
        objects.len(),
        channels.len()
    );
    Parsed::new(DeviceComObjects { objects, channels }, diagnostics)
}

/// Group address ids an instance sends to and listens to.
///
/// `Links` (schema 20 and later): the first entry sends, the rest listen.
/// `Connectors` (older schemas): `Send` entries send, `Receive` entries listen.
fn links(el: &XmlElement) -> (Vec<&str>, Vec<&str>) {
    if let Some(links) = el.attr("Links") {
        let mut ids = links.split_whitespace().map(strip_project_prefix);
        let send: Vec<&str> = ids.next().into_iter().collect();
        return (send, ids.collect());
    }
    let Some(connectors) = el.child("Connectors") else {
        return (Vec::new(), Vec::new());
    };
    let collect = |name: &'static str| {
        connectors
            .children_named(name)
            .filter_map(|c| c.attr("GroupAddressRefId"))
            .map(strip_project_prefix)
            .collect::<Vec<_>>()
    };
    (collect("Send"), collect("Receive"))
}

fn merge_instance(
    device: &DeviceRecord<'_>,
    el: &XmlElement,
    context: ApplicationContext<'_>,
    diagnostics: &mut Diagnostics,
) -> CommunicationObjectInstance {
    let ref_id = el.attr_or_empty("RefId");
    let subject = device.address.to_string();

    let template_id = context.program.map(|program| {
        if ref_id.starts_with(&program.id) {
            ref_id.to_string()
        } else {
            format!("{}_{}", program.id, strip_module_instance(ref_id, "O"))
        }
    });
    let template = match (&template_id, context.catalog) {
        (Some(id), Some(catalog)) => {
            let template = catalog.get(id);
            if template.is_none() {
                diagnostics.gap(subject.clone(), format!("com object ref {} not found", id));
            }
            template
        }
        _ => None,
    };

    let instance_flags = FlagOverrides {
        read: parse_enable(el.attr("ReadFlag")),
        write: parse_enable(el.attr("WriteFlag")),
        communication: parse_enable(el.attr("CommunicationFlag")),
        transmit: parse_enable(el.attr("TransmitFlag")),
        update: parse_enable(el.attr("UpdateFlag")),
        read_on_init: parse_enable(el.attr("ReadOnInitFlag")),
    };
    let flags = match template {
        Some(t) => instance_flags.or(t.flags),
        None => instance_flags,
    }
    .resolve();

    let module_instance = ref_id
        .starts_with("MD-")
        .then(|| owning_module_instance(ref_id, context.module_instances))
        .flatten();

    let text = match (el.attr("Text"), template) {
        (Some(text), _) => text.to_string(),
        (None, Some(t)) => {
            let text = match &t.text_parameter_ref_id {
                Some(tpr) if !t.text.is_empty() => {
                    let parameter = text_parameter_instance_ref(ref_id, "O", tpr);
                    replace_text_parameter(
                        &t.text,
                        context.parameter_values.get(&parameter).map(String::as_str),
                    )
                }
                _ => t.text.clone(),
            };
            match (module_instance, context.program) {
                (Some(mi), Some(program)) if text.contains("{{") => {
                    replace_named_placeholders(&text, mi.named_arguments(program))
                }
                _ => text,
            }
        }
        (None, None) => String::new(),
    };

    let mut number = template.map(|t| t.number).unwrap_or_default();
    let mut module = None;
    if let (Some(t), Some(mi), Some(program)) = (template, module_instance, context.program) {
        if let Some(argument) = &t.base_number_argument {
            match mi.numeric_argument(program, argument) {
                Ok(base) => number = u32::try_from(u64::from(t.number) + base).unwrap_or(u32::MAX),
                Err(reason) => diagnostics.gap(subject.clone(), reason),
            }
        }
        module = Some(ModuleInstanceInfo {
            definition: mi.definition.clone(),
            root_number: t.number,
        });
    }

    let instance_dpts = parse_dpt_types(el.attr("DatapointType"));
    CommunicationObjectInstance {
        identifier: format!("{}/{}", device.address, ref_id),
        device_address: device.address,
        application_program_ref: context.program.map(|p| p.id.clone()),
        instance_ref_id: ref_id.to_string(),
        com_object_ref_id: template_id,
        com_object_id: template.map(|t| t.com_object_id.clone()),
        number,
        name: template.map(|t| t.name.clone()).unwrap_or_default(),
        text,
        function_text: el
            .attr("FunctionText")
            .map(str::to_string)
            .or_else(|| template.map(|t| t.function_text.clone()))
            .unwrap_or_default(),
        description: el.attr_or_empty("Description").to_string(),
        object_size: template.map(|t| t.object_size.clone()).unwrap_or_default(),
        flags,
        dpts: if instance_dpts.is_empty() {
            template.map(|t| t.dpts.clone()).unwrap_or_default()
        } else {
            instance_dpts
        },
        channel: el.attr_string("ChannelId"),
        module,
        send_group_addresses: Vec::new(),
        listen_group_addresses: Vec::new(),
        group_address_links: Vec::new(),
        resolved: template.is_some(),
    }
}

/// The innermost module instance an instance reference belongs to.
fn owning_module_instance<'a>(ref_id: &str, instances: &'a [ModuleInstance]) -> Option<&'a ModuleInstance> {
    instances
        .iter()
        .filter(|mi| {
            ref_id
                .strip_prefix(mi.id.as_str())
                .is_some_and(|rest| rest.starts_with('_'))
        })
        .max_by_key(|mi| mi.id.len())
}

/// Channels of the device's `GroupObjectTree` that contain objects.
fn resolve_channels(
    device: &DeviceRecord<'_>,
    program: &ApplicationProgramDef,
    context: ApplicationContext<'_>,
    objects: &mut [CommunicationObjectInstance],
) -> Vec<Channel> {
    let mut nodes = Vec::new();
    if let Some(tree) = device.element.child("GroupObjectTree") {
        collect_channel_nodes(tree, &mut nodes);
    }

    let mut channels = Vec::new();
    for node in nodes {
        let Some(instances) = node.attr("GroupObjectInstances").filter(|g| !g.trim().is_empty()) else {
            continue;
        };
        let ref_id = node.attr_or_empty("RefId");
        let mut communication_object_ids = Vec::new();
        for instance in instances.split_whitespace() {
            let id = format!("{}/{}", device.address, instance);
            if let Some(object) = objects.iter_mut().find(|o| o.identifier == id) {
                object.channel = Some(ref_id.to_string());
                communication_object_ids.push(id);
            }
        }

        let mut name = match node.attr_string("Text") {
            Some(text) => text,
            None => application_channel_name(ref_id, program, context),
        };
        if ref_id.starts_with("MD-")
            && name.contains("{{")
            && let Some((instance_id, _)) = ref_id.split_once("_CH")
            && let Some(mi) = context.module_instances.iter().find(|mi| mi.id == instance_id)
        {
            name = replace_named_placeholders(&name, mi.named_arguments(program));
        }

        channels.push(Channel {
            identifier: ref_id.to_string(),
            name,
            communication_object_ids,
        });
    }
    channels
}

fn collect_channel_nodes<'a>(el: &'a XmlElement, out: &mut Vec<&'a XmlElement>) {
    for child in &el.children {
        if child.name == "Node" && child.attr("Type") == Some("Channel") {
            out.push(child);
        }
        collect_channel_nodes(child, out);
    }
}

fn application_channel_name(ref_id: &str, program: &ApplicationProgramDef, context: ApplicationContext<'_>) -> String {
    let channel_id = format!("{}_{}", program.id, strip_module_instance(ref_id, "CH"));
    let Some(channel) = program.channels.get(&channel_id) else {
        return String::new();
    };
    let text = context.lang.text(&channel.id, "Text", Some(&channel.text));
    match &channel.text_parameter_ref_id {
        Some(tpr) if !text.is_empty() => {
            let parameter = text_parameter_instance_ref(ref_id, "CH", tpr);
            let replaced = replace_text_parameter(
                &text,
                context.parameter_values.get(&parameter).map(String::as_str),
            );
            if replaced.is_empty() {
                channel.name.clone()
            } else {
                replaced
            }
        }
        _ if !text.is_empty() => text,
        _ => channel.name.clone(),
    }
}
