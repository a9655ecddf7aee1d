// crates/knxproj-rs-xml/src/resolver/modules.rs

//! Module instances of module-based application programs.
//!
//! In a project, instances come from `DeviceInstance/ModuleInstances`. For a
//! product file every `Module` of the dynamic section is one instance whose
//! arguments are taken from its `NumericArg`s.

use crate::log::{LogContext, ctx_warn};
use crate::model::application::ApplicationProgramDef;
use crate::xml::XmlElement;
use std::collections::BTreeMap;

/// One instantiation of a module definition with its argument values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ModuleInstance {
    /// Local instance id, e.g. `MD-1_M-1_MI-1` or
    /// `MD-4_M-15_MI-1_SM-1_M-1_MI-1-1-2` for submodules.
    pub id: String,
    /// Local module definition id, `MD-1` or `MD-4_SM-1`.
    pub definition: String,
    /// Completed argument id → raw value, in document order.
    pub arguments: Vec<(String, String)>,
}

impl ModuleInstance {
    /// Reads a `ModuleInstance` element of a device instance.
    pub(crate) fn from_project_element(el: &XmlElement, application_id: &str) -> Self {
        let id = el.attr_or_empty("Id").to_string();
        let module_def = el
            .attr_or_empty("RefId")
            .split('_')
            .next()
            .unwrap_or_default()
            .to_string();
        let arguments = el
            .find_all(&["Arguments", "Argument"])
            .into_iter()
            .map(|arg| {
                let ref_id = arg.attr_or_empty("RefId");
                let completed = if ref_id.starts_with(application_id) {
                    ref_id.to_string()
                } else if ref_id.starts_with("SM-") {
                    format!("{}_{}_{}", application_id, module_def, ref_id)
                } else {
                    format!("{}_{}", application_id, ref_id)
                };
                (completed, arg.attr_or_empty("Value").to_string())
            })
            .collect();
        ModuleInstance {
            definition: definition_of(&id, &module_def),
            id,
            arguments,
        }
    }

    /// Full id of the module definition within `program`.
    pub(crate) fn definition_id(&self, program: &ApplicationProgramDef) -> String {
        format!("{}_{}", program.id, self.definition)
    }

    /// Instance index taken from the first `_MI-<n>` segment.
    pub(crate) fn index(&self) -> Option<u64> {
        let (_, rest) = self.id.split_once("MI-")?;
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok()
    }

    pub(crate) fn argument(&self, id: &str) -> Option<&str> {
        self.arguments
            .iter()
            .find(|(k, _)| k == id)
            .map(|(_, v)| v.as_str())
    }

    /// Numeric value of an argument.
    ///
    /// Integer values are taken as is. Otherwise the value names an
    /// allocator (`L-1`) and the result is the allocator start plus the
    /// argument's allocation size per preceding instance.
    pub(crate) fn numeric_argument(
        &self,
        program: &ApplicationProgramDef,
        argument_id: &str,
    ) -> Result<u64, String> {
        let raw = self
            .argument(argument_id)
            .ok_or_else(|| format!("argument {} not set on module instance {}", argument_id, self.id))?;
        if let Ok(value) = raw.trim().parse::<u64>() {
            return Ok(value);
        }
        let allocator_id = format!("{}_{}", program.id, raw);
        let allocator = program
            .allocators
            .get(&allocator_id)
            .ok_or_else(|| format!("allocator {} not found", allocator_id))?;
        let allocates = program
            .arguments
            .get(argument_id)
            .and_then(|a| a.allocates)
            .ok_or_else(|| format!("argument {} declares no allocation size", argument_id))?;
        let index = self
            .index()
            .ok_or_else(|| format!("module instance {} has no index", self.id))?;
        Ok(allocator
            .start
            .saturating_add(allocates.saturating_mul(index.saturating_sub(1))))
    }

    /// Maps an identifier scoped to the module definition
    /// (`<app>_MD-1_P-2`) onto this instance (`<app>_MD-1_M-1_MI-1_P-2`).
    pub(crate) fn scope_id(&self, program: &ApplicationProgramDef, definition_scoped: &str) -> String {
        let prefix = format!("{}_", self.definition_id(program));
        match definition_scoped.strip_prefix(&prefix) {
            Some(rest) => format!("{}_{}_{}", program.id, self.id, rest),
            None => definition_scoped.to_string(),
        }
    }

    /// Argument name → value, for `{{name}}` placeholders.
    pub(crate) fn named_arguments<'a>(
        &'a self,
        program: &'a ApplicationProgramDef,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.arguments.iter().filter_map(move |(id, value)| {
            program
                .arguments
                .get(id)
                .map(|def| (def.name.as_str(), value.as_str()))
        })
    }
}

/// Local definition id of an instance: the module definition plus the first
/// submodule definition in the instance id.
fn definition_of(instance_id: &str, module_def: &str) -> String {
    match instance_id.split('_').find(|s| s.starts_with("SM-")) {
        Some(submodule) => format!("{}_{}", module_def, submodule),
        None => module_def.to_string(),
    }
}

/// Collects all module instances of a device, including nested submodule
/// instances, in document order.
pub(crate) fn project_instances(device: &XmlElement, application_id: &str) -> Vec<ModuleInstance> {
    fn collect(el: &XmlElement, application_id: &str, out: &mut Vec<ModuleInstance>) {
        for mi in el.descendants_named("ModuleInstance") {
            out.push(ModuleInstance::from_project_element(mi, application_id));
            collect(mi, application_id, out);
        }
    }
    let mut instances = Vec::new();
    if let Some(container) = device.child("ModuleInstances") {
        collect(container, application_id, &mut instances);
    }
    instances
}

/// Derives instances from the `Module` calls of a program's dynamic section.
///
/// Allocator arguments get the allocator start plus the allocation size for
/// every earlier module using the same allocator.
pub(crate) fn product_instances(program: &ApplicationProgramDef) -> Vec<ModuleInstance> {
    let ctx = LogContext::new("modules", &program.id);
    let mut allocator_use: BTreeMap<&str, u64> = BTreeMap::new();
    program
        .dynamic
        .modules
        .iter()
        .map(|call| {
            let id = call
                .id
                .strip_prefix(&format!("{}_", program.id))
                .unwrap_or(&call.id)
                .to_string();
            let module_def = call
                .module_def_id
                .strip_prefix(&format!("{}_", program.id))
                .unwrap_or(&call.module_def_id)
                .to_string();
            let arguments = call
                .numeric_args
                .iter()
                .filter_map(|arg| {
                    if let Some(value) = &arg.value {
                        return Some((arg.argument_id.clone(), value.clone()));
                    }
                    let allocator = program.allocators.get(arg.allocator_ref_id.as_deref()?)?;
                    let allocates = program
                        .arguments
                        .get(&arg.argument_id)
                        .and_then(|a| a.allocates)
                        .unwrap_or(1);
                    let ordinal = allocator_use.entry(allocator.id.as_str()).or_insert(0);
                    let value = allocator.start + allocates * *ordinal;
                    *ordinal += 1;
                    if let Some(max) = allocator.max_inclusive
                        && value + allocates.saturating_sub(1) > max
                    {
                        ctx_warn!(ctx, "Allocator {} exhausted at {} (max {})", allocator.id, value, max);
                    }
                    Some((arg.argument_id.clone(), value.to_string()))
                })
                .collect();
            ModuleInstance {
                definition: definition_of(&id, &module_def),
                id,
                arguments,
            }
        })
        .collect()
}
