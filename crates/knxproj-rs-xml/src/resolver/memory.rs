// crates/knxproj-rs-xml/src/resolver/memory.rs

//! Parameter memory layout reconstruction.
//!
//! The resolver runs in two passes. The segment pass assigns every code
//! segment its start address and checks for overlaps. The placement pass then
//! walks the parameters of every block in document order and computes their
//! byte and bit position within their segment.
//!
//! Bit positions are counted MSB-first: bit offset 0 is the most significant
//! bit of a byte, and a parameter wider than the remaining bits of a byte
//! carries into the following bytes.

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Parsed};
use crate::error::KnxprojError;
use crate::language::LanguageResolver;
use crate::log::{LogContext, ctx_debug, ctx_trace};
use crate::model::application::{
    ApplicationProgramDef, ParameterDef, ParameterEntry, ParameterRefDef, PlacementDecl, SegmentDef,
    UnionDef,
};
use crate::resolver::modules::ModuleInstance;
use crate::types::{
    MemoryPlacement, MemorySegment, ParameterTypeKind, ParameterValue, Placement, PropertyPlacement,
    ResolutionStatus, ResolvedParameter, SegmentKind, UnionAlternative,
};
use std::collections::BTreeMap;
use std::thread;

const MALFORMED_OFFSET: &str = "memory offset is not a number";

/// Parameters sharing one packing context: the static section of a program,
/// or one module instance bound to its argument values.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ParameterBlock<'a> {
    pub module_instance: Option<&'a ModuleInstance>,
    pub parameters: &'a [ParameterEntry],
    pub parameter_refs: &'a [ParameterRefDef],
}

/// Segments and placed parameters of one program or device.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MemoryMap {
    pub segments: Vec<MemorySegment>,
    pub parameters: Vec<ResolvedParameter>,
}

/// Resolves the full memory map of a program.
///
/// `values` maps `ParameterInstanceRef` ids to the values set on a device;
/// it is empty for product files.
pub(crate) fn resolve_memory(
    program: &ApplicationProgramDef,
    instances: &[ModuleInstance],
    values: &BTreeMap<String, String>,
    lang: LanguageResolver<'_>,
    parallel: bool,
) -> Parsed<MemoryMap> {
    let ctx = LogContext::new("memory", &program.id);
    let mut diagnostics = Diagnostics::new();

    // --- Pass 1: Segments ---
    let segments = layout_segments(&program.segments, &mut diagnostics);

    // --- Pass 2: Blocks ---
    let blocks = normalize_blocks(program, instances, &mut diagnostics);

    // --- Pass 3: Placement ---
    let placed: Vec<(Vec<ResolvedParameter>, Diagnostics)> = if parallel && blocks.len() > 1 {
        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let chunk_size = blocks.len().div_ceil(workers).max(1);
        let segments = &segments;
        thread::scope(|s| {
            let handles: Vec<_> = blocks
                .chunks(chunk_size)
                .map(|chunk| {
                    s.spawn(move || {
                        chunk
                            .iter()
                            .map(|block| place_block(program, segments, block, values, lang))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        })
    } else {
        blocks
            .iter()
            .map(|block| place_block(program, &segments, block, values, lang))
            .collect()
    };

    let mut parameters = Vec::new();
    for (block_parameters, block_diagnostics) in placed {
        parameters.extend(block_parameters);
        diagnostics.extend(block_diagnostics);
    }

    ctx_debug!(
        ctx,
        "Placed {} parameters in {} blocks over {} segments",
        parameters.len(),
        blocks.len(),
        segments.len()
    );
    Parsed::new(
        MemoryMap {
            segments,
            parameters,
        },
        diagnostics,
    )
}

/// Assigns start addresses to the code segments and checks for overlaps.
///
/// Relative segments without `Offset` follow the previous relative segment
/// of the same load state machine. Overlaps are checked within one address
/// space (absolute, or one load state machine).
pub(crate) fn layout_segments(defs: &[SegmentDef], diagnostics: &mut Diagnostics) -> Vec<MemorySegment> {
    let mut segments: Vec<MemorySegment> = Vec::with_capacity(defs.len());
    let mut relative_end: BTreeMap<Option<u32>, u32> = BTreeMap::new();

    for def in defs {
        let address = match def.kind {
            SegmentKind::Absolute => def.address.unwrap_or_default(),
            SegmentKind::Relative => {
                let next = relative_end.get(&def.load_state_machine).copied().unwrap_or(0);
                def.offset.unwrap_or(next)
            }
        };
        if def.kind == SegmentKind::Relative {
            relative_end.insert(def.load_state_machine, address.saturating_add(def.size));
        }

        let mut segment = MemorySegment {
            identifier: def.id.clone(),
            kind: def.kind,
            address,
            size: def.size,
            user_memory: def.user_memory,
            load_state_machine: def.load_state_machine,
            warnings: Vec::new(),
        };

        for earlier in segments.iter() {
            if !same_space(earlier, &segment) {
                continue;
            }
            let overlaps = segment.size > 0
                && earlier.size > 0
                && segment.address < earlier.address.saturating_add(earlier.size)
                && earlier.address < segment.address.saturating_add(segment.size);
            if overlaps {
                let warning = format!("overlaps segment {}", earlier.identifier);
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::LayoutInconsistency,
                    segment.identifier.clone(),
                    warning.clone(),
                ));
                segment.warnings.push(warning);
            }
        }
        segments.push(segment);
    }
    segments
}

fn same_space(a: &MemorySegment, b: &MemorySegment) -> bool {
    match (a.kind, b.kind) {
        (SegmentKind::Absolute, SegmentKind::Absolute) => true,
        (SegmentKind::Relative, SegmentKind::Relative) => a.load_state_machine == b.load_state_machine,
        _ => false,
    }
}

/// Normalizes both dialects into parameter blocks: the static section first,
/// then one block per module instance.
pub(crate) fn normalize_blocks<'a>(
    program: &'a ApplicationProgramDef,
    instances: &'a [ModuleInstance],
    diagnostics: &mut Diagnostics,
) -> Vec<ParameterBlock<'a>> {
    let mut blocks = vec![ParameterBlock {
        module_instance: None,
        parameters: &program.parameters,
        parameter_refs: &program.parameter_refs,
    }];
    for instance in instances {
        let definition_id = instance.definition_id(program);
        match program.module_def(&definition_id) {
            Some(module_def) => blocks.push(ParameterBlock {
                module_instance: Some(instance),
                parameters: &module_def.parameters,
                parameter_refs: &module_def.parameter_refs,
            }),
            None => diagnostics.gap(
                instance.id.clone(),
                format!("module definition {} not found", definition_id),
            ),
        }
    }
    blocks
}

fn place_block<'a>(
    program: &'a ApplicationProgramDef,
    segments: &'a [MemorySegment],
    block: &'a ParameterBlock<'a>,
    values: &'a BTreeMap<String, String>,
    lang: LanguageResolver<'a>,
) -> (Vec<ResolvedParameter>, Diagnostics) {
    let mut refs_by_parameter: BTreeMap<&str, Vec<&ParameterRefDef>> = BTreeMap::new();
    for r in block.parameter_refs {
        refs_by_parameter.entry(r.parameter_id.as_str()).or_default().push(r);
    }
    let mut placer = BlockPlacer {
        program,
        segments,
        block,
        values,
        lang,
        refs_by_parameter,
        cursors: BTreeMap::new(),
        parameters: Vec::new(),
        diagnostics: Diagnostics::new(),
    };
    for entry in block.parameters {
        match entry {
            ParameterEntry::Parameter(def) => placer.place_parameter(def),
            ParameterEntry::Union(union) => placer.place_union(union),
        }
    }
    (placer.parameters, placer.diagnostics)
}

struct BlockPlacer<'a> {
    program: &'a ApplicationProgramDef,
    segments: &'a [MemorySegment],
    block: &'a ParameterBlock<'a>,
    values: &'a BTreeMap<String, String>,
    lang: LanguageResolver<'a>,
    refs_by_parameter: BTreeMap<&'a str, Vec<&'a ParameterRefDef>>,
    /// Next free bit per segment.
    cursors: BTreeMap<&'a str, u64>,
    parameters: Vec<ResolvedParameter>,
    diagnostics: Diagnostics,
}

impl<'a> BlockPlacer<'a> {
    fn place_parameter(&mut self, def: &'a ParameterDef) {
        let mut reasons = Vec::new();
        let width = self.width_of(def, &mut reasons);
        let placement = match &def.placement {
            PlacementDecl::Memory { malformed: true, .. } => {
                reasons.push(MALFORMED_OFFSET.to_string());
                Placement::None
            }
            PlacementDecl::Memory {
                code_segment,
                offset,
                bit_offset,
                base_offset,
                ..
            } => self
                .locate(
                    code_segment,
                    *offset,
                    *bit_offset,
                    base_offset.as_deref(),
                    u64::from(width.unwrap_or(0)),
                    &mut reasons,
                )
                .map(|(segment, position)| memory_placement(segment, position, width.unwrap_or(0)))
                .unwrap_or(Placement::None),
            PlacementDecl::Property {
                object_index,
                object_type,
                property_id,
                offset,
                bit_offset,
            } => Placement::Property(PropertyPlacement {
                object_index: *object_index,
                object_type: *object_type,
                property_id: *property_id,
                offset: *offset,
                bit_offset: *bit_offset,
            }),
            PlacementDecl::None => Placement::None,
        };
        self.push(def, width, placement, Vec::new(), reasons);
    }

    fn place_union(&mut self, union: &'a UnionDef) {
        let mut union_reasons = Vec::new();
        let alternatives: Vec<UnionAlternative> = union
            .members
            .iter()
            .map(|m| UnionAlternative {
                parameter_id: self.scoped(&m.id),
                type_id: m.type_id.clone(),
                default: m.default_union,
            })
            .collect();

        let origin = match &union.placement {
            PlacementDecl::Memory { malformed: true, .. } => {
                union_reasons.push(MALFORMED_OFFSET.to_string());
                None
            }
            PlacementDecl::Memory {
                code_segment,
                offset,
                bit_offset,
                base_offset,
                ..
            } => self.locate(
                code_segment,
                *offset,
                *bit_offset,
                base_offset.as_deref(),
                u64::from(union.size_in_bit),
                &mut union_reasons,
            ),
            _ => None,
        };

        for member in &union.members {
            let mut reasons = union_reasons.clone();
            let width = self.width_of(member, &mut reasons);
            let member_offset = member.union_offset.unwrap_or(0);
            let member_bit_offset = member.union_bit_offset.unwrap_or(0);
            let placement = match (&union.placement, origin) {
                (PlacementDecl::Memory { .. }, Some((segment, position))) => memory_placement(
                    segment,
                    position
                        .saturating_add(u64::from(member_offset) * 8)
                        .saturating_add(u64::from(member_bit_offset)),
                    width.unwrap_or(0),
                ),
                (
                    PlacementDecl::Property {
                        object_index,
                        object_type,
                        property_id,
                        offset,
                        ..
                    },
                    _,
                ) => Placement::Property(PropertyPlacement {
                    object_index: *object_index,
                    object_type: *object_type,
                    property_id: *property_id,
                    offset: offset + member_offset,
                    bit_offset: member_bit_offset,
                }),
                _ => Placement::None,
            };
            self.push(member, width, placement, alternatives.clone(), reasons);
        }
    }

    /// Finds the segment and absolute bit position (from the segment start)
    /// of a memory declaration and advances the segment cursor.
    fn locate(
        &mut self,
        code_segment: &str,
        offset: Option<u32>,
        bit_offset: Option<u8>,
        base_offset: Option<&str>,
        width: u64,
        reasons: &mut Vec<String>,
    ) -> Option<(&'a MemorySegment, u64)> {
        let segments: &'a [MemorySegment] = self.segments;
        let Some(segment) = segments.iter().find(|s| s.identifier == code_segment) else {
            reasons.push(format!("code segment {} not found", code_segment));
            return None;
        };

        let base = match (base_offset, self.block.module_instance) {
            (None, _) => 0,
            (Some(argument), Some(instance)) => instance
                .numeric_argument(self.program, argument)
                .unwrap_or_else(|reason| {
                    reasons.push(reason);
                    0
                }),
            (Some(argument), None) => {
                reasons.push(format!("base offset argument {} used outside a module", argument));
                0
            }
        };

        let start = base.checked_mul(8);
        let position = match offset {
            Some(offset) => base
                .checked_add(u64::from(offset))
                .and_then(|byte| byte.checked_mul(8))
                .map(|bit| bit.saturating_add(u64::from(bit_offset.unwrap_or(0)))),
            None => match self.cursors.get(segment.identifier.as_str()) {
                Some(cursor) => Some(*cursor),
                None => start,
            },
        };
        let Some(position) = position else {
            reasons.push(format!("byte offset in {} out of range", code_segment));
            return None;
        };
        self.cursors
            .insert(segment.identifier.as_str(), position.saturating_add(width));
        Some((segment, position))
    }

    fn width_of(&self, def: &ParameterDef, reasons: &mut Vec<String>) -> Option<u32> {
        let Some(parameter_type) = self.program.parameter_types.get(&def.type_id) else {
            reasons.push(format!("parameter type {} not found", def.type_id));
            return None;
        };
        let width = parameter_type.kind.size_in_bit();
        if width.is_none() {
            reasons.push(format!("parameter type {} is not supported", def.type_id));
        }
        width
    }

    fn scoped(&self, id: &str) -> String {
        match self.block.module_instance {
            Some(instance) => instance.scope_id(self.program, id),
            None => id.to_string(),
        }
    }

    /// Device value > first `ParameterRef` value > `Parameter` value.
    fn effective_value(&self, def: &ParameterDef, refs: &[&ParameterRefDef]) -> Option<String> {
        refs.iter()
            .find_map(|r| self.values.get(&self.scoped(&r.id)).cloned())
            .or_else(|| default_value(def, refs))
    }

    fn push(
        &mut self,
        def: &'a ParameterDef,
        width: Option<u32>,
        placement: Placement,
        union_alternatives: Vec<UnionAlternative>,
        reasons: Vec<String>,
    ) {
        let identifier = self.scoped(&def.id);
        let refs: &[&ParameterRefDef] = self
            .refs_by_parameter
            .get(def.id.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut warnings = Vec::new();
        if let Placement::Memory(memory) = &placement
            && let Some(warning) = self.containment_warning(memory)
        {
            self.diagnostics.push(Diagnostic::new(
                DiagnosticKind::LayoutInconsistency,
                identifier.clone(),
                warning.clone(),
            ));
            warnings.push(warning);
        }

        let value = self.effective_value(def, refs);
        let kind = self.program.parameter_types.get(&def.type_id).map(|t| &t.kind);
        let decoded_value = match (kind, value.as_deref()) {
            (Some(kind), Some(raw)) => match decode_value(kind, raw) {
                Ok(decoded) => {
                    if let Some(message) = decoded.as_ref().and_then(|d| range_violation(kind, d)) {
                        self.diagnostics.push(Diagnostic::new(
                            DiagnosticKind::InvalidValue,
                            identifier.clone(),
                            message,
                        ));
                    }
                    decoded
                }
                Err(e) => {
                    self.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::InvalidValue,
                        identifier.clone(),
                        e.to_string(),
                    ));
                    None
                }
            },
            _ => None,
        };

        let text = match refs.iter().find(|r| r.text.is_some()) {
            Some(r) => self.lang.text(&r.id, "Text", r.text.as_deref()),
            None => self.lang.text(&def.id, "Text", Some(&def.text)),
        };

        let status = if reasons.is_empty() {
            ResolutionStatus::Resolved
        } else {
            for reason in &reasons {
                self.diagnostics.gap(identifier.clone(), reason.clone());
            }
            ResolutionStatus::Unresolved { reasons }
        };

        let ctx = LogContext::new("memory", &self.program.id);
        ctx_trace!(ctx, "{} => {:?}", identifier, placement);

        self.parameters.push(ResolvedParameter {
            identifier,
            definition_id: def.id.clone(),
            name: def.name.clone(),
            text,
            type_id: def.type_id.clone(),
            bit_width: width,
            default_value: default_value(def, refs),
            value,
            decoded_value,
            access: def.access,
            placement,
            union_alternatives,
            module_instance: self.block.module_instance.map(|m| m.id.clone()),
            warnings,
            status,
        });
    }

    fn containment_warning(&self, memory: &MemoryPlacement) -> Option<String> {
        let segment = self
            .segments
            .iter()
            .find(|s| s.identifier == memory.segment_id)?;
        let end = u64::from(memory.byte_offset) * 8
            + u64::from(memory.bit_offset)
            + u64::from(memory.bit_width);
        (end > u64::from(segment.size) * 8).then(|| {
            format!(
                "ends at bit {} beyond segment {} of {} bytes",
                end, segment.identifier, segment.size
            )
        })
    }
}

fn default_value(def: &ParameterDef, refs: &[&ParameterRefDef]) -> Option<String> {
    refs.iter()
        .find_map(|r| r.value.clone())
        .or_else(|| def.value.clone())
}

fn memory_placement(segment: &MemorySegment, position: u64, width: u32) -> Placement {
    Placement::Memory(MemoryPlacement {
        segment_id: segment.identifier.clone(),
        byte_offset: u32::try_from(position / 8).unwrap_or(u32::MAX),
        bit_offset: (position % 8) as u8,
        bit_width: width,
    })
}

/// Decodes a textual parameter value against its type.
///
/// Returns `Ok(None)` for types without a value and for empty non-text
/// values.
pub(crate) fn decode_value(
    kind: &ParameterTypeKind,
    raw: &str,
) -> Result<Option<ParameterValue>, KnxprojError> {
    let trimmed = raw.trim();
    let is_textual = matches!(
        kind,
        ParameterTypeKind::Text { .. }
            | ParameterTypeKind::Date
            | ParameterTypeKind::IpAddress { .. }
            | ParameterTypeKind::Color { .. }
    );
    if trimmed.is_empty() && !is_textual {
        return Ok(None);
    }

    let value = match kind {
        ParameterTypeKind::Number { signed: true, .. } => ParameterValue::Signed(trimmed.parse()?),
        ParameterTypeKind::Number { signed: false, .. } | ParameterTypeKind::Time { .. } => {
            ParameterValue::Unsigned(trimmed.parse()?)
        }
        ParameterTypeKind::Float { .. } => ParameterValue::Float(trimmed.parse()?),
        ParameterTypeKind::Enumeration { values, .. } => {
            let value: i64 = trimmed.parse()?;
            let entry = values.iter().find(|e| e.value == value).ok_or_else(|| {
                KnxprojError::InvalidAttributeFormat {
                    element: "Enumeration".to_string(),
                    attribute: "Value",
                    value: raw.to_string(),
                }
            })?;
            ParameterValue::Enumeration {
                value,
                text: entry.text.clone(),
            }
        }
        ParameterTypeKind::RawData { .. } => ParameterValue::Raw(hex::decode(trimmed)?),
        ParameterTypeKind::Text { .. }
        | ParameterTypeKind::Date
        | ParameterTypeKind::IpAddress { .. }
        | ParameterTypeKind::Color { .. } => ParameterValue::Text(raw.to_string()),
        ParameterTypeKind::Picture { .. }
        | ParameterTypeKind::None
        | ParameterTypeKind::Unsupported { .. } => return Ok(None),
    };
    Ok(Some(value))
}

fn range_violation(kind: &ParameterTypeKind, value: &ParameterValue) -> Option<String> {
    let out_of_range = match (kind, value) {
        (ParameterTypeKind::Number { min, max, .. }, ParameterValue::Signed(v)) => {
            min.is_some_and(|m| *v < m) || max.is_some_and(|m| *v > m)
        }
        (ParameterTypeKind::Number { min, max, .. }, ParameterValue::Unsigned(v)) => {
            let v = i128::from(*v);
            min.is_some_and(|m| v < i128::from(m)) || max.is_some_and(|m| v > i128::from(m))
        }
        (ParameterTypeKind::Float { min, max, .. }, ParameterValue::Float(v)) => {
            min.is_some_and(|m| *v < m) || max.is_some_and(|m| *v > m)
        }
        _ => false,
    };
    out_of_range.then(|| "value outside of the type's range".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::LanguageCatalog;
    use crate::types::EnumerationValue;
    use crate::xml::XmlDocument;

    fn program(xml: &str) -> ApplicationProgramDef {
        let doc = XmlDocument::parse("app.xml", xml).unwrap();
        ApplicationProgramDef::from_element(&doc.root, "M-0083", &mut Diagnostics::new()).unwrap()
    }

    fn segment(id: &str, kind: SegmentKind, address: Option<u32>, offset: Option<u32>, size: u32, lsm: Option<u32>) -> SegmentDef {
        SegmentDef {
            id: id.to_string(),
            kind,
            address,
            offset,
            size,
            user_memory: false,
            load_state_machine: lsm,
        }
    }

    #[test]
    fn test_relative_segments_follow_each_other_per_lsm() {
        let defs = [
            segment("RS-1", SegmentKind::Relative, None, None, 16, Some(4)),
            segment("RS-2", SegmentKind::Relative, None, None, 8, Some(4)),
            segment("RS-3", SegmentKind::Relative, None, None, 8, Some(5)),
            segment("AS-1", SegmentKind::Absolute, Some(0x4000), None, 16, None),
        ];
        let mut diagnostics = Diagnostics::new();
        let segments = layout_segments(&defs, &mut diagnostics);
        assert_eq!(segments[0].address, 0);
        assert_eq!(segments[1].address, 16);
        assert_eq!(segments[2].address, 0);
        assert_eq!(segments[3].address, 0x4000);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_overlap_warns_on_later_segment() {
        let defs = [
            segment("AS-1", SegmentKind::Absolute, Some(0x100), None, 16, None),
            segment("AS-2", SegmentKind::Absolute, Some(0x108), None, 16, None),
            // Different address space, never overlaps.
            segment("RS-1", SegmentKind::Relative, None, Some(0x100), 16, Some(4)),
        ];
        let mut diagnostics = Diagnostics::new();
        let segments = layout_segments(&defs, &mut diagnostics);
        assert!(segments[0].warnings.is_empty());
        assert_eq!(segments[1].warnings, vec!["overlaps segment AS-1"]);
        assert!(segments[2].warnings.is_empty());
        // Declared values are kept.
        assert_eq!(segments[1].address, 0x108);
        assert_eq!(diagnostics.of_kind(DiagnosticKind::LayoutInconsistency).count(), 1);
    }

    #[test]
    fn test_decode_value() {
        let number = ParameterTypeKind::Number {
            size_in_bit: 8,
            signed: true,
            min: Some(-10),
            max: Some(10),
        };
        assert_eq!(decode_value(&number, "-3").unwrap(), Some(ParameterValue::Signed(-3)));
        assert!(decode_value(&number, "x").is_err());
        assert!(range_violation(&number, &ParameterValue::Signed(11)).is_some());

        let enumeration = ParameterTypeKind::Enumeration {
            size_in_bit: 2,
            values: vec![EnumerationValue {
                value: 1,
                text: "On".to_string(),
                identifier: None,
            }],
        };
        assert_eq!(
            decode_value(&enumeration, "1").unwrap(),
            Some(ParameterValue::Enumeration {
                value: 1,
                text: "On".to_string()
            })
        );
        assert!(decode_value(&enumeration, "2").is_err());

        let raw = ParameterTypeKind::RawData { max_size: 2 };
        assert_eq!(
            decode_value(&raw, "0AFF").unwrap(),
            Some(ParameterValue::Raw(vec![0x0A, 0xFF]))
        );
        assert!(matches!(decode_value(&raw, "0G"), Err(KnxprojError::HexParsing(_))));
        assert_eq!(decode_value(&ParameterTypeKind::None, "1").unwrap(), None);
        assert_eq!(decode_value(&number, "").unwrap(), None);
    }

    const BASE: &str = r#"<ApplicationProgram Id="M-0083_A-1">
      <Static>
        <Code><RelativeSegment Id="M-0083_A-1_RS-1" Offset="0" Size="2" LoadStateMachine="4" /></Code>
        <ParameterTypes>
          <ParameterType Id="M-0083_A-1_PT-Bool"><TypeNumber SizeInBit="1" Type="unsignedInt" minInclusive="0" maxInclusive="1" /></ParameterType>
          <ParameterType Id="M-0083_A-1_PT-Byte"><TypeNumber SizeInBit="8" Type="unsignedInt" /></ParameterType>
        </ParameterTypes>
        <Parameters>
          PARAMETERS
        </Parameters>
        <ParameterRefs>
          <ParameterRef Id="M-0083_A-1_P-1_R-1" RefId="M-0083_A-1_P-1" Value="1" />
        </ParameterRefs>
      </Static>
    </ApplicationProgram>"#;

    fn resolve(parameters: &str, values: &BTreeMap<String, String>) -> Parsed<MemoryMap> {
        let program = program(&BASE.replace("PARAMETERS", parameters));
        let catalog = LanguageCatalog::new();
        resolve_memory(&program, &[], values, catalog.resolver(None), false)
    }

    fn memory(parameter: &ResolvedParameter) -> &MemoryPlacement {
        match &parameter.placement {
            Placement::Memory(m) => m,
            other => panic!("expected memory placement, got {:?}", other),
        }
    }

    #[test]
    fn test_explicit_offset_resets_cursor() {
        let parsed = resolve(
            r#"<Parameter Id="M-0083_A-1_P-1" Name="a" ParameterType="M-0083_A-1_PT-Byte"><Memory CodeSegment="M-0083_A-1_RS-1" Offset="1" BitOffset="0" /></Parameter>
               <Parameter Id="M-0083_A-1_P-2" Name="b" ParameterType="M-0083_A-1_PT-Bool"><Memory CodeSegment="M-0083_A-1_RS-1" /></Parameter>"#,
            &BTreeMap::new(),
        );
        let parameters = &parsed.value.parameters;
        assert_eq!(memory(&parameters[0]).byte_offset, 1);
        // Packed after the explicit placement, which ends at the segment end.
        assert_eq!(memory(&parameters[1]).byte_offset, 2);
        assert_eq!(parameters[1].warnings.len(), 1);
        assert_eq!(
            parsed
                .diagnostics
                .of_kind(DiagnosticKind::LayoutInconsistency)
                .count(),
            1
        );
    }

    #[test]
    fn test_reordering_changes_offsets_not_direction() {
        let flag = r#"<Parameter Id="M-0083_A-1_P-1" Name="a" ParameterType="M-0083_A-1_PT-Bool"><Memory CodeSegment="M-0083_A-1_RS-1" /></Parameter>"#;
        let byte = r#"<Parameter Id="M-0083_A-1_P-2" Name="b" ParameterType="M-0083_A-1_PT-Byte"><Memory CodeSegment="M-0083_A-1_RS-1" /></Parameter>"#;
        let positions = |parameters: String| -> Vec<(u32, u8)> {
            resolve(&parameters, &BTreeMap::new())
                .value
                .parameters
                .iter()
                .map(|p| (memory(p).byte_offset, memory(p).bit_offset))
                .collect()
        };
        assert_eq!(positions(format!("{}{}", flag, byte)), vec![(0, 0), (0, 1)]);
        assert_eq!(positions(format!("{}{}", byte, flag)), vec![(0, 0), (1, 0)]);
    }

    #[test]
    fn test_effective_value_precedence() {
        let params = r#"<Parameter Id="M-0083_A-1_P-1" Name="a" ParameterType="M-0083_A-1_PT-Byte" Value="0"><Memory CodeSegment="M-0083_A-1_RS-1" Offset="0" /></Parameter>
               <Parameter Id="M-0083_A-1_P-2" Name="b" ParameterType="M-0083_A-1_PT-Byte" Value="5"><Memory CodeSegment="M-0083_A-1_RS-1" Offset="1" /></Parameter>"#;
        let parsed = resolve(params, &BTreeMap::new());
        assert_eq!(parsed.value.parameters[0].value.as_deref(), Some("1"));
        assert_eq!(parsed.value.parameters[1].value.as_deref(), Some("5"));

        let mut values = BTreeMap::new();
        values.insert("M-0083_A-1_P-1_R-1".to_string(), "42".to_string());
        let parsed = resolve(params, &values);
        let first = &parsed.value.parameters[0];
        assert_eq!(first.value.as_deref(), Some("42"));
        assert_eq!(first.default_value.as_deref(), Some("1"));
        assert_eq!(first.decoded_value, Some(ParameterValue::Unsigned(42)));
    }

    #[test]
    fn test_unknown_type_and_segment_are_unresolved() {
        let parsed = resolve(
            r#"<Parameter Id="M-0083_A-1_P-1" Name="a" ParameterType="M-0083_A-1_PT-Missing"><Memory CodeSegment="M-0083_A-1_RS-1" Offset="0" /></Parameter>
               <Parameter Id="M-0083_A-1_P-2" Name="b" ParameterType="M-0083_A-1_PT-Byte"><Memory CodeSegment="M-0083_A-1_RS-9" Offset="0" /></Parameter>
               <Parameter Id="M-0083_A-1_P-3" Name="c" ParameterType="M-0083_A-1_PT-Byte" />"#,
            &BTreeMap::new(),
        );
        let parameters = &parsed.value.parameters;
        assert_eq!(parameters.len(), 3);
        assert!(!parameters[0].status.is_resolved());
        assert_eq!(parameters[0].bit_width, None);
        assert!(!parameters[1].status.is_resolved());
        assert_eq!(parameters[1].placement, Placement::None);
        assert!(parameters[2].status.is_resolved());
        assert_eq!(parameters[2].placement, Placement::None);
        assert_eq!(parsed.gaps().count(), 2);
    }

    #[test]
    fn test_malformed_memory_offset_is_unresolved() {
        let parsed = resolve(
            r#"<Parameter Id="M-0083_A-1_P-1" Name="a" ParameterType="M-0083_A-1_PT-Byte"><Memory CodeSegment="M-0083_A-1_RS-1" Offset="one" /></Parameter>
               <Parameter Id="M-0083_A-1_P-2" Name="b" ParameterType="M-0083_A-1_PT-Byte"><Memory CodeSegment="M-0083_A-1_RS-1" Offset="1" /></Parameter>"#,
            &BTreeMap::new(),
        );
        let parameters = &parsed.value.parameters;
        assert_eq!(parameters.len(), 2);
        assert_eq!(parameters[0].placement, Placement::None);
        assert_eq!(
            parameters[0].status,
            ResolutionStatus::Unresolved {
                reasons: vec![MALFORMED_OFFSET.to_string()]
            }
        );
        // The value is still known without a position.
        assert_eq!(parameters[0].value.as_deref(), Some("1"));
        assert_eq!(memory(&parameters[1]).byte_offset, 1);
        assert!(parameters[1].status.is_resolved());
    }

    #[test]
    fn test_huge_base_offset_is_unresolved() {
        let program = program(&BASE.replace("PARAMETERS", ""));
        let segments = layout_segments(&program.segments, &mut Diagnostics::new());
        let instance = ModuleInstance {
            id: "MD-1_M-1_MI-1".to_string(),
            definition: "MD-1".to_string(),
            arguments: vec![("M-0083_A-1_MD-1_A-1".to_string(), u64::MAX.to_string())],
        };
        let block = ParameterBlock {
            module_instance: Some(&instance),
            parameters: &[],
            parameter_refs: &[],
        };
        let values = BTreeMap::new();
        let catalog = LanguageCatalog::new();
        let mut placer = BlockPlacer {
            program: &program,
            segments: &segments,
            block: &block,
            values: &values,
            lang: catalog.resolver(None),
            refs_by_parameter: BTreeMap::new(),
            cursors: BTreeMap::new(),
            parameters: Vec::new(),
            diagnostics: Diagnostics::new(),
        };

        let mut reasons = Vec::new();
        let explicit = placer.locate("M-0083_A-1_RS-1", Some(1), None, Some("M-0083_A-1_MD-1_A-1"), 8, &mut reasons);
        assert!(explicit.is_none());
        let packed = placer.locate("M-0083_A-1_RS-1", None, None, Some("M-0083_A-1_MD-1_A-1"), 8, &mut reasons);
        assert!(packed.is_none());
        assert_eq!(reasons.len(), 2);
        assert!(reasons[0].contains("out of range"), "{}", reasons[0]);
    }

    #[test]
    fn test_union_members_share_position() {
        let parsed = resolve(
            r#"<Union SizeInBit="8">
                 <Memory CodeSegment="M-0083_A-1_RS-1" Offset="1" BitOffset="0" />
                 <Parameter Id="M-0083_A-1_UP-1" Name="a" ParameterType="M-0083_A-1_PT-Byte" Offset="0" BitOffset="0" DefaultUnionParameter="true" />
                 <Parameter Id="M-0083_A-1_UP-2" Name="b" ParameterType="M-0083_A-1_PT-Bool" Offset="0" BitOffset="7" />
               </Union>"#,
            &BTreeMap::new(),
        );
        let parameters = &parsed.value.parameters;
        assert_eq!(parameters.len(), 2);
        assert_eq!(memory(&parameters[0]).byte_offset, 1);
        assert_eq!(memory(&parameters[0]).bit_offset, 0);
        assert_eq!(memory(&parameters[1]).byte_offset, 1);
        assert_eq!(memory(&parameters[1]).bit_offset, 7);
        assert_eq!(parameters[1].union_alternatives.len(), 2);
        assert!(parameters[1].union_alternatives[0].default);
        assert!(parsed.diagnostics.is_empty());
    }
}
