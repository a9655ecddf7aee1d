// crates/knxproj-rs-xml/src/types.rs

//! Public, ergonomic result types produced by the resolvers.
//!
//! Everything here is created once per parse invocation and never mutated
//! afterwards. Definitions are referenced by identifier only.

use knxproj_rs::{ComObjectFlags, DatapointType, GroupAddressStyle, IndividualAddress, MediumType};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

// --- Project ---

/// The root result of a project parse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub info: ProjectInfo,
    pub topology: Vec<Area>,
    pub devices: BTreeMap<IndividualAddress, Device>,
    /// Keyed by `"<individual address>/<instance ref id>"`.
    pub communication_objects: BTreeMap<String, CommunicationObjectInstance>,
    /// Keyed by the formatted address.
    pub group_addresses: BTreeMap<String, GroupAddress>,
    /// Top-level group ranges keyed by their formatted start address.
    pub group_ranges: BTreeMap<String, GroupRange>,
    pub locations: Vec<Space>,
    pub functions: BTreeMap<String, Function>,
    /// Metadata of every datapoint type used by a group address or com
    /// object, keyed by its dotted form (`9.001`).
    pub datapoint_types: BTreeMap<String, DatapointTypeInfo>,
    /// Device instance id → resolved memory map. Only populated when
    /// parameterization was requested.
    pub parameterization: BTreeMap<String, DeviceParameterization>,
}

/// Metadata of the project (`project.xml` / `ProjectInformation`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ProjectInfo {
    pub project_id: String,
    pub name: String,
    pub last_modified: Option<String>,
    pub group_address_style: GroupAddressStyle,
    pub guid: String,
    pub created_by: String,
    pub schema_version: Option<u32>,
    pub tool_version: String,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Area {
    pub address: u8,
    pub name: String,
    pub description: Option<String>,
    pub lines: Vec<Line>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Line {
    pub address: u8,
    pub name: String,
    pub description: Option<String>,
    /// Raw `MediumTypeRefId` (e.g. `MT-0`).
    pub medium_type_id: Option<String>,
    pub medium_type: Option<MediumType>,
    /// Devices in document order.
    pub devices: Vec<IndividualAddress>,
}

/// Whether every reference of a device could be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Completeness {
    #[default]
    Complete,
    Incomplete { gaps: Vec<String> },
}

impl Completeness {
    pub fn is_complete(&self) -> bool {
        matches!(self, Completeness::Complete)
    }

    pub(crate) fn from_gaps(gaps: Vec<String>) -> Self {
        if gaps.is_empty() {
            Completeness::Complete
        } else {
            Completeness::Incomplete { gaps }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    /// `DeviceInstance@Id`.
    pub identifier: String,
    pub individual_address: IndividualAddress,
    /// Name given in the project, falling back to the product name.
    pub name: String,
    pub description: String,
    pub project_uid: Option<u32>,
    pub last_modified: Option<String>,
    pub manufacturer_id: String,
    pub manufacturer_name: String,
    pub product_ref: String,
    pub product_name: String,
    pub order_number: String,
    pub hardware_name: String,
    pub hardware2program_ref: String,
    pub application_program_ref: Option<String>,
    pub channels: Vec<Channel>,
    pub communication_object_ids: Vec<String>,
    pub additional_addresses: Vec<IndividualAddress>,
    pub completeness: Completeness,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub identifier: String,
    pub name: String,
    pub communication_object_ids: Vec<String>,
}

/// Module association of a communication object instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleInstanceInfo {
    /// Module definition (e.g. `MD-1`).
    pub definition: String,
    /// `ComObject@Number` before the module base number was added.
    pub root_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommunicationObjectInstance {
    pub identifier: String,
    pub device_address: IndividualAddress,
    pub application_program_ref: Option<String>,
    /// `ComObjectInstanceRef@RefId` as written in the project.
    pub instance_ref_id: String,
    pub com_object_ref_id: Option<String>,
    pub com_object_id: Option<String>,
    pub number: u32,
    pub name: String,
    pub text: String,
    pub function_text: String,
    pub description: String,
    pub object_size: String,
    pub flags: ComObjectFlags,
    pub dpts: Vec<DatapointType>,
    pub channel: Option<String>,
    pub module: Option<ModuleInstanceInfo>,
    /// Formatted group addresses this object sends to.
    pub send_group_addresses: Vec<String>,
    /// Formatted group addresses this object listens to.
    pub listen_group_addresses: Vec<String>,
    /// `send` followed by `listen`, duplicates preserved.
    pub group_address_links: Vec<String>,
    /// `false` if the template chain could not be resolved.
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupAddress {
    /// `GroupAddress@Id` without the project prefix (e.g. `GA-1`).
    pub identifier: String,
    pub raw_address: u16,
    pub address: String,
    pub name: String,
    pub description: String,
    pub comment: String,
    pub dpt: Option<DatapointType>,
    pub central: bool,
    pub data_secure: bool,
    pub project_uid: Option<u32>,
    pub communication_object_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupRange {
    pub name: String,
    pub address: String,
    pub range_start: u16,
    pub range_end: u16,
    pub comment: String,
    /// Formatted addresses directly contained in this range.
    pub group_addresses: Vec<String>,
    pub group_ranges: BTreeMap<String, GroupRange>,
}

/// Type of a location node (`Space@Type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SpaceType {
    Building,
    BuildingPart,
    Floor,
    Room,
    DistributionBoard,
    Stairway,
    Corridor,
    Area,
    Ground,
    Segment,
    Unknown,
}

impl SpaceType {
    pub fn from_attr(value: &str) -> Self {
        match value {
            "Building" => SpaceType::Building,
            "BuildingPart" => SpaceType::BuildingPart,
            "Floor" => SpaceType::Floor,
            "Room" => SpaceType::Room,
            "DistributionBoard" => SpaceType::DistributionBoard,
            "Stairway" => SpaceType::Stairway,
            "Corridor" => SpaceType::Corridor,
            "Area" => SpaceType::Area,
            "Ground" => SpaceType::Ground,
            "Segment" => SpaceType::Segment,
            _ => SpaceType::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Space {
    pub identifier: String,
    pub name: String,
    pub space_type: SpaceType,
    pub usage_id: Option<String>,
    pub usage_text: String,
    pub number: String,
    pub description: String,
    pub project_uid: Option<u32>,
    pub devices: Vec<IndividualAddress>,
    pub spaces: Vec<Space>,
    /// Identifiers of the functions declared in this space.
    pub functions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Function {
    pub identifier: String,
    pub name: String,
    pub function_type: String,
    pub usage_text: String,
    pub project_uid: Option<u32>,
    pub space_id: String,
    pub group_addresses: Vec<GroupAddressRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupAddressRef {
    pub identifier: String,
    pub ref_id: String,
    pub name: String,
    pub role: String,
    pub project_uid: Option<u32>,
    /// Formatted address, `None` if the referenced address does not exist.
    pub address: Option<String>,
}

/// Datapoint type metadata from the master data, or from the standard
/// catalog if the master data does not declare it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatapointTypeInfo {
    pub dpt: DatapointType,
    pub name: String,
    pub text: String,
    pub unit: Option<String>,
    pub size_in_bit: Option<u32>,
}

// --- Parameter types ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterType {
    pub identifier: String,
    pub name: String,
    pub kind: ParameterTypeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumerationValue {
    pub value: i64,
    pub text: String,
    pub identifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterTypeKind {
    Number {
        size_in_bit: u32,
        signed: bool,
        min: Option<i64>,
        max: Option<i64>,
    },
    Float {
        encoding: String,
        size_in_bit: u32,
        min: Option<f64>,
        max: Option<f64>,
    },
    Enumeration {
        size_in_bit: u32,
        values: Vec<EnumerationValue>,
    },
    Text {
        size_in_bit: u32,
    },
    Time {
        size_in_bit: u32,
        unit: Option<String>,
    },
    Date,
    IpAddress {
        version: String,
    },
    Color {
        space: String,
    },
    RawData {
        max_size: u32,
    },
    Picture {
        ref_id: Option<String>,
    },
    None,
    /// A restriction element this library does not know.
    Unsupported {
        element: String,
    },
}

impl ParameterTypeKind {
    /// Width of a value of this type in memory, if it has one.
    pub fn size_in_bit(&self) -> Option<u32> {
        match self {
            ParameterTypeKind::Number { size_in_bit, .. }
            | ParameterTypeKind::Float { size_in_bit, .. }
            | ParameterTypeKind::Enumeration { size_in_bit, .. }
            | ParameterTypeKind::Text { size_in_bit }
            | ParameterTypeKind::Time { size_in_bit, .. } => Some(*size_in_bit),
            ParameterTypeKind::Date => Some(24),
            ParameterTypeKind::IpAddress { version } if version == "IPv6" => Some(128),
            ParameterTypeKind::IpAddress { .. } => Some(32),
            ParameterTypeKind::Color { space } if space == "RGBW" => Some(32),
            ParameterTypeKind::Color { .. } => Some(24),
            ParameterTypeKind::RawData { max_size } => max_size.checked_mul(8),
            ParameterTypeKind::Picture { .. } | ParameterTypeKind::None => Some(0),
            ParameterTypeKind::Unsupported { .. } => None,
        }
    }
}

// --- Memory layout ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Absolute,
    Relative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemorySegment {
    pub identifier: String,
    pub kind: SegmentKind,
    /// Resolved start address. Relative segments are addressed within their
    /// load state machine.
    pub address: u32,
    pub size: u32,
    pub user_memory: bool,
    pub load_state_machine: Option<u32>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryPlacement {
    pub segment_id: String,
    /// Byte offset from the start of the segment.
    pub byte_offset: u32,
    /// Bit offset within the byte, 0 is the most significant bit.
    pub bit_offset: u8,
    pub bit_width: u32,
}

impl MemoryPlacement {
    /// Reads the raw bits of this placement out of a segment image.
    ///
    /// Returns `None` if the placement exceeds the image or is wider than
    /// 64 bits.
    pub fn extract(&self, image: &[u8]) -> Option<u64> {
        if self.bit_width > 64 {
            return None;
        }
        let start = self.byte_offset as usize * 8 + self.bit_offset as usize;
        let end = start + self.bit_width as usize;
        if end > image.len() * 8 {
            return None;
        }
        let mut value = 0u64;
        for position in start..end {
            let byte = image[position / 8];
            let bit = (byte >> (7 - position % 8)) & 1;
            value = (value << 1) | u64::from(bit);
        }
        Some(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyPlacement {
    pub object_index: Option<u32>,
    pub object_type: Option<u32>,
    pub property_id: u32,
    pub offset: u32,
    pub bit_offset: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Placement {
    Memory(MemoryPlacement),
    Property(PropertyPlacement),
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolutionStatus {
    Resolved,
    Unresolved { reasons: Vec<String> },
}

impl ResolutionStatus {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolutionStatus::Resolved)
    }
}

/// One member of the union a parameter belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnionAlternative {
    pub parameter_id: String,
    pub type_id: String,
    pub default: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ParameterAccess {
    None,
    Read,
    #[default]
    ReadWrite,
}

impl ParameterAccess {
    pub fn from_attr(value: Option<&str>) -> Self {
        match value {
            Some("None") => ParameterAccess::None,
            Some("Read") => ParameterAccess::Read,
            _ => ParameterAccess::ReadWrite,
        }
    }
}

/// A parameter value decoded against its type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Enumeration {
        value: i64,
        text: String,
    },
    Text(String),
    #[serde(serialize_with = "serialize_hex")]
    Raw(Vec<u8>),
}

fn serialize_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode_upper(bytes))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedParameter {
    /// Identifier of this parameter instance. Module parameters carry the
    /// module instance in place of the module definition.
    pub identifier: String,
    /// Identifier of the declaring `Parameter` element.
    pub definition_id: String,
    pub name: String,
    pub text: String,
    pub type_id: String,
    pub bit_width: Option<u32>,
    pub default_value: Option<String>,
    pub value: Option<String>,
    pub decoded_value: Option<ParameterValue>,
    pub access: ParameterAccess,
    pub placement: Placement,
    pub union_alternatives: Vec<UnionAlternative>,
    pub module_instance: Option<String>,
    pub warnings: Vec<String>,
    pub status: ResolutionStatus,
}

/// The resolved memory map of one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceParameterization {
    pub device_address: IndividualAddress,
    pub application_program_ref: String,
    pub segments: Vec<MemorySegment>,
    pub parameters: Vec<ResolvedParameter>,
}

// --- Product descriptions ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductDescription {
    pub manufacturer_id: String,
    pub manufacturer_name: String,
    pub hardware: Vec<HardwareInfo>,
    pub application_programs: BTreeMap<String, ProgramParameterization>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HardwareInfo {
    pub identifier: String,
    pub name: String,
    pub serial_number: String,
    pub version_number: Option<u32>,
    pub products: Vec<ProductInfo>,
    pub application_program_refs: Vec<String>,
    /// Media supported by any of the hardware's program assignments.
    pub medium_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductInfo {
    pub identifier: String,
    pub text: String,
    pub order_number: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DialectKind {
    Classic,
    ModuleBased,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramParameterization {
    pub identifier: String,
    pub name: String,
    pub application_number: Option<u32>,
    pub application_version: Option<u32>,
    pub program_type: String,
    pub mask_version: String,
    pub default_language: Option<String>,
    pub dialect: DialectKind,
    pub segments: Vec<MemorySegment>,
    pub parameter_types: BTreeMap<String, ParameterType>,
    pub parameters: Vec<ResolvedParameter>,
    pub parameter_blocks: Vec<ParameterBlockInfo>,
    pub channels: Vec<ProgramChannel>,
    pub com_objects: Vec<ComObjectInfo>,
    /// `ComObjectRef`s made visible by the dynamic section of the program.
    pub dynamic_com_object_refs: Vec<String>,
}

/// A `ParameterBlock` of a dynamic section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterBlockInfo {
    pub identifier: String,
    pub name: String,
    pub text: String,
    pub channel: Option<String>,
    pub parameter_refs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramChannel {
    pub identifier: String,
    pub name: String,
    pub number: String,
    pub text: String,
    pub parameter_blocks: Vec<String>,
}

/// A communication object template with its `ComObjectRef` applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComObjectInfo {
    /// `ComObjectRef@Id`.
    pub identifier: String,
    pub com_object_id: String,
    pub number: u32,
    pub name: String,
    pub text: String,
    pub function_text: String,
    pub object_size: String,
    pub flags: ComObjectFlags,
    pub dpts: Vec<DatapointType>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_msb_first() {
        // 0b1010_0110, 0b1100_0000
        let image = [0xA6, 0xC0];
        let bit = |byte_offset, bit_offset, bit_width| MemoryPlacement {
            segment_id: "RS-1".to_string(),
            byte_offset,
            bit_offset,
            bit_width,
        };
        assert_eq!(bit(0, 0, 1).extract(&image), Some(1));
        assert_eq!(bit(0, 1, 1).extract(&image), Some(0));
        assert_eq!(bit(0, 3, 5).extract(&image), Some(0b00110));
        // Carries into the next byte.
        assert_eq!(bit(0, 6, 4).extract(&image), Some(0b1011));
        assert_eq!(bit(1, 0, 8).extract(&image), Some(0xC0));
        assert_eq!(bit(1, 4, 8).extract(&image), None);
    }

    #[test]
    fn test_type_widths() {
        let ipv6 = ParameterTypeKind::IpAddress {
            version: "IPv6".to_string(),
        };
        assert_eq!(ipv6.size_in_bit(), Some(128));
        assert_eq!(ParameterTypeKind::RawData { max_size: 4 }.size_in_bit(), Some(32));
        assert_eq!(ParameterTypeKind::RawData { max_size: u32::MAX }.size_in_bit(), None);
        assert_eq!(ParameterTypeKind::Date.size_in_bit(), Some(24));
        let unsupported = ParameterTypeKind::Unsupported {
            element: "TypeFoo".to_string(),
        };
        assert_eq!(unsupported.size_in_bit(), None);
    }

    #[test]
    fn test_completeness_from_gaps() {
        assert!(Completeness::from_gaps(Vec::new()).is_complete());
        assert_eq!(
            Completeness::from_gaps(vec!["missing product".to_string()]),
            Completeness::Incomplete {
                gaps: vec!["missing product".to_string()]
            }
        );
    }
}
