// crates/knxproj-rs-xml/src/model/hardware.rs

//! Hardware, product and master data definitions.

use crate::error::KnxprojError;
use crate::xml::XmlElement;
use knxproj_rs::DatapointType;

/// `MasterData/Manufacturers/Manufacturer`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ManufacturerDef {
    pub id: String,
    pub name: String,
}

/// `Manufacturer/Hardware/Hardware`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HardwareDef {
    pub id: String,
    pub name: String,
    pub serial_number: String,
    pub version_number: Option<u32>,
    pub manufacturer_id: String,
    pub products: Vec<ProductDef>,
    pub hardware2programs: Vec<Hardware2ProgramDef>,
}

/// `Hardware/Products/Product`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProductDef {
    pub id: String,
    pub hardware_id: String,
    pub text: String,
    pub order_number: String,
}

/// `Hardware/Hardware2Programs/Hardware2Program`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Hardware2ProgramDef {
    pub id: String,
    pub hardware_id: String,
    pub application_program_refs: Vec<String>,
    pub medium_types: Vec<String>,
}

/// A master data datapoint type or subtype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DatapointTypeDef {
    pub id: String,
    pub dpt: DatapointType,
    pub name: String,
    pub text: String,
    pub size_in_bit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MediumTypeDef {
    pub id: String,
    pub name: String,
    pub text: String,
}

/// Space usages and function types share their shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TextDef {
    pub id: String,
    pub text: String,
}

impl HardwareDef {
    pub(crate) fn from_element(el: &XmlElement, manufacturer_id: &str) -> Result<Self, KnxprojError> {
        let id = el.attr_or_empty("Id").to_string();
        let products = el
            .find_all(&["Products", "Product"])
            .into_iter()
            .map(|p| ProductDef {
                id: p.attr_or_empty("Id").to_string(),
                hardware_id: id.clone(),
                text: p.attr_or_empty("Text").to_string(),
                order_number: p.attr_or_empty("OrderNumber").to_string(),
            })
            .collect();
        let hardware2programs = el
            .find_all(&["Hardware2Programs", "Hardware2Program"])
            .into_iter()
            .map(|h| Hardware2ProgramDef {
                id: h.attr_or_empty("Id").to_string(),
                hardware_id: id.clone(),
                application_program_refs: h
                    .children_named("ApplicationProgramRef")
                    .filter_map(|r| r.attr_string("RefId"))
                    .collect(),
                medium_types: h
                    .attr("MediumTypes")
                    .map(|m| m.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default(),
            })
            .collect();

        Ok(HardwareDef {
            name: el.attr_or_empty("Name").to_string(),
            serial_number: el.attr_or_empty("SerialNumber").to_string(),
            version_number: el.parse_attr("VersionNumber")?,
            manufacturer_id: manufacturer_id.to_string(),
            products,
            hardware2programs,
            id,
        })
    }
}

/// Parses a `DatapointType` together with its `DatapointSubtypes`.
pub(crate) fn parse_datapoint_type(el: &XmlElement) -> Result<Vec<DatapointTypeDef>, KnxprojError> {
    let main: u16 = el.parse_attr("Number")?.unwrap_or_default();
    let size_in_bit: Option<u32> = el.parse_attr("SizeInBit")?;
    let mut result = vec![DatapointTypeDef {
        id: el.attr_or_empty("Id").to_string(),
        dpt: DatapointType::new(main, None),
        name: el.attr_or_empty("Name").to_string(),
        text: el.attr_or_empty("Text").to_string(),
        size_in_bit,
    }];
    for sub in el.find_all(&["DatapointSubtypes", "DatapointSubtype"]) {
        let number: u16 = sub.parse_attr("Number")?.unwrap_or_default();
        result.push(DatapointTypeDef {
            id: sub.attr_or_empty("Id").to_string(),
            dpt: DatapointType::new(main, Some(number)),
            name: sub.attr_or_empty("Name").to_string(),
            text: sub.attr_or_empty("Text").to_string(),
            size_in_bit,
        });
    }
    Ok(result)
}
