//! Datapoint types (DPT) and the standard datapoint type catalog.

use alloc::vec::Vec;
use core::fmt;
use log::warn;
use serde::Serialize;

/// Prefix of a main-type-only identifier (`DPT-9`).
pub const MAIN_DPT_PREFIX: &str = "DPT";
/// Prefix of a main-and-sub-type identifier (`DPST-9-1`).
pub const MAIN_AND_SUB_DPT_PREFIX: &str = "DPST";

/// A datapoint type as main number and optional sub number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DatapointType {
    pub main: u16,
    pub sub: Option<u16>,
}

impl DatapointType {
    pub const fn new(main: u16, sub: Option<u16>) -> Self {
        Self { main, sub }
    }

    /// Parses a single ETS identifier such as `DPT-9` or `DPST-9-1`.
    pub fn parse(identifier: &str) -> Option<Self> {
        let mut parts = identifier.split('-');
        let prefix = parts.next()?;
        let main = parts.next()?.parse::<u16>().ok()?;
        let dpt = match prefix {
            MAIN_DPT_PREFIX => Self::new(main, None),
            MAIN_AND_SUB_DPT_PREFIX => Self::new(main, Some(parts.next()?.parse::<u16>().ok()?)),
            _ => return None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(dpt)
    }

    /// Infers a main type from a `ComObject@ObjectSize` value.
    ///
    /// Only sizes with a single plausible main type are mapped; 2 bit objects
    /// map to DPT 2 even though DPT 23 shares that size.
    pub fn from_object_size(object_size: &str) -> Option<Self> {
        match object_size {
            "1 Bit" => Some(Self::new(1, None)),
            "2 Bit" => Some(Self::new(2, None)),
            "4 Bit" => Some(Self::new(3, None)),
            _ => None,
        }
    }

    /// Looks up catalog metadata, preferring the exact subtype and falling back
    /// to the main type entry.
    pub fn info(&self) -> Option<&'static DptInfo> {
        STANDARD_DPTS
            .iter()
            .find(|i| i.main == self.main && i.sub == self.sub)
            .or_else(|| {
                STANDARD_DPTS
                    .iter()
                    .find(|i| i.main == self.main && i.sub.is_none())
            })
    }
}

impl fmt::Display for DatapointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sub {
            Some(sub) => write!(f, "{}.{:03}", self.main, sub),
            None => write!(f, "{}", self.main),
        }
    }
}

/// Parses a whitespace separated `DatapointType` attribute.
///
/// Order is preserved and repeated identifiers are dropped. Identifiers that
/// cannot be parsed are logged and skipped.
pub fn parse_dpt_types(value: Option<&str>) -> Vec<DatapointType> {
    let mut result: Vec<DatapointType> = Vec::new();
    let Some(value) = value else {
        return result;
    };
    for identifier in value.split_whitespace() {
        match DatapointType::parse(identifier) {
            Some(dpt) if !result.contains(&dpt) => result.push(dpt),
            Some(_) => {}
            None => warn!(
                "Could not parse DatapointType from: \"{}\" in \"{}\"",
                identifier, value
            ),
        }
    }
    result
}

/// Static metadata of a standard datapoint type.
#[derive(Debug, PartialEq, Eq)]
pub struct DptInfo {
    pub main: u16,
    pub sub: Option<u16>,
    pub name: &'static str,
    pub unit: Option<&'static str>,
    pub size_in_bit: u16,
}

const fn dpt(
    main: u16,
    sub: Option<u16>,
    name: &'static str,
    unit: Option<&'static str>,
    size_in_bit: u16,
) -> DptInfo {
    DptInfo {
        main,
        sub,
        name,
        unit,
        size_in_bit,
    }
}

/// The standard datapoint types most commonly found in projects.
/// (Reference: KNX Standard 03.07.02 Datapoint Types)
pub static STANDARD_DPTS: &[DptInfo] = &[
    dpt(1, None, "1-bit", None, 1),
    dpt(1, Some(1), "switch", None, 1),
    dpt(1, Some(2), "bool", None, 1),
    dpt(1, Some(3), "enable", None, 1),
    dpt(1, Some(5), "alarm", None, 1),
    dpt(1, Some(7), "step", None, 1),
    dpt(1, Some(8), "up_down", None, 1),
    dpt(1, Some(9), "open_close", None, 1),
    dpt(1, Some(10), "start", None, 1),
    dpt(1, Some(11), "state", None, 1),
    dpt(1, Some(17), "trigger", None, 1),
    dpt(1, Some(18), "occupancy", None, 1),
    dpt(1, Some(19), "window_door", None, 1),
    dpt(1, Some(24), "day_night", None, 1),
    dpt(2, None, "1-bit controlled", None, 2),
    dpt(2, Some(1), "switch_control", None, 2),
    dpt(3, None, "3-bit controlled", None, 4),
    dpt(3, Some(7), "control_dimming", None, 4),
    dpt(3, Some(8), "control_blinds", None, 4),
    dpt(4, None, "character", None, 8),
    dpt(4, Some(1), "char_ascii", None, 8),
    dpt(5, None, "8-bit unsigned value", None, 8),
    dpt(5, Some(1), "percent", Some("%"), 8),
    dpt(5, Some(3), "angle", Some("°"), 8),
    dpt(5, Some(4), "percent_u8", Some("%"), 8),
    dpt(5, Some(10), "pulse", None, 8),
    dpt(6, None, "8-bit signed value", None, 8),
    dpt(6, Some(1), "percent_v8", Some("%"), 8),
    dpt(6, Some(10), "value_1_count", None, 8),
    dpt(7, None, "2-octet unsigned value", None, 16),
    dpt(7, Some(1), "pulse_2byte", None, 16),
    dpt(7, Some(5), "time_period_sec", Some("s"), 16),
    dpt(7, Some(600), "color_temperature", Some("K"), 16),
    dpt(8, None, "2-octet signed value", None, 16),
    dpt(8, Some(1), "pulse_2byte_signed", None, 16),
    dpt(9, None, "2-octet float value", None, 16),
    dpt(9, Some(1), "temperature", Some("°C"), 16),
    dpt(9, Some(2), "temperature_difference", Some("K"), 16),
    dpt(9, Some(4), "illuminance", Some("lx"), 16),
    dpt(9, Some(5), "wind_speed_ms", Some("m/s"), 16),
    dpt(9, Some(6), "pressure_2byte", Some("Pa"), 16),
    dpt(9, Some(7), "humidity", Some("%"), 16),
    dpt(9, Some(8), "ppm", Some("ppm"), 16),
    dpt(9, Some(20), "voltage", Some("mV"), 16),
    dpt(9, Some(21), "current", Some("mA"), 16),
    dpt(9, Some(24), "power_2byte", Some("kW"), 16),
    dpt(10, None, "time", None, 24),
    dpt(10, Some(1), "time_of_day", None, 24),
    dpt(11, None, "date", None, 24),
    dpt(11, Some(1), "date", None, 24),
    dpt(12, None, "4-octet unsigned value", None, 32),
    dpt(12, Some(1), "counter_pulses_u32", None, 32),
    dpt(13, None, "4-octet signed value", None, 32),
    dpt(13, Some(1), "counter_pulses", None, 32),
    dpt(13, Some(10), "active_energy", Some("Wh"), 32),
    dpt(13, Some(13), "active_energy_kwh", Some("kWh"), 32),
    dpt(14, None, "4-octet float value", None, 32),
    dpt(14, Some(19), "electric_current", Some("A"), 32),
    dpt(14, Some(27), "electric_potential", Some("V"), 32),
    dpt(14, Some(56), "power", Some("W"), 32),
    dpt(16, None, "character string", None, 112),
    dpt(16, Some(0), "string", None, 112),
    dpt(16, Some(1), "latin_1", None, 112),
    dpt(17, None, "scene number", None, 8),
    dpt(17, Some(1), "scene_number", None, 8),
    dpt(18, None, "scene control", None, 8),
    dpt(18, Some(1), "scene_control", None, 8),
    dpt(19, None, "date time", None, 64),
    dpt(19, Some(1), "datetime", None, 64),
    dpt(20, None, "1-octet enumeration", None, 8),
    dpt(20, Some(102), "hvac_mode", None, 8),
    dpt(20, Some(105), "hvac_controller_mode", None, 8),
    dpt(232, None, "3-octet colour RGB", None, 24),
    dpt(232, Some(600), "colour_rgb", None, 24),
    dpt(251, None, "6-octet colour RGBW", None, 48),
    dpt(251, Some(600), "colour_rgbw", None, 48),
];

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    #[test]
    fn test_parse_identifiers() {
        assert_eq!(DatapointType::parse("DPT-9"), Some(DatapointType::new(9, None)));
        assert_eq!(
            DatapointType::parse("DPST-9-1"),
            Some(DatapointType::new(9, Some(1)))
        );
        assert_eq!(DatapointType::parse("DPST-9"), None);
        assert_eq!(DatapointType::parse("XYZ-1-1"), None);
        assert_eq!(DatapointType::parse("DPST-1-1-1"), None);
    }

    #[test]
    fn test_parse_list_dedups_in_order() {
        let dpts = parse_dpt_types(Some("DPST-1-1 DPT-5 DPST-1-1 broken DPST-5-1"));
        assert_eq!(
            dpts,
            vec![
                DatapointType::new(1, Some(1)),
                DatapointType::new(5, None),
                DatapointType::new(5, Some(1)),
            ]
        );
        assert!(parse_dpt_types(None).is_empty());
        assert!(parse_dpt_types(Some("")).is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(DatapointType::new(9, Some(1)).to_string(), "9.001");
        assert_eq!(DatapointType::new(232, Some(600)).to_string(), "232.600");
        assert_eq!(DatapointType::new(1, None).to_string(), "1");
    }

    #[test]
    fn test_catalog_lookup_falls_back_to_main() {
        let info = DatapointType::new(9, Some(1)).info().unwrap();
        assert_eq!(info.unit, Some("°C"));
        let generic = DatapointType::new(9, Some(99)).info().unwrap();
        assert_eq!(generic.sub, None);
        assert_eq!(generic.size_in_bit, 16);
        assert!(DatapointType::new(999, None).info().is_none());
    }

    #[test]
    fn test_from_object_size() {
        assert_eq!(
            DatapointType::from_object_size("1 Bit"),
            Some(DatapointType::new(1, None))
        );
        assert_eq!(
            DatapointType::from_object_size("4 Bit"),
            Some(DatapointType::new(3, None))
        );
        assert_eq!(DatapointType::from_object_size("2 Bytes"), None);
    }
}
