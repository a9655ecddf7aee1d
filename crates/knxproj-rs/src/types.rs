use alloc::format;
use alloc::string::{String, ToString};
use core::convert::TryFrom;
use core::fmt;
use core::str::FromStr;
use serde::{Serialize, Serializer};

// --- Address Layout Constants (KNX Standard 03.03.02) ---

/// Highest area number of an individual address (4 bits).
pub const MAX_AREA: u8 = 0x0F;
/// Highest line number of an individual address (4 bits).
pub const MAX_LINE: u8 = 0x0F;

/// Mask of the main group in a three-level group address (5 bits).
pub const GA_MAIN_MASK: u16 = 0xF800;
/// Mask of the middle group in a three-level group address (3 bits).
pub const GA_MIDDLE_MASK: u16 = 0x0700;
/// Mask of the sub group in a three-level group address (8 bits).
pub const GA_SUB_MASK: u16 = 0x00FF;
/// Mask of the sub group in a two-level group address (11 bits).
pub const GA_SUB_MASK_TWO_LEVEL: u16 = 0x07FF;

/// Represents a KNX individual address (`area.line.device`).
///
/// Identifies one physical device on the bus. The area and line are 4-bit
/// values; the device number is a full byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndividualAddress {
    pub area: u8,
    pub line: u8,
    pub device: u8,
}

/// Error type for invalid address creation or parsing.
#[derive(Debug, PartialEq, Eq)]
pub enum AddressError {
    /// Area number is outside 0-15.
    AreaOutOfRange(u16),
    /// Line number is outside 0-15.
    LineOutOfRange(u16),
    /// Device number is outside 0-255.
    DeviceOutOfRange(u16),
    /// Raw group address does not fit 16 bits.
    GroupOutOfRange(u32),
    /// The textual form could not be parsed.
    InvalidFormat(String),
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::AreaOutOfRange(v) => {
                write!(f, "Invalid area {}. Valid range is 0-{}.", v, MAX_AREA)
            }
            AddressError::LineOutOfRange(v) => {
                write!(f, "Invalid line {}. Valid range is 0-{}.", v, MAX_LINE)
            }
            AddressError::DeviceOutOfRange(v) => {
                write!(f, "Invalid device number {}. Valid range is 0-255.", v)
            }
            AddressError::GroupOutOfRange(v) => {
                write!(f, "Invalid raw group address {}. Valid range is 0-65535.", v)
            }
            AddressError::InvalidFormat(s) => write!(f, "Invalid address format: '{}'", s),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AddressError {}

impl IndividualAddress {
    /// Creates an address from its three numeric components.
    pub fn new(area: u16, line: u16, device: u16) -> Result<Self, AddressError> {
        if area > MAX_AREA as u16 {
            return Err(AddressError::AreaOutOfRange(area));
        }
        if line > MAX_LINE as u16 {
            return Err(AddressError::LineOutOfRange(line));
        }
        let device = u8::try_from(device).map_err(|_| AddressError::DeviceOutOfRange(device))?;
        Ok(Self {
            area: area as u8,
            line: line as u8,
            device,
        })
    }

    /// Returns the 16-bit bus representation.
    pub fn raw(&self) -> u16 {
        ((self.area as u16) << 12) | ((self.line as u16) << 8) | self.device as u16
    }
}

impl From<u16> for IndividualAddress {
    fn from(raw: u16) -> Self {
        Self {
            area: (raw >> 12) as u8,
            line: ((raw >> 8) & 0x0F) as u8,
            device: (raw & 0xFF) as u8,
        }
    }
}

impl fmt::Display for IndividualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.area, self.line, self.device)
    }
}

impl FromStr for IndividualAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressError::InvalidFormat(s.to_string());
        let mut parts = s.split('.');
        let mut next = || -> Result<u16, AddressError> {
            parts
                .next()
                .and_then(|p| p.trim().parse::<u16>().ok())
                .ok_or_else(invalid)
        };
        let (area, line, device) = (next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Self::new(area, line, device)
    }
}

impl Serialize for IndividualAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The presentation style of group addresses declared by a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupAddressStyle {
    /// Raw 16-bit number.
    Free,
    /// `main/sub` (5/11 bits).
    TwoLevel,
    /// `main/middle/sub` (5/3/8 bits).
    #[default]
    ThreeLevel,
}

impl GroupAddressStyle {
    /// The attribute value used in `ProjectInformation@GroupAddressStyle`.
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupAddressStyle::Free => "Free",
            GroupAddressStyle::TwoLevel => "TwoLevel",
            GroupAddressStyle::ThreeLevel => "ThreeLevel",
        }
    }
}

impl FromStr for GroupAddressStyle {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Free" => Ok(GroupAddressStyle::Free),
            "TwoLevel" => Ok(GroupAddressStyle::TwoLevel),
            "ThreeLevel" => Ok(GroupAddressStyle::ThreeLevel),
            other => Err(AddressError::InvalidFormat(other.to_string())),
        }
    }
}

impl Serialize for GroupAddressStyle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Represents a raw 16-bit KNX group address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupAddress(pub u16);

impl GroupAddress {
    /// Main group (upper 5 bits).
    pub fn main(&self) -> u16 {
        (self.0 & GA_MAIN_MASK) >> 11
    }

    /// Middle group of the three-level style (3 bits).
    pub fn middle(&self) -> u16 {
        (self.0 & GA_MIDDLE_MASK) >> 8
    }

    /// Sub group of the three-level style (8 bits).
    pub fn sub(&self) -> u16 {
        self.0 & GA_SUB_MASK
    }

    /// Formats the address in the given presentation style.
    pub fn format(&self, style: GroupAddressStyle) -> String {
        match style {
            GroupAddressStyle::Free => format!("{}", self.0),
            GroupAddressStyle::TwoLevel => {
                format!("{}/{}", self.main(), self.0 & GA_SUB_MASK_TWO_LEVEL)
            }
            GroupAddressStyle::ThreeLevel => {
                format!("{}/{}/{}", self.main(), self.middle(), self.sub())
            }
        }
    }

    /// Parses a textual address written in any of the three styles.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let invalid = || AddressError::InvalidFormat(s.to_string());
        let parts = s
            .split('/')
            .map(|p| p.trim().parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<alloc::vec::Vec<u32>, _>>()?;
        let raw = match parts.as_slice() {
            [raw] => *raw,
            [main, sub] if *main <= 0x1F && *sub <= 0x7FF => (*main << 11) | *sub,
            [main, middle, sub] if *main <= 0x1F && *middle <= 0x07 && *sub <= 0xFF => {
                (*main << 11) | (*middle << 8) | *sub
            }
            _ => return Err(invalid()),
        };
        Self::try_from(raw)
    }
}

impl TryFrom<u32> for GroupAddress {
    type Error = AddressError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        u16::try_from(value)
            .map(GroupAddress)
            .map_err(|_| AddressError::GroupOutOfRange(value))
    }
}

impl From<GroupAddress> for u16 {
    fn from(address: GroupAddress) -> Self {
        address.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_individual_address_display_and_parse() {
        let ia = IndividualAddress::new(1, 2, 33).unwrap();
        assert_eq!(ia.to_string(), "1.2.33");
        assert_eq!(ia.raw(), 0x1221);
        assert_eq!("1.2.33".parse::<IndividualAddress>().unwrap(), ia);
        assert_eq!(IndividualAddress::from(0x1221), ia);
    }

    #[test]
    fn test_individual_address_range_checks() {
        assert_eq!(
            IndividualAddress::new(16, 0, 0),
            Err(AddressError::AreaOutOfRange(16))
        );
        assert_eq!(
            IndividualAddress::new(1, 1, 256),
            Err(AddressError::DeviceOutOfRange(256))
        );
        assert!("1.1".parse::<IndividualAddress>().is_err());
        assert!("1.1.1.1".parse::<IndividualAddress>().is_err());
    }

    #[test]
    fn test_individual_address_ordering_is_numeric() {
        let a: IndividualAddress = "1.1.2".parse().unwrap();
        let b: IndividualAddress = "1.1.10".parse().unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_group_address_styles() {
        // 1/2/3 => (1 << 11) | (2 << 8) | 3
        let ga = GroupAddress(2563);
        assert_eq!(ga.format(GroupAddressStyle::ThreeLevel), "1/2/3");
        assert_eq!(ga.format(GroupAddressStyle::TwoLevel), "1/515");
        assert_eq!(ga.format(GroupAddressStyle::Free), "2563");
    }

    #[test]
    fn test_group_address_parse() {
        assert_eq!(GroupAddress::parse("1/2/3").unwrap(), GroupAddress(2563));
        assert_eq!(GroupAddress::parse("1/515").unwrap(), GroupAddress(2563));
        assert_eq!(GroupAddress::parse("2563").unwrap(), GroupAddress(2563));
        assert!(GroupAddress::parse("1/8/3").is_err());
        assert!(GroupAddress::parse("70000").is_err());
        assert!(GroupAddress::parse("a/b").is_err());
    }

    #[test]
    fn test_group_address_style_from_str() {
        assert_eq!(
            "TwoLevel".parse::<GroupAddressStyle>().unwrap(),
            GroupAddressStyle::TwoLevel
        );
        assert!("FourLevel".parse::<GroupAddressStyle>().is_err());
        assert_eq!(GroupAddressStyle::default(), GroupAddressStyle::ThreeLevel);
    }
}
