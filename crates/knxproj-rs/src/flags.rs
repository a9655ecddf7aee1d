use serde::Serialize;

/// The resolved communication flags of a group object.
/// (Reference: KNX Standard 03.03.07, Application Layer group object flags)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ComObjectFlags {
    pub read: bool,
    pub write: bool,
    pub communication: bool,
    pub transmit: bool,
    pub update: bool,
    pub read_on_init: bool,
}

/// A partially specified flag set, as declared on one level of the
/// `ComObjectInstanceRef` > `ComObjectRef` > `ComObject` chain.
///
/// `None` means "not declared here"; the value is then inherited from the
/// next level. Each flag is inherited independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagOverrides {
    pub read: Option<bool>,
    pub write: Option<bool>,
    pub communication: Option<bool>,
    pub transmit: Option<bool>,
    pub update: Option<bool>,
    pub read_on_init: Option<bool>,
}

/// Parses an `Enable_t` attribute value (`Enabled` / `Disabled`).
pub fn parse_enable(value: Option<&str>) -> Option<bool> {
    value.map(|v| v == "Enabled")
}

impl FlagOverrides {
    /// Fills every undeclared flag of `self` from `parent`.
    pub fn or(self, parent: Self) -> Self {
        Self {
            read: self.read.or(parent.read),
            write: self.write.or(parent.write),
            communication: self.communication.or(parent.communication),
            transmit: self.transmit.or(parent.transmit),
            update: self.update.or(parent.update),
            read_on_init: self.read_on_init.or(parent.read_on_init),
        }
    }

    /// Resolves the chain against the type default (all flags off).
    pub fn resolve(self) -> ComObjectFlags {
        ComObjectFlags {
            read: self.read.unwrap_or(false),
            write: self.write.unwrap_or(false),
            communication: self.communication.unwrap_or(false),
            transmit: self.transmit.unwrap_or(false),
            update: self.update.unwrap_or(false),
            read_on_init: self.read_on_init.unwrap_or(false),
        }
    }
}
