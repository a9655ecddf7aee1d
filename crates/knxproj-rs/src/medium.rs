use core::fmt;
use serde::{Serialize, Serializer};

/// The transmission medium of a line (`MediumTypeRefId`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MediumType {
    /// `MT-0`
    TwistedPair,
    /// `MT-1`
    Powerline,
    /// `MT-2`
    Rf,
    /// `MT-5`
    Ip,
}

impl MediumType {
    /// Maps a master-data medium identifier (e.g. `MT-0`) to its medium.
    pub fn from_ref_id(ref_id: &str) -> Option<Self> {
        match ref_id {
            "MT-0" => Some(MediumType::TwistedPair),
            "MT-1" => Some(MediumType::Powerline),
            "MT-2" => Some(MediumType::Rf),
            "MT-5" => Some(MediumType::Ip),
            _ => None,
        }
    }

    /// Human readable name, used when master data carries no text.
    pub fn name(&self) -> &'static str {
        match self {
            MediumType::TwistedPair => "Twisted Pair (TP)",
            MediumType::Powerline => "Powerline (PL)",
            MediumType::Rf => "KNX RF (RF)",
            MediumType::Ip => "KNXnet/IP (IP)",
        }
    }
}

impl fmt::Display for MediumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for MediumType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}
