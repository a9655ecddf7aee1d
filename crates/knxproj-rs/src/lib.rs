#![cfg_attr(not(feature = "std"), no_std)]

// 'alloc' is used for owned strings and datapoint type lists
extern crate alloc;

// --- Addressing ---
pub mod types;
pub mod medium;

// --- Application Layer Vocabulary ---
pub mod dpt;
pub mod flags;

// --- Top-level Exports ---
pub use dpt::{DatapointType, DptInfo, STANDARD_DPTS};
pub use flags::{ComObjectFlags, FlagOverrides};
pub use medium::MediumType;
pub use types::{AddressError, GroupAddress, GroupAddressStyle, IndividualAddress};
