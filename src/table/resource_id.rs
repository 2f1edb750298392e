//! Stable identifier of a resource table entry.
//! Laid out as `0xPPTTEEEE`: package id, type id and entry index.

use std::fmt;
use std::fmt::{Debug, Formatter};
use std::hash::Hash;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use serde_hex::{SerHex, StrictPfx};

#[derive(Error, Debug)]
pub enum ResourceIdError {
    #[error("{:#010x} can't represent a valid resource id", _0)]
    InvalidId(u32),

    #[error("Cannot parse {} to a resource id", _0)]
    ParseError(String),
}

/// Represents a resource identifier.
#[derive(Default, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResourceId {
    #[cfg_attr(feature = "serde", serde(with = "SerHex::<StrictPfx>"))]
    id: u32,
}

impl PartialEq<u32> for ResourceId {
    fn eq(&self, other: &u32) -> bool {
        self.id == *other
    }
}

impl From<u32> for ResourceId {
    fn from(value: u32) -> Self {
        ResourceId { id: value }
    }
}

impl From<ResourceId> for u32 {
    fn from(value: ResourceId) -> Self {
        value.id
    }
}

impl ResourceId {
    /// Builds an id out of its three components.
    ///
    /// # Arguments
    /// * `package` - The package id (0x7f for applications, 0x01 for the framework)
    /// * `type_id` - The 1-based type id inside the package
    /// * `entry` - The entry index inside the type
    pub fn new(package: u8, type_id: u8, entry: u16) -> Self {
        Self {
            id: (package as u32) << 24 | (type_id as u32) << 16 | entry as u32,
        }
    }

    pub fn package(&self) -> u8 {
        (self.id >> 24) as u8
    }

    pub fn type_id(&self) -> u8 {
        (self.id >> 16) as u8
    }

    pub fn entry(&self) -> u16 {
        self.id as u16
    }

    pub fn value(&self) -> u32 {
        self.id
    }

    /// A valid id always has a package and a type component.
    pub fn is_valid(&self) -> bool {
        self.package() != 0 && self.type_id() != 0
    }

    pub fn to_hex_string(&self) -> String {
        format!("0x{:08x}", self.id)
    }

    /// Create ResourceId from hexadecimal string
    /// Also accepts 0x prefixed strings
    pub fn from_hex_string(hex_string: &str) -> Result<Self, ResourceIdError> {
        let hex_string = if let Some(hex_string) = hex_string.strip_prefix("0x") {
            hex_string
        } else {
            hex_string
        };

        match u32::from_str_radix(hex_string, 16) {
            Ok(num) => {
                let id = ResourceId { id: num };
                if !id.is_valid() {
                    Err(ResourceIdError::InvalidId(num))
                } else {
                    Ok(id)
                }
            }
            Err(_) => Err(ResourceIdError::ParseError(hex_string.to_string())),
        }
    }
}

impl Debug for ResourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex_string())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_components() {
        let id = ResourceId::new(0x7f, 0x02, 0x0013);
        assert_eq!(id, 0x7f020013);
        assert_eq!(id.package(), 0x7f);
        assert_eq!(id.type_id(), 0x02);
        assert_eq!(id.entry(), 0x13);
        assert_eq!(id.to_hex_string(), "0x7f020013");
    }

    #[test]
    fn test_resource_id_from_hex() {
        assert_eq!(
            ResourceId::from_hex_string("0x01010000").unwrap(),
            0x01010000
        );
        assert_eq!(ResourceId::from_hex_string("7f0b0001").unwrap(), 0x7f0b0001);
        assert!(ResourceId::from_hex_string("0x00000001").is_err());
        assert!(ResourceId::from_hex_string("zz").is_err());
    }
}
