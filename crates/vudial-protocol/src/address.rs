use crate::error::InvalidParameter;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a dial on the hub's I2C bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DialAddress(u8);

impl DialAddress {
    /// Highest bus position a hub can address.
    pub const MAX: u8 = 7;

    pub fn new(index: u8) -> Result<Self, InvalidParameter> {
        if index > Self::MAX {
            return Err(InvalidParameter::new(
                "dial",
                format!("{index} is outside 0..={}", Self::MAX),
            ));
        }
        Ok(Self(index))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = DialAddress> {
        (0..=Self::MAX).map(DialAddress)
    }
}

impl TryFrom<u8> for DialAddress {
    type Error = InvalidParameter;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DialAddress> for u8 {
    fn from(value: DialAddress) -> Self {
        value.0
    }
}

impl fmt::Display for DialAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
