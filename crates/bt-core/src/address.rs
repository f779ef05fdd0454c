//! Bluetooth device address.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A 6-byte Bluetooth device address.
///
/// Bytes are stored in display order, so `AA:BB:CC:DD:EE:FF` is
/// `[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]`. On the wire and in parcels the
/// address is copied verbatim; in JSON it serializes as the colon string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BtAddress([u8; 6]);

impl BtAddress {
    /// The all-zero address. Used as the target of broadcast messages.
    pub const ANY: BtAddress = BtAddress([0; 6]);

    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_any(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl From<[u8; 6]> for BtAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for BtAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Error returned when an address string is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid bluetooth address: {0}")]
pub struct AddressParseError(pub String);

impl FromStr for BtAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');

        for slot in bytes.iter_mut() {
            let part = parts
                .next()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| AddressParseError(s.to_string()))?;
            *slot = u8::from_str_radix(part, 16).map_err(|_| AddressParseError(s.to_string()))?;
        }

        if parts.next().is_some() {
            return Err(AddressParseError(s.to_string()));
        }

        Ok(Self(bytes))
    }
}

impl Serialize for BtAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BtAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
