//! Protocol version negotiated in the socket handshake.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Wire protocol version, `major.minor`.
///
/// Peers interoperate when their major versions match. Minor bumps only add
/// opcodes or optional fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    pub const CURRENT: ProtocolVersion = ProtocolVersion { major: 1, minor: 0 };

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub fn is_compatible_with(&self, other: &ProtocolVersion) -> bool {
        self.major == other.major
    }

    /// Fails with [`VersionError::Incompatible`] when majors differ.
    pub fn check(&self, peer: &ProtocolVersion) -> Result<(), VersionError> {
        if self.is_compatible_with(peer) {
            Ok(())
        } else {
            Err(VersionError::Incompatible {
                got: *peer,
                expected: *self,
            })
        }
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ProtocolVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionError::InvalidFormat(s.to_string());
        let (major, minor) = s.split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version format: {0}")]
    InvalidFormat(String),

    #[error("Incompatible protocol version: got {got}, expected {expected}")]
    Incompatible {
        got: ProtocolVersion,
        expected: ProtocolVersion,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() {
        let v: ProtocolVersion = "1.3".parse().unwrap();
        assert_eq!(v, ProtocolVersion::new(1, 3));
        assert!("1".parse::<ProtocolVersion>().is_err());
        assert!("1.0.0".parse::<ProtocolVersion>().is_err());
        assert!("x.y".parse::<ProtocolVersion>().is_err());
    }

    #[test]
    fn test_major_must_match() {
        let v1_0 = ProtocolVersion::new(1, 0);
        assert!(v1_0.check(&ProtocolVersion::new(1, 7)).is_ok());
        assert_eq!(
            v1_0.check(&ProtocolVersion::new(2, 0)),
            Err(VersionError::Incompatible {
                got: ProtocolVersion::new(2, 0),
                expected: v1_0,
            })
        );
    }

    #[test]
    fn test_version_display() {
        assert_eq!(ProtocolVersion::new(1, 2).to_string(), "1.2");
    }
}
