//! Profile-level state values reported to listeners.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a profile runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileId {
    /// Hands-free audio gateway.
    HfpAg,
    /// Hands-free unit.
    HfpHf,
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileId::HfpAg => write!(f, "hfp-ag"),
            ProfileId::HfpHf => write!(f, "hfp-hf"),
        }
    }
}

/// Connection state of one remote device as seen by a profile.
///
/// The declaration order is significant: `Connecting < Connected` and a
/// session "counts" toward the connection ceiling when it is `Connecting`
/// or at least `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ProfileConnectionState {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Disconnected),
            1 => Some(Self::Connecting),
            2 => Some(Self::Connected),
            3 => Some(Self::Disconnecting),
            _ => None,
        }
    }
}

/// Audio (SCO) path state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl AudioState {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Disconnected),
            1 => Some(Self::Connecting),
            2 => Some(Self::Connected),
            3 => Some(Self::Disconnecting),
            _ => None,
        }
    }
}

/// Reason attached to a stack-reported connection state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionReason {
    #[default]
    Unspecified,
    /// Both sides initiated a connection at the same time.
    Collision,
    RemoteTerminated,
    LocalTerminated,
    Timeout,
    /// The stack rejected or failed the request.
    Failure,
}

/// Whether a remote device may connect this profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPolicy {
    Allowed,
    Forbidden,
    #[default]
    Unknown,
}

impl ConnectionPolicy {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Allowed),
            1 => Some(Self::Forbidden),
            2 => Some(Self::Unknown),
            _ => None,
        }
    }
}
