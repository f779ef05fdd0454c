//! Hands-free profile value types shared by the AG and HF roles.

use serde::{Deserialize, Serialize};

/// Declares a fieldless enum with explicit wire discriminants and
/// `as_u8`/`from_u8` conversions.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($(#[$vmeta:meta])* $variant:ident = $value:expr),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $name {
            pub const fn as_u8(self) -> u8 {
                self as u8
            }

            pub fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $(v if v == $value => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

wire_enum! {
    pub enum VolumeType {
        Speaker = 0,
        Microphone = 1,
    }
}

wire_enum! {
    /// How an incoming call is accepted when another call is active.
    pub enum CallAccept {
        None = 0,
        /// Release the active call first.
        Release = 1,
        /// Hold the active call first.
        Hold = 2,
    }
}

wire_enum! {
    /// AT+CHLD call control operations.
    pub enum CallControl {
        ReleaseHeld = 0,
        ReleaseActiveAcceptOther = 1,
        HoldActiveAcceptOther = 2,
        AddHeldToConference = 3,
        ExplicitTransfer = 4,
    }
}

wire_enum! {
    pub enum CallDirection {
        Outgoing = 0,
        Incoming = 1,
    }
}

wire_enum! {
    /// State of one call as reported by the AG to the HF.
    pub enum HfCallState {
        Active = 0,
        Held = 1,
        Dialing = 2,
        Alerting = 3,
        Incoming = 4,
        Waiting = 5,
        HeldByResponseHold = 6,
        Disconnected = 7,
    }
}

wire_enum! {
    pub enum CallMultiparty {
        Single = 0,
        Multi = 1,
    }
}

wire_enum! {
    /// The +CIEV "call" indicator.
    pub enum CallIndicator {
        NoCallsInProgress = 0,
        CallsInProgress = 1,
    }
}

wire_enum! {
    /// The +CIEV "callsetup" indicator.
    pub enum CallSetup {
        None = 0,
        Incoming = 1,
        Outgoing = 2,
        Alerting = 3,
    }
}

wire_enum! {
    /// The +CIEV "callheld" indicator.
    pub enum CallHeld {
        None = 0,
        Held = 1,
    }
}

wire_enum! {
    /// Telephony call state reported by the application to the AG.
    pub enum AgCallState {
        Active = 0,
        Held = 1,
        Dialing = 2,
        Alerting = 3,
        Incoming = 4,
        Waiting = 5,
        Idle = 6,
        Disconnected = 7,
    }
}

wire_enum! {
    pub enum CallAddressType {
        Unknown = 0x81,
        International = 0x91,
        National = 0xA1,
    }
}

wire_enum! {
    pub enum NetworkState {
        NotAvailable = 0,
        Available = 1,
    }
}

wire_enum! {
    pub enum RoamingState {
        NoRoaming = 0,
        Roaming = 1,
    }
}

/// One entry of the current call list (+CLCC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentCall {
    pub index: u32,
    pub direction: CallDirection,
    pub state: HfCallState,
    pub multiparty: CallMultiparty,
    pub number: String,
    pub name: String,
}

/// Telephony state pushed to connected hands-free units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneState {
    pub num_active: u8,
    pub num_held: u8,
    pub call_state: AgCallState,
    pub address_type: CallAddressType,
    pub number: String,
    pub name: String,
}

/// Network indicators pushed to connected hands-free units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub network: NetworkState,
    pub roaming: RoamingState,
    pub signal: u8,
    pub battery: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_control_rejects_out_of_range() {
        assert_eq!(CallControl::from_u8(4), Some(CallControl::ExplicitTransfer));
        assert_eq!(CallControl::from_u8(5), None);
    }

    #[test]
    fn test_address_type_uses_toa_values() {
        assert_eq!(CallAddressType::International.as_u8(), 0x91);
        assert_eq!(CallAddressType::from_u8(0xA1), Some(CallAddressType::National));
        assert_eq!(CallAddressType::from_u8(0), None);
    }

    #[test]
    fn test_current_call_json() {
        let call = CurrentCall {
            index: 1,
            direction: CallDirection::Incoming,
            state: HfCallState::Active,
            multiparty: CallMultiparty::Single,
            number: "5551234".to_string(),
            name: String::new(),
        };
        let json = serde_json::to_string(&call).unwrap();
        assert!(json.contains("\"direction\":\"incoming\""));
        let back: CurrentCall = serde_json::from_str(&json).unwrap();
        assert_eq!(back, call);
    }
}
