//! Hands-free unit (HF) public API and listener contract.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::address::BtAddress;
use crate::callbacks::Cookie;
use crate::error::BtResult;
use crate::hfp::{CallAccept, CallControl, CallHeld, CallIndicator, CallSetup, CurrentCall, VolumeType};
use crate::state::{AudioState, ConnectionPolicy, ProfileConnectionState};

/// Listener for HF events. Every method defaults to a no-op.
pub trait HfpHfCallbacks: Send + Sync {
    fn on_connection_state_changed(&self, _addr: BtAddress, _state: ProfileConnectionState) {}

    fn on_audio_state_changed(&self, _addr: BtAddress, _state: AudioState) {}

    fn on_voice_recognition_state_changed(&self, _addr: BtAddress, _started: bool) {}

    fn on_call_state_changed(&self, _addr: BtAddress, _call: &CurrentCall) {}

    /// Final result text of an AT command sent with `send_at_cmd`.
    fn on_at_command_complete(&self, _addr: BtAddress, _response: &str) {}

    fn on_ring_indication(&self, _addr: BtAddress, _inband: bool) {}

    fn on_volume_changed(&self, _addr: BtAddress, _kind: VolumeType, _volume: u8) {}

    fn on_call_indicator(&self, _addr: BtAddress, _call: CallIndicator) {}

    fn on_call_setup_indicator(&self, _addr: BtAddress, _setup: CallSetup) {}

    fn on_call_held_indicator(&self, _addr: BtAddress, _held: CallHeld) {}
}

/// One HF listener invocation, as a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HfNotification {
    ConnectionState {
        addr: BtAddress,
        state: ProfileConnectionState,
    },
    AudioState {
        addr: BtAddress,
        state: AudioState,
    },
    VoiceRecognitionState {
        addr: BtAddress,
        started: bool,
    },
    CallStateChanged {
        addr: BtAddress,
        call: CurrentCall,
    },
    AtCommandComplete {
        addr: BtAddress,
        response: String,
    },
    RingIndication {
        addr: BtAddress,
        inband: bool,
    },
    VolumeChanged {
        addr: BtAddress,
        volume_type: VolumeType,
        volume: u8,
    },
    CallIndicator {
        addr: BtAddress,
        call: CallIndicator,
    },
    CallSetupIndicator {
        addr: BtAddress,
        setup: CallSetup,
    },
    CallHeldIndicator {
        addr: BtAddress,
        held: CallHeld,
    },
}

impl HfNotification {
    /// Calls the matching listener method.
    pub fn deliver(&self, cb: &dyn HfpHfCallbacks) {
        match self {
            Self::ConnectionState { addr, state } => cb.on_connection_state_changed(*addr, *state),
            Self::AudioState { addr, state } => cb.on_audio_state_changed(*addr, *state),
            Self::VoiceRecognitionState { addr, started } => {
                cb.on_voice_recognition_state_changed(*addr, *started)
            }
            Self::CallStateChanged { addr, call } => cb.on_call_state_changed(*addr, call),
            Self::AtCommandComplete { addr, response } => cb.on_at_command_complete(*addr, response),
            Self::RingIndication { addr, inband } => cb.on_ring_indication(*addr, *inband),
            Self::VolumeChanged {
                addr,
                volume_type,
                volume,
            } => cb.on_volume_changed(*addr, *volume_type, *volume),
            Self::CallIndicator { addr, call } => cb.on_call_indicator(*addr, *call),
            Self::CallSetupIndicator { addr, setup } => cb.on_call_setup_indicator(*addr, *setup),
            Self::CallHeldIndicator { addr, held } => cb.on_call_held_indicator(*addr, *held),
        }
    }

    pub fn address(&self) -> BtAddress {
        match self {
            Self::ConnectionState { addr, .. }
            | Self::AudioState { addr, .. }
            | Self::VoiceRecognitionState { addr, .. }
            | Self::CallStateChanged { addr, .. }
            | Self::AtCommandComplete { addr, .. }
            | Self::RingIndication { addr, .. }
            | Self::VolumeChanged { addr, .. }
            | Self::CallIndicator { addr, .. }
            | Self::CallSetupIndicator { addr, .. }
            | Self::CallHeldIndicator { addr, .. } => *addr,
        }
    }
}

/// Public operations of the hands-free unit profile.
#[async_trait]
pub trait HfpHf: Send + Sync {
    async fn register_callbacks(&self, callbacks: Arc<dyn HfpHfCallbacks>) -> BtResult<Cookie>;

    async fn unregister_callbacks(&self, cookie: Cookie) -> BtResult<()>;

    async fn is_connected(&self, addr: BtAddress) -> BtResult<bool>;

    async fn is_audio_connected(&self, addr: BtAddress) -> BtResult<bool>;

    async fn get_connection_state(&self, addr: BtAddress) -> BtResult<ProfileConnectionState>;

    async fn connect(&self, addr: BtAddress) -> BtResult<()>;

    async fn disconnect(&self, addr: BtAddress) -> BtResult<()>;

    /// `Allowed` also connects, `Forbidden` also disconnects.
    async fn set_connection_policy(&self, addr: BtAddress, policy: ConnectionPolicy) -> BtResult<()>;

    async fn connect_audio(&self, addr: BtAddress) -> BtResult<()>;

    async fn disconnect_audio(&self, addr: BtAddress) -> BtResult<()>;

    async fn start_voice_recognition(&self, addr: BtAddress) -> BtResult<()>;

    async fn stop_voice_recognition(&self, addr: BtAddress) -> BtResult<()>;

    async fn dial(&self, addr: BtAddress, number: &str) -> BtResult<()>;

    async fn dial_memory(&self, addr: BtAddress, location: u32) -> BtResult<()>;

    async fn redial(&self, addr: BtAddress) -> BtResult<()>;

    async fn accept_call(&self, addr: BtAddress, flag: CallAccept) -> BtResult<()>;

    async fn reject_call(&self, addr: BtAddress) -> BtResult<()>;

    async fn hold_call(&self, addr: BtAddress) -> BtResult<()>;

    async fn terminate_call(&self, addr: BtAddress) -> BtResult<()>;

    async fn control_call(&self, addr: BtAddress, chld: CallControl, index: u8) -> BtResult<()>;

    /// Returns the cached call list. An empty list allocates nothing.
    async fn query_current_calls(&self, addr: BtAddress) -> BtResult<Vec<CurrentCall>>;

    async fn send_at_cmd(&self, addr: BtAddress, command: &str) -> BtResult<()>;

    async fn update_battery_level(&self, addr: BtAddress, level: u8) -> BtResult<()>;

    async fn volume_control(&self, addr: BtAddress, kind: VolumeType, volume: u8) -> BtResult<()>;

    async fn send_dtmf(&self, addr: BtAddress, dtmf: char) -> BtResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hfp::{CallDirection, CallMultiparty, HfCallState};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<u32>>,
        rings: Mutex<Vec<bool>>,
    }

    impl HfpHfCallbacks for Recorder {
        fn on_call_state_changed(&self, _addr: BtAddress, call: &CurrentCall) {
            self.calls.lock().unwrap().push(call.index);
        }

        fn on_ring_indication(&self, _addr: BtAddress, inband: bool) {
            self.rings.lock().unwrap().push(inband);
        }
    }

    #[test]
    fn test_deliver_routes_to_matching_method() {
        let addr = BtAddress::new([0xAA, 0, 0, 0, 0, 1]);
        let rec = Recorder::default();
        let call = CurrentCall {
            index: 2,
            direction: CallDirection::Outgoing,
            state: HfCallState::Dialing,
            multiparty: CallMultiparty::Single,
            number: "123".to_string(),
            name: String::new(),
        };

        HfNotification::CallStateChanged { addr, call }.deliver(&rec);
        HfNotification::RingIndication { addr, inband: true }.deliver(&rec);
        HfNotification::CallHeldIndicator {
            addr,
            held: CallHeld::Held,
        }
        .deliver(&rec);

        assert_eq!(*rec.calls.lock().unwrap(), vec![2]);
        assert_eq!(*rec.rings.lock().unwrap(), vec![true]);
    }
}
