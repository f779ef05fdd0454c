//! Hands-free audio gateway (AG) public API and listener contract.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::address::BtAddress;
use crate::callbacks::Cookie;
use crate::error::BtResult;
use crate::hfp::{DeviceStatus, PhoneState, VolumeType};
use crate::state::{AudioState, ProfileConnectionState};

/// Listener for AG events. Every method defaults to a no-op.
pub trait HfpAgCallbacks: Send + Sync {
    fn on_connection_state_changed(&self, _addr: BtAddress, _state: ProfileConnectionState) {}

    fn on_audio_state_changed(&self, _addr: BtAddress, _state: AudioState) {}

    fn on_voice_recognition_state_changed(&self, _addr: BtAddress, _started: bool) {}

    fn on_battery_level_changed(&self, _addr: BtAddress, _level: u8) {}

    fn on_volume_control(&self, _addr: BtAddress, _kind: VolumeType, _volume: u8) {}

    fn on_answer_call(&self, _addr: BtAddress) {}

    fn on_reject_call(&self, _addr: BtAddress) {}

    fn on_hangup_call(&self, _addr: BtAddress) {}

    /// `number` is `None` for a redial request.
    fn on_dial_call(&self, _addr: BtAddress, _number: Option<&str>) {}

    fn on_at_command_received(&self, _addr: BtAddress, _command: &str) {}

    fn on_vendor_at_command_received(
        &self,
        _addr: BtAddress,
        _command: &str,
        _company_id: u16,
        _value: &str,
    ) {
    }
}

/// One AG listener invocation, as a value.
///
/// The runtime collects these while it holds its session lock and
/// delivers them once the lock is released. Transports carry them as
/// push payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgNotification {
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
    BatteryLevel {
        addr: BtAddress,
        level: u8,
    },
    VolumeControl {
        addr: BtAddress,
        volume_type: VolumeType,
        volume: u8,
    },
    AnswerCall {
        addr: BtAddress,
    },
    RejectCall {
        addr: BtAddress,
    },
    HangupCall {
        addr: BtAddress,
    },
    DialCall {
        addr: BtAddress,
        number: Option<String>,
    },
    AtCommand {
        addr: BtAddress,
        command: String,
    },
    VendorAtCommand {
        addr: BtAddress,
        command: String,
        company_id: u16,
        value: String,
    },
}

impl AgNotification {
    /// Calls the matching listener method.
    pub fn deliver(&self, cb: &dyn HfpAgCallbacks) {
        match self {
            Self::ConnectionState { addr, state } => cb.on_connection_state_changed(*addr, *state),
            Self::AudioState { addr, state } => cb.on_audio_state_changed(*addr, *state),
            Self::VoiceRecognitionState { addr, started } => {
                cb.on_voice_recognition_state_changed(*addr, *started)
            }
            Self::BatteryLevel { addr, level } => cb.on_battery_level_changed(*addr, *level),
            Self::VolumeControl {
                addr,
                volume_type,
                volume,
            } => cb.on_volume_control(*addr, *volume_type, *volume),
            Self::AnswerCall { addr } => cb.on_answer_call(*addr),
            Self::RejectCall { addr } => cb.on_reject_call(*addr),
            Self::HangupCall { addr } => cb.on_hangup_call(*addr),
            Self::DialCall { addr, number } => cb.on_dial_call(*addr, number.as_deref()),
            Self::AtCommand { addr, command } => cb.on_at_command_received(*addr, command),
            Self::VendorAtCommand {
                addr,
                command,
                company_id,
                value,
            } => cb.on_vendor_at_command_received(*addr, command, *company_id, value),
        }
    }

    pub fn address(&self) -> BtAddress {
        match self {
            Self::ConnectionState { addr, .. }
            | Self::AudioState { addr, .. }
            | Self::VoiceRecognitionState { addr, .. }
            | Self::BatteryLevel { addr, .. }
            | Self::VolumeControl { addr, .. }
            | Self::AnswerCall { addr }
            | Self::RejectCall { addr }
            | Self::HangupCall { addr }
            | Self::DialCall { addr, .. }
            | Self::AtCommand { addr, .. }
            | Self::VendorAtCommand { addr, .. } => *addr,
        }
    }
}

/// Public operations of the audio gateway profile.
///
/// Implemented by the in-process service and by the RPC proxies, so
/// application code is written once against this trait.
#[async_trait]
pub trait HfpAg: Send + Sync {
    async fn register_callbacks(&self, callbacks: Arc<dyn HfpAgCallbacks>) -> BtResult<Cookie>;

    async fn unregister_callbacks(&self, cookie: Cookie) -> BtResult<()>;

    async fn is_connected(&self, addr: BtAddress) -> BtResult<bool>;

    async fn is_audio_connected(&self, addr: BtAddress) -> BtResult<bool>;

    async fn get_connection_state(&self, addr: BtAddress) -> BtResult<ProfileConnectionState>;

    async fn connect(&self, addr: BtAddress) -> BtResult<()>;

    async fn disconnect(&self, addr: BtAddress) -> BtResult<()>;

    async fn connect_audio(&self, addr: BtAddress) -> BtResult<()>;

    async fn disconnect_audio(&self, addr: BtAddress) -> BtResult<()>;

    async fn start_virtual_call(&self, addr: BtAddress) -> BtResult<()>;

    async fn stop_virtual_call(&self, addr: BtAddress) -> BtResult<()>;

    async fn start_voice_recognition(&self, addr: BtAddress) -> BtResult<()>;

    async fn stop_voice_recognition(&self, addr: BtAddress) -> BtResult<()>;

    /// Applied to every session.
    async fn phone_state_change(&self, addr: BtAddress, state: PhoneState) -> BtResult<()>;

    /// Applied to every session.
    async fn notify_device_status(&self, addr: BtAddress, status: DeviceStatus) -> BtResult<()>;

    async fn volume_control(&self, addr: BtAddress, kind: VolumeType, volume: u8) -> BtResult<()>;

    /// Reports the telephony outcome of a dial request from the hands-free unit.
    async fn dial_response(&self, result: u8) -> BtResult<()>;

    async fn send_at_command(&self, addr: BtAddress, command: &str) -> BtResult<()>;

    async fn send_vendor_specific_at_command(
        &self,
        addr: BtAddress,
        command: &str,
        value: &str,
    ) -> BtResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl HfpAgCallbacks for Recorder {
        fn on_audio_state_changed(&self, addr: BtAddress, state: AudioState) {
            self.seen.lock().unwrap().push(format!("audio {addr} {state:?}"));
        }

        fn on_dial_call(&self, addr: BtAddress, number: Option<&str>) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("dial {addr} {}", number.unwrap_or("-")));
        }
    }

    #[test]
    fn test_deliver_routes_to_matching_method() {
        let addr: BtAddress = "11:22:33:44:55:66".parse().unwrap();
        let rec = Recorder::default();

        AgNotification::AudioState {
            addr,
            state: AudioState::Connected,
        }
        .deliver(&rec);
        AgNotification::DialCall { addr, number: None }.deliver(&rec);
        // Default no-op method must not record anything.
        AgNotification::HangupCall { addr }.deliver(&rec);

        let seen = rec.seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                "audio 11:22:33:44:55:66 Connected".to_string(),
                "dial 11:22:33:44:55:66 -".to_string(),
            ]
        );
    }

    #[test]
    fn test_notification_json_is_tagged() {
        let addr = BtAddress::new([1, 2, 3, 4, 5, 6]);
        let n = AgNotification::BatteryLevel { addr, level: 3 };
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains("\"kind\":\"battery_level\""));
        assert_eq!(serde_json::from_str::<AgNotification>(&json).unwrap(), n);
        assert_eq!(n.address(), addr);
    }
}
