use bt_core::{
    AudioState, ConnectionReason, DeviceStatus, PhoneState, ProfileConnectionState, ProfileEvent,
    VolumeType,
};

/// Everything an AG session can be asked to handle.
///
/// Variants prefixed `Stack` are reported by the driver; the rest come
/// from the public API or from the runtime itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgEvent {
    Connect,
    Disconnect,
    ConnectAudio,
    DisconnectAudio,
    VoiceRecognitionStart,
    VoiceRecognitionStop,
    PhoneStateChange(PhoneState),
    DeviceStatusChanged(DeviceStatus),
    SetVolume {
        kind: VolumeType,
        volume: u8,
    },
    SetInbandRingEnable {
        enabled: bool,
    },
    DialingResult {
        result: u8,
    },
    StartVirtualCall,
    StopVirtualCall,
    SendAtCommand {
        command: String,
    },
    SendVendorAtCommand {
        command: String,
        value: String,
    },
    ConnectTimeout,

    StackAudioRequest,
    StackConnectionStateChanged {
        state: ProfileConnectionState,
        reason: ConnectionReason,
        remote_features: u32,
    },
    StackAudioStateChanged {
        state: AudioState,
    },
    StackVoiceRecognitionChanged {
        started: bool,
    },
    StackVolumeChanged {
        kind: VolumeType,
        volume: u8,
    },
    StackBatteryUpdate {
        level: u8,
    },
    StackAnswerCall,
    StackRejectCall,
    StackHangupCall,
    /// `None` asks for a redial of the last number.
    StackDialNumber {
        number: Option<String>,
    },
    StackDialMemory {
        location: u32,
    },
    StackAtCommand {
        command: String,
    },
    StackVendorAtCommand {
        command: String,
        company_id: u16,
        value: String,
    },
}

impl ProfileEvent for AgEvent {
    fn name(&self) -> &'static str {
        match self {
            AgEvent::Connect => "CONNECT",
            AgEvent::Disconnect => "DISCONNECT",
            AgEvent::ConnectAudio => "CONNECT_AUDIO",
            AgEvent::DisconnectAudio => "DISCONNECT_AUDIO",
            AgEvent::VoiceRecognitionStart => "VOICE_RECOGNITION_START",
            AgEvent::VoiceRecognitionStop => "VOICE_RECOGNITION_STOP",
            AgEvent::PhoneStateChange(_) => "PHONE_STATE_CHANGE",
            AgEvent::DeviceStatusChanged(_) => "DEVICE_STATUS_CHANGED",
            AgEvent::SetVolume { .. } => "SET_VOLUME",
            AgEvent::SetInbandRingEnable { .. } => "SET_INBAND_RING_ENABLE",
            AgEvent::DialingResult { .. } => "DIALING_RESULT",
            AgEvent::StartVirtualCall => "START_VIRTUAL_CALL",
            AgEvent::StopVirtualCall => "STOP_VIRTUAL_CALL",
            AgEvent::SendAtCommand { .. } => "SEND_AT_COMMAND",
            AgEvent::SendVendorAtCommand { .. } => "SEND_VENDOR_SPECIFIC_AT_COMMAND",
            AgEvent::ConnectTimeout => "CONNECT_TIMEOUT",
            AgEvent::StackAudioRequest => "STACK_EVENT_AUDIO_REQ",
            AgEvent::StackConnectionStateChanged { .. } => "STACK_EVENT_CONNECTION_STATE_CHANGED",
            AgEvent::StackAudioStateChanged { .. } => "STACK_EVENT_AUDIO_STATE_CHANGED",
            AgEvent::StackVoiceRecognitionChanged { .. } => "STACK_EVENT_VR_STATE_CHANGED",
            AgEvent::StackVolumeChanged { .. } => "STACK_EVENT_VOLUME_CHANGED",
            AgEvent::StackBatteryUpdate { .. } => "STACK_EVENT_BATTERY_UPDATE",
            AgEvent::StackAnswerCall => "STACK_EVENT_ANSWER_CALL",
            AgEvent::StackRejectCall => "STACK_EVENT_REJECT_CALL",
            AgEvent::StackHangupCall => "STACK_EVENT_HANGUP_CALL",
            AgEvent::StackDialNumber { .. } => "STACK_EVENT_DIAL_NUMBER",
            AgEvent::StackDialMemory { .. } => "STACK_EVENT_DIAL_MEMORY",
            AgEvent::StackAtCommand { .. } => "STACK_EVENT_AT_COMMAND",
            AgEvent::StackVendorAtCommand { .. } => "STACK_EVENT_VENDOR_AT_COMMAND",
        }
    }

    fn is_broadcast(&self) -> bool {
        matches!(
            self,
            AgEvent::DeviceStatusChanged(_)
                | AgEvent::PhoneStateChange(_)
                | AgEvent::SetVolume { .. }
                | AgEvent::SetInbandRingEnable { .. }
                | AgEvent::DialingResult { .. }
        )
    }

    fn is_audio_connected(&self) -> bool {
        matches!(
            self,
            AgEvent::StackAudioStateChanged {
                state: AudioState::Connected
            }
        )
    }
}
