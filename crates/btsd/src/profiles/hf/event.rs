use bt_core::{
    AudioState, CallAccept, CallDirection, CallHeld, CallIndicator, CallMultiparty, CallSetup,
    ConnectionPolicy, ConnectionReason, HfCallState, ProfileConnectionState, ProfileEvent,
    VolumeType,
};

/// Everything an HF session can be asked to handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HfEvent {
    Connect,
    Disconnect,
    SetConnectionPolicy {
        policy: ConnectionPolicy,
    },
    ConnectAudio,
    DisconnectAudio,
    VoiceRecognitionStart,
    VoiceRecognitionStop,
    SetVolume {
        kind: VolumeType,
        volume: u8,
    },
    DialNumber {
        number: String,
    },
    DialMemory {
        location: u32,
    },
    DialLast,
    AcceptCall {
        flag: CallAccept,
    },
    RejectCall,
    HoldCall,
    TerminateCall,
    /// `chld` is the raw AT+CHLD operation; values above 4 are refused.
    ControlCall {
        chld: u8,
        index: u8,
    },
    QueryCurrentCalls,
    SendAtCommand {
        command: String,
    },
    UpdateBatteryLevel {
        level: u8,
    },
    SendDtmf {
        dtmf: char,
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
    StackCall {
        call: CallIndicator,
    },
    StackCallSetup {
        setup: CallSetup,
    },
    StackCallHeld {
        held: CallHeld,
    },
    StackClip {
        number: String,
        name: String,
    },
    /// One +CLCC entry. Index 0 ends the list.
    StackCurrentCall {
        index: u32,
        direction: CallDirection,
        state: HfCallState,
        multiparty: CallMultiparty,
        number: String,
    },
    StackVolumeChanged {
        kind: VolumeType,
        volume: u8,
    },
    StackCommandResponse {
        text: String,
    },
    StackCommandResult {
        code: u32,
        result: u32,
    },
    StackRingIndication {
        inband: bool,
    },
}

impl ProfileEvent for HfEvent {
    fn name(&self) -> &'static str {
        match self {
            HfEvent::Connect => "CONNECT",
            HfEvent::Disconnect => "DISCONNECT",
            HfEvent::SetConnectionPolicy { .. } => "SET_CONNECTION_POLICY",
            HfEvent::ConnectAudio => "CONNECT_AUDIO",
            HfEvent::DisconnectAudio => "DISCONNECT_AUDIO",
            HfEvent::VoiceRecognitionStart => "VOICE_RECOGNITION_START",
            HfEvent::VoiceRecognitionStop => "VOICE_RECOGNITION_STOP",
            HfEvent::SetVolume { .. } => "SET_VOLUME",
            HfEvent::DialNumber { .. } => "DIAL_NUMBER",
            HfEvent::DialMemory { .. } => "DIAL_MEMORY",
            HfEvent::DialLast => "DIAL_LAST",
            HfEvent::AcceptCall { .. } => "ACCEPT_CALL",
            HfEvent::RejectCall => "REJECT_CALL",
            HfEvent::HoldCall => "HOLD_CALL",
            HfEvent::TerminateCall => "TERMINATE_CALL",
            HfEvent::ControlCall { .. } => "CONTROL_CALL",
            HfEvent::QueryCurrentCalls => "QUERY_CURRENT_CALLS",
            HfEvent::SendAtCommand { .. } => "SEND_AT_COMMAND",
            HfEvent::UpdateBatteryLevel { .. } => "UPDATE_BATTERY_LEVEL",
            HfEvent::SendDtmf { .. } => "SEND_DTMF",
            HfEvent::ConnectTimeout => "CONNECT_TIMEOUT",
            HfEvent::StackAudioRequest => "STACK_EVENT_AUDIO_REQ",
            HfEvent::StackConnectionStateChanged { .. } => "STACK_EVENT_CONNECTION_STATE_CHANGED",
            HfEvent::StackAudioStateChanged { .. } => "STACK_EVENT_AUDIO_STATE_CHANGED",
            HfEvent::StackVoiceRecognitionChanged { .. } => "STACK_EVENT_VR_STATE_CHANGED",
            HfEvent::StackCall { .. } => "STACK_EVENT_CALL",
            HfEvent::StackCallSetup { .. } => "STACK_EVENT_CALLSETUP",
            HfEvent::StackCallHeld { .. } => "STACK_EVENT_CALLHELD",
            HfEvent::StackClip { .. } => "STACK_EVENT_CLIP",
            HfEvent::StackCurrentCall { .. } => "STACK_EVENT_CURRENT_CALLS",
            HfEvent::StackVolumeChanged { .. } => "STACK_EVENT_VOLUME_CHANGED",
            HfEvent::StackCommandResponse { .. } => "STACK_EVENT_CMD_RESPONSE",
            HfEvent::StackCommandResult { .. } => "STACK_EVENT_CMD_RESULT",
            HfEvent::StackRingIndication { .. } => "STACK_EVENT_RING_INDICATION",
        }
    }

    fn is_broadcast(&self) -> bool {
        matches!(
            self,
            HfEvent::UpdateBatteryLevel { .. } | HfEvent::SetVolume { .. }
        )
    }

    fn is_audio_connected(&self) -> bool {
        matches!(
            self,
            HfEvent::StackAudioStateChanged {
                state: AudioState::Connected
            }
        )
    }
}
