//! Hands-free unit request and push vocabulary.

use bt_core::text::{bounded_copy, AT_COMMAND_CAPACITY, PHONE_NUMBER_CAPACITY};
use bt_core::{
    AudioState, BtAddress, CallAccept, CallHeld, CallIndicator, CallSetup, ConnectionPolicy,
    HfNotification, ProfileConnectionState, VolumeType,
};
use serde::{Deserialize, Serialize};

use crate::parcel::{Parcel, ParcelError, ParcelReader};
use crate::reply::{read_call, write_call, ReplyKind};

/// Transaction codes for HF requests.
pub mod opcode {
    pub const REGISTER_CALLBACK: u32 = 0x0201;
    pub const UNREGISTER_CALLBACK: u32 = 0x0202;
    pub const IS_CONNECTED: u32 = 0x0203;
    pub const IS_AUDIO_CONNECTED: u32 = 0x0204;
    pub const GET_CONNECTION_STATE: u32 = 0x0205;
    pub const CONNECT: u32 = 0x0206;
    pub const SET_CONNECTION_POLICY: u32 = 0x0207;
    pub const DISCONNECT: u32 = 0x0208;
    pub const CONNECT_AUDIO: u32 = 0x0209;
    pub const DISCONNECT_AUDIO: u32 = 0x020A;
    pub const START_VOICE_RECOGNITION: u32 = 0x020B;
    pub const STOP_VOICE_RECOGNITION: u32 = 0x020C;
    pub const DIAL: u32 = 0x020D;
    pub const DIAL_MEMORY: u32 = 0x020E;
    pub const REDIAL: u32 = 0x020F;
    pub const ACCEPT_CALL: u32 = 0x0210;
    pub const REJECT_CALL: u32 = 0x0211;
    pub const HOLD_CALL: u32 = 0x0212;
    pub const TERMINATE_CALL: u32 = 0x0213;
    pub const CONTROL_CALL: u32 = 0x0214;
    pub const QUERY_CURRENT_CALLS: u32 = 0x0215;
    pub const SEND_AT_CMD: u32 = 0x0216;
    pub const UPDATE_BATTERY_LEVEL: u32 = 0x0217;
    pub const VOLUME_CONTROL: u32 = 0x0218;
    pub const SEND_DTMF: u32 = 0x0219;

    pub const ON_CONNECTION_STATE_CHANGED: u32 = 0x0281;
    pub const ON_AUDIO_STATE_CHANGED: u32 = 0x0282;
    pub const ON_VOICE_RECOGNITION_STATE_CHANGED: u32 = 0x0283;
    pub const ON_CALL_STATE_CHANGED: u32 = 0x0284;
    pub const ON_AT_CMD_COMPLETE: u32 = 0x0285;
    pub const ON_RING_INDICATION: u32 = 0x0286;
    pub const ON_VOLUME_CHANGED: u32 = 0x0287;
    pub const ON_CALL_IND_RECEIVED: u32 = 0x0288;
    pub const ON_CALLSETUP_IND_RECEIVED: u32 = 0x0289;
    pub const ON_CALLHELD_IND_RECEIVED: u32 = 0x028A;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HfRequest {
    RegisterCallback,
    UnregisterCallback,
    IsConnected { addr: BtAddress },
    IsAudioConnected { addr: BtAddress },
    GetConnectionState { addr: BtAddress },
    Connect { addr: BtAddress },
    SetConnectionPolicy { addr: BtAddress, policy: ConnectionPolicy },
    Disconnect { addr: BtAddress },
    ConnectAudio { addr: BtAddress },
    DisconnectAudio { addr: BtAddress },
    StartVoiceRecognition { addr: BtAddress },
    StopVoiceRecognition { addr: BtAddress },
    Dial { addr: BtAddress, number: String },
    DialMemory { addr: BtAddress, location: u32 },
    Redial { addr: BtAddress },
    AcceptCall { addr: BtAddress, flag: CallAccept },
    RejectCall { addr: BtAddress },
    HoldCall { addr: BtAddress },
    TerminateCall { addr: BtAddress },
    /// `chld` stays raw so an out-of-range value reaches the service and is
    /// rejected there.
    ControlCall { addr: BtAddress, chld: u8, index: u8 },
    QueryCurrentCalls { addr: BtAddress },
    SendAtCmd { addr: BtAddress, command: String },
    UpdateBatteryLevel { addr: BtAddress, level: u8 },
    VolumeControl {
        addr: BtAddress,
        volume_type: VolumeType,
        volume: u8,
    },
    SendDtmf { addr: BtAddress, dtmf: char },
}

impl HfRequest {
    pub fn opcode(&self) -> u32 {
        use opcode::*;
        match self {
            Self::RegisterCallback => REGISTER_CALLBACK,
            Self::UnregisterCallback => UNREGISTER_CALLBACK,
            Self::IsConnected { .. } => IS_CONNECTED,
            Self::IsAudioConnected { .. } => IS_AUDIO_CONNECTED,
            Self::GetConnectionState { .. } => GET_CONNECTION_STATE,
            Self::Connect { .. } => CONNECT,
            Self::SetConnectionPolicy { .. } => SET_CONNECTION_POLICY,
            Self::Disconnect { .. } => DISCONNECT,
            Self::ConnectAudio { .. } => CONNECT_AUDIO,
            Self::DisconnectAudio { .. } => DISCONNECT_AUDIO,
            Self::StartVoiceRecognition { .. } => START_VOICE_RECOGNITION,
            Self::StopVoiceRecognition { .. } => STOP_VOICE_RECOGNITION,
            Self::Dial { .. } => DIAL,
            Self::DialMemory { .. } => DIAL_MEMORY,
            Self::Redial { .. } => REDIAL,
            Self::AcceptCall { .. } => ACCEPT_CALL,
            Self::RejectCall { .. } => REJECT_CALL,
            Self::HoldCall { .. } => HOLD_CALL,
            Self::TerminateCall { .. } => TERMINATE_CALL,
            Self::ControlCall { .. } => CONTROL_CALL,
            Self::QueryCurrentCalls { .. } => QUERY_CURRENT_CALLS,
            Self::SendAtCmd { .. } => SEND_AT_CMD,
            Self::UpdateBatteryLevel { .. } => UPDATE_BATTERY_LEVEL,
            Self::VolumeControl { .. } => VOLUME_CONTROL,
            Self::SendDtmf { .. } => SEND_DTMF,
        }
    }

    pub fn reply_kind(&self) -> ReplyKind {
        match self {
            Self::IsConnected { .. } | Self::IsAudioConnected { .. } => ReplyKind::Bool,
            Self::GetConnectionState { .. } => ReplyKind::ConnectionState,
            Self::QueryCurrentCalls { .. } => ReplyKind::Calls,
            _ => ReplyKind::Status,
        }
    }

    /// Clamps every string field to its fixed wire capacity.
    pub fn bounded(self) -> Self {
        match self {
            Self::Dial { addr, number } => Self::Dial {
                addr,
                number: bounded_copy(&number, PHONE_NUMBER_CAPACITY),
            },
            Self::SendAtCmd { addr, command } => Self::SendAtCmd {
                addr,
                command: bounded_copy(&command, AT_COMMAND_CAPACITY),
            },
            other => other,
        }
    }

    pub fn write_parcel(&self, p: &mut Parcel) {
        match self {
            Self::RegisterCallback | Self::UnregisterCallback => {}
            Self::IsConnected { addr }
            | Self::IsAudioConnected { addr }
            | Self::GetConnectionState { addr }
            | Self::Connect { addr }
            | Self::Disconnect { addr }
            | Self::ConnectAudio { addr }
            | Self::DisconnectAudio { addr }
            | Self::StartVoiceRecognition { addr }
            | Self::StopVoiceRecognition { addr }
            | Self::Redial { addr }
            | Self::RejectCall { addr }
            | Self::HoldCall { addr }
            | Self::TerminateCall { addr }
            | Self::QueryCurrentCalls { addr } => {
                p.write_address(*addr);
            }
            Self::SetConnectionPolicy { addr, policy } => {
                p.write_address(*addr).write_u8(policy.as_u8());
            }
            Self::Dial { addr, number } => {
                p.write_address(*addr).write_str(number);
            }
            Self::DialMemory { addr, location } => {
                p.write_address(*addr).write_u32(*location);
            }
            Self::AcceptCall { addr, flag } => {
                p.write_address(*addr).write_u8(flag.as_u8());
            }
            Self::ControlCall { addr, chld, index } => {
                p.write_address(*addr).write_u8(*chld).write_u8(*index);
            }
            Self::SendAtCmd { addr, command } => {
                p.write_address(*addr).write_str(command);
            }
            Self::UpdateBatteryLevel { addr, level } => {
                p.write_address(*addr).write_u8(*level);
            }
            Self::VolumeControl {
                addr,
                volume_type,
                volume,
            } => {
                p.write_address(*addr).write_u8(volume_type.as_u8()).write_u8(*volume);
            }
            Self::SendDtmf { addr, dtmf } => {
                p.write_address(*addr).write_u32(u32::from(*dtmf));
            }
        }
    }

    /// Decodes a request from its transaction code and argument parcel.
    /// Returns `None` for codes outside the HF request range.
    pub fn read_parcel(code: u32, r: &mut ParcelReader<'_>) -> Option<Result<Self, ParcelError>> {
        use opcode::*;
        let result = match code {
            REGISTER_CALLBACK => Ok(Self::RegisterCallback),
            UNREGISTER_CALLBACK => Ok(Self::UnregisterCallback),
            IS_CONNECTED => r.read_address().map(|addr| Self::IsConnected { addr }),
            IS_AUDIO_CONNECTED => r.read_address().map(|addr| Self::IsAudioConnected { addr }),
            GET_CONNECTION_STATE => r.read_address().map(|addr| Self::GetConnectionState { addr }),
            CONNECT => r.read_address().map(|addr| Self::Connect { addr }),
            DISCONNECT => r.read_address().map(|addr| Self::Disconnect { addr }),
            CONNECT_AUDIO => r.read_address().map(|addr| Self::ConnectAudio { addr }),
            DISCONNECT_AUDIO => r.read_address().map(|addr| Self::DisconnectAudio { addr }),
            START_VOICE_RECOGNITION => r.read_address().map(|addr| Self::StartVoiceRecognition { addr }),
            STOP_VOICE_RECOGNITION => r.read_address().map(|addr| Self::StopVoiceRecognition { addr }),
            REDIAL => r.read_address().map(|addr| Self::Redial { addr }),
            REJECT_CALL => r.read_address().map(|addr| Self::RejectCall { addr }),
            HOLD_CALL => r.read_address().map(|addr| Self::HoldCall { addr }),
            TERMINATE_CALL => r.read_address().map(|addr| Self::TerminateCall { addr }),
            QUERY_CURRENT_CALLS => r.read_address().map(|addr| Self::QueryCurrentCalls { addr }),
            SET_CONNECTION_POLICY => read_connection_policy(r),
            DIAL => read_dial(r),
            DIAL_MEMORY => read_dial_memory(r),
            ACCEPT_CALL => read_accept_call(r),
            CONTROL_CALL => read_control_call(r),
            SEND_AT_CMD => read_at_cmd(r),
            UPDATE_BATTERY_LEVEL => read_battery_level(r),
            VOLUME_CONTROL => read_volume_control(r),
            SEND_DTMF => read_dtmf(r),
            _ => return None,
        };
        Some(result)
    }
}

fn read_connection_policy(r: &mut ParcelReader<'_>) -> Result<HfRequest, ParcelError> {
    Ok(HfRequest::SetConnectionPolicy {
        addr: r.read_address()?,
        policy: r.read_enum("connection_policy", ConnectionPolicy::from_u8)?,
    })
}

fn read_dial(r: &mut ParcelReader<'_>) -> Result<HfRequest, ParcelError> {
    Ok(HfRequest::Dial {
        addr: r.read_address()?,
        number: r.read_string()?,
    })
}

fn read_dial_memory(r: &mut ParcelReader<'_>) -> Result<HfRequest, ParcelError> {
    Ok(HfRequest::DialMemory {
        addr: r.read_address()?,
        location: r.read_u32()?,
    })
}

fn read_accept_call(r: &mut ParcelReader<'_>) -> Result<HfRequest, ParcelError> {
    Ok(HfRequest::AcceptCall {
        addr: r.read_address()?,
        flag: r.read_enum("accept_flag", CallAccept::from_u8)?,
    })
}

fn read_control_call(r: &mut ParcelReader<'_>) -> Result<HfRequest, ParcelError> {
    Ok(HfRequest::ControlCall {
        addr: r.read_address()?,
        chld: r.read_u8()?,
        index: r.read_u8()?,
    })
}

fn read_at_cmd(r: &mut ParcelReader<'_>) -> Result<HfRequest, ParcelError> {
    Ok(HfRequest::SendAtCmd {
        addr: r.read_address()?,
        command: r.read_string()?,
    })
}

fn read_battery_level(r: &mut ParcelReader<'_>) -> Result<HfRequest, ParcelError> {
    Ok(HfRequest::UpdateBatteryLevel {
        addr: r.read_address()?,
        level: r.read_u8()?,
    })
}

fn read_volume_control(r: &mut ParcelReader<'_>) -> Result<HfRequest, ParcelError> {
    Ok(HfRequest::VolumeControl {
        addr: r.read_address()?,
        volume_type: r.read_enum("volume_type", VolumeType::from_u8)?,
        volume: r.read_u8()?,
    })
}

fn read_dtmf(r: &mut ParcelReader<'_>) -> Result<HfRequest, ParcelError> {
    let addr = r.read_address()?;
    let raw = r.read_u32()?;
    let dtmf = char::from_u32(raw).ok_or(ParcelError::InvalidValue {
        field: "dtmf",
        value: raw,
    })?;
    Ok(HfRequest::SendDtmf { addr, dtmf })
}

// ============================================================================
// Push codec
// ============================================================================

pub fn push_code(n: &HfNotification) -> u32 {
    use opcode::*;
    match n {
        HfNotification::ConnectionState { .. } => ON_CONNECTION_STATE_CHANGED,
        HfNotification::AudioState { .. } => ON_AUDIO_STATE_CHANGED,
        HfNotification::VoiceRecognitionState { .. } => ON_VOICE_RECOGNITION_STATE_CHANGED,
        HfNotification::CallStateChanged { .. } => ON_CALL_STATE_CHANGED,
        HfNotification::AtCommandComplete { .. } => ON_AT_CMD_COMPLETE,
        HfNotification::RingIndication { .. } => ON_RING_INDICATION,
        HfNotification::VolumeChanged { .. } => ON_VOLUME_CHANGED,
        HfNotification::CallIndicator { .. } => ON_CALL_IND_RECEIVED,
        HfNotification::CallSetupIndicator { .. } => ON_CALLSETUP_IND_RECEIVED,
        HfNotification::CallHeldIndicator { .. } => ON_CALLHELD_IND_RECEIVED,
    }
}

pub fn write_push(n: &HfNotification, p: &mut Parcel) {
    p.write_address(n.address());
    match n {
        HfNotification::ConnectionState { state, .. } => {
            p.write_u8(state.as_u8());
        }
        HfNotification::AudioState { state, .. } => {
            p.write_u8(state.as_u8());
        }
        HfNotification::VoiceRecognitionState { started, .. } => {
            p.write_bool(*started);
        }
        HfNotification::CallStateChanged { call, .. } => write_call(p, call),
        HfNotification::AtCommandComplete { response, .. } => {
            p.write_str(response);
        }
        HfNotification::RingIndication { inband, .. } => {
            p.write_bool(*inband);
        }
        HfNotification::VolumeChanged {
            volume_type, volume, ..
        } => {
            p.write_u8(volume_type.as_u8()).write_u8(*volume);
        }
        HfNotification::CallIndicator { call, .. } => {
            p.write_u8(call.as_u8());
        }
        HfNotification::CallSetupIndicator { setup, .. } => {
            p.write_u8(setup.as_u8());
        }
        HfNotification::CallHeldIndicator { held, .. } => {
            p.write_u8(held.as_u8());
        }
    }
}

pub fn read_push(code: u32, r: &mut ParcelReader<'_>) -> Option<Result<HfNotification, ParcelError>> {
    use opcode::*;
    if !matches!(code, ON_CONNECTION_STATE_CHANGED..=ON_CALLHELD_IND_RECEIVED) {
        return None;
    }
    Some(read_push_body(code, r))
}

fn read_push_body(code: u32, r: &mut ParcelReader<'_>) -> Result<HfNotification, ParcelError> {
    use opcode::*;
    let addr = r.read_address()?;
    Ok(match code {
        ON_CONNECTION_STATE_CHANGED => HfNotification::ConnectionState {
            addr,
            state: r.read_enum("connection_state", ProfileConnectionState::from_u8)?,
        },
        ON_AUDIO_STATE_CHANGED => HfNotification::AudioState {
            addr,
            state: r.read_enum("audio_state", AudioState::from_u8)?,
        },
        ON_VOICE_RECOGNITION_STATE_CHANGED => HfNotification::VoiceRecognitionState {
            addr,
            started: r.read_bool()?,
        },
        ON_CALL_STATE_CHANGED => HfNotification::CallStateChanged {
            addr,
            call: read_call(r)?,
        },
        ON_AT_CMD_COMPLETE => HfNotification::AtCommandComplete {
            addr,
            response: r.read_string()?,
        },
        ON_RING_INDICATION => HfNotification::RingIndication {
            addr,
            inband: r.read_bool()?,
        },
        ON_VOLUME_CHANGED => HfNotification::VolumeChanged {
            addr,
            volume_type: r.read_enum("volume_type", VolumeType::from_u8)?,
            volume: r.read_u8()?,
        },
        ON_CALL_IND_RECEIVED => HfNotification::CallIndicator {
            addr,
            call: r.read_enum("call_indicator", CallIndicator::from_u8)?,
        },
        ON_CALLSETUP_IND_RECEIVED => HfNotification::CallSetupIndicator {
            addr,
            setup: r.read_enum("callsetup_indicator", CallSetup::from_u8)?,
        },
        _ => HfNotification::CallHeldIndicator {
            addr,
            held: r.read_enum("callheld_indicator", CallHeld::from_u8)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_core::{CallDirection, CallMultiparty, CurrentCall, HfCallState};

    fn addr() -> BtAddress {
        "66:55:44:33:22:11".parse().unwrap()
    }

    #[test]
    fn test_control_call_keeps_raw_chld() {
        let req = HfRequest::ControlCall {
            addr: addr(),
            chld: 9,
            index: 1,
        };
        let mut p = Parcel::new();
        req.write_parcel(&mut p);
        let back = HfRequest::read_parcel(opcode::CONTROL_CALL, &mut p.reader())
            .unwrap()
            .unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn test_dial_number_is_bounded() {
        let req = HfRequest::Dial {
            addr: addr(),
            number: "1".repeat(50),
        }
        .bounded();
        match req {
            HfRequest::Dial { number, .. } => assert_eq!(number.len(), 32),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_query_calls_expects_call_list() {
        assert_eq!(
            HfRequest::QueryCurrentCalls { addr: addr() }.reply_kind(),
            ReplyKind::Calls
        );
    }

    #[test]
    fn test_call_state_push_parcel() {
        let n = HfNotification::CallStateChanged {
            addr: addr(),
            call: CurrentCall {
                index: 1,
                direction: CallDirection::Incoming,
                state: HfCallState::Incoming,
                multiparty: CallMultiparty::Single,
                number: "5550100".to_string(),
                name: "Bob".to_string(),
            },
        };
        let mut p = Parcel::new();
        write_push(&n, &mut p);
        let back = read_push(push_code(&n), &mut p.reader()).unwrap().unwrap();
        assert_eq!(back, n);
    }

    #[test]
    fn test_dtmf_travels_as_code_point() {
        let req = HfRequest::SendDtmf {
            addr: addr(),
            dtmf: '#',
        };
        let mut p = Parcel::new();
        req.write_parcel(&mut p);
        assert_eq!(
            HfRequest::read_parcel(opcode::SEND_DTMF, &mut p.reader()).unwrap(),
            Ok(req)
        );
    }
}
