//! Audio gateway request and push vocabulary.

use bt_core::text::{
    bounded_copy, AT_COMMAND_CAPACITY, NAME_CAPACITY, PHONE_NUMBER_CAPACITY, VENDOR_PREFIX_CAPACITY,
};
use bt_core::{
    AgCallState, AgNotification, AudioState, BtAddress, CallAddressType, DeviceStatus, NetworkState,
    PhoneState, ProfileConnectionState, RoamingState, VolumeType,
};
use serde::{Deserialize, Serialize};

use crate::parcel::{Parcel, ParcelError, ParcelReader};
use crate::reply::ReplyKind;

/// Transaction codes for AG requests.
pub mod opcode {
    pub const REGISTER_CALLBACK: u32 = 0x0101;
    pub const UNREGISTER_CALLBACK: u32 = 0x0102;
    pub const IS_CONNECTED: u32 = 0x0103;
    pub const IS_AUDIO_CONNECTED: u32 = 0x0104;
    pub const GET_CONNECTION_STATE: u32 = 0x0105;
    pub const CONNECT: u32 = 0x0106;
    pub const DISCONNECT: u32 = 0x0107;
    pub const CONNECT_AUDIO: u32 = 0x0108;
    pub const DISCONNECT_AUDIO: u32 = 0x0109;
    pub const START_VIRTUAL_CALL: u32 = 0x010A;
    pub const STOP_VIRTUAL_CALL: u32 = 0x010B;
    pub const START_VOICE_RECOGNITION: u32 = 0x010C;
    pub const STOP_VOICE_RECOGNITION: u32 = 0x010D;
    pub const PHONE_STATE_CHANGE: u32 = 0x010E;
    pub const NOTIFY_DEVICE_STATUS: u32 = 0x010F;
    pub const VOLUME_CONTROL: u32 = 0x0110;
    pub const SEND_AT_COMMAND: u32 = 0x0111;
    pub const SEND_VENDOR_SPECIFIC_AT_COMMAND: u32 = 0x0112;
    pub const DIAL_RESPONSE: u32 = 0x0113;

    pub const ON_CONNECTION_STATE_CHANGED: u32 = 0x0181;
    pub const ON_AUDIO_STATE_CHANGED: u32 = 0x0182;
    pub const ON_VOICE_RECOGNITION_STATE_CHANGED: u32 = 0x0183;
    pub const ON_BATTERY_LEVEL_CHANGED: u32 = 0x0184;
    pub const ON_VOLUME_CONTROL: u32 = 0x0185;
    pub const ON_ANSWER_CALL: u32 = 0x0186;
    pub const ON_REJECT_CALL: u32 = 0x0187;
    pub const ON_HANGUP_CALL: u32 = 0x0188;
    pub const ON_DIAL_CALL: u32 = 0x0189;
    pub const ON_AT_COMMAND_RECEIVED: u32 = 0x018A;
    pub const ON_VENDOR_SPECIFIC_AT_COMMAND_RECEIVED: u32 = 0x018B;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AgRequest {
    RegisterCallback,
    UnregisterCallback,
    IsConnected { addr: BtAddress },
    IsAudioConnected { addr: BtAddress },
    GetConnectionState { addr: BtAddress },
    Connect { addr: BtAddress },
    Disconnect { addr: BtAddress },
    ConnectAudio { addr: BtAddress },
    DisconnectAudio { addr: BtAddress },
    StartVirtualCall { addr: BtAddress },
    StopVirtualCall { addr: BtAddress },
    StartVoiceRecognition { addr: BtAddress },
    StopVoiceRecognition { addr: BtAddress },
    PhoneStateChange { addr: BtAddress, state: PhoneState },
    NotifyDeviceStatus { addr: BtAddress, status: DeviceStatus },
    VolumeControl {
        addr: BtAddress,
        volume_type: VolumeType,
        volume: u8,
    },
    SendAtCommand { addr: BtAddress, command: String },
    SendVendorSpecificAtCommand {
        addr: BtAddress,
        command: String,
        value: String,
    },
    DialResponse { result: u8 },
}

impl AgRequest {
    pub fn opcode(&self) -> u32 {
        use opcode::*;
        match self {
            Self::RegisterCallback => REGISTER_CALLBACK,
            Self::UnregisterCallback => UNREGISTER_CALLBACK,
            Self::IsConnected { .. } => IS_CONNECTED,
            Self::IsAudioConnected { .. } => IS_AUDIO_CONNECTED,
            Self::GetConnectionState { .. } => GET_CONNECTION_STATE,
            Self::Connect { .. } => CONNECT,
            Self::Disconnect { .. } => DISCONNECT,
            Self::ConnectAudio { .. } => CONNECT_AUDIO,
            Self::DisconnectAudio { .. } => DISCONNECT_AUDIO,
            Self::StartVirtualCall { .. } => START_VIRTUAL_CALL,
            Self::StopVirtualCall { .. } => STOP_VIRTUAL_CALL,
            Self::StartVoiceRecognition { .. } => START_VOICE_RECOGNITION,
            Self::StopVoiceRecognition { .. } => STOP_VOICE_RECOGNITION,
            Self::PhoneStateChange { .. } => PHONE_STATE_CHANGE,
            Self::NotifyDeviceStatus { .. } => NOTIFY_DEVICE_STATUS,
            Self::VolumeControl { .. } => VOLUME_CONTROL,
            Self::SendAtCommand { .. } => SEND_AT_COMMAND,
            Self::SendVendorSpecificAtCommand { .. } => SEND_VENDOR_SPECIFIC_AT_COMMAND,
            Self::DialResponse { .. } => DIAL_RESPONSE,
        }
    }

    pub fn reply_kind(&self) -> ReplyKind {
        match self {
            Self::IsConnected { .. } | Self::IsAudioConnected { .. } => ReplyKind::Bool,
            Self::GetConnectionState { .. } => ReplyKind::ConnectionState,
            _ => ReplyKind::Status,
        }
    }

    /// Clamps every string field to its fixed wire capacity.
    pub fn bounded(self) -> Self {
        match self {
            Self::PhoneStateChange { addr, state } => Self::PhoneStateChange {
                addr,
                state: PhoneState {
                    number: bounded_copy(&state.number, PHONE_NUMBER_CAPACITY),
                    name: bounded_copy(&state.name, NAME_CAPACITY),
                    ..state
                },
            },
            Self::SendAtCommand { addr, command } => Self::SendAtCommand {
                addr,
                command: bounded_copy(&command, AT_COMMAND_CAPACITY),
            },
            Self::SendVendorSpecificAtCommand {
                addr,
                command,
                value,
            } => Self::SendVendorSpecificAtCommand {
                addr,
                command: bounded_copy(&command, VENDOR_PREFIX_CAPACITY),
                value: bounded_copy(&value, AT_COMMAND_CAPACITY),
            },
            other => other,
        }
    }

    /// Writes the arguments of this request; the opcode travels as the
    /// transaction code.
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
            | Self::StartVirtualCall { addr }
            | Self::StopVirtualCall { addr }
            | Self::StartVoiceRecognition { addr }
            | Self::StopVoiceRecognition { addr } => {
                p.write_address(*addr);
            }
            Self::PhoneStateChange { addr, state } => {
                p.write_address(*addr)
                    .write_u8(state.num_active)
                    .write_u8(state.num_held)
                    .write_u8(state.call_state.as_u8())
                    .write_u8(state.address_type.as_u8())
                    .write_str(&state.number)
                    .write_str(&state.name);
            }
            Self::NotifyDeviceStatus { addr, status } => {
                p.write_address(*addr)
                    .write_u8(status.network.as_u8())
                    .write_u8(status.roaming.as_u8())
                    .write_u8(status.signal)
                    .write_u8(status.battery);
            }
            Self::VolumeControl {
                addr,
                volume_type,
                volume,
            } => {
                p.write_address(*addr).write_u8(volume_type.as_u8()).write_u8(*volume);
            }
            Self::SendAtCommand { addr, command } => {
                p.write_address(*addr).write_str(command);
            }
            Self::SendVendorSpecificAtCommand {
                addr,
                command,
                value,
            } => {
                p.write_address(*addr).write_str(command).write_str(value);
            }
            Self::DialResponse { result } => {
                p.write_u8(*result);
            }
        }
    }

    /// Decodes a request from its transaction code and argument parcel.
    /// Returns `None` for codes outside the AG request range.
    pub fn read_parcel(
        code: u32,
        r: &mut ParcelReader<'_>,
    ) -> Option<Result<Self, ParcelError>> {
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
            START_VIRTUAL_CALL => r.read_address().map(|addr| Self::StartVirtualCall { addr }),
            STOP_VIRTUAL_CALL => r.read_address().map(|addr| Self::StopVirtualCall { addr }),
            START_VOICE_RECOGNITION => r.read_address().map(|addr| Self::StartVoiceRecognition { addr }),
            STOP_VOICE_RECOGNITION => r.read_address().map(|addr| Self::StopVoiceRecognition { addr }),
            PHONE_STATE_CHANGE => read_phone_state_change(r),
            NOTIFY_DEVICE_STATUS => read_device_status(r),
            VOLUME_CONTROL => read_volume_control(r),
            SEND_AT_COMMAND => read_at_command(r),
            SEND_VENDOR_SPECIFIC_AT_COMMAND => read_vendor_at_command(r),
            DIAL_RESPONSE => r.read_u8().map(|result| Self::DialResponse { result }),
            _ => return None,
        };
        Some(result)
    }
}

fn read_volume_control(r: &mut ParcelReader<'_>) -> Result<AgRequest, ParcelError> {
    Ok(AgRequest::VolumeControl {
        addr: r.read_address()?,
        volume_type: r.read_enum("volume_type", VolumeType::from_u8)?,
        volume: r.read_u8()?,
    })
}

fn read_at_command(r: &mut ParcelReader<'_>) -> Result<AgRequest, ParcelError> {
    Ok(AgRequest::SendAtCommand {
        addr: r.read_address()?,
        command: r.read_string()?,
    })
}

fn read_vendor_at_command(r: &mut ParcelReader<'_>) -> Result<AgRequest, ParcelError> {
    Ok(AgRequest::SendVendorSpecificAtCommand {
        addr: r.read_address()?,
        command: r.read_string()?,
        value: r.read_string()?,
    })
}

fn read_phone_state_change(r: &mut ParcelReader<'_>) -> Result<AgRequest, ParcelError> {
    Ok(AgRequest::PhoneStateChange {
        addr: r.read_address()?,
        state: PhoneState {
            num_active: r.read_u8()?,
            num_held: r.read_u8()?,
            call_state: r.read_enum("call_state", AgCallState::from_u8)?,
            address_type: r.read_enum("address_type", CallAddressType::from_u8)?,
            number: r.read_string()?,
            name: r.read_string()?,
        },
    })
}

fn read_device_status(r: &mut ParcelReader<'_>) -> Result<AgRequest, ParcelError> {
    Ok(AgRequest::NotifyDeviceStatus {
        addr: r.read_address()?,
        status: DeviceStatus {
            network: r.read_enum("network", NetworkState::from_u8)?,
            roaming: r.read_enum("roaming", RoamingState::from_u8)?,
            signal: r.read_u8()?,
            battery: r.read_u8()?,
        },
    })
}

// ============================================================================
// Push codec
// ============================================================================

pub fn push_code(n: &AgNotification) -> u32 {
    use opcode::*;
    match n {
        AgNotification::ConnectionState { .. } => ON_CONNECTION_STATE_CHANGED,
        AgNotification::AudioState { .. } => ON_AUDIO_STATE_CHANGED,
        AgNotification::VoiceRecognitionState { .. } => ON_VOICE_RECOGNITION_STATE_CHANGED,
        AgNotification::BatteryLevel { .. } => ON_BATTERY_LEVEL_CHANGED,
        AgNotification::VolumeControl { .. } => ON_VOLUME_CONTROL,
        AgNotification::AnswerCall { .. } => ON_ANSWER_CALL,
        AgNotification::RejectCall { .. } => ON_REJECT_CALL,
        AgNotification::HangupCall { .. } => ON_HANGUP_CALL,
        AgNotification::DialCall { .. } => ON_DIAL_CALL,
        AgNotification::AtCommand { .. } => ON_AT_COMMAND_RECEIVED,
        AgNotification::VendorAtCommand { .. } => ON_VENDOR_SPECIFIC_AT_COMMAND_RECEIVED,
    }
}

pub fn write_push(n: &AgNotification, p: &mut Parcel) {
    p.write_address(n.address());
    match n {
        AgNotification::ConnectionState { state, .. } => {
            p.write_u8(state.as_u8());
        }
        AgNotification::AudioState { state, .. } => {
            p.write_u8(state.as_u8());
        }
        AgNotification::VoiceRecognitionState { started, .. } => {
            p.write_bool(*started);
        }
        AgNotification::BatteryLevel { level, .. } => {
            p.write_u8(*level);
        }
        AgNotification::VolumeControl {
            volume_type, volume, ..
        } => {
            p.write_u8(volume_type.as_u8()).write_u8(*volume);
        }
        AgNotification::AnswerCall { .. }
        | AgNotification::RejectCall { .. }
        | AgNotification::HangupCall { .. } => {}
        AgNotification::DialCall { number, .. } => {
            p.write_bool(number.is_some());
            if let Some(number) = number {
                p.write_str(number);
            }
        }
        AgNotification::AtCommand { command, .. } => {
            p.write_str(command);
        }
        AgNotification::VendorAtCommand {
            command,
            company_id,
            value,
            ..
        } => {
            p.write_str(command).write_u16(*company_id).write_str(value);
        }
    }
}

pub fn read_push(code: u32, r: &mut ParcelReader<'_>) -> Option<Result<AgNotification, ParcelError>> {
    use opcode::*;
    let known = matches!(
        code,
        ON_CONNECTION_STATE_CHANGED..=ON_VENDOR_SPECIFIC_AT_COMMAND_RECEIVED
    );
    if !known {
        return None;
    }

    Some(read_push_body(code, r))
}

fn read_push_body(code: u32, r: &mut ParcelReader<'_>) -> Result<AgNotification, ParcelError> {
    use opcode::*;
    let addr = r.read_address()?;
    Ok(match code {
        ON_CONNECTION_STATE_CHANGED => AgNotification::ConnectionState {
            addr,
            state: r.read_enum("connection_state", ProfileConnectionState::from_u8)?,
        },
        ON_AUDIO_STATE_CHANGED => AgNotification::AudioState {
            addr,
            state: r.read_enum("audio_state", AudioState::from_u8)?,
        },
        ON_VOICE_RECOGNITION_STATE_CHANGED => AgNotification::VoiceRecognitionState {
            addr,
            started: r.read_bool()?,
        },
        ON_BATTERY_LEVEL_CHANGED => AgNotification::BatteryLevel {
            addr,
            level: r.read_u8()?,
        },
        ON_VOLUME_CONTROL => AgNotification::VolumeControl {
            addr,
            volume_type: r.read_enum("volume_type", VolumeType::from_u8)?,
            volume: r.read_u8()?,
        },
        ON_ANSWER_CALL => AgNotification::AnswerCall { addr },
        ON_REJECT_CALL => AgNotification::RejectCall { addr },
        ON_HANGUP_CALL => AgNotification::HangupCall { addr },
        ON_DIAL_CALL => {
            let number = if r.read_bool()? {
                Some(r.read_string()?)
            } else {
                None
            };
            AgNotification::DialCall { addr, number }
        }
        ON_AT_COMMAND_RECEIVED => AgNotification::AtCommand {
            addr,
            command: r.read_string()?,
        },
        _ => AgNotification::VendorAtCommand {
            addr,
            command: r.read_string()?,
            company_id: r.read_u16()?,
            value: r.read_string()?,
        },
    })
}
