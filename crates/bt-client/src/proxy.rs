//! Profile proxies.
//!
//! [`AgProxy`] and [`HfProxy`] implement the same profile traits as the
//! in-process service, so application code does not care which side of a
//! process boundary the profile runs on. Every call maps transport
//! failures to `BtError::IpcError`.

use std::sync::Arc;

use async_trait::async_trait;
use bt_core::{
    BtAddress, BtResult, CallAccept, CallControl, ConnectionPolicy, Cookie, CurrentCall,
    DeviceStatus, HfpAg, HfpAgCallbacks, HfpHf, HfpHfCallbacks, PhoneState,
    ProfileConnectionState, VolumeType,
};
use bt_protocol::{AgRequest, HfRequest, Reply, Request};

use crate::bridge::CallbackBridge;
use crate::transport::Transport;

// ============================================================================
// Audio gateway
// ============================================================================

pub struct AgProxy {
    transport: Arc<dyn Transport>,
    bridge: CallbackBridge<dyn HfpAgCallbacks>,
}

impl AgProxy {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            bridge: CallbackBridge::new(Arc::clone(&transport)),
            transport,
        }
    }

    /// Local listeners currently registered through this proxy.
    pub fn listener_count(&self) -> usize {
        self.bridge.listener_count()
    }

    async fn send(&self, request: AgRequest) -> BtResult<Reply> {
        Ok(self.transport.call(Request::Ag(request.bounded())).await?)
    }
}

#[async_trait]
impl HfpAg for AgProxy {
    async fn register_callbacks(&self, callbacks: Arc<dyn HfpAgCallbacks>) -> BtResult<Cookie> {
        self.bridge.register(callbacks).await
    }

    async fn unregister_callbacks(&self, cookie: Cookie) -> BtResult<()> {
        self.bridge.unregister(cookie).await
    }

    async fn is_connected(&self, addr: BtAddress) -> BtResult<bool> {
        self.send(AgRequest::IsConnected { addr }).await?.into_bool()
    }

    async fn is_audio_connected(&self, addr: BtAddress) -> BtResult<bool> {
        self.send(AgRequest::IsAudioConnected { addr }).await?.into_bool()
    }

    async fn get_connection_state(&self, addr: BtAddress) -> BtResult<ProfileConnectionState> {
        self.send(AgRequest::GetConnectionState { addr })
            .await?
            .into_connection_state()
    }

    async fn connect(&self, addr: BtAddress) -> BtResult<()> {
        self.send(AgRequest::Connect { addr }).await?.into_status()
    }

    async fn disconnect(&self, addr: BtAddress) -> BtResult<()> {
        self.send(AgRequest::Disconnect { addr }).await?.into_status()
    }

    async fn connect_audio(&self, addr: BtAddress) -> BtResult<()> {
        self.send(AgRequest::ConnectAudio { addr }).await?.into_status()
    }

    async fn disconnect_audio(&self, addr: BtAddress) -> BtResult<()> {
        self.send(AgRequest::DisconnectAudio { addr }).await?.into_status()
    }

    async fn start_virtual_call(&self, addr: BtAddress) -> BtResult<()> {
        self.send(AgRequest::StartVirtualCall { addr }).await?.into_status()
    }

    async fn stop_virtual_call(&self, addr: BtAddress) -> BtResult<()> {
        self.send(AgRequest::StopVirtualCall { addr }).await?.into_status()
    }

    async fn start_voice_recognition(&self, addr: BtAddress) -> BtResult<()> {
        self.send(AgRequest::StartVoiceRecognition { addr })
            .await?
            .into_status()
    }

    async fn stop_voice_recognition(&self, addr: BtAddress) -> BtResult<()> {
        self.send(AgRequest::StopVoiceRecognition { addr })
            .await?
            .into_status()
    }

    async fn phone_state_change(&self, addr: BtAddress, state: PhoneState) -> BtResult<()> {
        self.send(AgRequest::PhoneStateChange { addr, state })
            .await?
            .into_status()
    }

    async fn notify_device_status(&self, addr: BtAddress, status: DeviceStatus) -> BtResult<()> {
        self.send(AgRequest::NotifyDeviceStatus { addr, status })
            .await?
            .into_status()
    }

    async fn volume_control(&self, addr: BtAddress, kind: VolumeType, volume: u8) -> BtResult<()> {
        self.send(AgRequest::VolumeControl {
            addr,
            volume_type: kind,
            volume,
        })
        .await?
        .into_status()
    }

    async fn dial_response(&self, result: u8) -> BtResult<()> {
        self.send(AgRequest::DialResponse { result }).await?.into_status()
    }

    async fn send_at_command(&self, addr: BtAddress, command: &str) -> BtResult<()> {
        self.send(AgRequest::SendAtCommand {
            addr,
            command: command.to_string(),
        })
        .await?
        .into_status()
    }

    async fn send_vendor_specific_at_command(
        &self,
        addr: BtAddress,
        command: &str,
        value: &str,
    ) -> BtResult<()> {
        self.send(AgRequest::SendVendorSpecificAtCommand {
            addr,
            command: command.to_string(),
            value: value.to_string(),
        })
        .await?
        .into_status()
    }
}

// ============================================================================
// Hands-free unit
// ============================================================================

pub struct HfProxy {
    transport: Arc<dyn Transport>,
    bridge: CallbackBridge<dyn HfpHfCallbacks>,
}

impl HfProxy {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            bridge: CallbackBridge::new(Arc::clone(&transport)),
            transport,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.bridge.listener_count()
    }

    async fn send(&self, request: HfRequest) -> BtResult<Reply> {
        Ok(self.transport.call(Request::Hf(request.bounded())).await?)
    }

    async fn status(&self, request: HfRequest) -> BtResult<()> {
        self.send(request).await?.into_status()
    }
}

#[async_trait]
impl HfpHf for HfProxy {
    async fn register_callbacks(&self, callbacks: Arc<dyn HfpHfCallbacks>) -> BtResult<Cookie> {
        self.bridge.register(callbacks).await
    }

    async fn unregister_callbacks(&self, cookie: Cookie) -> BtResult<()> {
        self.bridge.unregister(cookie).await
    }

    async fn is_connected(&self, addr: BtAddress) -> BtResult<bool> {
        self.send(HfRequest::IsConnected { addr }).await?.into_bool()
    }

    async fn is_audio_connected(&self, addr: BtAddress) -> BtResult<bool> {
        self.send(HfRequest::IsAudioConnected { addr }).await?.into_bool()
    }

    async fn get_connection_state(&self, addr: BtAddress) -> BtResult<ProfileConnectionState> {
        self.send(HfRequest::GetConnectionState { addr })
            .await?
            .into_connection_state()
    }

    async fn connect(&self, addr: BtAddress) -> BtResult<()> {
        self.status(HfRequest::Connect { addr }).await
    }

    async fn disconnect(&self, addr: BtAddress) -> BtResult<()> {
        self.status(HfRequest::Disconnect { addr }).await
    }

    async fn set_connection_policy(&self, addr: BtAddress, policy: ConnectionPolicy) -> BtResult<()> {
        self.status(HfRequest::SetConnectionPolicy { addr, policy }).await
    }

    async fn connect_audio(&self, addr: BtAddress) -> BtResult<()> {
        self.status(HfRequest::ConnectAudio { addr }).await
    }

    async fn disconnect_audio(&self, addr: BtAddress) -> BtResult<()> {
        self.status(HfRequest::DisconnectAudio { addr }).await
    }

    async fn start_voice_recognition(&self, addr: BtAddress) -> BtResult<()> {
        self.status(HfRequest::StartVoiceRecognition { addr }).await
    }

    async fn stop_voice_recognition(&self, addr: BtAddress) -> BtResult<()> {
        self.status(HfRequest::StopVoiceRecognition { addr }).await
    }

    async fn dial(&self, addr: BtAddress, number: &str) -> BtResult<()> {
        self.status(HfRequest::Dial {
            addr,
            number: number.to_string(),
        })
        .await
    }

    async fn dial_memory(&self, addr: BtAddress, location: u32) -> BtResult<()> {
        self.status(HfRequest::DialMemory { addr, location }).await
    }

    async fn redial(&self, addr: BtAddress) -> BtResult<()> {
        self.status(HfRequest::Redial { addr }).await
    }

    async fn accept_call(&self, addr: BtAddress, flag: CallAccept) -> BtResult<()> {
        self.status(HfRequest::AcceptCall { addr, flag }).await
    }

    async fn reject_call(&self, addr: BtAddress) -> BtResult<()> {
        self.status(HfRequest::RejectCall { addr }).await
    }

    async fn hold_call(&self, addr: BtAddress) -> BtResult<()> {
        self.status(HfRequest::HoldCall { addr }).await
    }

    async fn terminate_call(&self, addr: BtAddress) -> BtResult<()> {
        self.status(HfRequest::TerminateCall { addr }).await
    }

    async fn control_call(&self, addr: BtAddress, chld: CallControl, index: u8) -> BtResult<()> {
        self.status(HfRequest::ControlCall {
            addr,
            chld: chld.as_u8(),
            index,
        })
        .await
    }

    async fn query_current_calls(&self, addr: BtAddress) -> BtResult<Vec<CurrentCall>> {
        self.send(HfRequest::QueryCurrentCalls { addr })
            .await?
            .into_calls()
    }

    async fn send_at_cmd(&self, addr: BtAddress, command: &str) -> BtResult<()> {
        self.status(HfRequest::SendAtCmd {
            addr,
            command: command.to_string(),
        })
        .await
    }

    async fn update_battery_level(&self, addr: BtAddress, level: u8) -> BtResult<()> {
        self.status(HfRequest::UpdateBatteryLevel { addr, level }).await
    }

    async fn volume_control(&self, addr: BtAddress, kind: VolumeType, volume: u8) -> BtResult<()> {
        self.status(HfRequest::VolumeControl {
            addr,
            volume_type: kind,
            volume,
        })
        .await
    }

    async fn send_dtmf(&self, addr: BtAddress, dtmf: char) -> BtResult<()> {
        self.status(HfRequest::SendDtmf { addr, dtmf }).await
    }
}
