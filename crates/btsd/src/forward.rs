//! Listener adapter that turns callback invocations into push values.
//!
//! Both RPC backends register a [`PushForwarder`] on behalf of a remote
//! client. The forwarder rebuilds the notification each callback stands
//! for and hands it to a [`PushSink`], which owns delivery.

use bt_core::{
    AgNotification, AudioState, BtAddress, CallHeld, CallIndicator, CallSetup, CurrentCall,
    HfNotification, HfpAgCallbacks, HfpHfCallbacks, ProfileConnectionState, VolumeType,
};
use bt_protocol::Push;
use tokio::sync::mpsc;
use tracing::trace;

/// Destination of pushes produced by a [`PushForwarder`].
///
/// Called on the event loop; implementations must not block.
pub trait PushSink: Send + Sync + 'static {
    fn push(&self, push: Push);
}

impl PushSink for mpsc::UnboundedSender<Push> {
    fn push(&self, push: Push) {
        if self.send(push).is_err() {
            trace!("Push dropped, receiver closed");
        }
    }
}

pub struct PushForwarder<S> {
    sink: S,
}

impl<S: PushSink> PushForwarder<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn ag(&self, note: AgNotification) {
        self.sink.push(Push::Ag(note));
    }

    fn hf(&self, note: HfNotification) {
        self.sink.push(Push::Hf(note));
    }
}

impl<S: PushSink> HfpAgCallbacks for PushForwarder<S> {
    fn on_connection_state_changed(&self, addr: BtAddress, state: ProfileConnectionState) {
        self.ag(AgNotification::ConnectionState { addr, state });
    }

    fn on_audio_state_changed(&self, addr: BtAddress, state: AudioState) {
        self.ag(AgNotification::AudioState { addr, state });
    }

    fn on_voice_recognition_state_changed(&self, addr: BtAddress, started: bool) {
        self.ag(AgNotification::VoiceRecognitionState { addr, started });
    }

    fn on_battery_level_changed(&self, addr: BtAddress, level: u8) {
        self.ag(AgNotification::BatteryLevel { addr, level });
    }

    fn on_volume_control(&self, addr: BtAddress, kind: VolumeType, volume: u8) {
        self.ag(AgNotification::VolumeControl {
            addr,
            volume_type: kind,
            volume,
        });
    }

    fn on_answer_call(&self, addr: BtAddress) {
        self.ag(AgNotification::AnswerCall { addr });
    }

    fn on_reject_call(&self, addr: BtAddress) {
        self.ag(AgNotification::RejectCall { addr });
    }

    fn on_hangup_call(&self, addr: BtAddress) {
        self.ag(AgNotification::HangupCall { addr });
    }

    fn on_dial_call(&self, addr: BtAddress, number: Option<&str>) {
        self.ag(AgNotification::DialCall {
            addr,
            number: number.map(str::to_string),
        });
    }

    fn on_at_command_received(&self, addr: BtAddress, command: &str) {
        self.ag(AgNotification::AtCommand {
            addr,
            command: command.to_string(),
        });
    }

    fn on_vendor_at_command_received(
        &self,
        addr: BtAddress,
        command: &str,
        company_id: u16,
        value: &str,
    ) {
        self.ag(AgNotification::VendorAtCommand {
            addr,
            command: command.to_string(),
            company_id,
            value: value.to_string(),
        });
    }
}

impl<S: PushSink> HfpHfCallbacks for PushForwarder<S> {
    fn on_connection_state_changed(&self, addr: BtAddress, state: ProfileConnectionState) {
        self.hf(HfNotification::ConnectionState { addr, state });
    }

    fn on_audio_state_changed(&self, addr: BtAddress, state: AudioState) {
        self.hf(HfNotification::AudioState { addr, state });
    }

    fn on_voice_recognition_state_changed(&self, addr: BtAddress, started: bool) {
        self.hf(HfNotification::VoiceRecognitionState { addr, started });
    }

    fn on_call_state_changed(&self, addr: BtAddress, call: &CurrentCall) {
        self.hf(HfNotification::CallStateChanged {
            addr,
            call: call.clone(),
        });
    }

    fn on_at_command_complete(&self, addr: BtAddress, response: &str) {
        self.hf(HfNotification::AtCommandComplete {
            addr,
            response: response.to_string(),
        });
    }

    fn on_ring_indication(&self, addr: BtAddress, inband: bool) {
        self.hf(HfNotification::RingIndication { addr, inband });
    }

    fn on_volume_changed(&self, addr: BtAddress, kind: VolumeType, volume: u8) {
        self.hf(HfNotification::VolumeChanged {
            addr,
            volume_type: kind,
            volume,
        });
    }

    fn on_call_indicator(&self, addr: BtAddress, call: CallIndicator) {
        self.hf(HfNotification::CallIndicator { addr, call });
    }

    fn on_call_setup_indicator(&self, addr: BtAddress, setup: CallSetup) {
        self.hf(HfNotification::CallSetupIndicator { addr, setup });
    }

    fn on_call_held_indicator(&self, addr: BtAddress, held: CallHeld) {
        self.hf(HfNotification::CallHeldIndicator { addr, held });
    }
}
