//! Per-device audio gateway state machine.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> AudioConnecting -> AudioOn
//!       ^                          |  ^                           |
//!       +------ Disconnecting <----+  +---- AudioDisconnecting <--+
//! ```
//!
//! Connected, AudioConnecting, AudioOn and AudioDisconnecting share one
//! fallback handler for call control, indicators and AT traffic.

use std::time::Duration;

use bt_core::text::AT_COMMAND_CAPACITY;
use bt_core::{
    bounded_copy, AgCallState, AgNotification, AudioState, BtAddress, CallAddressType, PhoneState,
    ProfileConnectionState, VolumeType,
};
use tracing::{debug, error, info, warn};

use super::stack::{at_result, AgStack};
use super::{AgEvent, AgProfile};
use crate::event_loop::TimerHandle;
use crate::hsm::{HsmCore, StateMachine};
use crate::profile::Env;
use crate::session::DeviceSession;

/// How long a dial request from the hands-free unit may wait for
/// `dial_response` before it is answered with a timeout.
pub const DIAL_OUT_TIMEOUT: Duration = Duration::from_secs(5);

const AT_TEST: &str = "AT+TEST\r\n";
const AT_TEST_RESPONSE: &str = "\r\n+TEST:0\r\n";
const AT_OK: &str = "\r\nOK\r\n";

/// Vendor AT prefixes routed to `on_vendor_at_command_received`.
const VENDOR_PREFIXES: [(&str, u16); 2] = [("+XIAOMI", 0x038F), ("+ANDROID", 0x00E0)];

/// Ordered: everything at or above `Connected` has a service level link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AgState {
    Disconnected,
    Connecting,
    Disconnecting,
    Connected,
    AudioConnecting,
    AudioOn,
    AudioDisconnecting,
}

type Ctx<'a> = Env<'a, AgProfile>;

pub struct AgSession {
    addr: BtAddress,
    core: HsmCore<AgState>,
    remote_features: u32,
    spk_volume: u8,
    mic_volume: u8,
    recognition_active: bool,
    virtual_call_started: bool,
    pending_disconnect: bool,
    /// Last telephony state pushed by the application.
    phone: Option<PhoneState>,
    connect_timer: Option<TimerHandle>,
    dial_timer: Option<TimerHandle>,
}

impl AgSession {
    pub fn new(addr: BtAddress) -> Self {
        Self {
            addr,
            core: HsmCore::new(AgState::Disconnected),
            remote_features: 0,
            spk_volume: 0,
            mic_volume: 0,
            recognition_active: false,
            virtual_call_started: false,
            pending_disconnect: false,
            phone: None,
            connect_timer: None,
            dial_timer: None,
        }
    }

    pub fn state(&self) -> AgState {
        self.core.current()
    }

    pub fn remote_features(&self) -> u32 {
        self.remote_features
    }

    pub fn volume(&self, kind: VolumeType) -> u8 {
        match kind {
            VolumeType::Speaker => self.spk_volume,
            VolumeType::Microphone => self.mic_volume,
        }
    }

    pub fn is_virtual_call_started(&self) -> bool {
        self.virtual_call_started
    }

    pub fn is_connected(&self) -> bool {
        self.state() >= AgState::Connected
    }

    pub fn is_audio_connected(&self) -> bool {
        self.state() == AgState::AudioOn
    }

    pub fn handle(&mut self, ctx: &mut Ctx<'_>, event: AgEvent) {
        let name = event_name(&event);
        if !self.dispatch(ctx, event) {
            debug!(addr = %self.addr, state = ?self.state(), event = name, "Event not consumed");
        }
    }

    fn notify_connection(&self, ctx: &mut Ctx<'_>, state: ProfileConnectionState) {
        info!(addr = %self.addr, state = ?state, "AG connection state");
        ctx.notify(AgNotification::ConnectionState {
            addr: self.addr,
            state,
        });
    }

    fn notify_audio(&self, ctx: &mut Ctx<'_>, state: AudioState) {
        info!(addr = %self.addr, state = ?state, "AG audio state");
        ctx.notify(AgNotification::AudioState {
            addr: self.addr,
            state,
        });
    }

    fn report(&self, op: &'static str, result: bt_core::BtResult<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                error!(addr = %self.addr, op, error = %e, "Stack request failed");
                false
            }
        }
    }

    fn cancel_connect_timer(&mut self) {
        if let Some(timer) = self.connect_timer.take() {
            timer.cancel();
        }
    }

    fn is_virtual_call_allowed(&self) -> bool {
        if self.state() != AgState::Connected || self.virtual_call_started {
            return false;
        }
        match &self.phone {
            Some(phone) => {
                phone.num_active == 0
                    && phone.num_held == 0
                    && matches!(phone.call_state, AgCallState::Idle | AgCallState::Disconnected)
            }
            None => true,
        }
    }

    fn set_virtual_call_started(&mut self, ctx: &mut Ctx<'_>, started: bool) {
        if self.virtual_call_started == started {
            return;
        }
        debug!(addr = %self.addr, started, "Virtual call");
        self.virtual_call_started = started;

        let sequence: &[(u8, AgCallState)] = if started {
            &[
                (0, AgCallState::Dialing),
                (0, AgCallState::Alerting),
                (1, AgCallState::Active),
            ]
        } else {
            &[(0, AgCallState::Disconnected), (0, AgCallState::Idle)]
        };
        for &(num_active, call_state) in sequence {
            let phone = PhoneState {
                num_active,
                num_held: 0,
                call_state,
                address_type: CallAddressType::Unknown,
                number: String::new(),
                name: String::new(),
            };
            let result = ctx.stack().phone_state_change(self.addr, &phone);
            self.report("phone_state_change", result);
        }
    }

    fn send_vendor_at_command(&self, ctx: &Ctx<'_>, command: &str, value: &str) {
        let at = bounded_copy(&format!("\r\n{command}: {value}\r\n"), AT_COMMAND_CAPACITY);
        debug!(addr = %self.addr, command, value, "Sending vendor AT command");
        self.report("send_at_command", ctx.stack().send_at_command(self.addr, &at));
    }

    /// Routes an unsolicited AT command from the hands-free unit.
    fn process_at_command(&self, ctx: &mut Ctx<'_>, command: &str) {
        if command == AT_TEST {
            self.report("send_at_command", ctx.stack().send_at_command(self.addr, AT_TEST_RESPONSE));
            return;
        }

        if let Some((prefix, company_id, value)) = parse_vendor_at(command) {
            self.notify_vendor_at(ctx, prefix, company_id, value);
            return;
        }

        debug!(addr = %self.addr, command = command.trim(), "Unknown AT command");
        ctx.notify(AgNotification::AtCommand {
            addr: self.addr,
            command: command.to_string(),
        });
        let result = ctx
            .stack()
            .error_response(self.addr, at_result::CME_OPERATION_NOT_SUPPORTED);
        self.report("error_response", result);
    }

    fn notify_vendor_at(&self, ctx: &mut Ctx<'_>, command: &str, company_id: u16, value: &str) {
        debug!(addr = %self.addr, command, company_id, value, "Vendor AT command");
        ctx.notify(AgNotification::VendorAtCommand {
            addr: self.addr,
            command: command.to_string(),
            company_id,
            value: value.to_string(),
        });
        self.report("send_at_command", ctx.stack().send_at_command(self.addr, AT_OK));
    }

    // ------------------------------------------------------------------------
    // Per-state handlers
    // ------------------------------------------------------------------------

    fn process_disconnected(&mut self, ctx: &mut Ctx<'_>, event: AgEvent) -> bool {
        match event {
            AgEvent::Connect => {
                if !self.report("connect", ctx.stack().connect(self.addr)) {
                    self.notify_connection(ctx, ProfileConnectionState::Disconnected);
                    return false;
                }
                self.transition_to(ctx, AgState::Connecting);
            }
            AgEvent::StackConnectionStateChanged {
                state,
                remote_features,
                ..
            } => match state {
                ProfileConnectionState::Connected => {
                    self.remote_features = remote_features;
                    self.transition_to(ctx, AgState::Connected);
                }
                ProfileConnectionState::Connecting => self.transition_to(ctx, AgState::Connecting),
                other => {
                    warn!(addr = %self.addr, state = ?other, "Ignored connection state");
                    return false;
                }
            },
            other => return self.unexpected(&other),
        }
        true
    }

    fn process_connecting(&mut self, ctx: &mut Ctx<'_>, event: AgEvent) -> bool {
        match event {
            AgEvent::Disconnect | AgEvent::ConnectTimeout => {
                self.report("disconnect", ctx.stack().disconnect(self.addr));
                self.transition_to(ctx, AgState::Disconnected);
            }
            AgEvent::SendAtCommand { command } => {
                self.report("send_at_command", ctx.stack().send_at_command(self.addr, &command));
            }
            AgEvent::SendVendorAtCommand { command, value } => {
                self.send_vendor_at_command(ctx, &command, &value);
            }
            AgEvent::StackConnectionStateChanged {
                state,
                reason,
                remote_features,
            } => match state {
                ProfileConnectionState::Connected => {
                    self.remote_features = remote_features;
                    self.transition_to(ctx, AgState::Connected);
                }
                ProfileConnectionState::Disconnected => {
                    debug!(addr = %self.addr, reason = ?reason, "Connection attempt ended");
                    self.transition_to(ctx, AgState::Disconnected);
                }
                other => {
                    warn!(addr = %self.addr, state = ?other, "Ignored connection state");
                    return false;
                }
            },
            AgEvent::StackAtCommand { command } => self.process_at_command(ctx, &command),
            AgEvent::StackVendorAtCommand {
                command,
                company_id,
                value,
            } => self.notify_vendor_at(ctx, &command, company_id, &value),
            other => return self.unexpected(&other),
        }
        true
    }

    fn process_disconnecting(&mut self, ctx: &mut Ctx<'_>, event: AgEvent) -> bool {
        match event {
            AgEvent::StackConnectionStateChanged {
                state: ProfileConnectionState::Disconnected,
                ..
            } => {
                self.transition_to(ctx, AgState::Disconnected);
                true
            }
            AgEvent::StackConnectionStateChanged { state, .. } => {
                warn!(addr = %self.addr, state = ?state, "Ignored connection state");
                false
            }
            other => self.unexpected(&other),
        }
    }

    fn process_connected(&mut self, ctx: &mut Ctx<'_>, event: AgEvent) -> bool {
        match event {
            AgEvent::Disconnect => {
                self.report("disconnect", ctx.stack().disconnect(self.addr));
                self.transition_to(ctx, AgState::Disconnecting);
            }
            AgEvent::ConnectAudio => {
                if !self.report("connect_audio", ctx.stack().connect_audio(self.addr)) {
                    self.notify_audio(ctx, AudioState::Disconnected);
                    return false;
                }
                self.transition_to(ctx, AgState::AudioConnecting);
            }
            AgEvent::StartVirtualCall => {
                if !self.is_virtual_call_allowed() {
                    warn!(addr = %self.addr, "Virtual call not allowed");
                    self.notify_audio(ctx, AudioState::Disconnected);
                    return false;
                }
                self.set_virtual_call_started(ctx, true);
                if !self.report("connect_audio", ctx.stack().connect_audio(self.addr)) {
                    self.set_virtual_call_started(ctx, false);
                    self.notify_audio(ctx, AudioState::Disconnected);
                    return false;
                }
                self.transition_to(ctx, AgState::AudioConnecting);
            }
            AgEvent::StackAudioRequest => {
                if !self.report("accept_audio", ctx.stack().accept_audio(self.addr)) {
                    return false;
                }
                self.transition_to(ctx, AgState::AudioConnecting);
            }
            AgEvent::StackConnectionStateChanged { state, .. } => {
                return self.process_link_state(ctx, state)
            }
            AgEvent::StackAudioStateChanged {
                state: AudioState::Connected,
            } => self.transition_to(ctx, AgState::AudioOn),
            AgEvent::StackAudioStateChanged { state } => {
                warn!(addr = %self.addr, state = ?state, "Ignored audio state");
                return false;
            }
            other => return self.process_default(ctx, other),
        }
        true
    }

    fn process_audio_connecting(&mut self, ctx: &mut Ctx<'_>, event: AgEvent) -> bool {
        match event {
            AgEvent::Disconnect => {
                if !self.report("disconnect", ctx.stack().disconnect(self.addr)) {
                    self.notify_audio(ctx, AudioState::Disconnected);
                }
                self.transition_to(ctx, AgState::Disconnecting);
            }
            AgEvent::DisconnectAudio | AgEvent::StopVirtualCall => {
                debug!(addr = %self.addr, "Audio still connecting, request dropped");
                return false;
            }
            AgEvent::StackAudioRequest => {
                debug!(addr = %self.addr, "Already connecting audio");
            }
            AgEvent::StackConnectionStateChanged { state, .. } => {
                return self.process_link_state(ctx, state)
            }
            AgEvent::StackAudioStateChanged { state } => match state {
                AudioState::Connected => self.transition_to(ctx, AgState::AudioOn),
                AudioState::Disconnected => self.transition_to(ctx, AgState::Connected),
                other => {
                    warn!(addr = %self.addr, state = ?other, "Ignored audio state");
                    return false;
                }
            },
            other => return self.process_default(ctx, other),
        }
        true
    }

    fn process_audio_on(&mut self, ctx: &mut Ctx<'_>, event: AgEvent) -> bool {
        match event {
            AgEvent::Disconnect => {
                if ctx.stack().disconnect_audio(self.addr).is_ok() {
                    debug!(addr = %self.addr, "Waiting for audio to close before disconnecting");
                    self.pending_disconnect = true;
                    self.transition_to(ctx, AgState::AudioDisconnecting);
                    return true;
                }
                if !self.report("disconnect", ctx.stack().disconnect(self.addr)) {
                    self.notify_audio(ctx, AudioState::Disconnected);
                }
                self.transition_to(ctx, AgState::Disconnecting);
            }
            AgEvent::DisconnectAudio => {
                if !self.report("disconnect_audio", ctx.stack().disconnect_audio(self.addr)) {
                    self.transition_to(ctx, AgState::Connected);
                    return false;
                }
                self.transition_to(ctx, AgState::AudioDisconnecting);
            }
            AgEvent::StopVirtualCall => {
                if !self.virtual_call_started {
                    warn!(addr = %self.addr, "Virtual call not started");
                    return false;
                }
                self.set_virtual_call_started(ctx, false);
                if !self.report("disconnect_audio", ctx.stack().disconnect_audio(self.addr)) {
                    self.transition_to(ctx, AgState::Connected);
                    return false;
                }
                self.transition_to(ctx, AgState::AudioDisconnecting);
            }
            AgEvent::VoiceRecognitionStart | AgEvent::VoiceRecognitionStop => {
                debug!(addr = %self.addr, "Voice recognition ignored while audio is on");
                return false;
            }
            AgEvent::SetVolume { kind, volume } => {
                if self.volume(kind) == volume {
                    return true;
                }
                if !self.report("set_volume", ctx.stack().set_volume(self.addr, kind, volume)) {
                    return false;
                }
                match kind {
                    VolumeType::Speaker => self.spk_volume = volume,
                    VolumeType::Microphone => self.mic_volume = volume,
                }
            }
            AgEvent::StackConnectionStateChanged { state, .. } => {
                return self.process_link_state(ctx, state)
            }
            AgEvent::StackAudioStateChanged {
                state: AudioState::Disconnected,
            } => self.transition_to(ctx, AgState::Connected),
            AgEvent::StackAudioStateChanged { state } => {
                warn!(addr = %self.addr, state = ?state, "Ignored audio state");
                return false;
            }
            other => return self.process_default(ctx, other),
        }
        true
    }

    fn process_audio_disconnecting(&mut self, ctx: &mut Ctx<'_>, event: AgEvent) -> bool {
        match event {
            AgEvent::Disconnect => {
                self.report("disconnect", ctx.stack().disconnect(self.addr));
                self.transition_to(ctx, AgState::Disconnecting);
            }
            AgEvent::StackConnectionStateChanged { state, .. } => {
                return self.process_link_state(ctx, state)
            }
            AgEvent::StackAudioStateChanged {
                state: AudioState::Disconnected,
            } => self.transition_to(ctx, AgState::Connected),
            AgEvent::StackAudioStateChanged { state } => {
                warn!(addr = %self.addr, state = ?state, "Ignored audio state");
                return false;
            }
            other => return self.process_default(ctx, other),
        }
        true
    }

    /// Link-level state changes while a service level link is up.
    fn process_link_state(&mut self, ctx: &mut Ctx<'_>, state: ProfileConnectionState) -> bool {
        match state {
            ProfileConnectionState::Disconnected => self.transition_to(ctx, AgState::Disconnected),
            ProfileConnectionState::Disconnecting => {
                self.transition_to(ctx, AgState::Disconnecting)
            }
            other => {
                warn!(addr = %self.addr, state = ?other, "Ignored connection state");
                return false;
            }
        }
        true
    }

    fn process_default(&mut self, ctx: &mut Ctx<'_>, event: AgEvent) -> bool {
        let addr = self.addr;
        match event {
            AgEvent::VoiceRecognitionStart => {
                if !self.recognition_active {
                    self.report(
                        "start_voice_recognition",
                        ctx.stack().start_voice_recognition(addr),
                    );
                }
            }
            AgEvent::VoiceRecognitionStop => {
                if self.recognition_active {
                    self.report(
                        "stop_voice_recognition",
                        ctx.stack().stop_voice_recognition(addr),
                    );
                }
            }
            AgEvent::PhoneStateChange(phone) => {
                let busy = phone.num_active + phone.num_held > 0
                    || !matches!(phone.call_state, AgCallState::Idle | AgCallState::Disconnected);
                if busy {
                    self.set_virtual_call_started(ctx, false);
                }
                self.report("phone_state_change", ctx.stack().phone_state_change(addr, &phone));
                self.phone = Some(phone);
            }
            AgEvent::DeviceStatusChanged(status) => {
                self.report(
                    "device_status_changed",
                    ctx.stack().device_status_changed(addr, status),
                );
            }
            AgEvent::SetInbandRingEnable { enabled } => {
                self.report(
                    "set_inband_ring_enable",
                    ctx.stack().set_inband_ring_enable(addr, enabled),
                );
            }
            AgEvent::SendAtCommand { command } => {
                self.report("send_at_command", ctx.stack().send_at_command(addr, &command));
            }
            AgEvent::SendVendorAtCommand { command, value } => {
                self.send_vendor_at_command(ctx, &command, &value);
            }
            AgEvent::DialingResult { result } => {
                // Only the session that forwarded a dial request answers.
                let Some(timer) = self.dial_timer.take() else {
                    return false;
                };
                timer.cancel();
                self.report("dial_response", ctx.stack().dial_response(addr, result));
            }
            AgEvent::StackVoiceRecognitionChanged { started } => {
                self.recognition_active = started;
                ctx.notify(AgNotification::VoiceRecognitionState { addr, started });
            }
            AgEvent::StackVolumeChanged { kind, volume } => {
                match kind {
                    VolumeType::Speaker => self.spk_volume = volume,
                    VolumeType::Microphone => self.mic_volume = volume,
                }
                debug!(addr = %addr, kind = ?kind, volume, "Remote volume changed");
                ctx.notify(AgNotification::VolumeControl {
                    addr,
                    volume_type: kind,
                    volume,
                });
            }
            AgEvent::StackBatteryUpdate { level } => {
                ctx.notify(AgNotification::BatteryLevel { addr, level });
            }
            AgEvent::StackAnswerCall => ctx.notify(AgNotification::AnswerCall { addr }),
            AgEvent::StackRejectCall => ctx.notify(AgNotification::RejectCall { addr }),
            AgEvent::StackHangupCall => ctx.notify(AgNotification::HangupCall { addr }),
            AgEvent::StackDialNumber { number } => {
                self.set_virtual_call_started(ctx, false);
                match &number {
                    Some(number) => {
                        debug!(addr = %addr, number = %number, "Dial request");
                        if let Some(old) = self.dial_timer.take() {
                            old.cancel();
                        }
                        self.dial_timer = ctx.schedule(
                            DIAL_OUT_TIMEOUT,
                            addr,
                            AgEvent::DialingResult {
                                result: at_result::TIMEOUT,
                            },
                        );
                    }
                    None => {
                        debug!(addr = %addr, "Redial not supported");
                        self.report(
                            "dial_response",
                            ctx.stack().dial_response(addr, at_result::ERROR),
                        );
                    }
                }
                ctx.notify(AgNotification::DialCall { addr, number });
            }
            AgEvent::StackDialMemory { location } => {
                debug!(addr = %addr, location, "Memory dial not handled");
                return false;
            }
            AgEvent::StackAtCommand { command } => self.process_at_command(ctx, &command),
            AgEvent::StackVendorAtCommand {
                command,
                company_id,
                value,
            } => self.notify_vendor_at(ctx, &command, company_id, &value),
            other => return self.unexpected(&other),
        }
        true
    }

    fn unexpected(&self, event: &AgEvent) -> bool {
        warn!(addr = %self.addr, state = ?self.state(), event = event_name(event), "Unexpected event");
        false
    }
}

fn event_name(event: &AgEvent) -> &'static str {
    bt_core::ProfileEvent::name(event)
}

/// Splits `AT<prefix><sep><value>` for a known vendor prefix.
fn parse_vendor_at(command: &str) -> Option<(&'static str, u16, &str)> {
    let body = command.get(2..)?;
    VENDOR_PREFIXES.iter().find_map(|&(prefix, company_id)| {
        if !body.starts_with(prefix) || command.len() <= prefix.len() + 3 {
            return None;
        }
        let value = command.get(prefix.len() + 3..)?;
        if value.starts_with(['\r', '\n']) {
            return None;
        }
        Some((prefix, company_id, value.trim_end_matches(['\r', '\n'])))
    })
}

impl<'a> StateMachine<Ctx<'a>> for AgSession {
    type State = AgState;
    type Event = AgEvent;

    fn core(&self) -> &HsmCore<AgState> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut HsmCore<AgState> {
        &mut self.core
    }

    fn on_enter(&mut self, ctx: &mut Ctx<'a>, state: AgState) {
        debug!(addr = %self.addr, state = ?state, "Enter");
        match state {
            AgState::Disconnected => {
                if self.core.previous().is_some() {
                    self.spk_volume = 0;
                    self.mic_volume = 0;
                    self.recognition_active = false;
                    self.virtual_call_started = false;
                    self.pending_disconnect = false;
                    self.notify_connection(ctx, ProfileConnectionState::Disconnected);
                }
            }
            AgState::Connecting => {
                self.connect_timer = ctx.schedule(
                    ctx.config().connect_timeout(),
                    self.addr,
                    AgEvent::ConnectTimeout,
                );
                self.notify_connection(ctx, ProfileConnectionState::Connecting);
            }
            AgState::Disconnecting => {
                self.notify_connection(ctx, ProfileConnectionState::Disconnecting);
            }
            AgState::Connected => {
                let from_link_setup = self
                    .core
                    .previous()
                    .map_or(true, |prev| prev < AgState::Connected);
                if from_link_setup {
                    self.notify_connection(ctx, ProfileConnectionState::Connected);
                } else {
                    self.notify_audio(ctx, AudioState::Disconnected);
                }
                if self.pending_disconnect {
                    self.pending_disconnect = false;
                    self.process_connected(ctx, AgEvent::Disconnect);
                }
            }
            AgState::AudioConnecting => self.notify_audio(ctx, AudioState::Connecting),
            AgState::AudioOn => self.notify_audio(ctx, AudioState::Connected),
            AgState::AudioDisconnecting => self.notify_audio(ctx, AudioState::Disconnecting),
        }
    }

    fn on_exit(&mut self, ctx: &mut Ctx<'a>, state: AgState) {
        debug!(addr = %self.addr, state = ?state, "Exit");
        match state {
            AgState::Connecting => self.cancel_connect_timer(),
            AgState::AudioOn => self.set_virtual_call_started(ctx, false),
            _ => {}
        }
    }

    fn process(&mut self, ctx: &mut Ctx<'a>, state: AgState, event: AgEvent) -> bool {
        debug!(addr = %self.addr, state = ?state, event = event_name(&event), "Process");
        match state {
            AgState::Disconnected => self.process_disconnected(ctx, event),
            AgState::Connecting => self.process_connecting(ctx, event),
            AgState::Disconnecting => self.process_disconnecting(ctx, event),
            AgState::Connected => self.process_connected(ctx, event),
            AgState::AudioConnecting => self.process_audio_connecting(ctx, event),
            AgState::AudioOn => self.process_audio_on(ctx, event),
            AgState::AudioDisconnecting => self.process_audio_disconnecting(ctx, event),
        }
    }
}

impl DeviceSession for AgSession {
    fn address(&self) -> BtAddress {
        self.addr
    }

    fn connection_state(&self) -> ProfileConnectionState {
        match self.state() {
            AgState::Disconnected => ProfileConnectionState::Disconnected,
            AgState::Connecting => ProfileConnectionState::Connecting,
            AgState::Disconnecting => ProfileConnectionState::Disconnecting,
            _ => ProfileConnectionState::Connected,
        }
    }

    fn audio_state(&self) -> AudioState {
        match self.state() {
            AgState::AudioConnecting => AudioState::Connecting,
            AgState::AudioOn => AudioState::Connected,
            AgState::AudioDisconnecting => AudioState::Disconnecting,
            _ => AudioState::Disconnected,
        }
    }

    fn is_counted(&self) -> bool {
        let state = self.state();
        state >= AgState::Connected || state == AgState::Connecting
    }

    fn release(&mut self) {
        self.cancel_connect_timer();
        if let Some(timer) = self.dial_timer.take() {
            timer.cancel();
        }
    }
}
