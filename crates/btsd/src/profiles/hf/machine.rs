//! Per-device hands-free unit state machine.
//!
//! ```text
//! Disconnected -> Connecting -> Connected <-> AudioOn
//!       ^              |             |            |
//!       +--------------+-------------+------------+
//! ```
//!
//! Call control, indicator tracking and the +CLCC call list are shared by
//! Connected and AudioOn.

use std::collections::VecDeque;

use bt_core::{
    AudioState, BtAddress, BtResult, CallAccept, CallControl, CallDirection, CallHeld,
    CallIndicator, CallMultiparty, CallSetup, ConnectionPolicy, CurrentCall, HfCallState,
    HfNotification, ProfileConnectionState, VolumeType,
};
use tracing::{debug, error, info, warn};

use super::stack::{at_cmd, HfStack};
use super::{HfEvent, HfProfile};
use crate::event_loop::TimerHandle;
use crate::hsm::{HsmCore, StateMachine};
use crate::profile::Env;
use crate::session::DeviceSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HfState {
    Disconnected,
    Connecting,
    Connected,
    AudioOn,
}

type Ctx<'a> = Env<'a, HfProfile>;

/// An AT command sent to the AG whose final result is still outstanding.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingCommand {
    code: u32,
    number: Option<String>,
}

pub struct HfSession {
    addr: BtAddress,
    core: HsmCore<HfState>,
    remote_features: u32,
    policy: ConnectionPolicy,
    spk_volume: u8,
    mic_volume: u8,
    recognition_active: bool,
    /// Indicators arrived before the link was up; refresh the call list
    /// once connected.
    need_query: bool,
    pending: VecDeque<PendingCommand>,
    current_calls: Vec<CurrentCall>,
    update_calls: Vec<CurrentCall>,
    call: CallIndicator,
    call_setup: CallSetup,
    call_held: CallHeld,
    connect_timer: Option<TimerHandle>,
}

impl HfSession {
    pub fn new(addr: BtAddress) -> Self {
        Self {
            addr,
            core: HsmCore::new(HfState::Disconnected),
            remote_features: 0,
            policy: ConnectionPolicy::Unknown,
            spk_volume: 0,
            mic_volume: 0,
            recognition_active: false,
            need_query: false,
            pending: VecDeque::new(),
            current_calls: Vec::new(),
            update_calls: Vec::new(),
            call: CallIndicator::NoCallsInProgress,
            call_setup: CallSetup::None,
            call_held: CallHeld::None,
            connect_timer: None,
        }
    }

    pub fn state(&self) -> HfState {
        self.core.current()
    }

    pub fn remote_features(&self) -> u32 {
        self.remote_features
    }

    pub fn policy(&self) -> ConnectionPolicy {
        self.policy
    }

    pub fn volume(&self, kind: VolumeType) -> u8 {
        match kind {
            VolumeType::Speaker => self.spk_volume,
            VolumeType::Microphone => self.mic_volume,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() >= HfState::Connected
    }

    pub fn is_audio_connected(&self) -> bool {
        self.state() == HfState::AudioOn
    }

    pub fn current_calls(&self) -> &[CurrentCall] {
        &self.current_calls
    }

    pub fn indicators(&self) -> (CallIndicator, CallSetup, CallHeld) {
        (self.call, self.call_setup, self.call_held)
    }

    pub fn handle(&mut self, ctx: &mut Ctx<'_>, event: HfEvent) {
        if let HfEvent::SetConnectionPolicy { policy } = event {
            debug!(addr = %self.addr, policy = ?policy, "Connection policy");
            self.policy = policy;
            return;
        }
        let name = event_name(&event);
        if !self.dispatch(ctx, event) {
            debug!(addr = %self.addr, state = ?self.state(), event = name, "Event not consumed");
        }
    }

    fn notify_connection(&self, ctx: &mut Ctx<'_>, state: ProfileConnectionState) {
        info!(addr = %self.addr, state = ?state, "HF connection state");
        ctx.notify(HfNotification::ConnectionState {
            addr: self.addr,
            state,
        });
    }

    fn notify_audio(&self, ctx: &mut Ctx<'_>, state: AudioState) {
        info!(addr = %self.addr, state = ?state, "HF audio state");
        ctx.notify(HfNotification::AudioState {
            addr: self.addr,
            state,
        });
    }

    fn notify_call(&self, ctx: &mut Ctx<'_>, call: CurrentCall) {
        debug!(addr = %self.addr, index = call.index, state = ?call.state, "Call state");
        ctx.notify(HfNotification::CallStateChanged {
            addr: self.addr,
            call,
        });
    }

    fn report(&self, op: &'static str, result: BtResult<()>) -> bool {
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

    fn reset_calls(&mut self) {
        self.current_calls.clear();
        self.update_calls.clear();
        self.pending.clear();
        self.call = CallIndicator::NoCallsInProgress;
        self.call_setup = CallSetup::None;
        self.call_held = CallHeld::None;
        self.recognition_active = false;
        self.cancel_connect_timer();
    }

    fn query_calls(&self, ctx: &Ctx<'_>) -> bool {
        self.report("get_current_calls", ctx.stack().get_current_calls(self.addr))
    }

    fn find_call(&self, state: HfCallState) -> Option<&CurrentCall> {
        self.current_calls.iter().find(|call| call.state == state)
    }

    fn has_call(&self, state: HfCallState) -> bool {
        self.find_call(state).is_some()
    }

    /// Reports an outgoing call that never got past dialing.
    fn dial_failed(&self, ctx: &mut Ctx<'_>, number: Option<String>) {
        warn!(addr = %self.addr, number = number.as_deref().unwrap_or(""), "Dial failed");
        self.notify_call(
            ctx,
            CurrentCall {
                index: 0,
                direction: CallDirection::Outgoing,
                state: HfCallState::Disconnected,
                multiparty: CallMultiparty::Single,
                number: number.unwrap_or_default(),
                name: String::new(),
            },
        );
    }

    fn update_indicator(&mut self, ctx: &mut Ctx<'_>, event: &HfEvent) -> bool {
        let addr = self.addr;
        match *event {
            HfEvent::StackCall { call } => {
                self.call = call;
                ctx.notify(HfNotification::CallIndicator { addr, call });
            }
            HfEvent::StackCallSetup { setup } => {
                self.call_setup = setup;
                ctx.notify(HfNotification::CallSetupIndicator { addr, setup });
            }
            HfEvent::StackCallHeld { held } => {
                self.call_held = held;
                ctx.notify(HfNotification::CallHeldIndicator { addr, held });
            }
            _ => return false,
        }
        true
    }

    // ------------------------------------------------------------------------
    // Call control
    // ------------------------------------------------------------------------

    fn chld(&self, ctx: &Ctx<'_>, control: CallControl, index: u8) -> bool {
        self.report("call_control", ctx.stack().call_control(self.addr, control, index))
    }

    fn accept_call(&self, ctx: &Ctx<'_>, flag: CallAccept) -> bool {
        if self.has_call(HfCallState::Incoming) {
            if flag != CallAccept::None {
                warn!(addr = %self.addr, flag = ?flag, "No other call to act on");
                return false;
            }
            return self.report("answer_call", ctx.stack().answer_call(self.addr));
        }

        if self.has_call(HfCallState::Waiting) {
            if !self.has_call(HfCallState::Active) && flag != CallAccept::None {
                warn!(addr = %self.addr, flag = ?flag, "No active call to act on");
                return false;
            }
            let control = match flag {
                CallAccept::Release => CallControl::ReleaseActiveAcceptOther,
                CallAccept::None | CallAccept::Hold => CallControl::HoldActiveAcceptOther,
            };
            return self.chld(ctx, control, 0);
        }

        if self.has_call(HfCallState::Held) {
            let control = match flag {
                CallAccept::Hold => CallControl::HoldActiveAcceptOther,
                CallAccept::Release => CallControl::ReleaseActiveAcceptOther,
                CallAccept::None if self.has_call(HfCallState::Active) => {
                    CallControl::AddHeldToConference
                }
                CallAccept::None => CallControl::HoldActiveAcceptOther,
            };
            return self.chld(ctx, control, 0);
        }

        warn!(addr = %self.addr, "No call to accept");
        false
    }

    fn reject_call(&self, ctx: &Ctx<'_>) -> bool {
        if self.has_call(HfCallState::Incoming) {
            return self.report("reject_call", ctx.stack().reject_call(self.addr));
        }
        if self.has_call(HfCallState::Held) || self.has_call(HfCallState::Waiting) {
            return self.chld(ctx, CallControl::ReleaseHeld, 0);
        }
        warn!(addr = %self.addr, "No call to reject");
        false
    }

    fn terminate_call(&self, ctx: &Ctx<'_>) -> bool {
        let outgoing_or_active = [HfCallState::Active, HfCallState::Dialing, HfCallState::Alerting];
        if outgoing_or_active.iter().any(|&state| self.has_call(state)) {
            return self.report("hangup_call", ctx.stack().hangup_call(self.addr));
        }
        if self.has_call(HfCallState::Held) {
            return self.chld(ctx, CallControl::ReleaseHeld, 0);
        }
        warn!(addr = %self.addr, "No call to terminate");
        false
    }

    fn hold_call(&self, ctx: &Ctx<'_>) -> bool {
        if self.has_call(HfCallState::Active) {
            return self.chld(ctx, CallControl::HoldActiveAcceptOther, 0);
        }
        warn!(addr = %self.addr, "No active call to hold");
        false
    }

    // ------------------------------------------------------------------------
    // Call list
    // ------------------------------------------------------------------------

    fn update_clip(&mut self, ctx: &mut Ctx<'_>, number: &str, name: &str) {
        let mut changed = Vec::new();
        for call in &mut self.current_calls {
            if call.number == number && call.name != name {
                call.name = name.to_string();
                changed.push(call.clone());
            }
        }
        for call in changed {
            self.notify_call(ctx, call);
        }
    }

    /// Reconciles the collected +CLCC entries with the known call list.
    fn merge_current_calls(&mut self, ctx: &mut Ctx<'_>) {
        let reported = std::mem::take(&mut self.update_calls);

        let (kept, gone): (Vec<_>, Vec<_>) = std::mem::take(&mut self.current_calls)
            .into_iter()
            .partition(|call| reported.iter().any(|r| r.index == call.index));
        for mut call in gone {
            call.state = HfCallState::Disconnected;
            self.notify_call(ctx, call);
        }
        self.current_calls = kept;

        for update in reported {
            match self
                .current_calls
                .iter_mut()
                .find(|call| call.index == update.index)
            {
                Some(call) => {
                    let changed = call.state != update.state
                        || call.multiparty != update.multiparty
                        || call.number != update.number;
                    if changed {
                        call.state = update.state;
                        call.multiparty = update.multiparty;
                        call.number = update.number;
                        let snapshot = call.clone();
                        self.notify_call(ctx, snapshot);
                    }
                }
                None => {
                    self.current_calls.push(update.clone());
                    self.notify_call(ctx, update);
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Per-state handlers
    // ------------------------------------------------------------------------

    fn process_disconnected(&mut self, ctx: &mut Ctx<'_>, event: HfEvent) -> bool {
        match event {
            HfEvent::Connect => {
                if self.policy == ConnectionPolicy::Forbidden {
                    warn!(addr = %self.addr, "Connection forbidden by policy");
                    return false;
                }
                if !self.report("connect", ctx.stack().connect(self.addr)) {
                    self.notify_connection(ctx, ProfileConnectionState::Disconnected);
                    return false;
                }
                self.transition_to(ctx, HfState::Connecting);
            }
            HfEvent::StackConnectionStateChanged {
                state,
                remote_features,
                ..
            } => match state {
                ProfileConnectionState::Connected => {
                    self.remote_features = remote_features;
                    self.transition_to(ctx, HfState::Connected);
                }
                ProfileConnectionState::Connecting => {
                    if self.policy == ConnectionPolicy::Forbidden {
                        info!(addr = %self.addr, "Refusing incoming connection");
                        self.report("disconnect", ctx.stack().disconnect(self.addr));
                        return true;
                    }
                    self.transition_to(ctx, HfState::Connecting);
                }
                other => {
                    warn!(addr = %self.addr, state = ?other, "Ignored connection state");
                    return false;
                }
            },
            other => return self.unexpected(&other),
        }
        true
    }

    fn process_connecting(&mut self, ctx: &mut Ctx<'_>, event: HfEvent) -> bool {
        match event {
            HfEvent::Disconnect | HfEvent::ConnectTimeout => {
                self.report("disconnect", ctx.stack().disconnect(self.addr));
                self.transition_to(ctx, HfState::Disconnected);
            }
            HfEvent::StackConnectionStateChanged {
                state,
                reason,
                remote_features,
            } => match state {
                ProfileConnectionState::Connected => {
                    self.remote_features = remote_features;
                    self.transition_to(ctx, HfState::Connected);
                }
                ProfileConnectionState::Disconnected => {
                    debug!(addr = %self.addr, reason = ?reason, "Connection attempt ended");
                    self.transition_to(ctx, HfState::Disconnected);
                }
                other => {
                    warn!(addr = %self.addr, state = ?other, "Ignored connection state");
                    return false;
                }
            },
            ref indicator @ (HfEvent::StackCall { .. }
            | HfEvent::StackCallSetup { .. }
            | HfEvent::StackCallHeld { .. }) => {
                self.update_indicator(ctx, indicator);
                self.need_query = true;
            }
            HfEvent::StackClip { .. } => self.need_query = true,
            other => return self.unexpected(&other),
        }
        true
    }

    fn process_connected(&mut self, ctx: &mut Ctx<'_>, event: HfEvent) -> bool {
        let addr = self.addr;
        match event {
            HfEvent::Disconnect => {
                self.report("disconnect", ctx.stack().disconnect(addr));
                self.transition_to(ctx, HfState::Disconnected);
            }
            HfEvent::ConnectAudio => {
                if !self.report("connect_audio", ctx.stack().connect_audio(addr)) {
                    self.notify_audio(ctx, AudioState::Disconnected);
                    return false;
                }
            }
            HfEvent::DisconnectAudio => {
                self.report("disconnect_audio", ctx.stack().disconnect_audio(addr));
            }
            HfEvent::VoiceRecognitionStart => {
                if self.recognition_active {
                    debug!(addr = %addr, "Voice recognition already active");
                    return false;
                }
                self.report(
                    "start_voice_recognition",
                    ctx.stack().start_voice_recognition(addr),
                );
            }
            HfEvent::VoiceRecognitionStop => {
                if !self.recognition_active {
                    debug!(addr = %addr, "Voice recognition not active");
                    return false;
                }
                self.report(
                    "stop_voice_recognition",
                    ctx.stack().stop_voice_recognition(addr),
                );
            }
            HfEvent::DialNumber { number } => {
                if !self.report("dial_number", ctx.stack().dial_number(addr, Some(&number))) {
                    self.dial_failed(ctx, Some(number));
                    return false;
                }
                self.pending.push_back(PendingCommand {
                    code: at_cmd::ATD,
                    number: Some(number),
                });
            }
            HfEvent::DialMemory { location } => {
                if !self.report("dial_memory", ctx.stack().dial_memory(addr, location)) {
                    self.dial_failed(ctx, None);
                    return false;
                }
                self.pending.push_back(PendingCommand {
                    code: at_cmd::ATD,
                    number: None,
                });
            }
            HfEvent::DialLast => {
                if !self.report("dial_number", ctx.stack().dial_number(addr, None)) {
                    self.dial_failed(ctx, None);
                    return false;
                }
                self.pending.push_back(PendingCommand {
                    code: at_cmd::BLDN,
                    number: None,
                });
            }
            HfEvent::StackAudioRequest => {
                self.report("accept_audio", ctx.stack().accept_audio(addr));
            }
            HfEvent::StackConnectionStateChanged {
                state: ProfileConnectionState::Disconnected,
                ..
            } => self.transition_to(ctx, HfState::Disconnected),
            HfEvent::StackAudioStateChanged {
                state: AudioState::Connected,
            } => self.transition_to(ctx, HfState::AudioOn),
            other => return self.process_default(ctx, other),
        }
        true
    }

    fn process_audio_on(&mut self, ctx: &mut Ctx<'_>, event: HfEvent) -> bool {
        let addr = self.addr;
        match event {
            HfEvent::Disconnect => {
                self.report("disconnect", ctx.stack().disconnect(addr));
                self.transition_to(ctx, HfState::Disconnected);
            }
            HfEvent::DisconnectAudio => {
                self.report("disconnect_audio", ctx.stack().disconnect_audio(addr));
            }
            HfEvent::VoiceRecognitionStop => {
                if !self.recognition_active {
                    debug!(addr = %addr, "Voice recognition not active");
                    return false;
                }
                self.report(
                    "stop_voice_recognition",
                    ctx.stack().stop_voice_recognition(addr),
                );
            }
            HfEvent::SetVolume { kind, volume } => {
                if self.volume(kind) == volume {
                    return true;
                }
                if !self.report("set_volume", ctx.stack().set_volume(addr, kind, volume)) {
                    return false;
                }
                match kind {
                    VolumeType::Speaker => self.spk_volume = volume,
                    VolumeType::Microphone => self.mic_volume = volume,
                }
            }
            HfEvent::StackConnectionStateChanged {
                state: ProfileConnectionState::Disconnected,
                ..
            } => self.transition_to(ctx, HfState::Disconnected),
            HfEvent::StackAudioStateChanged {
                state: AudioState::Disconnected,
            } => self.transition_to(ctx, HfState::Connected),
            other => return self.process_default(ctx, other),
        }
        true
    }

    fn process_default(&mut self, ctx: &mut Ctx<'_>, event: HfEvent) -> bool {
        let addr = self.addr;
        match event {
            HfEvent::AcceptCall { flag } => return self.accept_call(ctx, flag),
            HfEvent::RejectCall => return self.reject_call(ctx),
            HfEvent::HoldCall => return self.hold_call(ctx),
            HfEvent::TerminateCall => return self.terminate_call(ctx),
            HfEvent::ControlCall { chld, index } => {
                let Some(control) = CallControl::from_u8(chld) else {
                    warn!(addr = %addr, chld, "Invalid call control");
                    return false;
                };
                return self.chld(ctx, control, index);
            }
            HfEvent::QueryCurrentCalls => return self.query_calls(ctx),
            HfEvent::SendAtCommand { command } => {
                self.report("send_at_command", ctx.stack().send_at_command(addr, &command));
            }
            HfEvent::UpdateBatteryLevel { level } => {
                self.report("send_battery_level", ctx.stack().send_battery_level(addr, level));
            }
            HfEvent::SendDtmf { dtmf } => {
                self.report("send_dtmf", ctx.stack().send_dtmf(addr, dtmf));
            }
            HfEvent::StackVoiceRecognitionChanged { started } => {
                self.recognition_active = started;
                ctx.notify(HfNotification::VoiceRecognitionState { addr, started });
            }
            ref indicator @ (HfEvent::StackCall { .. }
            | HfEvent::StackCallSetup { .. }
            | HfEvent::StackCallHeld { .. }) => {
                self.update_indicator(ctx, indicator);
                self.query_calls(ctx);
            }
            HfEvent::StackClip { number, name } => self.update_clip(ctx, &number, &name),
            HfEvent::StackCurrentCall {
                index,
                direction,
                state,
                multiparty,
                number,
            } => {
                if index == 0 {
                    self.merge_current_calls(ctx);
                } else {
                    self.update_calls.push(CurrentCall {
                        index,
                        direction,
                        state,
                        multiparty,
                        number,
                        name: String::new(),
                    });
                }
            }
            HfEvent::StackVolumeChanged { kind, volume } => {
                match kind {
                    VolumeType::Speaker => self.spk_volume = volume,
                    VolumeType::Microphone => self.mic_volume = volume,
                }
                ctx.notify(HfNotification::VolumeChanged {
                    addr,
                    volume_type: kind,
                    volume,
                });
            }
            HfEvent::StackCommandResponse { text } => {
                ctx.notify(HfNotification::AtCommandComplete {
                    addr,
                    response: text,
                });
            }
            HfEvent::StackCommandResult { code, result } => {
                let Some(pending) = self.pending.pop_front() else {
                    debug!(addr = %addr, code, "Result without a pending command");
                    return false;
                };
                if pending.code != code {
                    warn!(addr = %addr, expected = pending.code, code, "Out of order AT result");
                    return false;
                }
                if result != at_cmd::RESULT_OK {
                    self.dial_failed(ctx, pending.number);
                }
            }
            HfEvent::StackRingIndication { inband } => {
                ctx.notify(HfNotification::RingIndication { addr, inband });
            }
            other => return self.unexpected(&other),
        }
        true
    }

    fn unexpected(&self, event: &HfEvent) -> bool {
        warn!(addr = %self.addr, state = ?self.state(), event = event_name(event), "Unexpected event");
        false
    }
}

fn event_name(event: &HfEvent) -> &'static str {
    bt_core::ProfileEvent::name(event)
}

impl<'a> StateMachine<Ctx<'a>> for HfSession {
    type State = HfState;
    type Event = HfEvent;

    fn core(&self) -> &HsmCore<HfState> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut HsmCore<HfState> {
        &mut self.core
    }

    fn on_enter(&mut self, ctx: &mut Ctx<'a>, state: HfState) {
        debug!(addr = %self.addr, state = ?state, "Enter");
        match state {
            HfState::Disconnected => {
                self.need_query = false;
                if self.core.previous().is_some() {
                    self.spk_volume = 0;
                    self.mic_volume = 0;
                    self.notify_connection(ctx, ProfileConnectionState::Disconnected);
                }
                self.reset_calls();
            }
            HfState::Connecting => {
                self.connect_timer = ctx.schedule(
                    ctx.config().connect_timeout(),
                    self.addr,
                    HfEvent::ConnectTimeout,
                );
                self.notify_connection(ctx, ProfileConnectionState::Connecting);
            }
            HfState::Connected => {
                if self.need_query {
                    self.need_query = false;
                    self.query_calls(ctx);
                }
                if self.core.previous() != Some(HfState::AudioOn) {
                    self.notify_connection(ctx, ProfileConnectionState::Connected);
                }
            }
            HfState::AudioOn => self.notify_audio(ctx, AudioState::Connected),
        }
    }

    fn on_exit(&mut self, ctx: &mut Ctx<'a>, state: HfState) {
        debug!(addr = %self.addr, state = ?state, "Exit");
        match state {
            HfState::Connecting => self.cancel_connect_timer(),
            HfState::AudioOn => self.notify_audio(ctx, AudioState::Disconnected),
            _ => {}
        }
    }

    fn process(&mut self, ctx: &mut Ctx<'a>, state: HfState, event: HfEvent) -> bool {
        debug!(addr = %self.addr, state = ?state, event = event_name(&event), "Process");
        match state {
            HfState::Disconnected => self.process_disconnected(ctx, event),
            HfState::Connecting => self.process_connecting(ctx, event),
            HfState::Connected => self.process_connected(ctx, event),
            HfState::AudioOn => self.process_audio_on(ctx, event),
        }
    }
}

impl DeviceSession for HfSession {
    fn address(&self) -> BtAddress {
        self.addr
    }

    fn connection_state(&self) -> ProfileConnectionState {
        match self.state() {
            HfState::Disconnected => ProfileConnectionState::Disconnected,
            HfState::Connecting => ProfileConnectionState::Connecting,
            HfState::Connected | HfState::AudioOn => ProfileConnectionState::Connected,
        }
    }

    fn audio_state(&self) -> AudioState {
        match self.state() {
            HfState::AudioOn => AudioState::Connected,
            _ => AudioState::Disconnected,
        }
    }

    fn is_counted(&self) -> bool {
        self.state() != HfState::Disconnected
    }

    fn release(&mut self) {
        self.cancel_connect_timer();
    }
}
