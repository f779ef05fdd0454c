//! Public HF operations on top of the generic runtime.

use std::sync::Arc;

use async_trait::async_trait;
use bt_core::text::{AT_COMMAND_CAPACITY, AT_COMMAND_MAX, NAME_CAPACITY, PHONE_NUMBER_CAPACITY};
use bt_core::{
    bounded_copy, AudioState, BtAddress, BtError, BtResult, CallAccept, CallControl, CallDirection,
    CallHeld, CallIndicator, CallMultiparty, CallSetup, ConnectionPolicy, ConnectionReason, Cookie,
    CurrentCall, HfCallState, HfpHf, HfpHfCallbacks, Message, ProfileConnectionState, VolumeType,
};
use bt_protocol::{HfRequest, Reply};
use tracing::debug;

use super::stack::at_cmd;
use super::{HfEvent, HfProfile, HfSession};
use crate::profile::ProfileService;
use crate::session::{DeviceSession, SessionRegistry};

pub type HfService = ProfileService<HfProfile>;

type Sessions = SessionRegistry<HfSession>;

fn require_connected(addr: BtAddress) -> impl FnOnce(&Sessions) -> BtResult<()> {
    move |sessions| match sessions.find(addr) {
        Some(s) if s.is_connected() => Ok(()),
        _ => Err(BtError::Fail),
    }
}

fn require_capacity(sessions: &Sessions) -> BtResult<()> {
    if sessions.at_capacity() {
        Err(BtError::NoResources)
    } else {
        Ok(())
    }
}

fn require_disconnectable(addr: BtAddress) -> impl FnOnce(&Sessions) -> BtResult<()> {
    move |sessions| match sessions.find(addr).map(DeviceSession::connection_state) {
        None => Err(BtError::NotFound),
        Some(ProfileConnectionState::Disconnected | ProfileConnectionState::Disconnecting) => {
            Err(BtError::Fail)
        }
        Some(_) => Ok(()),
    }
}

fn require_audio_idle(addr: BtAddress) -> impl FnOnce(&Sessions) -> BtResult<()> {
    move |sessions| match sessions.find(addr) {
        Some(s) if s.is_connected() && !s.is_audio_connected() => Ok(()),
        _ => Err(BtError::Fail),
    }
}

fn require_audio_on(addr: BtAddress) -> impl FnOnce(&Sessions) -> BtResult<()> {
    move |sessions| match sessions.find(addr) {
        Some(s) if s.is_audio_connected() => Ok(()),
        _ => Err(BtError::Fail),
    }
}

impl ProfileService<HfProfile> {
    /// Runs one request and returns its reply.
    ///
    /// Listener registration is connection-scoped and handled by the
    /// caller; those requests are rejected here.
    pub fn execute(&self, request: HfRequest) -> Reply {
        debug!(op = request.opcode(), "HF request");
        if let HfRequest::SendAtCmd { command, .. } = &request {
            if command.len() > AT_COMMAND_MAX {
                return Reply::error(BtError::InvalidParameter);
            }
        }

        match request.bounded() {
            HfRequest::RegisterCallback | HfRequest::UnregisterCallback => {
                Reply::error(BtError::InvalidParameter)
            }
            HfRequest::IsConnected { addr } => Reply::from_bool(
                self.with_sessions(|s| s.find(addr).is_some_and(HfSession::is_connected)),
            ),
            HfRequest::IsAudioConnected { addr } => Reply::from_bool(
                self.with_sessions(|s| s.find(addr).is_some_and(HfSession::is_audio_connected)),
            ),
            HfRequest::GetConnectionState { addr } => {
                Reply::from_connection_state(self.with_sessions(|s| {
                    s.find(addr)
                        .map_or(ProfileConnectionState::Disconnected, |s| s.connection_state())
                }))
            }
            HfRequest::Connect { addr } => {
                Reply::from_status(self.post_reserved(addr, HfEvent::Connect, require_capacity))
            }
            HfRequest::SetConnectionPolicy { addr, policy } => {
                Reply::from_status(self.set_connection_policy(addr, policy))
            }
            HfRequest::Disconnect { addr } => Reply::from_status(self.post_checked(
                addr,
                HfEvent::Disconnect,
                require_disconnectable(addr),
            )),
            HfRequest::ConnectAudio { addr } => Reply::from_status(self.post_checked(
                addr,
                HfEvent::ConnectAudio,
                require_audio_idle(addr),
            )),
            HfRequest::DisconnectAudio { addr } => Reply::from_status(self.post_checked(
                addr,
                HfEvent::DisconnectAudio,
                require_audio_on(addr),
            )),
            HfRequest::StartVoiceRecognition { addr } => {
                self.connected_post(addr, HfEvent::VoiceRecognitionStart)
            }
            HfRequest::StopVoiceRecognition { addr } => {
                self.connected_post(addr, HfEvent::VoiceRecognitionStop)
            }
            HfRequest::Dial { addr, number } => {
                self.connected_post(addr, HfEvent::DialNumber { number })
            }
            HfRequest::DialMemory { addr, location } => {
                self.connected_post(addr, HfEvent::DialMemory { location })
            }
            HfRequest::Redial { addr } => self.connected_post(addr, HfEvent::DialLast),
            HfRequest::AcceptCall { addr, flag } => {
                self.connected_post(addr, HfEvent::AcceptCall { flag })
            }
            HfRequest::RejectCall { addr } => self.connected_post(addr, HfEvent::RejectCall),
            HfRequest::HoldCall { addr } => self.connected_post(addr, HfEvent::HoldCall),
            HfRequest::TerminateCall { addr } => {
                self.connected_post(addr, HfEvent::TerminateCall)
            }
            HfRequest::ControlCall { addr, chld, index } => {
                if CallControl::from_u8(chld).is_none() {
                    return Reply::error(BtError::InvalidParameter);
                }
                self.connected_post(addr, HfEvent::ControlCall { chld, index })
            }
            HfRequest::QueryCurrentCalls { addr } => Reply::from_calls(
                self.with_sessions(|s| match s.find(addr) {
                    Some(session) if session.is_connected() => {
                        Ok(session.current_calls().to_vec())
                    }
                    _ => Err(BtError::Fail),
                })
                .and_then(|calls| calls),
            ),
            HfRequest::SendAtCmd { addr, command } => {
                self.connected_post(addr, HfEvent::SendAtCommand { command })
            }
            HfRequest::UpdateBatteryLevel { level, .. } => Reply::from_status(
                self.post(Message::broadcast(HfEvent::UpdateBatteryLevel { level })),
            ),
            HfRequest::VolumeControl {
                volume_type,
                volume,
                ..
            } => Reply::from_status(self.post(Message::broadcast(HfEvent::SetVolume {
                kind: volume_type,
                volume,
            }))),
            HfRequest::SendDtmf { addr, dtmf } => {
                Reply::from_status(self.post(Message::new(addr, HfEvent::SendDtmf { dtmf })))
            }
        }
    }

    fn connected_post(&self, addr: BtAddress, event: HfEvent) -> Reply {
        Reply::from_status(self.post_checked(addr, event, require_connected(addr)))
    }

    /// Stores `policy` on the session, then connects for `Allowed` or
    /// disconnects for `Forbidden`. The follow-up outcome is not reported.
    pub fn set_connection_policy(&self, addr: BtAddress, policy: ConnectionPolicy) -> BtResult<()> {
        self.post(Message::new(addr, HfEvent::SetConnectionPolicy { policy }))?;
        let follow_up = match policy {
            ConnectionPolicy::Allowed => self.post_reserved(addr, HfEvent::Connect, require_capacity),
            ConnectionPolicy::Forbidden => self.post_checked(
                addr,
                HfEvent::Disconnect,
                require_disconnectable(addr),
            ),
            ConnectionPolicy::Unknown => Ok(()),
        };
        if let Err(e) = follow_up {
            debug!(addr = %addr, policy = ?policy, error = %e, "Policy follow-up skipped");
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Stack events
    // ------------------------------------------------------------------------

    pub fn on_stack_connection_state_changed(
        &self,
        addr: BtAddress,
        state: ProfileConnectionState,
        reason: ConnectionReason,
        remote_features: u32,
    ) -> BtResult<()> {
        self.post(Message::new(
            addr,
            HfEvent::StackConnectionStateChanged {
                state,
                reason,
                remote_features,
            },
        ))
    }

    pub fn on_stack_audio_state_changed(&self, addr: BtAddress, state: AudioState) -> BtResult<()> {
        self.post(Message::new(addr, HfEvent::StackAudioStateChanged { state }))
    }

    pub fn on_stack_audio_request(&self, addr: BtAddress) -> BtResult<()> {
        self.post(Message::new(addr, HfEvent::StackAudioRequest))
    }

    pub fn on_stack_voice_recognition_changed(&self, addr: BtAddress, started: bool) -> BtResult<()> {
        self.post(Message::new(
            addr,
            HfEvent::StackVoiceRecognitionChanged { started },
        ))
    }

    pub fn on_stack_call(&self, addr: BtAddress, call: CallIndicator) -> BtResult<()> {
        self.post(Message::new(addr, HfEvent::StackCall { call }))
    }

    pub fn on_stack_call_setup(&self, addr: BtAddress, setup: CallSetup) -> BtResult<()> {
        self.post(Message::new(addr, HfEvent::StackCallSetup { setup }))
    }

    pub fn on_stack_call_held(&self, addr: BtAddress, held: CallHeld) -> BtResult<()> {
        self.post(Message::new(addr, HfEvent::StackCallHeld { held }))
    }

    pub fn on_stack_clip(&self, addr: BtAddress, number: &str, name: &str) -> BtResult<()> {
        self.post(Message::new(
            addr,
            HfEvent::StackClip {
                number: bounded_copy(number, PHONE_NUMBER_CAPACITY),
                name: bounded_copy(name, NAME_CAPACITY),
            },
        ))
    }

    /// One +CLCC entry; `index` 0 marks the end of the list.
    pub fn on_stack_current_call(
        &self,
        addr: BtAddress,
        index: u32,
        direction: CallDirection,
        state: HfCallState,
        multiparty: CallMultiparty,
        number: &str,
    ) -> BtResult<()> {
        self.post(Message::new(
            addr,
            HfEvent::StackCurrentCall {
                index,
                direction,
                state,
                multiparty,
                number: bounded_copy(number, PHONE_NUMBER_CAPACITY),
            },
        ))
    }

    pub fn on_stack_volume_changed(
        &self,
        addr: BtAddress,
        kind: VolumeType,
        volume: u8,
    ) -> BtResult<()> {
        self.post(Message::new(addr, HfEvent::StackVolumeChanged { kind, volume }))
    }

    pub fn on_stack_command_response(&self, addr: BtAddress, text: &str) -> BtResult<()> {
        self.post(Message::new(
            addr,
            HfEvent::StackCommandResponse {
                text: bounded_copy(text, AT_COMMAND_CAPACITY),
            },
        ))
    }

    /// Final result of an AT command. Only dial results are tracked.
    pub fn on_stack_command_result(&self, addr: BtAddress, code: u32, result: u32) -> BtResult<()> {
        if code != at_cmd::ATD && code != at_cmd::BLDN {
            return Ok(());
        }
        self.post(Message::new(addr, HfEvent::StackCommandResult { code, result }))
    }

    pub fn on_stack_ring_indication(&self, addr: BtAddress, active: bool, inband: bool) -> BtResult<()> {
        if !active {
            return Ok(());
        }
        self.post(Message::new(addr, HfEvent::StackRingIndication { inband }))
    }
}

#[async_trait]
impl HfpHf for ProfileService<HfProfile> {
    async fn register_callbacks(&self, callbacks: Arc<dyn HfpHfCallbacks>) -> BtResult<Cookie> {
        self.register(callbacks, None)
    }

    async fn unregister_callbacks(&self, cookie: Cookie) -> BtResult<()> {
        self.unregister(cookie)
    }

    async fn is_connected(&self, addr: BtAddress) -> BtResult<bool> {
        self.execute(HfRequest::IsConnected { addr }).into_bool()
    }

    async fn is_audio_connected(&self, addr: BtAddress) -> BtResult<bool> {
        self.execute(HfRequest::IsAudioConnected { addr }).into_bool()
    }

    async fn get_connection_state(&self, addr: BtAddress) -> BtResult<ProfileConnectionState> {
        self.execute(HfRequest::GetConnectionState { addr })
            .into_connection_state()
    }

    async fn connect(&self, addr: BtAddress) -> BtResult<()> {
        self.execute(HfRequest::Connect { addr }).into_status()
    }

    async fn disconnect(&self, addr: BtAddress) -> BtResult<()> {
        self.execute(HfRequest::Disconnect { addr }).into_status()
    }

    async fn set_connection_policy(&self, addr: BtAddress, policy: ConnectionPolicy) -> BtResult<()> {
        self.execute(HfRequest::SetConnectionPolicy { addr, policy })
            .into_status()
    }

    async fn connect_audio(&self, addr: BtAddress) -> BtResult<()> {
        self.execute(HfRequest::ConnectAudio { addr }).into_status()
    }

    async fn disconnect_audio(&self, addr: BtAddress) -> BtResult<()> {
        self.execute(HfRequest::DisconnectAudio { addr }).into_status()
    }

    async fn start_voice_recognition(&self, addr: BtAddress) -> BtResult<()> {
        self.execute(HfRequest::StartVoiceRecognition { addr })
            .into_status()
    }

    async fn stop_voice_recognition(&self, addr: BtAddress) -> BtResult<()> {
        self.execute(HfRequest::StopVoiceRecognition { addr })
            .into_status()
    }

    async fn dial(&self, addr: BtAddress, number: &str) -> BtResult<()> {
        self.execute(HfRequest::Dial {
            addr,
            number: number.to_string(),
        })
        .into_status()
    }

    async fn dial_memory(&self, addr: BtAddress, location: u32) -> BtResult<()> {
        self.execute(HfRequest::DialMemory { addr, location })
            .into_status()
    }

    async fn redial(&self, addr: BtAddress) -> BtResult<()> {
        self.execute(HfRequest::Redial { addr }).into_status()
    }

    async fn accept_call(&self, addr: BtAddress, flag: CallAccept) -> BtResult<()> {
        self.execute(HfRequest::AcceptCall { addr, flag }).into_status()
    }

    async fn reject_call(&self, addr: BtAddress) -> BtResult<()> {
        self.execute(HfRequest::RejectCall { addr }).into_status()
    }

    async fn hold_call(&self, addr: BtAddress) -> BtResult<()> {
        self.execute(HfRequest::HoldCall { addr }).into_status()
    }

    async fn terminate_call(&self, addr: BtAddress) -> BtResult<()> {
        self.execute(HfRequest::TerminateCall { addr }).into_status()
    }

    async fn control_call(&self, addr: BtAddress, chld: CallControl, index: u8) -> BtResult<()> {
        self.execute(HfRequest::ControlCall {
            addr,
            chld: chld.as_u8(),
            index,
        })
        .into_status()
    }

    async fn query_current_calls(&self, addr: BtAddress) -> BtResult<Vec<CurrentCall>> {
        self.execute(HfRequest::QueryCurrentCalls { addr }).into_calls()
    }

    async fn send_at_cmd(&self, addr: BtAddress, command: &str) -> BtResult<()> {
        self.execute(HfRequest::SendAtCmd {
            addr,
            command: command.to_string(),
        })
        .into_status()
    }

    async fn update_battery_level(&self, addr: BtAddress, level: u8) -> BtResult<()> {
        self.execute(HfRequest::UpdateBatteryLevel { addr, level })
            .into_status()
    }

    async fn volume_control(&self, addr: BtAddress, kind: VolumeType, volume: u8) -> BtResult<()> {
        self.execute(HfRequest::VolumeControl {
            addr,
            volume_type: kind,
            volume,
        })
        .into_status()
    }

    async fn send_dtmf(&self, addr: BtAddress, dtmf: char) -> BtResult<()> {
        self.execute(HfRequest::SendDtmf { addr, dtmf }).into_status()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::config::ProfileConfig;
    use crate::event_loop::{EventLoop, LoopHandle};
    use crate::profiles::hf::{HfState, RecordingHfStack};

    const ADDR: &str = "11:22:33:44:55:66";

    #[derive(Default)]
    struct Seen {
        events: Mutex<Vec<String>>,
    }

    impl Seen {
        fn push(&self, entry: String) {
            self.events.lock().unwrap().push(entry);
        }

        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    impl HfpHfCallbacks for Seen {
        fn on_connection_state_changed(&self, _addr: BtAddress, state: ProfileConnectionState) {
            self.push(format!("conn {state:?}"));
        }

        fn on_audio_state_changed(&self, _addr: BtAddress, state: AudioState) {
            self.push(format!("audio {state:?}"));
        }

        fn on_call_state_changed(&self, _addr: BtAddress, call: &CurrentCall) {
            self.push(format!(
                "call {} {:?} {} {}",
                call.index, call.state, call.number, call.name
            ));
        }

        fn on_at_command_complete(&self, _addr: BtAddress, response: &str) {
            self.push(format!("at {response}"));
        }

        fn on_ring_indication(&self, _addr: BtAddress, inband: bool) {
            self.push(format!("ring {inband}"));
        }

        fn on_call_setup_indicator(&self, _addr: BtAddress, setup: CallSetup) {
            self.push(format!("callsetup {setup:?}"));
        }
    }

    struct Harness {
        svc: HfService,
        stack: Arc<RecordingHfStack>,
        seen: Arc<Seen>,
        handle: LoopHandle,
        addr: BtAddress,
    }

    impl Harness {
        async fn new(config: ProfileConfig) -> Self {
            let (handle, _task) = EventLoop::spawn();
            let stack = Arc::new(RecordingHfStack::default());
            let svc = HfService::new(handle.clone(), config, 4, stack.clone());
            assert!(svc.start().await.unwrap());
            let seen = Arc::new(Seen::default());
            svc.register(seen.clone(), None).unwrap();
            stack.log.take();
            Self {
                svc,
                stack,
                seen,
                handle,
                addr: ADDR.parse().unwrap(),
            }
        }

        async fn settle(&self) {
            self.handle.call(|| ()).await.unwrap();
        }

        fn state(&self) -> Option<HfState> {
            self.svc
                .with_sessions(|s| s.find(self.addr).map(HfSession::state))
                .unwrap()
        }

        async fn connected() -> Self {
            let h = Self::new(ProfileConfig::default()).await;
            h.svc
                .on_stack_connection_state_changed(
                    h.addr,
                    ProfileConnectionState::Connected,
                    ConnectionReason::default(),
                    0x7F,
                )
                .unwrap();
            h.settle().await;
            h.seen.take();
            h.stack.log.take();
            h
        }

        fn clcc(&self, index: u32, state: HfCallState, number: &str) {
            self.svc
                .on_stack_current_call(
                    self.addr,
                    index,
                    CallDirection::Incoming,
                    state,
                    CallMultiparty::Single,
                    number,
                )
                .unwrap();
        }

        /// Feeds a full +CLCC list and clears the resulting output.
        async fn with_calls(&self, calls: &[(u32, HfCallState)]) {
            for &(index, state) in calls {
                self.clcc(index, state, "5550100");
            }
            self.clcc(0, HfCallState::Active, "");
            self.settle().await;
            self.seen.take();
            self.stack.log.take();
        }
    }

    #[tokio::test]
    async fn test_outgoing_connect_and_connected() {
        let h = Harness::new(ProfileConfig::default()).await;
        assert_eq!(h.svc.execute(HfRequest::Connect { addr: h.addr }), Reply::ok());
        h.svc
            .on_stack_connection_state_changed(
                h.addr,
                ProfileConnectionState::Connected,
                ConnectionReason::default(),
                0x10,
            )
            .unwrap();
        h.settle().await;

        assert_eq!(h.state(), Some(HfState::Connected));
        assert_eq!(h.seen.take(), vec!["conn Connecting", "conn Connected"]);
        assert_eq!(h.stack.log.calls(), vec![format!("connect {ADDR}")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_disconnects() {
        let config = ProfileConfig {
            connect_timeout_ms: 50,
            ..ProfileConfig::default()
        };
        let h = Harness::new(config).await;
        h.svc.execute(HfRequest::Connect { addr: h.addr });
        h.settle().await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        h.settle().await;

        assert_eq!(h.state(), Some(HfState::Disconnected));
        assert_eq!(h.stack.log.count("disconnect"), 1);
        assert_eq!(h.seen.take(), vec!["conn Connecting", "conn Disconnected"]);
    }

    #[tokio::test]
    async fn test_request_preconditions() {
        let h = Harness::new(ProfileConfig::default()).await;
        let fail = Reply::error(BtError::Fail);
        assert_eq!(
            h.svc.execute(HfRequest::Disconnect { addr: h.addr }),
            Reply::error(BtError::NotFound)
        );
        assert_eq!(h.svc.execute(HfRequest::Redial { addr: h.addr }), fail);
        assert_eq!(h.svc.execute(HfRequest::HoldCall { addr: h.addr }), fail);
        assert_eq!(h.svc.execute(HfRequest::QueryCurrentCalls { addr: h.addr }), fail);
        assert_eq!(
            h.svc.execute(HfRequest::ControlCall {
                addr: h.addr,
                chld: 5,
                index: 0,
            }),
            Reply::error(BtError::InvalidParameter)
        );
        assert_eq!(
            h.svc.execute(HfRequest::SendAtCmd {
                addr: h.addr,
                command: "A".repeat(AT_COMMAND_MAX + 1),
            }),
            Reply::error(BtError::InvalidParameter)
        );
        // Broadcasts only need a running profile.
        assert_eq!(
            h.svc.execute(HfRequest::UpdateBatteryLevel {
                addr: h.addr,
                level: 3,
            }),
            Reply::ok()
        );
    }

    #[tokio::test]
    async fn test_queued_connect_holds_the_only_slot() {
        let h = Harness::new(ProfileConfig::default()).await;
        let other: BtAddress = "66:55:44:33:22:11".parse().unwrap();

        assert_eq!(h.svc.execute(HfRequest::Connect { addr: h.addr }), Reply::ok());
        assert_eq!(
            h.svc.execute(HfRequest::Connect { addr: other }),
            Reply::error(BtError::NoResources)
        );
        assert_eq!(
            h.svc.execute(HfRequest::SetConnectionPolicy {
                addr: other,
                policy: ConnectionPolicy::Allowed,
            }),
            Reply::ok()
        );
        h.settle().await;

        assert_eq!(h.svc.sessions().len(), 2);
        assert_eq!(h.stack.log.count("connect"), 1);
        assert_eq!(h.svc.with_sessions(|s| s.connection_count()).unwrap(), 1);
        assert_eq!(h.svc.with_sessions(|s| s.reserved()).unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_connects_create_one_session() {
        let h = Harness::new(ProfileConfig::default()).await;

        let mut tasks = Vec::new();
        for i in 0..16 {
            let svc = h.svc.clone();
            let addr = h.addr;
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    Some(svc.execute(HfRequest::Connect { addr }))
                } else {
                    svc.on_stack_connection_state_changed(
                        addr,
                        ProfileConnectionState::Connecting,
                        ConnectionReason::default(),
                        0,
                    )
                    .unwrap();
                    None
                }
            }));
        }
        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() == Some(Reply::ok()) {
                admitted += 1;
            }
        }
        h.settle().await;

        assert!(admitted <= 1);
        assert_eq!(h.svc.sessions().len(), 1);
        assert!(h.stack.log.count("connect") <= 1);
        assert_eq!(h.state(), Some(HfState::Connecting));
    }

    #[tokio::test]
    async fn test_disconnect_refused_once_disconnected() {
        let h = Harness::connected().await;

        assert_eq!(h.svc.execute(HfRequest::Disconnect { addr: h.addr }), Reply::ok());
        h.settle().await;
        assert_eq!(h.state(), Some(HfState::Disconnected));
        assert_eq!(h.stack.log.take(), vec![format!("disconnect {ADDR}")]);

        assert_eq!(
            h.svc.execute(HfRequest::Disconnect { addr: h.addr }),
            Reply::error(BtError::Fail)
        );
        h.settle().await;
        assert_eq!(h.stack.log.count("disconnect"), 0);
    }

    #[tokio::test]
    async fn test_forbidden_policy_refuses_incoming_connection() {
        let h = Harness::new(ProfileConfig::default()).await;
        assert_eq!(
            h.svc.execute(HfRequest::SetConnectionPolicy {
                addr: h.addr,
                policy: ConnectionPolicy::Forbidden,
            }),
            Reply::ok()
        );
        h.svc
            .on_stack_connection_state_changed(
                h.addr,
                ProfileConnectionState::Connecting,
                ConnectionReason::default(),
                0,
            )
            .unwrap();
        h.svc.execute(HfRequest::Connect { addr: h.addr });
        h.settle().await;

        assert_eq!(h.state(), Some(HfState::Disconnected));
        assert_eq!(h.stack.log.take(), vec![format!("disconnect {ADDR}")]);
        assert!(h.seen.take().is_empty());
    }

    #[tokio::test]
    async fn test_allowed_policy_connects() {
        let h = Harness::new(ProfileConfig::default()).await;
        h.svc
            .set_connection_policy(h.addr, ConnectionPolicy::Allowed)
            .unwrap();
        h.settle().await;

        assert_eq!(h.state(), Some(HfState::Connecting));
        assert_eq!(
            h.svc.with_sessions(|s| s.find(h.addr).map(HfSession::policy)).unwrap(),
            Some(ConnectionPolicy::Allowed)
        );
    }

    #[tokio::test]
    async fn test_indicators_while_connecting_query_calls_once_connected() {
        let h = Harness::new(ProfileConfig::default()).await;
        h.svc.execute(HfRequest::Connect { addr: h.addr });
        h.svc.on_stack_call_setup(h.addr, CallSetup::Incoming).unwrap();
        h.svc
            .on_stack_connection_state_changed(
                h.addr,
                ProfileConnectionState::Connected,
                ConnectionReason::default(),
                0,
            )
            .unwrap();
        h.settle().await;

        assert_eq!(
            h.stack.log.take(),
            vec![format!("connect {ADDR}"), format!("get_current_calls {ADDR}")]
        );
        assert_eq!(
            h.seen.take(),
            vec!["conn Connecting", "callsetup Incoming", "conn Connected"]
        );
    }

    #[tokio::test]
    async fn test_current_call_list_merge() {
        let h = Harness::connected().await;
        h.clcc(1, HfCallState::Incoming, "5550100");
        h.clcc(2, HfCallState::Held, "5550199");
        h.clcc(0, HfCallState::Active, "");
        h.settle().await;
        assert_eq!(
            h.seen.take(),
            vec!["call 1 Incoming 5550100 ", "call 2 Held 5550199 "]
        );

        // Call 1 answered, call 2 gone.
        h.clcc(1, HfCallState::Active, "5550100");
        h.clcc(0, HfCallState::Active, "");
        h.svc.on_stack_clip(h.addr, "5550100", "Alice").unwrap();
        h.settle().await;
        assert_eq!(
            h.seen.take(),
            vec![
                "call 2 Disconnected 5550199 ",
                "call 1 Active 5550100 ",
                "call 1 Active 5550100 Alice",
            ]
        );

        let calls = h.svc.query_current_calls(h.addr).await.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "Alice");
    }

    #[tokio::test]
    async fn test_accept_call_chooses_operation() {
        let h = Harness::connected().await;
        h.with_calls(&[(1, HfCallState::Incoming)]).await;
        h.svc.execute(HfRequest::AcceptCall {
            addr: h.addr,
            flag: CallAccept::None,
        });
        h.settle().await;
        assert_eq!(h.stack.log.take(), vec![format!("answer_call {ADDR}")]);

        h.with_calls(&[(1, HfCallState::Active), (2, HfCallState::Waiting)])
            .await;
        h.svc.execute(HfRequest::AcceptCall {
            addr: h.addr,
            flag: CallAccept::Release,
        });
        h.svc.execute(HfRequest::AcceptCall {
            addr: h.addr,
            flag: CallAccept::Hold,
        });
        h.settle().await;
        assert_eq!(
            h.stack.log.take(),
            vec![format!("call_control {ADDR} 1 0"), format!("call_control {ADDR} 2 0")]
        );

        h.with_calls(&[(1, HfCallState::Active), (2, HfCallState::Held)])
            .await;
        h.svc.execute(HfRequest::AcceptCall {
            addr: h.addr,
            flag: CallAccept::None,
        });
        h.settle().await;
        assert_eq!(h.stack.log.take(), vec![format!("call_control {ADDR} 3 0")]);
    }

    #[tokio::test]
    async fn test_terminate_and_reject_routing() {
        let h = Harness::connected().await;
        h.with_calls(&[(1, HfCallState::Held)]).await;
        h.svc.execute(HfRequest::TerminateCall { addr: h.addr });
        h.svc.execute(HfRequest::HoldCall { addr: h.addr });
        h.settle().await;
        // Nothing active to hold.
        assert_eq!(h.stack.log.take(), vec![format!("call_control {ADDR} 0 0")]);

        h.with_calls(&[(1, HfCallState::Incoming)]).await;
        h.svc.execute(HfRequest::RejectCall { addr: h.addr });
        h.settle().await;
        assert_eq!(h.stack.log.take(), vec![format!("reject_call {ADDR}")]);
    }

    #[tokio::test]
    async fn test_failed_dial_result_reports_disconnected_call() {
        let h = Harness::connected().await;
        h.svc.dial(h.addr, "5551234").await.unwrap();
        h.svc.redial(h.addr).await.unwrap();
        h.settle().await;
        assert_eq!(
            h.stack.log.take(),
            vec![format!("dial_number {ADDR} 5551234"), format!("dial_number {ADDR} -")]
        );

        h.svc
            .on_stack_command_result(h.addr, at_cmd::ATD, 4)
            .unwrap();
        h.svc
            .on_stack_command_result(h.addr, at_cmd::BLDN, at_cmd::RESULT_OK)
            .unwrap();
        h.settle().await;
        assert_eq!(h.seen.take(), vec!["call 0 Disconnected 5551234 "]);
    }

    #[tokio::test]
    async fn test_stack_dial_failure_reports_immediately() {
        let h = Harness::connected().await;
        h.stack.log.fail_on("dial_number");
        h.svc.dial(h.addr, "5551234").await.unwrap();
        h.settle().await;
        assert_eq!(h.seen.take(), vec!["call 0 Disconnected 5551234 "]);
    }

    #[tokio::test]
    async fn test_audio_cycle_and_volume() {
        let h = Harness::connected().await;
        assert_eq!(h.svc.execute(HfRequest::ConnectAudio { addr: h.addr }), Reply::ok());
        h.settle().await;
        h.svc
            .on_stack_audio_state_changed(h.addr, AudioState::Connected)
            .unwrap();
        h.settle().await;
        assert_eq!(h.state(), Some(HfState::AudioOn));

        for _ in 0..2 {
            h.svc
                .volume_control(h.addr, VolumeType::Speaker, 11)
                .await
                .unwrap();
        }
        h.svc
            .on_stack_audio_state_changed(h.addr, AudioState::Disconnected)
            .unwrap();
        h.settle().await;

        assert_eq!(h.state(), Some(HfState::Connected));
        assert_eq!(
            h.stack.log.take(),
            vec![format!("connect_audio {ADDR}"), format!("set_volume {ADDR} Speaker 11")]
        );
        assert_eq!(h.seen.take(), vec!["audio Connected", "audio Disconnected"]);
    }

    #[tokio::test]
    async fn test_ring_and_at_response_notifications() {
        let h = Harness::connected().await;
        h.svc.on_stack_ring_indication(h.addr, false, true).unwrap();
        h.svc.on_stack_ring_indication(h.addr, true, true).unwrap();
        h.svc.on_stack_command_response(h.addr, "+CSQ: 4").unwrap();
        h.settle().await;
        assert_eq!(h.seen.take(), vec!["ring true", "at +CSQ: 4"]);
    }

    #[tokio::test]
    async fn test_remote_disconnect_clears_calls() {
        let h = Harness::connected().await;
        h.with_calls(&[(1, HfCallState::Active)]).await;
        h.svc
            .on_stack_connection_state_changed(
                h.addr,
                ProfileConnectionState::Disconnected,
                ConnectionReason::RemoteTerminated,
                0,
            )
            .unwrap();
        h.settle().await;

        assert_eq!(h.state(), Some(HfState::Disconnected));
        assert_eq!(h.seen.take(), vec!["conn Disconnected"]);
        assert!(h
            .svc
            .with_sessions(|s| s.find(h.addr).map(|s| s.current_calls().is_empty()))
            .unwrap()
            .unwrap());
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_and_cleans_up() {
        let h = Harness::connected().await;
        assert!(h.svc.stop().await.unwrap());
        assert_eq!(
            h.stack.log.take(),
            vec![format!("disconnect {ADDR}"), "cleanup".to_string()]
        );
        assert_eq!(h.seen.take(), vec!["conn Disconnected"]);
    }
}
