//! Public AG operations on top of the generic runtime.
//!
//! [`AgService::execute`] is the single entry point shared by the
//! in-process [`HfpAg`] implementation and both RPC servers. It checks
//! the cached session state and posts an event; the outcome is reported
//! later through the listeners.

use std::sync::Arc;

use async_trait::async_trait;
use bt_core::text::{AT_COMMAND_CAPACITY, PHONE_NUMBER_CAPACITY, VENDOR_PREFIX_CAPACITY};
use bt_core::{
    bounded_copy, AudioState, BtAddress, BtError, BtResult, ConnectionReason, Cookie, DeviceStatus,
    HfpAg, HfpAgCallbacks, Message, PhoneState, ProfileConnectionState, VolumeType,
};
use bt_protocol::{AgRequest, Reply};
use tracing::debug;

use super::{AgEvent, AgProfile, AgSession};
use crate::profile::ProfileService;
use crate::session::{DeviceSession, SessionRegistry};

pub type AgService = ProfileService<AgProfile>;

type Sessions = SessionRegistry<AgSession>;

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

impl ProfileService<AgProfile> {
    /// Runs one request and returns its reply.
    ///
    /// Listener registration is connection-scoped and handled by the
    /// caller; those requests are rejected here.
    pub fn execute(&self, request: AgRequest) -> Reply {
        debug!(op = request.opcode(), "AG request");
        match request.bounded() {
            AgRequest::RegisterCallback | AgRequest::UnregisterCallback => {
                Reply::error(BtError::InvalidParameter)
            }
            AgRequest::IsConnected { addr } => Reply::from_bool(
                self.with_sessions(|s| s.find(addr).is_some_and(AgSession::is_connected)),
            ),
            AgRequest::IsAudioConnected { addr } => Reply::from_bool(
                self.with_sessions(|s| s.find(addr).is_some_and(AgSession::is_audio_connected)),
            ),
            AgRequest::GetConnectionState { addr } => {
                Reply::from_connection_state(self.with_sessions(|s| {
                    s.find(addr)
                        .map_or(ProfileConnectionState::Disconnected, |s| s.connection_state())
                }))
            }
            AgRequest::Connect { addr } => {
                Reply::from_status(self.post_reserved(addr, AgEvent::Connect, require_capacity))
            }
            AgRequest::Disconnect { addr } => Reply::from_status(self.post_checked(
                addr,
                AgEvent::Disconnect,
                require_disconnectable(addr),
            )),
            AgRequest::ConnectAudio { addr } => Reply::from_status(self.post_checked(
                addr,
                AgEvent::ConnectAudio,
                require_audio_idle(addr),
            )),
            AgRequest::DisconnectAudio { addr } => Reply::from_status(self.post_checked(
                addr,
                AgEvent::DisconnectAudio,
                require_audio_on(addr),
            )),
            AgRequest::StartVirtualCall { addr } => Reply::from_status(self.post_checked(
                addr,
                AgEvent::StartVirtualCall,
                require_audio_idle(addr),
            )),
            AgRequest::StopVirtualCall { addr } => Reply::from_status(self.post_checked(
                addr,
                AgEvent::StopVirtualCall,
                require_audio_on(addr),
            )),
            AgRequest::StartVoiceRecognition { addr } => Reply::from_status(self.post_checked(
                addr,
                AgEvent::VoiceRecognitionStart,
                require_connected(addr),
            )),
            AgRequest::StopVoiceRecognition { addr } => Reply::from_status(self.post_checked(
                addr,
                AgEvent::VoiceRecognitionStop,
                require_connected(addr),
            )),
            AgRequest::PhoneStateChange { state, .. } => {
                Reply::from_status(self.post(Message::broadcast(AgEvent::PhoneStateChange(state))))
            }
            AgRequest::NotifyDeviceStatus { status, .. } => Reply::from_status(
                self.post(Message::broadcast(AgEvent::DeviceStatusChanged(status))),
            ),
            AgRequest::VolumeControl {
                volume_type,
                volume,
                ..
            } => Reply::from_status(self.post(Message::broadcast(AgEvent::SetVolume {
                kind: volume_type,
                volume,
            }))),
            AgRequest::SendAtCommand { addr, command } => Reply::from_status(self.post_checked(
                addr,
                AgEvent::SendAtCommand { command },
                require_connected(addr),
            )),
            AgRequest::SendVendorSpecificAtCommand {
                addr,
                command,
                value,
            } => {
                if command.is_empty() || value.is_empty() {
                    return Reply::error(BtError::InvalidParameter);
                }
                Reply::from_status(self.post_checked(
                    addr,
                    AgEvent::SendVendorAtCommand { command, value },
                    require_connected(addr),
                ))
            }
            AgRequest::DialResponse { result } => Reply::from_status(
                self.post(Message::broadcast(AgEvent::DialingResult { result })),
            ),
        }
    }

    pub fn set_inband_ring_enable(&self, enabled: bool) -> BtResult<()> {
        self.post(Message::broadcast(AgEvent::SetInbandRingEnable { enabled }))
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
            AgEvent::StackConnectionStateChanged {
                state,
                reason,
                remote_features,
            },
        ))
    }

    pub fn on_stack_audio_state_changed(&self, addr: BtAddress, state: AudioState) -> BtResult<()> {
        self.post(Message::new(addr, AgEvent::StackAudioStateChanged { state }))
    }

    pub fn on_stack_audio_request(&self, addr: BtAddress) -> BtResult<()> {
        self.post(Message::new(addr, AgEvent::StackAudioRequest))
    }

    pub fn on_stack_voice_recognition_changed(&self, addr: BtAddress, started: bool) -> BtResult<()> {
        self.post(Message::new(
            addr,
            AgEvent::StackVoiceRecognitionChanged { started },
        ))
    }

    pub fn on_stack_volume_changed(
        &self,
        addr: BtAddress,
        kind: VolumeType,
        volume: u8,
    ) -> BtResult<()> {
        self.post(Message::new(addr, AgEvent::StackVolumeChanged { kind, volume }))
    }

    pub fn on_stack_battery_update(&self, addr: BtAddress, level: u8) -> BtResult<()> {
        self.post(Message::new(addr, AgEvent::StackBatteryUpdate { level }))
    }

    pub fn on_stack_answer_call(&self, addr: BtAddress) -> BtResult<()> {
        self.post(Message::new(addr, AgEvent::StackAnswerCall))
    }

    pub fn on_stack_reject_call(&self, addr: BtAddress) -> BtResult<()> {
        self.post(Message::new(addr, AgEvent::StackRejectCall))
    }

    pub fn on_stack_hangup_call(&self, addr: BtAddress) -> BtResult<()> {
        self.post(Message::new(addr, AgEvent::StackHangupCall))
    }

    pub fn on_stack_dial_number(&self, addr: BtAddress, number: Option<&str>) -> BtResult<()> {
        let number = number.map(|n| bounded_copy(n, PHONE_NUMBER_CAPACITY));
        self.post(Message::new(addr, AgEvent::StackDialNumber { number }))
    }

    pub fn on_stack_dial_memory(&self, addr: BtAddress, location: u32) -> BtResult<()> {
        self.post(Message::new(addr, AgEvent::StackDialMemory { location }))
    }

    pub fn on_stack_at_command(&self, addr: BtAddress, command: &str) -> BtResult<()> {
        let command = bounded_copy(command, AT_COMMAND_CAPACITY);
        self.post(Message::new(addr, AgEvent::StackAtCommand { command }))
    }

    pub fn on_stack_vendor_at_command(
        &self,
        addr: BtAddress,
        command: &str,
        company_id: u16,
        value: &str,
    ) -> BtResult<()> {
        self.post(Message::new(
            addr,
            AgEvent::StackVendorAtCommand {
                command: bounded_copy(command, VENDOR_PREFIX_CAPACITY),
                company_id,
                value: bounded_copy(value, AT_COMMAND_CAPACITY),
            },
        ))
    }
}

#[async_trait]
impl HfpAg for ProfileService<AgProfile> {
    async fn register_callbacks(&self, callbacks: Arc<dyn HfpAgCallbacks>) -> BtResult<Cookie> {
        self.register(callbacks, None)
    }

    async fn unregister_callbacks(&self, cookie: Cookie) -> BtResult<()> {
        self.unregister(cookie)
    }

    async fn is_connected(&self, addr: BtAddress) -> BtResult<bool> {
        self.execute(AgRequest::IsConnected { addr }).into_bool()
    }

    async fn is_audio_connected(&self, addr: BtAddress) -> BtResult<bool> {
        self.execute(AgRequest::IsAudioConnected { addr }).into_bool()
    }

    async fn get_connection_state(&self, addr: BtAddress) -> BtResult<ProfileConnectionState> {
        self.execute(AgRequest::GetConnectionState { addr })
            .into_connection_state()
    }

    async fn connect(&self, addr: BtAddress) -> BtResult<()> {
        self.execute(AgRequest::Connect { addr }).into_status()
    }

    async fn disconnect(&self, addr: BtAddress) -> BtResult<()> {
        self.execute(AgRequest::Disconnect { addr }).into_status()
    }

    async fn connect_audio(&self, addr: BtAddress) -> BtResult<()> {
        self.execute(AgRequest::ConnectAudio { addr }).into_status()
    }

    async fn disconnect_audio(&self, addr: BtAddress) -> BtResult<()> {
        self.execute(AgRequest::DisconnectAudio { addr }).into_status()
    }

    async fn start_virtual_call(&self, addr: BtAddress) -> BtResult<()> {
        self.execute(AgRequest::StartVirtualCall { addr }).into_status()
    }

    async fn stop_virtual_call(&self, addr: BtAddress) -> BtResult<()> {
        self.execute(AgRequest::StopVirtualCall { addr }).into_status()
    }

    async fn start_voice_recognition(&self, addr: BtAddress) -> BtResult<()> {
        self.execute(AgRequest::StartVoiceRecognition { addr })
            .into_status()
    }

    async fn stop_voice_recognition(&self, addr: BtAddress) -> BtResult<()> {
        self.execute(AgRequest::StopVoiceRecognition { addr })
            .into_status()
    }

    async fn phone_state_change(&self, addr: BtAddress, state: PhoneState) -> BtResult<()> {
        self.execute(AgRequest::PhoneStateChange { addr, state })
            .into_status()
    }

    async fn notify_device_status(&self, addr: BtAddress, status: DeviceStatus) -> BtResult<()> {
        self.execute(AgRequest::NotifyDeviceStatus { addr, status })
            .into_status()
    }

    async fn volume_control(&self, addr: BtAddress, kind: VolumeType, volume: u8) -> BtResult<()> {
        self.execute(AgRequest::VolumeControl {
            addr,
            volume_type: kind,
            volume,
        })
        .into_status()
    }

    async fn dial_response(&self, result: u8) -> BtResult<()> {
        self.execute(AgRequest::DialResponse { result }).into_status()
    }

    async fn send_at_command(&self, addr: BtAddress, command: &str) -> BtResult<()> {
        self.execute(AgRequest::SendAtCommand {
            addr,
            command: command.to_string(),
        })
        .into_status()
    }

    async fn send_vendor_specific_at_command(
        &self,
        addr: BtAddress,
        command: &str,
        value: &str,
    ) -> BtResult<()> {
        self.execute(AgRequest::SendVendorSpecificAtCommand {
            addr,
            command: command.to_string(),
            value: value.to_string(),
        })
        .into_status()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use bt_core::{AgCallState, CallAddressType};

    use super::*;
    use crate::config::ProfileConfig;
    use crate::event_loop::{EventLoop, LoopHandle};
    use crate::profiles::ag::{at_result, AgState, RecordingAgStack, DIAL_OUT_TIMEOUT};

    const ADDR: &str = "11:22:33:44:55:66";
    const OTHER: &str = "66:55:44:33:22:11";

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

    impl HfpAgCallbacks for Seen {
        fn on_connection_state_changed(&self, addr: BtAddress, state: ProfileConnectionState) {
            self.push(format!("conn {addr} {state:?}"));
        }

        fn on_audio_state_changed(&self, addr: BtAddress, state: AudioState) {
            self.push(format!("audio {addr} {state:?}"));
        }

        fn on_volume_control(&self, addr: BtAddress, kind: VolumeType, volume: u8) {
            self.push(format!("volume {addr} {kind:?} {volume}"));
        }

        fn on_dial_call(&self, addr: BtAddress, number: Option<&str>) {
            self.push(format!("dial {addr} {}", number.unwrap_or("-")));
        }

        fn on_at_command_received(&self, addr: BtAddress, command: &str) {
            self.push(format!("at {addr} {}", command.trim()));
        }

        fn on_vendor_at_command_received(
            &self,
            addr: BtAddress,
            command: &str,
            company_id: u16,
            value: &str,
        ) {
            self.push(format!("vendor {addr} {command} {company_id:#06x} {value}"));
        }
    }

    struct Harness {
        svc: AgService,
        stack: Arc<RecordingAgStack>,
        seen: Arc<Seen>,
        handle: LoopHandle,
        addr: BtAddress,
    }

    impl Harness {
        async fn new(config: ProfileConfig) -> Self {
            let (handle, _task) = EventLoop::spawn();
            let stack = Arc::new(RecordingAgStack::default());
            let svc = AgService::new(handle.clone(), config, 4, stack.clone());
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

        fn state(&self) -> Option<AgState> {
            self.svc
                .with_sessions(|s| s.find(self.addr).map(AgSession::state))
                .unwrap()
        }

        async fn connected(config: ProfileConfig) -> Self {
            let h = Self::new(config).await;
            h.svc
                .on_stack_connection_state_changed(
                    h.addr,
                    ProfileConnectionState::Connected,
                    ConnectionReason::default(),
                    0x3F,
                )
                .unwrap();
            h.settle().await;
            h.seen.take();
            h.stack.log.take();
            h
        }

        async fn audio_on() -> Self {
            let h = Self::connected(ProfileConfig::default()).await;
            h.svc
                .on_stack_audio_state_changed(h.addr, AudioState::Connected)
                .unwrap();
            h.settle().await;
            assert_eq!(h.state(), Some(AgState::AudioOn));
            h.seen.take();
            h.stack.log.take();
            h
        }
    }

    #[tokio::test]
    async fn test_outgoing_connect() {
        let h = Harness::new(ProfileConfig::default()).await;
        assert_eq!(h.svc.execute(AgRequest::Connect { addr: h.addr }), Reply::ok());
        h.settle().await;

        assert_eq!(h.state(), Some(AgState::Connecting));
        assert_eq!(h.stack.log.calls(), vec![format!("connect {ADDR}")]);

        h.svc
            .on_stack_connection_state_changed(
                h.addr,
                ProfileConnectionState::Connected,
                ConnectionReason::default(),
                0x1,
            )
            .unwrap();
        h.settle().await;

        assert_eq!(
            h.seen.take(),
            vec![format!("conn {ADDR} Connecting"), format!("conn {ADDR} Connected")]
        );
        assert!(h.svc.is_connected(h.addr).await.unwrap());
        assert_eq!(
            h.svc.with_sessions(|s| s.find(h.addr).map(AgSession::remote_features)).unwrap(),
            Some(0x1)
        );
    }

    #[tokio::test]
    async fn test_stack_connect_failure_reports_disconnected() {
        let h = Harness::new(ProfileConfig::default()).await;
        h.stack.log.fail_on("connect");
        h.svc.execute(AgRequest::Connect { addr: h.addr });
        h.settle().await;

        assert_eq!(h.state(), Some(AgState::Disconnected));
        assert_eq!(h.seen.take(), vec![format!("conn {ADDR} Disconnected")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_disconnects() {
        let config = ProfileConfig {
            connect_timeout_ms: 50,
            ..ProfileConfig::default()
        };
        let h = Harness::new(config).await;
        h.svc.execute(AgRequest::Connect { addr: h.addr });
        h.settle().await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        h.settle().await;

        assert_eq!(h.state(), Some(AgState::Disconnected));
        assert_eq!(
            h.stack.log.calls(),
            vec![format!("connect {ADDR}"), format!("disconnect {ADDR}")]
        );
        assert_eq!(
            h.seen.take(),
            vec![format!("conn {ADDR} Connecting"), format!("conn {ADDR} Disconnected")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_cancelled_when_connected() {
        let config = ProfileConfig {
            connect_timeout_ms: 50,
            ..ProfileConfig::default()
        };
        let h = Harness::new(config).await;
        h.svc.execute(AgRequest::Connect { addr: h.addr });
        h.svc
            .on_stack_connection_state_changed(
                h.addr,
                ProfileConnectionState::Connected,
                ConnectionReason::default(),
                0,
            )
            .unwrap();
        h.settle().await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        h.settle().await;

        assert_eq!(h.state(), Some(AgState::Connected));
        assert_eq!(h.stack.log.count("disconnect"), 0);
    }

    #[tokio::test]
    async fn test_request_preconditions() {
        let h = Harness::new(ProfileConfig::default()).await;
        let other: BtAddress = OTHER.parse().unwrap();

        let fail = Reply::error(BtError::Fail);
        assert_eq!(
            h.svc.execute(AgRequest::Disconnect { addr: h.addr }),
            Reply::error(BtError::NotFound)
        );
        assert_eq!(h.svc.execute(AgRequest::ConnectAudio { addr: h.addr }), fail);
        assert_eq!(h.svc.execute(AgRequest::DisconnectAudio { addr: h.addr }), fail);
        assert_eq!(h.svc.execute(AgRequest::StartVirtualCall { addr: h.addr }), fail);
        assert_eq!(
            h.svc.execute(AgRequest::SendVendorSpecificAtCommand {
                addr: h.addr,
                command: String::new(),
                value: "1".into(),
            }),
            Reply::error(BtError::InvalidParameter)
        );
        assert_eq!(
            h.svc.execute(AgRequest::RegisterCallback),
            Reply::error(BtError::InvalidParameter)
        );
        assert_eq!(
            h.svc.execute(AgRequest::GetConnectionState { addr: h.addr }),
            Reply::ConnectionState {
                state: ProfileConnectionState::Disconnected
            }
        );

        // One connection allowed: a second device hits the ceiling.
        h.svc.execute(AgRequest::Connect { addr: h.addr });
        h.settle().await;
        assert_eq!(
            h.svc.execute(AgRequest::Connect { addr: other }),
            Reply::error(BtError::NoResources)
        );
        assert!(h.stack.log.calls().iter().all(|c| !c.contains(OTHER)));
    }

    #[tokio::test]
    async fn test_queued_connect_holds_the_only_slot() {
        let h = Harness::new(ProfileConfig::default()).await;
        let other: BtAddress = OTHER.parse().unwrap();
        h.stack.log.fail_on("connect");

        // Neither connect has reached the loop yet.
        assert_eq!(h.svc.execute(AgRequest::Connect { addr: h.addr }), Reply::ok());
        assert_eq!(
            h.svc.execute(AgRequest::Connect { addr: other }),
            Reply::error(BtError::NoResources)
        );
        h.settle().await;

        assert_eq!(h.svc.sessions().len(), 1);
        assert_eq!(h.stack.log.take(), vec![format!("connect {ADDR}")]);
        assert_eq!(h.svc.with_sessions(|s| s.reserved()).unwrap(), 0);

        // The failed attempt gave its slot back.
        h.stack.log.succeed_on("connect");
        assert_eq!(h.svc.execute(AgRequest::Connect { addr: other }), Reply::ok());
        h.settle().await;
        assert_eq!(h.stack.log.take(), vec![format!("connect {OTHER}")]);
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
                    Some(svc.execute(AgRequest::Connect { addr }))
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
        assert_eq!(h.state(), Some(AgState::Connecting));
    }

    #[tokio::test]
    async fn test_disconnect_refused_once_disconnecting() {
        let h = Harness::connected(ProfileConfig::default()).await;
        let fail = Reply::error(BtError::Fail);

        assert_eq!(h.svc.execute(AgRequest::Disconnect { addr: h.addr }), Reply::ok());
        h.settle().await;
        assert_eq!(h.state(), Some(AgState::Disconnecting));
        assert_eq!(h.stack.log.take(), vec![format!("disconnect {ADDR}")]);

        assert_eq!(h.svc.execute(AgRequest::Disconnect { addr: h.addr }), fail);
        h.settle().await;
        assert_eq!(h.stack.log.count("disconnect"), 0);

        h.svc
            .on_stack_connection_state_changed(
                h.addr,
                ProfileConnectionState::Disconnected,
                ConnectionReason::default(),
                0,
            )
            .unwrap();
        h.settle().await;
        assert_eq!(h.state(), Some(AgState::Disconnected));

        assert_eq!(h.svc.execute(AgRequest::Disconnect { addr: h.addr }), fail);
        h.settle().await;
        assert_eq!(h.stack.log.count("disconnect"), 0);
    }

    #[tokio::test]
    async fn test_virtual_call_follows_audio_state() {
        let h = Harness::connected(ProfileConfig::default()).await;
        let fail = Reply::error(BtError::Fail);
        assert_eq!(h.svc.execute(AgRequest::StopVirtualCall { addr: h.addr }), fail);

        h.svc
            .on_stack_audio_state_changed(h.addr, AudioState::Connected)
            .unwrap();
        h.settle().await;
        assert_eq!(h.state(), Some(AgState::AudioOn));
        assert_eq!(h.svc.execute(AgRequest::StartVirtualCall { addr: h.addr }), fail);
        assert_eq!(h.stack.log.count("phone_state_change"), 0);
    }

    #[tokio::test]
    async fn test_stray_audio_event_does_not_change_active_device() {
        let config = ProfileConfig {
            max_connections: 2,
            ..ProfileConfig::default()
        };
        let h = Harness::connected(config).await;
        let other: BtAddress = OTHER.parse().unwrap();

        h.svc
            .on_stack_audio_state_changed(other, AudioState::Connected)
            .unwrap();
        h.settle().await;

        assert_eq!(h.svc.sessions().len(), 2);
        assert_eq!(h.svc.active_device(), Some(h.addr));

        // Once connected, audio on the second device promotes it.
        h.svc
            .on_stack_connection_state_changed(
                other,
                ProfileConnectionState::Connected,
                ConnectionReason::default(),
                0,
            )
            .unwrap();
        h.svc
            .on_stack_audio_state_changed(other, AudioState::Connected)
            .unwrap();
        h.settle().await;
        assert_eq!(h.svc.active_device(), Some(other));
    }

    #[tokio::test]
    async fn test_stopped_service_is_not_enabled() {
        let h = Harness::new(ProfileConfig::default()).await;
        assert!(h.svc.stop().await.unwrap());

        assert_eq!(
            h.svc.execute(AgRequest::IsConnected { addr: h.addr }),
            Reply::error(BtError::NotEnabled)
        );
        assert_eq!(
            h.svc.on_stack_audio_request(h.addr),
            Err(BtError::NotEnabled)
        );
        assert_eq!(h.svc.callback_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_during_audio_closes_audio_first() {
        let h = Harness::audio_on().await;
        assert_eq!(h.svc.execute(AgRequest::Disconnect { addr: h.addr }), Reply::ok());
        h.settle().await;

        assert_eq!(h.state(), Some(AgState::AudioDisconnecting));
        assert_eq!(h.stack.log.take(), vec![format!("disconnect_audio {ADDR}")]);

        h.svc
            .on_stack_audio_state_changed(h.addr, AudioState::Disconnected)
            .unwrap();
        h.settle().await;

        assert_eq!(h.state(), Some(AgState::Disconnecting));
        assert_eq!(h.stack.log.take(), vec![format!("disconnect {ADDR}")]);
        assert_eq!(
            h.seen.take(),
            vec![
                format!("audio {ADDR} Disconnecting"),
                format!("audio {ADDR} Disconnected"),
                format!("conn {ADDR} Disconnecting"),
            ]
        );
    }

    #[tokio::test]
    async fn test_virtual_call_drives_call_sequence() {
        let h = Harness::connected(ProfileConfig::default()).await;
        assert_eq!(
            h.svc.execute(AgRequest::StartVirtualCall { addr: h.addr }),
            Reply::ok()
        );
        h.settle().await;

        assert_eq!(h.state(), Some(AgState::AudioConnecting));
        assert_eq!(
            h.stack.log.take(),
            vec![
                format!("phone_state_change {ADDR} 0 0 Dialing"),
                format!("phone_state_change {ADDR} 0 0 Alerting"),
                format!("phone_state_change {ADDR} 1 0 Active"),
                format!("connect_audio {ADDR}"),
            ]
        );

        h.svc
            .on_stack_audio_state_changed(h.addr, AudioState::Connected)
            .unwrap();
        h.settle().await;
        h.svc.execute(AgRequest::StopVirtualCall { addr: h.addr });
        h.settle().await;

        assert_eq!(h.state(), Some(AgState::AudioDisconnecting));
        assert_eq!(
            h.stack.log.take(),
            vec![
                format!("phone_state_change {ADDR} 0 0 Disconnected"),
                format!("phone_state_change {ADDR} 0 0 Idle"),
                format!("disconnect_audio {ADDR}"),
            ]
        );
    }

    #[tokio::test]
    async fn test_virtual_call_refused_during_telephony_call() {
        let h = Harness::connected(ProfileConfig::default()).await;
        let phone = PhoneState {
            num_active: 1,
            num_held: 0,
            call_state: AgCallState::Idle,
            address_type: CallAddressType::Unknown,
            number: String::new(),
            name: String::new(),
        };
        h.svc.execute(AgRequest::PhoneStateChange {
            addr: h.addr,
            state: phone,
        });
        h.svc.execute(AgRequest::StartVirtualCall { addr: h.addr });
        h.settle().await;

        assert_eq!(h.state(), Some(AgState::Connected));
        assert_eq!(h.stack.log.count("connect_audio"), 0);
        assert_eq!(h.seen.take(), vec![format!("audio {ADDR} Disconnected")]);
    }

    #[tokio::test]
    async fn test_volume_is_sent_only_when_changed() {
        let h = Harness::audio_on().await;
        for _ in 0..2 {
            h.svc.execute(AgRequest::VolumeControl {
                addr: h.addr,
                volume_type: VolumeType::Speaker,
                volume: 9,
            });
        }
        h.svc
            .on_stack_volume_changed(h.addr, VolumeType::Microphone, 4)
            .unwrap();
        h.settle().await;

        assert_eq!(h.stack.log.take(), vec![format!("set_volume {ADDR} Speaker 9")]);
        assert_eq!(h.seen.take(), vec![format!("volume {ADDR} Microphone 4")]);
    }

    #[tokio::test]
    async fn test_vendor_at_command_is_parsed() {
        let h = Harness::connected(ProfileConfig::default()).await;
        h.svc.on_stack_at_command(h.addr, "AT+XIAOMI=battery\r\n").unwrap();
        h.svc.on_stack_at_command(h.addr, "AT+TEST\r\n").unwrap();
        h.svc.on_stack_at_command(h.addr, "AT+FOO\r\n").unwrap();
        h.settle().await;

        assert_eq!(
            h.seen.take(),
            vec![
                format!("vendor {ADDR} +XIAOMI 0x038f battery"),
                format!("at {ADDR} AT+FOO"),
            ]
        );
        assert_eq!(
            h.stack.log.take(),
            vec![
                format!("send_at_command {ADDR} \"\\r\\nOK\\r\\n\""),
                format!("send_at_command {ADDR} \"\\r\\n+TEST:0\\r\\n\""),
                format!("error_response {ADDR} {}", at_result::CME_OPERATION_NOT_SUPPORTED),
            ]
        );
    }

    #[tokio::test]
    async fn test_send_vendor_at_command_formats_frame() {
        let h = Harness::connected(ProfileConfig::default()).await;
        h.svc.execute(AgRequest::SendVendorSpecificAtCommand {
            addr: h.addr,
            command: "+ANDROID".into(),
            value: "1,2".into(),
        });
        h.settle().await;

        assert_eq!(
            h.stack.log.take(),
            vec![format!("send_at_command {ADDR} \"\\r\\n+ANDROID: 1,2\\r\\n\"")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dial_request_times_out() {
        let h = Harness::connected(ProfileConfig::default()).await;
        h.svc.on_stack_dial_number(h.addr, Some("5551234")).unwrap();
        h.settle().await;
        assert_eq!(h.seen.take(), vec![format!("dial {ADDR} 5551234")]);

        tokio::time::sleep(DIAL_OUT_TIMEOUT + Duration::from_secs(1)).await;
        h.settle().await;
        assert_eq!(
            h.stack.log.take(),
            vec![format!("dial_response {ADDR} {}", at_result::TIMEOUT)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dial_response_cancels_timeout() {
        let h = Harness::connected(ProfileConfig::default()).await;
        h.svc.on_stack_dial_number(h.addr, Some("5551234")).unwrap();
        h.settle().await;
        h.svc.execute(AgRequest::DialResponse {
            result: at_result::OK,
        });
        h.settle().await;

        tokio::time::sleep(DIAL_OUT_TIMEOUT + Duration::from_secs(1)).await;
        h.settle().await;
        assert_eq!(
            h.stack.log.take(),
            vec![format!("dial_response {ADDR} {}", at_result::OK)]
        );
    }

    #[tokio::test]
    async fn test_redial_is_refused() {
        let h = Harness::connected(ProfileConfig::default()).await;
        h.svc.on_stack_dial_number(h.addr, None).unwrap();
        h.settle().await;

        assert_eq!(
            h.stack.log.take(),
            vec![format!("dial_response {ADDR} {}", at_result::ERROR)]
        );
        assert_eq!(h.seen.take(), vec![format!("dial {ADDR} -")]);
    }

    #[tokio::test]
    async fn test_shutdown_tears_down_sessions() {
        let h = Harness::connected(ProfileConfig::default()).await;
        assert!(h.svc.stop().await.unwrap());

        assert_eq!(
            h.stack.log.take(),
            vec![format!("disconnect {ADDR}"), "cleanup".to_string()]
        );
        assert_eq!(h.seen.take(), vec![format!("conn {ADDR} Disconnecting")]);
        assert!(h.svc.sessions().is_empty());
        // Idempotent.
        assert!(h.svc.stop().await.unwrap());
    }
}
