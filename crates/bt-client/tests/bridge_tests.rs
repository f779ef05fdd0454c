//! Proxy and callback bridge behavior over a scripted transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bt_client::{AgProxy, ClientError, HfProxy, Transport};
use bt_core::{
    AudioState, BtAddress, BtError, HfNotification, HfpAg, HfpAgCallbacks, HfpHf, HfpHfCallbacks,
    ProfileConnectionState,
};
use bt_protocol::{AgRequest, HfRequest, Push, Reply, Request};
use tokio::sync::broadcast;

/// Records every request and answers `Ok` unless told otherwise.
struct FakeTransport {
    requests: Mutex<Vec<Request>>,
    replies: Mutex<Vec<Reply>>,
    fail: Mutex<bool>,
    pushes: broadcast::Sender<Push>,
}

impl FakeTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            fail: Mutex::new(false),
            pushes: broadcast::channel(16).0,
        })
    }

    fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    fn queue_reply(&self, reply: Reply) {
        self.replies.lock().unwrap().push(reply);
    }

    fn push(&self, push: Push) {
        self.pushes.send(push).unwrap();
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn call(&self, request: Request) -> bt_client::Result<Reply> {
        if *self.fail.lock().unwrap() {
            return Err(ClientError::ConnectionClosed);
        }
        self.requests.lock().unwrap().push(request);
        let queued = self.replies.lock().unwrap().pop();
        Ok(queued.unwrap_or_else(Reply::ok))
    }

    fn subscribe(&self) -> broadcast::Receiver<Push> {
        self.pushes.subscribe()
    }

    fn is_connected(&self) -> bool {
        !*self.fail.lock().unwrap()
    }
}

#[derive(Default)]
struct RecordingHf {
    audio: Mutex<Vec<(BtAddress, AudioState)>>,
}

impl HfpHfCallbacks for RecordingHf {
    fn on_audio_state_changed(&self, addr: BtAddress, state: AudioState) {
        self.audio.lock().unwrap().push((addr, state));
    }
}

struct SilentAg;

impl HfpAgCallbacks for SilentAg {}

fn addr() -> BtAddress {
    "00:11:22:33:44:55".parse().unwrap()
}

fn count(requests: &[Request], wanted: &Request) -> usize {
    requests.iter().filter(|r| *r == wanted).count()
}

#[tokio::test]
async fn test_remote_unregister_waits_for_last_local_listener() {
    let transport = FakeTransport::new();
    let proxy = HfProxy::new(transport.clone());

    let first = proxy
        .register_callbacks(Arc::new(RecordingHf::default()))
        .await
        .unwrap();
    let second = proxy
        .register_callbacks(Arc::new(RecordingHf::default()))
        .await
        .unwrap();

    let register = Request::Hf(HfRequest::RegisterCallback);
    let unregister = Request::Hf(HfRequest::UnregisterCallback);

    assert_eq!(count(&transport.requests(), &register), 1);
    assert_eq!(proxy.listener_count(), 2);

    proxy.unregister_callbacks(first).await.unwrap();
    assert_eq!(count(&transport.requests(), &unregister), 0);

    proxy.unregister_callbacks(second).await.unwrap();
    assert_eq!(count(&transport.requests(), &unregister), 1);
    assert_eq!(proxy.listener_count(), 0);
}

#[tokio::test]
async fn test_failed_remote_unregister_keeps_registration_for_reuse() {
    let transport = FakeTransport::new();
    let proxy = HfProxy::new(transport.clone());
    let register = Request::Hf(HfRequest::RegisterCallback);
    let unregister = Request::Hf(HfRequest::UnregisterCallback);

    let cookie = proxy
        .register_callbacks(Arc::new(RecordingHf::default()))
        .await
        .unwrap();
    transport.queue_reply(Reply::error(BtError::IpcError));
    assert_eq!(
        proxy.unregister_callbacks(cookie).await.unwrap_err(),
        BtError::IpcError
    );
    assert_eq!(proxy.listener_count(), 0);

    // The service still holds the registration; it must not be opened twice.
    let cookie = proxy
        .register_callbacks(Arc::new(RecordingHf::default()))
        .await
        .unwrap();
    assert_eq!(count(&transport.requests(), &register), 1);

    proxy.unregister_callbacks(cookie).await.unwrap();
    assert_eq!(count(&transport.requests(), &unregister), 2);
    assert_eq!(proxy.listener_count(), 0);
}

#[tokio::test]
async fn test_unknown_cookie_is_not_found_locally() {
    let transport = FakeTransport::new();
    let proxy = AgProxy::new(transport.clone());

    let cookie = proxy.register_callbacks(Arc::new(SilentAg)).await.unwrap();
    proxy.unregister_callbacks(cookie).await.unwrap();

    let err = proxy.unregister_callbacks(cookie).await.unwrap_err();
    assert_eq!(err, BtError::NotFound);
    assert_eq!(
        count(&transport.requests(), &Request::Ag(AgRequest::UnregisterCallback)),
        1
    );
}

#[tokio::test]
async fn test_same_listener_twice_is_busy() {
    let transport = FakeTransport::new();
    let proxy = AgProxy::new(transport.clone());
    let listener: Arc<dyn HfpAgCallbacks> = Arc::new(SilentAg);

    proxy.register_callbacks(Arc::clone(&listener)).await.unwrap();
    let err = proxy.register_callbacks(listener).await.unwrap_err();
    assert_eq!(err, BtError::Busy);
    assert_eq!(proxy.listener_count(), 1);
}

#[tokio::test]
async fn test_service_refusal_leaves_no_local_listener() {
    let transport = FakeTransport::new();
    let proxy = HfProxy::new(transport.clone());
    transport.queue_reply(Reply::error(BtError::ServiceNotFound));

    let err = proxy
        .register_callbacks(Arc::new(RecordingHf::default()))
        .await
        .unwrap_err();
    assert_eq!(err, BtError::ServiceNotFound);
    assert_eq!(proxy.listener_count(), 0);
}

#[tokio::test]
async fn test_pushes_reach_local_listeners() {
    let transport = FakeTransport::new();
    let proxy = HfProxy::new(transport.clone());
    let listener = Arc::new(RecordingHf::default());
    proxy.register_callbacks(listener.clone()).await.unwrap();

    // An AG push must not reach HF listeners.
    transport.push(Push::Ag(bt_core::AgNotification::AnswerCall { addr: addr() }));
    transport.push(Push::Hf(HfNotification::AudioState {
        addr: addr(),
        state: AudioState::Connected,
    }));

    for _ in 0..50 {
        if !listener.audio.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        *listener.audio.lock().unwrap(),
        vec![(addr(), AudioState::Connected)]
    );
}

#[tokio::test]
async fn test_typed_replies_and_transport_failure() {
    let transport = FakeTransport::new();
    let proxy = HfProxy::new(transport.clone());

    transport.queue_reply(Reply::ConnectionState {
        state: ProfileConnectionState::Connected,
    });
    assert_eq!(
        proxy.get_connection_state(addr()).await.unwrap(),
        ProfileConnectionState::Connected
    );

    transport.queue_reply(Reply::Calls { calls: Vec::new() });
    assert!(proxy.query_current_calls(addr()).await.unwrap().is_empty());

    *transport.fail.lock().unwrap() = true;
    assert_eq!(proxy.connect(addr()).await.unwrap_err(), BtError::IpcError);
}

#[tokio::test]
async fn test_long_dial_number_is_truncated_before_sending() {
    let transport = FakeTransport::new();
    let proxy = HfProxy::new(transport.clone());

    let number = "5".repeat(80);
    proxy.dial(addr(), &number).await.unwrap();

    match transport.requests().last() {
        Some(Request::Hf(HfRequest::Dial { number, .. })) => assert!(number.len() < 80),
        other => panic!("unexpected request: {other:?}"),
    }
}
