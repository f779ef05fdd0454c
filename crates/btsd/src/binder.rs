//! Binder backend: parcel transactions against the profile services.
//!
//! Each profile is exposed as a [`BinderStub`]. The transaction code is the
//! request opcode; the reply parcel carries the i32 status followed by the
//! typed result.
//!
//! Registration carries the caller's callback object. The stub keeps only
//! a weak reference to it: every push promotes the reference first, and a
//! failed promotion marks the listener dead. Dead listeners are skipped
//! and swept from the table on the next registration.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Malformed parcels surface as `TransactError`, never as a panic

use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use bt_core::{BtError, BtResult, Cookie, HfpAgCallbacks, HfpHfCallbacks, RemoteAnchor};
use bt_protocol::{
    ag, hf, AgRequest, Binder, HfRequest, Parcel, ParcelError, ParcelReader, Push, Reply,
    TransactError,
};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::forward::{PushForwarder, PushSink};
use crate::manager::{ProfileManager, RemoteIds};
use crate::profile::{lock, ProfileRuntime, ProfileService};
use crate::profiles::ag::AgProfile;
use crate::profiles::hf::HfProfile;

// ============================================================================
// Profile binding
// ============================================================================

/// What a profile needs to be served over binder.
pub trait BinderProfile: ProfileRuntime {
    type Request: Send + 'static;

    fn decode(code: u32, r: &mut ParcelReader<'_>) -> Option<Result<Self::Request, ParcelError>>;

    fn is_register(request: &Self::Request) -> bool;

    fn is_unregister(request: &Self::Request) -> bool;

    fn execute(service: &ProfileService<Self>, request: Self::Request) -> Reply;

    fn listener(forwarder: Arc<PushForwarder<BinderSink>>) -> Arc<Self::Callbacks>;
}

impl BinderProfile for AgProfile {
    type Request = AgRequest;

    fn decode(code: u32, r: &mut ParcelReader<'_>) -> Option<Result<AgRequest, ParcelError>> {
        AgRequest::read_parcel(code, r)
    }

    fn is_register(request: &AgRequest) -> bool {
        matches!(request, AgRequest::RegisterCallback)
    }

    fn is_unregister(request: &AgRequest) -> bool {
        matches!(request, AgRequest::UnregisterCallback)
    }

    fn execute(service: &ProfileService<Self>, request: AgRequest) -> Reply {
        service.execute(request)
    }

    fn listener(forwarder: Arc<PushForwarder<BinderSink>>) -> Arc<dyn HfpAgCallbacks> {
        forwarder
    }
}

impl BinderProfile for HfProfile {
    type Request = HfRequest;

    fn decode(code: u32, r: &mut ParcelReader<'_>) -> Option<Result<HfRequest, ParcelError>> {
        HfRequest::read_parcel(code, r)
    }

    fn is_register(request: &HfRequest) -> bool {
        matches!(request, HfRequest::RegisterCallback)
    }

    fn is_unregister(request: &HfRequest) -> bool {
        matches!(request, HfRequest::UnregisterCallback)
    }

    fn execute(service: &ProfileService<Self>, request: HfRequest) -> Reply {
        service.execute(request)
    }

    fn listener(forwarder: Arc<PushForwarder<BinderSink>>) -> Arc<dyn HfpHfCallbacks> {
        forwarder
    }
}

// ============================================================================
// Callback sink
// ============================================================================

/// Queues pushes for one remote callback object.
///
/// A forwarding task drains the queue in order and transacts each push on
/// the callback object, promoting its weak reference every time.
pub struct BinderSink {
    tx: mpsc::UnboundedSender<Push>,
}

impl BinderSink {
    /// Spawns the forwarding task for `callback`. Must run inside a runtime.
    pub fn spawn(callback: Weak<dyn Binder>, remote_id: u64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(forward_pushes(rx, callback, remote_id));
        Self { tx }
    }
}

impl PushSink for BinderSink {
    fn push(&self, push: Push) {
        if self.tx.send(push).is_err() {
            trace!("Binder push dropped, forwarder gone");
        }
    }
}

async fn forward_pushes(
    mut rx: mpsc::UnboundedReceiver<Push>,
    callback: Weak<dyn Binder>,
    remote_id: u64,
) {
    while let Some(push) = rx.recv().await {
        let Some(binder) = callback.upgrade() else {
            debug!(remote_id, "Callback object died, skipping push");
            continue;
        };

        let code = push.code();
        let mut parcel = Parcel::new();
        match &push {
            Push::Ag(note) => ag::write_push(note, &mut parcel),
            Push::Hf(note) => hf::write_push(note, &mut parcel),
        }

        if let Err(e) = binder.transact(code, &parcel).await {
            debug!(remote_id, code, error = %e, "Callback transaction failed");
        }
    }
    trace!(remote_id, "Binder forwarder finished");
}

// ============================================================================
// Stub
// ============================================================================

struct RemoteListener {
    callback: Weak<dyn Binder>,
    cookie: Cookie,
    /// Keeps the registration's remote identity alive.
    anchor: RemoteAnchor,
}

impl RemoteListener {
    fn is_alive(&self) -> bool {
        self.callback.strong_count() > 0
    }

    fn is(&self, callback: &Arc<dyn Binder>) -> bool {
        std::ptr::eq(
            self.callback.as_ptr() as *const (),
            Arc::as_ptr(callback) as *const (),
        )
    }
}

/// Binder endpoint for one profile service.
pub struct BinderStub<P: BinderProfile> {
    service: ProfileService<P>,
    remote_ids: RemoteIds,
    listeners: Mutex<Vec<RemoteListener>>,
}

pub type AgBinderStub = BinderStub<AgProfile>;
pub type HfBinderStub = BinderStub<HfProfile>;

impl<P: BinderProfile> BinderStub<P> {
    pub fn new(service: ProfileService<P>, remote_ids: RemoteIds) -> Self {
        Self {
            service,
            remote_ids,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Registers a remote callback object.
    ///
    /// # Errors
    ///
    /// - `BtError::ServiceNotFound` if the profile is not running
    /// - `BtError::Busy` if `callback` is already registered
    /// - `BtError::NoResources` if the listener table is full
    fn register(&self, callback: Arc<dyn Binder>) -> BtResult<()> {
        if !self.service.is_started() {
            return Err(BtError::ServiceNotFound);
        }

        let mut listeners = lock(&self.listeners);
        self.sweep_dead(&mut listeners);
        if listeners.iter().any(|l| l.is(&callback)) {
            return Err(BtError::Busy);
        }

        let anchor = RemoteAnchor::new(self.remote_ids.next());
        let weak = Arc::downgrade(&callback);
        let forwarder = Arc::new(PushForwarder::new(BinderSink::spawn(
            weak.clone(),
            anchor.id(),
        )));
        let cookie = self
            .service
            .register(P::listener(forwarder), Some(anchor.identity()))?;

        info!(profile = %P::ID, remote_id = anchor.id(), cookie = %cookie, "Binder listener registered");
        listeners.push(RemoteListener {
            callback: weak,
            cookie,
            anchor,
        });
        Ok(())
    }

    /// # Errors
    ///
    /// `BtError::NotFound` if `callback` holds no registration.
    fn unregister(&self, callback: &Arc<dyn Binder>) -> BtResult<()> {
        let listener = {
            let mut listeners = lock(&self.listeners);
            let position = listeners
                .iter()
                .position(|l| l.is(callback))
                .ok_or(BtError::NotFound)?;
            listeners.swap_remove(position)
        };

        let RemoteListener { cookie, anchor, .. } = listener;
        drop(anchor);
        self.service.unregister(cookie)
    }

    fn sweep_dead(&self, listeners: &mut Vec<RemoteListener>) {
        listeners.retain(|l| {
            if l.is_alive() {
                return true;
            }
            debug!(profile = %P::ID, remote_id = l.anchor.id(), "Sweeping dead binder listener");
            if let Err(e) = self.service.unregister(l.cookie) {
                trace!(error = %e, "Dead listener already unregistered");
            }
            false
        });
    }

    async fn execute(&self, request: P::Request) -> Reply {
        let service = self.service.clone();
        self.service
            .loop_handle()
            .call(move || P::execute(&service, request))
            .await
            .unwrap_or_else(|e| Reply::error(BtError::from(e)))
    }
}

#[async_trait]
impl<P: BinderProfile> Binder for BinderStub<P> {
    async fn transact(&self, code: u32, data: &Parcel) -> Result<Parcel, TransactError> {
        let mut reader = data.reader();
        let request = P::decode(code, &mut reader).ok_or(TransactError::UnknownCode(code))??;

        let reply = if P::is_register(&request) {
            Reply::from_status(self.register(reader.read_binder()?))
        } else if P::is_unregister(&request) {
            Reply::from_status(self.unregister(&reader.read_binder()?))
        } else {
            self.execute(request).await
        };

        let mut parcel = Parcel::new();
        reply.write_parcel(&mut parcel);
        Ok(parcel)
    }
}

/// Both binder endpoints of one daemon.
pub struct BinderHost {
    pub ag: Arc<AgBinderStub>,
    pub hf: Arc<HfBinderStub>,
}

impl BinderHost {
    pub fn new(manager: &ProfileManager) -> Self {
        Self {
            ag: Arc::new(BinderStub::new(manager.ag().clone(), manager.remote_ids().clone())),
            hf: Arc::new(BinderStub::new(manager.hf().clone(), manager.remote_ids().clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::event_loop::{EventLoop, LoopHandle};
    use crate::profiles::ag::RecordingAgStack;
    use crate::profiles::hf::RecordingHfStack;
    use bt_protocol::ReplyKind;

    struct NullCallback;

    #[async_trait]
    impl Binder for NullCallback {
        async fn transact(&self, _code: u32, _data: &Parcel) -> Result<Parcel, TransactError> {
            Ok(Parcel::new())
        }
    }

    async fn host() -> (BinderHost, ProfileManager, LoopHandle) {
        let (handle, _task) = EventLoop::spawn();
        let manager = ProfileManager::new(
            handle.clone(),
            &ServiceConfig::default(),
            Arc::new(RecordingAgStack::default()),
            Arc::new(RecordingHfStack::default()),
        );
        manager.start_all().await.unwrap();
        (BinderHost::new(&manager), manager, handle)
    }

    async fn status(stub: &dyn Binder, code: u32, data: &Parcel) -> i32 {
        let reply = stub.transact(code, data).await.unwrap();
        Reply::read_parcel(ReplyKind::Status, &mut reply.reader())
            .unwrap()
            .status()
    }

    fn with_binder(callback: &Arc<dyn Binder>) -> Parcel {
        let mut p = Parcel::new();
        p.write_binder(Arc::clone(callback));
        p
    }

    #[tokio::test]
    async fn test_unknown_code() {
        let (host, _manager, _handle) = host().await;
        let err = host.ag.transact(0x7777, &Parcel::new()).await.unwrap_err();
        assert_eq!(err, TransactError::UnknownCode(0x7777));
    }

    #[tokio::test]
    async fn test_malformed_parcel() {
        let (host, _manager, _handle) = host().await;
        let mut p = Parcel::new();
        p.write_str("not an address");
        let err = host.hf.transact(hf::opcode::CONNECT, &p).await.unwrap_err();
        assert!(matches!(err, TransactError::Parcel(ParcelError::TypeMismatch { .. })));
    }

    #[tokio::test]
    async fn test_register_twice_is_busy_then_unregister() {
        let (host, manager, _handle) = host().await;
        let callback: Arc<dyn Binder> = Arc::new(NullCallback);
        let p = with_binder(&callback);

        assert_eq!(status(host.ag.as_ref(), ag::opcode::REGISTER_CALLBACK, &p).await, 0);
        assert_eq!(
            status(host.ag.as_ref(), ag::opcode::REGISTER_CALLBACK, &p).await,
            BtError::Busy.code()
        );
        assert_eq!(manager.ag().callback_count(), 1);

        assert_eq!(status(host.ag.as_ref(), ag::opcode::UNREGISTER_CALLBACK, &p).await, 0);
        assert_eq!(
            status(host.ag.as_ref(), ag::opcode::UNREGISTER_CALLBACK, &p).await,
            BtError::NotFound.code()
        );
        assert_eq!(manager.ag().callback_count(), 0);
    }

    #[tokio::test]
    async fn test_dead_callback_is_swept() {
        let (host, manager, _handle) = host().await;
        let first: Arc<dyn Binder> = Arc::new(NullCallback);
        assert_eq!(
            status(host.hf.as_ref(), hf::opcode::REGISTER_CALLBACK, &with_binder(&first)).await,
            0
        );
        drop(first);

        let second: Arc<dyn Binder> = Arc::new(NullCallback);
        assert_eq!(
            status(host.hf.as_ref(), hf::opcode::REGISTER_CALLBACK, &with_binder(&second)).await,
            0
        );
        assert_eq!(host.hf.listener_count(), 1);
        assert_eq!(manager.hf().callback_count(), 1);
    }

    #[tokio::test]
    async fn test_stopped_profile_is_service_not_found() {
        let (host, manager, _handle) = host().await;
        manager.ag().stop().await.unwrap();
        let callback: Arc<dyn Binder> = Arc::new(NullCallback);

        assert_eq!(
            status(host.ag.as_ref(), ag::opcode::REGISTER_CALLBACK, &with_binder(&callback)).await,
            BtError::ServiceNotFound.code()
        );
    }
}
