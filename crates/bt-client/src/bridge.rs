//! Local listener fan-out over one remote registration.
//!
//! A process registers with the service at most once per profile. Every
//! local listener lives in a [`CallbackList`] on this side of the
//! transport; the bridge sends `RegisterCallback` when the first local
//! listener arrives and `UnregisterCallback` when the last one leaves.
//! Pushes received in between are delivered to every local listener in
//! registration order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bt_core::{
    BtError, BtResult, CallbackList, Cookie, HfpAgCallbacks, HfpHfCallbacks, ProfileId,
    DEFAULT_MAX_REGISTRATIONS,
};
use bt_protocol::{AgRequest, HfRequest, Push, Request};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::transport::Transport;

/// A listener type that can receive pushes for one profile.
pub trait PushListener: Send + Sync + 'static {
    const PROFILE: ProfileId;

    fn register_request() -> Request;

    fn unregister_request() -> Request;

    /// Invokes the listener method matching `push`. Pushes for other
    /// profiles are ignored.
    fn deliver(push: &Push, listener: &Self);
}

impl PushListener for dyn HfpAgCallbacks {
    const PROFILE: ProfileId = ProfileId::HfpAg;

    fn register_request() -> Request {
        Request::Ag(AgRequest::RegisterCallback)
    }

    fn unregister_request() -> Request {
        Request::Ag(AgRequest::UnregisterCallback)
    }

    fn deliver(push: &Push, listener: &Self) {
        if let Push::Ag(note) = push {
            note.deliver(listener);
        }
    }
}

impl PushListener for dyn HfpHfCallbacks {
    const PROFILE: ProfileId = ProfileId::HfpHf;

    fn register_request() -> Request {
        Request::Hf(HfRequest::RegisterCallback)
    }

    fn unregister_request() -> Request {
        Request::Hf(HfRequest::UnregisterCallback)
    }

    fn deliver(push: &Push, listener: &Self) {
        if let Push::Hf(note) = push {
            note.deliver(listener);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct CallbackBridge<C: PushListener + ?Sized> {
    transport: Arc<dyn Transport>,
    listeners: Arc<Mutex<CallbackList<C>>>,
    /// True while the service holds this side's registration. Also
    /// serializes register/unregister so the remote registration follows
    /// the local count.
    remote_open: tokio::sync::Mutex<bool>,
    dispatcher: JoinHandle<()>,
}

impl<C: PushListener + ?Sized> CallbackBridge<C> {
    /// Subscribes to the transport's pushes. Must be called inside a tokio
    /// runtime.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_capacity(transport, DEFAULT_MAX_REGISTRATIONS)
    }

    pub fn with_capacity(transport: Arc<dyn Transport>, max_listeners: usize) -> Self {
        let listeners = Arc::new(Mutex::new(CallbackList::new(max_listeners)));
        let pushes = transport.subscribe();
        let dispatcher = tokio::spawn(dispatch(pushes, Arc::clone(&listeners)));

        Self {
            transport,
            listeners,
            remote_open: tokio::sync::Mutex::new(false),
            dispatcher,
        }
    }

    pub async fn register(&self, listener: Arc<C>) -> BtResult<Cookie> {
        let mut remote_open = self.remote_open.lock().await;

        let opened_here = !*remote_open;
        if opened_here {
            self.transport
                .call(C::register_request())
                .await?
                .into_status()?;
            *remote_open = true;
            debug!(profile = %C::PROFILE, "Remote registration opened");
        }

        let result = lock(&self.listeners).register(listener, None);
        if result.is_err() && opened_here && self.close_remote().await.is_ok() {
            *remote_open = false;
        }
        result
    }

    /// Drops the local listener. When it was the last one the remote
    /// registration is closed too; if that fails the registration stays
    /// open and is reused by the next `register`.
    pub async fn unregister(&self, cookie: Cookie) -> BtResult<()> {
        let mut remote_open = self.remote_open.lock().await;

        let remaining = {
            let mut listeners = lock(&self.listeners);
            listeners.unregister(cookie)?;
            listeners.len()
        };

        if remaining == 0 && *remote_open {
            self.close_remote().await?;
            *remote_open = false;
            debug!(profile = %C::PROFILE, "Remote registration closed");
        }
        Ok(())
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    async fn close_remote(&self) -> BtResult<()> {
        let result = match self.transport.call(C::unregister_request()).await {
            Ok(reply) => reply.into_status(),
            Err(e) => Err(BtError::from(e)),
        };
        if let Err(e) = &result {
            debug!(profile = %C::PROFILE, error = %e, "Closing remote registration failed");
        }
        result
    }
}

impl<C: PushListener + ?Sized> Drop for CallbackBridge<C> {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

async fn dispatch<C: PushListener + ?Sized>(
    mut pushes: tokio::sync::broadcast::Receiver<Push>,
    listeners: Arc<Mutex<CallbackList<C>>>,
) {
    loop {
        match pushes.recv().await {
            Ok(push) => {
                if push.profile() != C::PROFILE {
                    continue;
                }
                // Listeners run without the lock so they may unregister.
                let snapshot = lock(&listeners).snapshot();
                for listener in snapshot {
                    C::deliver(&push, &listener);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(profile = %C::PROFILE, skipped, "Listener dispatch lagged, pushes dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
