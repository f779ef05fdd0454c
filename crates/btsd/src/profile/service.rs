//! Event-loop bound runtime for one profile.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Loop failures are mapped to `BtError::NotEnabled`

use std::sync::{Arc, Mutex, RwLock, Weak};

use bt_core::{
    AudioState, BtAddress, BtError, BtResult, CallbackList, Cookie, Message, ProfileId,
    RemoteIdentity,
};
use tracing::{debug, error, info, trace, warn};

use super::{lock, policy_for, read, write, ActivationPolicy, Env, ProfileRuntime, Scheduler};
use crate::config::ProfileConfig;
use crate::event_loop::{LoopError, LoopHandle};
use crate::session::{DeviceSession, SessionInfo, SessionRegistry};

impl From<LoopError> for BtError {
    fn from(_: LoopError) -> Self {
        BtError::NotEnabled
    }
}

/// State owned by a started runtime. Created by startup, dropped by
/// shutdown.
pub struct RuntimeState<P: ProfileRuntime> {
    sessions: Mutex<SessionRegistry<P::Session>>,
    callbacks: Mutex<CallbackList<P::Callbacks>>,
}

impl<P: ProfileRuntime> RuntimeState<P> {
    fn new(config: &ProfileConfig, max_callbacks: usize) -> Self {
        Self {
            sessions: Mutex::new(SessionRegistry::new(config.max_connections)),
            callbacks: Mutex::new(CallbackList::new(max_callbacks)),
        }
    }
}

struct ServiceInner<P: ProfileRuntime> {
    config: ProfileConfig,
    max_callbacks: usize,
    loop_handle: LoopHandle,
    stack: Arc<P::Stack>,
    policy: Box<dyn ActivationPolicy>,
    scheduler: Scheduler<P::Event>,
    runtime: RwLock<Option<Arc<RuntimeState<P>>>>,
}

/// Handle on one profile runtime. Cheap to clone.
///
/// Lifecycle changes and message handling run on the event loop; the
/// query and precondition helpers read the registry from any thread.
pub struct ProfileService<P: ProfileRuntime> {
    inner: Arc<ServiceInner<P>>,
}

impl<P: ProfileRuntime> Clone for ProfileService<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: ProfileRuntime> ProfileService<P> {
    pub fn new(
        loop_handle: LoopHandle,
        config: ProfileConfig,
        max_callbacks: usize,
        stack: Arc<P::Stack>,
    ) -> Self {
        let policy = policy_for(config.active_device);
        Self::with_policy(loop_handle, config, max_callbacks, stack, policy)
    }

    pub fn with_policy(
        loop_handle: LoopHandle,
        config: ProfileConfig,
        max_callbacks: usize,
        stack: Arc<P::Stack>,
        policy: Box<dyn ActivationPolicy>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<ServiceInner<P>>| {
            let weak = weak.clone();
            let sink = Arc::new(move |msg: Message<P::Event>| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_message(msg, false);
                }
            });
            ServiceInner {
                config,
                max_callbacks,
                scheduler: Scheduler::new(loop_handle.clone(), sink),
                loop_handle,
                stack,
                policy,
                runtime: RwLock::new(None),
            }
        });
        Self { inner }
    }

    pub fn id(&self) -> ProfileId {
        P::ID
    }

    pub fn config(&self) -> &ProfileConfig {
        &self.inner.config
    }

    pub fn loop_handle(&self) -> &LoopHandle {
        &self.inner.loop_handle
    }

    pub fn stack(&self) -> &Arc<P::Stack> {
        &self.inner.stack
    }

    pub fn is_started(&self) -> bool {
        read(&self.inner.runtime).is_some()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Posts startup; `on_done` runs on the loop with the outcome.
    pub fn startup<F>(&self, on_done: F) -> Result<(), LoopError>
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        self.inner.loop_handle.post(move || on_done(inner.startup()))
    }

    pub async fn start(&self) -> Result<bool, LoopError> {
        let inner = Arc::clone(&self.inner);
        self.inner.loop_handle.call(move || inner.startup()).await
    }

    /// Posts shutdown; `on_done` runs on the loop with the outcome.
    pub fn shutdown<F>(&self, on_done: F) -> Result<(), LoopError>
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        self.inner.loop_handle.post(move || on_done(inner.shutdown()))
    }

    pub async fn stop(&self) -> Result<bool, LoopError> {
        let inner = Arc::clone(&self.inner);
        self.inner.loop_handle.call(move || inner.shutdown()).await
    }

    // ------------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------------

    /// Queues a message for the loop.
    ///
    /// # Errors
    ///
    /// `BtError::NotEnabled` if the runtime is stopped or the loop is gone.
    pub fn post(&self, msg: Message<P::Event>) -> BtResult<()> {
        if !self.is_started() {
            return Err(BtError::NotEnabled);
        }
        trace!(profile = %P::ID, addr = %msg.address, event = msg.name(), "Posting message");
        let inner = Arc::clone(&self.inner);
        self.inner.loop_handle.post(move || inner.handle_message(msg, false))?;
        Ok(())
    }

    /// Like [`post_checked`](Self::post_checked), but also reserves a
    /// connection slot under the same lock as `check`. The slot is held
    /// until the loop consumes the message, so queued connects count
    /// toward the ceiling.
    pub fn post_reserved(
        &self,
        addr: BtAddress,
        event: P::Event,
        check: impl FnOnce(&SessionRegistry<P::Session>) -> BtResult<()>,
    ) -> BtResult<()> {
        let state = self.inner.state().ok_or(BtError::NotEnabled)?;
        {
            let mut sessions = lock(&state.sessions);
            check(&sessions)?;
            sessions.reserve();
        }

        let msg = Message::new(addr, event);
        trace!(profile = %P::ID, addr = %addr, event = msg.name(), "Posting reserved message");
        let inner = Arc::clone(&self.inner);
        if let Err(e) = self.inner.loop_handle.post(move || inner.handle_message(msg, true)) {
            lock(&state.sessions).release_reservation();
            return Err(e.into());
        }
        Ok(())
    }

    /// Runs `check` against the cached session state, then posts `event`
    /// for `addr` if it passed. Nothing is posted on failure.
    pub fn post_checked(
        &self,
        addr: BtAddress,
        event: P::Event,
        check: impl FnOnce(&SessionRegistry<P::Session>) -> BtResult<()>,
    ) -> BtResult<()> {
        self.with_sessions(check)??;
        self.post(Message::new(addr, event))
    }

    /// Reads the registry under its lock.
    ///
    /// # Errors
    ///
    /// `BtError::NotEnabled` if the runtime is stopped.
    pub fn with_sessions<R>(&self, f: impl FnOnce(&SessionRegistry<P::Session>) -> R) -> BtResult<R> {
        let state = self.inner.state().ok_or(BtError::NotEnabled)?;
        let sessions = lock(&state.sessions);
        Ok(f(&sessions))
    }

    // ------------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------------

    pub fn register(
        &self,
        callbacks: Arc<P::Callbacks>,
        remote: Option<RemoteIdentity>,
    ) -> BtResult<Cookie> {
        let state = self.inner.state().ok_or(BtError::NotEnabled)?;
        let mut list = lock(&state.callbacks);
        list.prune_dead();
        let cookie = list.register(callbacks, remote)?;
        info!(profile = %P::ID, cookie = %cookie, "Callbacks registered");
        Ok(cookie)
    }

    pub fn unregister(&self, cookie: Cookie) -> BtResult<()> {
        let state = self.inner.state().ok_or(BtError::NotEnabled)?;
        lock(&state.callbacks).unregister(cookie)?;
        info!(profile = %P::ID, cookie = %cookie, "Callbacks unregistered");
        Ok(())
    }

    /// Drops every registration made for a remote peer.
    pub fn unregister_remote(&self, remote_id: u64) -> usize {
        match self.inner.state() {
            Some(state) => lock(&state.callbacks).unregister_remote(remote_id),
            None => 0,
        }
    }

    pub fn callback_count(&self) -> usize {
        self.inner
            .state()
            .map_or(0, |state| lock(&state.callbacks).len())
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    /// Ordered session snapshots, active device first. Empty when stopped.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.with_sessions(|s| s.snapshot()).unwrap_or_default()
    }

    pub fn active_device(&self) -> Option<BtAddress> {
        self.with_sessions(|s| s.front().map(DeviceSession::address))
            .ok()
            .flatten()
    }

    /// Makes `addr` the active device.
    ///
    /// # Errors
    ///
    /// - `BtError::NotEnabled` if the runtime is stopped
    /// - `BtError::NotFound` if no session exists for `addr`
    pub async fn set_active_device(&self, addr: BtAddress) -> BtResult<()> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .loop_handle
            .call(move || {
                let state = inner.state().ok_or(BtError::NotEnabled)?;
                let moved = lock(&state.sessions).move_to_front(addr);
                if moved {
                    info!(profile = %P::ID, addr = %addr, "Active device set");
                    Ok(())
                } else {
                    Err(BtError::NotFound)
                }
            })
            .await?
    }

    /// Tears down and drops the session for `addr`.
    ///
    /// # Errors
    ///
    /// - `BtError::NotEnabled` if the runtime is stopped
    /// - `BtError::NotFound` if no session exists for `addr`
    pub async fn remove(&self, addr: BtAddress) -> BtResult<()> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .loop_handle
            .call(move || inner.remove_session(addr))
            .await?
    }
}

// ============================================================================
// Loop-side implementation
// ============================================================================

impl<P: ProfileRuntime> ServiceInner<P> {
    fn state(&self) -> Option<Arc<RuntimeState<P>>> {
        read(&self.runtime).clone()
    }

    fn startup(&self) -> bool {
        if read(&self.runtime).is_some() {
            debug!(profile = %P::ID, "Already started");
            return true;
        }
        if !self.config.enabled {
            warn!(profile = %P::ID, "Profile disabled by configuration");
            return false;
        }
        if let Err(e) = P::init_stack(&self.stack, &self.config) {
            error!(profile = %P::ID, error = %e, "Stack init failed");
            return false;
        }

        *write(&self.runtime) = Some(Arc::new(RuntimeState::new(&self.config, self.max_callbacks)));
        info!(
            profile = %P::ID,
            max_connections = self.config.max_connections,
            "Profile started"
        );
        true
    }

    fn shutdown(&self) -> bool {
        let Some(state) = write(&self.runtime).take() else {
            debug!(profile = %P::ID, "Already stopped");
            return true;
        };

        let drained = lock(&state.sessions).drain();
        let count = drained.len();
        let mut notes = Vec::new();
        {
            let mut env = Env::new(&*self.stack, &self.config, &self.scheduler, &mut notes);
            for mut session in drained {
                P::teardown(&mut session, &mut env);
            }
        }
        deliver::<P>(&state, notes);

        lock(&state.callbacks).clear();
        P::cleanup_stack(&self.stack);
        info!(profile = %P::ID, sessions = count, "Profile stopped");
        true
    }

    fn remove_session(&self, addr: BtAddress) -> BtResult<()> {
        let state = self.state().ok_or(BtError::NotEnabled)?;
        let mut session = lock(&state.sessions).remove(addr).ok_or(BtError::NotFound)?;

        let mut notes = Vec::new();
        {
            let mut env = Env::new(&*self.stack, &self.config, &self.scheduler, &mut notes);
            P::teardown(&mut session, &mut env);
        }
        deliver::<P>(&state, notes);
        Ok(())
    }

    /// `reserved` is set for messages admitted through `post_reserved`;
    /// their slot is released under the lock that dispatches them.
    fn handle_message(&self, msg: Message<P::Event>, reserved: bool) {
        let Some(state) = self.state() else {
            debug!(profile = %P::ID, event = msg.name(), "Runtime stopped, message dropped");
            return;
        };

        let mut notes = Vec::new();
        {
            let mut sessions = lock(&state.sessions);
            if reserved {
                sessions.release_reservation();
            }
            let mut env = Env::new(&*self.stack, &self.config, &self.scheduler, &mut notes);

            if msg.is_broadcast() {
                debug!(profile = %P::ID, event = msg.name(), sessions = sessions.len(), "Broadcast");
                let event = msg.event;
                sessions.for_each(|session| P::dispatch(session, &mut env, event.clone()));
            } else {
                let addr = msg.address;
                let config = &self.config;
                if sessions
                    .find_or_create(addr, || P::new_session(addr, config))
                    .is_none()
                {
                    warn!(profile = %P::ID, addr = %addr, "No session for message");
                    return;
                }
                let activate = self.policy.should_activate(&msg.event);
                if let Some(session) = sessions.find_mut(addr) {
                    debug!(profile = %P::ID, addr = %addr, event = msg.name(), "Dispatch");
                    P::dispatch(session, &mut env, msg.event);
                }
                // Promote only a session that actually reached audio.
                let audio_on = sessions
                    .find(addr)
                    .is_some_and(|s| s.audio_state() == AudioState::Connected);
                if activate && audio_on && sessions.move_to_front(addr) {
                    debug!(profile = %P::ID, addr = %addr, "Session activated");
                }
            }
        }
        deliver::<P>(&state, notes);
    }
}

/// Fans queued notifications out to a snapshot of the live listeners.
fn deliver<P: ProfileRuntime>(state: &RuntimeState<P>, notes: Vec<P::Notification>) {
    if notes.is_empty() {
        return;
    }
    let listeners = lock(&state.callbacks).snapshot();
    for note in &notes {
        trace!(profile = %P::ID, note = ?note, listeners = listeners.len(), "Notify");
        for cb in &listeners {
            P::deliver(note, cb);
        }
    }
}
