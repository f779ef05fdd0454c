//! Generic profile runtime.
//!
//! A concrete profile implements [`ProfileRuntime`]: its event vocabulary,
//! its per-device session type, its listener table and its stack driver.
//! [`ProfileService`] binds that description to the event loop, the
//! session registry and the callback multiplexer.

mod policy;
mod service;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use bt_core::{BtAddress, BtResult, Message, ProfileEvent, ProfileId};
use tracing::warn;

use crate::config::ProfileConfig;
use crate::event_loop::{LoopHandle, TimerHandle};
use crate::session::DeviceSession;

pub use policy::{policy_for, ActivationPolicy, AudioConnectedPolicy, ManualPolicy};
pub use service::{ProfileService, RuntimeState};

/// Static description of one profile.
///
/// Implementors are marker types; every hook is an associated function so
/// the engine never holds profile state outside the sessions it owns.
pub trait ProfileRuntime: Send + Sync + Sized + 'static {
    const ID: ProfileId;

    type Event: ProfileEvent + Clone;
    type Session: DeviceSession;
    type Callbacks: ?Sized + Send + Sync + 'static;
    type Notification: fmt::Debug + Send + 'static;
    type Stack: ?Sized + Send + Sync + 'static;

    /// Builds the session for a newly seen address in its initial state.
    fn new_session(addr: BtAddress, config: &ProfileConfig) -> Self::Session;

    fn dispatch(session: &mut Self::Session, env: &mut Env<'_, Self>, event: Self::Event);

    /// The synthetic event that lets a session release driver resources.
    fn disconnect_event() -> Self::Event;

    /// Runs a session's teardown path before it is dropped.
    fn teardown(session: &mut Self::Session, env: &mut Env<'_, Self>) {
        Self::dispatch(session, env, Self::disconnect_event());
        session.release();
    }

    fn deliver(note: &Self::Notification, callbacks: &Self::Callbacks);

    fn init_stack(stack: &Self::Stack, config: &ProfileConfig) -> BtResult<()>;

    fn cleanup_stack(stack: &Self::Stack);
}

// ============================================================================
// Dispatch environment
// ============================================================================

/// Posts delayed messages back into a profile runtime.
pub struct Scheduler<E> {
    handle: LoopHandle,
    sink: Arc<dyn Fn(Message<E>) + Send + Sync>,
}

impl<E: ProfileEvent> Scheduler<E> {
    pub fn new(handle: LoopHandle, sink: Arc<dyn Fn(Message<E>) + Send + Sync>) -> Self {
        Self { handle, sink }
    }

    /// Delivers `msg` after `delay` unless the returned timer is cancelled.
    pub fn schedule(&self, delay: Duration, msg: Message<E>) -> Option<TimerHandle> {
        let sink = Arc::clone(&self.sink);
        let name = msg.name();
        match self.handle.post_after(delay, move || sink(msg)) {
            Ok(timer) => Some(timer),
            Err(e) => {
                warn!(event = name, error = %e, "Failed to arm timer");
                None
            }
        }
    }
}

/// What a session may touch while it handles one event.
///
/// Notifications are queued here and delivered once the registry lock is
/// released, so listeners can call back into the service.
pub struct Env<'a, P: ProfileRuntime> {
    stack: &'a P::Stack,
    config: &'a ProfileConfig,
    scheduler: &'a Scheduler<P::Event>,
    notes: &'a mut Vec<P::Notification>,
}

impl<'a, P: ProfileRuntime> Env<'a, P> {
    pub fn new(
        stack: &'a P::Stack,
        config: &'a ProfileConfig,
        scheduler: &'a Scheduler<P::Event>,
        notes: &'a mut Vec<P::Notification>,
    ) -> Self {
        Self {
            stack,
            config,
            scheduler,
            notes,
        }
    }

    pub fn stack(&self) -> &'a P::Stack {
        self.stack
    }

    pub fn config(&self) -> &'a ProfileConfig {
        self.config
    }

    pub fn notify(&mut self, note: P::Notification) {
        self.notes.push(note);
    }

    pub fn schedule(&self, delay: Duration, addr: BtAddress, event: P::Event) -> Option<TimerHandle> {
        self.scheduler.schedule(delay, Message::new(addr, event))
    }
}

// ============================================================================
// Lock helpers
// ============================================================================

// Poisoned locks are recovered. Guarded values are never left half-updated.

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}
