//! Hands-free audio gateway (AG) runtime.

mod event;
mod machine;
mod service;
mod stack;

use bt_core::{AgNotification, BtAddress, BtResult, HfpAgCallbacks, ProfileId};

use crate::config::ProfileConfig;
use crate::profile::{Env, ProfileRuntime};
use crate::session::DeviceSession;

pub use event::AgEvent;
pub use machine::{AgSession, AgState, DIAL_OUT_TIMEOUT};
pub use service::AgService;
pub use stack::{at_result, AgStack, NullAgStack, RecordingAgStack};

/// Marker binding the AG vocabulary to the generic runtime.
#[derive(Debug)]
pub struct AgProfile;

impl ProfileRuntime for AgProfile {
    const ID: ProfileId = ProfileId::HfpAg;

    type Event = AgEvent;
    type Session = AgSession;
    type Callbacks = dyn HfpAgCallbacks;
    type Notification = AgNotification;
    type Stack = dyn AgStack;

    fn new_session(addr: BtAddress, _config: &ProfileConfig) -> AgSession {
        AgSession::new(addr)
    }

    fn dispatch(session: &mut AgSession, env: &mut Env<'_, Self>, event: AgEvent) {
        session.handle(env, event);
    }

    fn disconnect_event() -> AgEvent {
        AgEvent::Disconnect
    }

    fn teardown(session: &mut AgSession, env: &mut Env<'_, Self>) {
        if session.connection_state() != bt_core::ProfileConnectionState::Disconnected {
            session.handle(env, AgEvent::Disconnect);
        }
        session.release();
    }

    fn deliver(note: &AgNotification, callbacks: &dyn HfpAgCallbacks) {
        note.deliver(callbacks);
    }

    fn init_stack(stack: &dyn AgStack, config: &ProfileConfig) -> BtResult<()> {
        stack.init(config.features, config.max_connections)
    }

    fn cleanup_stack(stack: &dyn AgStack) {
        stack.cleanup();
    }
}
