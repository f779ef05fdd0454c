//! Hands-free unit (HF) runtime.

mod event;
mod machine;
mod service;
mod stack;

use bt_core::{BtAddress, BtResult, HfNotification, HfpHfCallbacks, ProfileConnectionState, ProfileId};

use crate::config::ProfileConfig;
use crate::profile::{Env, ProfileRuntime};
use crate::session::DeviceSession;

pub use event::HfEvent;
pub use machine::{HfSession, HfState};
pub use service::HfService;
pub use stack::{at_cmd, HfStack, NullHfStack, RecordingHfStack};

#[derive(Debug)]
pub struct HfProfile;

impl ProfileRuntime for HfProfile {
    const ID: ProfileId = ProfileId::HfpHf;

    type Event = HfEvent;
    type Session = HfSession;
    type Callbacks = dyn HfpHfCallbacks;
    type Notification = HfNotification;
    type Stack = dyn HfStack;

    fn new_session(addr: BtAddress, _config: &ProfileConfig) -> HfSession {
        HfSession::new(addr)
    }

    fn dispatch(session: &mut HfSession, env: &mut Env<'_, Self>, event: HfEvent) {
        session.handle(env, event);
    }

    fn disconnect_event() -> HfEvent {
        HfEvent::Disconnect
    }

    fn teardown(session: &mut HfSession, env: &mut Env<'_, Self>) {
        if session.connection_state() != ProfileConnectionState::Disconnected {
            session.handle(env, HfEvent::Disconnect);
        }
        session.release();
    }

    fn deliver(note: &HfNotification, callbacks: &dyn HfpHfCallbacks) {
        note.deliver(callbacks);
    }

    fn init_stack(stack: &dyn HfStack, config: &ProfileConfig) -> BtResult<()> {
        stack.init(config.features, config.max_connections)
    }

    fn cleanup_stack(stack: &dyn HfStack) {
        stack.cleanup();
    }
}
