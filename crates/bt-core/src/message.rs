//! The unit of work consumed by a profile runtime.

use crate::address::BtAddress;

/// Behaviour every profile event vocabulary provides to the engine.
pub trait ProfileEvent: std::fmt::Debug + Send + 'static {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// True for runtime-wide events that are applied to every session
    /// instead of being routed by address.
    fn is_broadcast(&self) -> bool {
        false
    }

    /// True when this event reports that a session's audio path connected.
    fn is_audio_connected(&self) -> bool {
        false
    }
}

/// A tagged event addressed to one remote device.
///
/// The payload lives in the event variant itself. Messages are consumed by
/// value exactly once by the event loop; owned strings are dropped with them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<E> {
    pub address: BtAddress,
    pub event: E,
}

impl<E: ProfileEvent> Message<E> {
    pub fn new(address: BtAddress, event: E) -> Self {
        Self { address, event }
    }

    /// A runtime-wide message with no specific target.
    pub fn broadcast(event: E) -> Self {
        Self {
            address: BtAddress::ANY,
            event,
        }
    }

    pub fn name(&self) -> &'static str {
        self.event.name()
    }

    pub fn is_broadcast(&self) -> bool {
        self.event.is_broadcast()
    }
}
