//! Address-keyed, ordered collection of device sessions.
//!
//! The registry never holds two sessions for one address. Order is
//! significant: the front session is the active device.

use bt_core::{AudioState, BtAddress, ProfileConnectionState};
use serde::Serialize;
use tracing::debug;

/// Cached view of one remote device as the service layer sees it.
pub trait DeviceSession: Send + 'static {
    fn address(&self) -> BtAddress;

    fn connection_state(&self) -> ProfileConnectionState;

    fn audio_state(&self) -> AudioState;

    /// True while the session counts toward the connection ceiling.
    fn is_counted(&self) -> bool;

    /// Releases loop resources (timers) before the session is dropped.
    fn release(&mut self) {}
}

/// Diagnostic snapshot of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub address: BtAddress,
    pub connection_state: ProfileConnectionState,
    pub audio_state: AudioState,
}

pub struct SessionRegistry<S> {
    sessions: Vec<S>,
    max_connections: usize,
    /// Admitted connects not yet consumed by the loop.
    reserved: usize,
}

impl<S: DeviceSession> SessionRegistry<S> {
    pub fn new(max_connections: usize) -> Self {
        Self {
            sessions: Vec::new(),
            max_connections,
            reserved: 0,
        }
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn position(&self, addr: BtAddress) -> Option<usize> {
        self.sessions.iter().position(|s| s.address() == addr)
    }

    pub fn find(&self, addr: BtAddress) -> Option<&S> {
        self.sessions.iter().find(|s| s.address() == addr)
    }

    pub fn find_mut(&mut self, addr: BtAddress) -> Option<&mut S> {
        self.sessions.iter_mut().find(|s| s.address() == addr)
    }

    /// Returns the session for `addr`, building it with `create` if absent.
    /// New sessions are appended at the back.
    pub fn find_or_create(
        &mut self,
        addr: BtAddress,
        create: impl FnOnce() -> S,
    ) -> Option<&mut S> {
        if self.position(addr).is_none() {
            debug!(addr = %addr, "Creating device session");
            self.sessions.push(create());
        }
        self.find_mut(addr)
    }

    /// Detaches the session for `addr`. The caller runs its teardown.
    pub fn remove(&mut self, addr: BtAddress) -> Option<S> {
        let index = self.position(addr)?;
        debug!(addr = %addr, "Removing device session");
        Some(self.sessions.remove(index))
    }

    /// Makes `addr` the active device. Returns false if absent.
    pub fn move_to_front(&mut self, addr: BtAddress) -> bool {
        match self.position(addr) {
            Some(0) => true,
            Some(index) => {
                let session = self.sessions.remove(index);
                self.sessions.insert(0, session);
                debug!(addr = %addr, "Session moved to front");
                true
            }
            None => false,
        }
    }

    pub fn front(&self) -> Option<&S> {
        self.sessions.first()
    }

    pub fn for_each(&mut self, f: impl FnMut(&mut S)) {
        self.sessions.iter_mut().for_each(f);
    }

    pub fn iter(&self) -> impl Iterator<Item = &S> + '_ {
        self.sessions.iter()
    }

    /// Sessions currently counted toward the ceiling.
    pub fn connection_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_counted()).count()
    }

    /// Counted sessions plus admitted connects still in the queue.
    pub fn at_capacity(&self) -> bool {
        self.connection_count() + self.reserved >= self.max_connections
    }

    /// Holds a slot for a connect that has been admitted but not yet run.
    pub fn reserve(&mut self) {
        self.reserved += 1;
    }

    pub fn release_reservation(&mut self) {
        self.reserved = self.reserved.saturating_sub(1);
    }

    pub fn reserved(&self) -> usize {
        self.reserved
    }

    pub fn snapshot(&self) -> Vec<SessionInfo> {
        self.sessions
            .iter()
            .map(|s| SessionInfo {
                address: s.address(),
                connection_state: s.connection_state(),
                audio_state: s.audio_state(),
            })
            .collect()
    }

    /// Removes every session, front first.
    pub fn drain(&mut self) -> Vec<S> {
        std::mem::take(&mut self.sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fake {
        addr: BtAddress,
        counted: bool,
    }

    impl DeviceSession for Fake {
        fn address(&self) -> BtAddress {
            self.addr
        }

        fn connection_state(&self) -> ProfileConnectionState {
            if self.counted {
                ProfileConnectionState::Connected
            } else {
                ProfileConnectionState::Disconnected
            }
        }

        fn audio_state(&self) -> AudioState {
            AudioState::Disconnected
        }

        fn is_counted(&self) -> bool {
            self.counted
        }
    }

    fn addr(last: u8) -> BtAddress {
        BtAddress::new([0, 0, 0, 0, 0, last])
    }

    fn fake(last: u8, counted: bool) -> Fake {
        Fake {
            addr: addr(last),
            counted,
        }
    }

    #[test]
    fn test_find_or_create_never_duplicates() {
        let mut reg = SessionRegistry::new(2);
        reg.find_or_create(addr(1), || fake(1, false));
        reg.find_or_create(addr(1), || fake(1, true)).unwrap().counted = true;
        assert_eq!(reg.len(), 1);
        assert!(reg.find(addr(1)).unwrap().counted);
    }

    #[test]
    fn test_move_to_front_reorders() {
        let mut reg = SessionRegistry::new(3);
        for i in 1..=3 {
            reg.find_or_create(addr(i), || fake(i, false));
        }
        assert!(reg.move_to_front(addr(3)));
        assert!(!reg.move_to_front(addr(9)));

        let order: Vec<_> = reg.iter().map(|s| s.addr).collect();
        assert_eq!(order, vec![addr(3), addr(1), addr(2)]);
        assert_eq!(reg.front().map(|s| s.addr), Some(addr(3)));
    }

    #[test]
    fn test_connection_count_and_capacity() {
        let mut reg = SessionRegistry::new(1);
        reg.find_or_create(addr(1), || fake(1, false));
        assert!(!reg.at_capacity());
        reg.find_or_create(addr(2), || fake(2, true));
        assert_eq!(reg.connection_count(), 1);
        assert!(reg.at_capacity());
    }

    #[test]
    fn test_reservation_counts_toward_capacity() {
        let mut reg: SessionRegistry<Fake> = SessionRegistry::new(1);
        reg.reserve();
        assert!(reg.at_capacity());
        assert_eq!(reg.connection_count(), 0);

        reg.release_reservation();
        reg.release_reservation();
        assert_eq!(reg.reserved(), 0);
        assert!(!reg.at_capacity());
    }

    #[test]
    fn test_remove_detaches_session() {
        let mut reg = SessionRegistry::new(1);
        reg.find_or_create(addr(1), || fake(1, false));
        assert!(reg.remove(addr(1)).is_some());
        assert!(reg.remove(addr(1)).is_none());
        assert!(reg.is_empty());
    }
}
