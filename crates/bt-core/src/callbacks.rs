//! Listener multiplexer with generation-checked cookies.
//!
//! A [`CallbackList`] holds registered listener objects in registration
//! order. Each registration is identified by a [`Cookie`] made of an arena
//! slot index and the slot's generation, so a cookie kept after
//! unregistration can never address a listener that later reuses the slot.
//!
//! Registrations made on behalf of another process carry a
//! [`RemoteIdentity`]. The identity is a weak handle on a
//! [`RemoteAnchor`] owned by the transport; once the anchor is dropped
//! (connection closed, callback object died) the entry is skipped by
//! [`CallbackList::for_each`] even before it is unregistered.

use std::fmt;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BtError, BtResult};

/// Default ceiling on registrations per list.
pub const DEFAULT_MAX_REGISTRATIONS: usize = 16;

// ============================================================================
// Cookie
// ============================================================================

/// Handle identifying one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cookie {
    index: u32,
    generation: u32,
}

impl Cookie {
    pub const fn index(&self) -> u32 {
        self.index
    }

    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Packs the cookie into one integer for transports that carry scalars.
    pub const fn to_raw(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.index, self.generation)
    }
}

// ============================================================================
// Remote identity
// ============================================================================

/// Owner side of a remote identity. Dropping it kills the identity.
#[derive(Debug)]
pub struct RemoteAnchor {
    inner: Arc<u64>,
}

impl RemoteAnchor {
    pub fn new(id: u64) -> Self {
        Self {
            inner: Arc::new(id),
        }
    }

    pub fn id(&self) -> u64 {
        *self.inner
    }

    pub fn identity(&self) -> RemoteIdentity {
        RemoteIdentity {
            id: *self.inner,
            anchor: Arc::downgrade(&self.inner),
        }
    }
}

/// Weak, cloneable handle naming the peer a registration was made for.
#[derive(Debug, Clone)]
pub struct RemoteIdentity {
    id: u64,
    anchor: Weak<u64>,
}

impl RemoteIdentity {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.anchor.strong_count() > 0
    }
}

// ============================================================================
// Callback list
// ============================================================================

struct Entry<T: ?Sized> {
    callbacks: Arc<T>,
    remote: Option<RemoteIdentity>,
}

impl<T: ?Sized> Entry<T> {
    fn is_live(&self) -> bool {
        self.remote.as_ref().map_or(true, RemoteIdentity::is_alive)
    }
}

struct Slot<T: ?Sized> {
    generation: u32,
    entry: Option<Entry<T>>,
}

/// Ordered set of registered listeners.
///
/// Not internally synchronized; owners wrap it in a lock.
pub struct CallbackList<T: ?Sized> {
    slots: Vec<Slot<T>>,
    /// Occupied slot indices in registration order.
    order: Vec<u32>,
    free: Vec<u32>,
    max_registrations: usize,
}

impl<T: ?Sized> CallbackList<T> {
    pub fn new(max_registrations: usize) -> Self {
        Self {
            slots: Vec::new(),
            order: Vec::new(),
            free: Vec::new(),
            max_registrations,
        }
    }

    /// Registers a listener.
    ///
    /// # Errors
    ///
    /// - `BtError::NoResources` when the list is at its ceiling
    /// - `BtError::Busy` when the same listener object, or another live
    ///   registration for the same remote, is already registered
    pub fn register(&mut self, callbacks: Arc<T>, remote: Option<RemoteIdentity>) -> BtResult<Cookie> {
        if self.order.len() >= self.max_registrations {
            return Err(BtError::NoResources);
        }

        let duplicate = self.entries().any(|(_, entry)| {
            same_object(&entry.callbacks, &callbacks)
                || matches!((&entry.remote, &remote), (Some(a), Some(b)) if a.id == b.id && a.is_alive())
        });
        if duplicate {
            return Err(BtError::Busy);
        }

        let entry = Entry { callbacks, remote };
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len()).map_err(|_| BtError::NoResources)?;
                self.slots.push(Slot {
                    generation: 0,
                    entry: None,
                });
                index
            }
        };

        let slot = self
            .slots
            .get_mut(index as usize)
            .ok_or(BtError::NoResources)?;
        slot.entry = Some(entry);
        self.order.push(index);

        let cookie = Cookie {
            index,
            generation: slot.generation,
        };
        debug!(cookie = %cookie, registered = self.order.len(), "Listener registered");
        Ok(cookie)
    }

    /// Removes a registration and returns its listener.
    ///
    /// # Errors
    ///
    /// `BtError::NotFound` if the cookie is unknown or stale.
    pub fn unregister(&mut self, cookie: Cookie) -> BtResult<Arc<T>> {
        let slot = self
            .slots
            .get_mut(cookie.index as usize)
            .filter(|slot| slot.generation == cookie.generation)
            .ok_or(BtError::NotFound)?;
        let entry = slot.entry.take().ok_or(BtError::NotFound)?;

        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(cookie.index);
        self.order.retain(|&i| i != cookie.index);

        debug!(cookie = %cookie, registered = self.order.len(), "Listener unregistered");
        Ok(entry.callbacks)
    }

    /// Removes every registration made for `remote_id`. Returns how many.
    pub fn unregister_remote(&mut self, remote_id: u64) -> usize {
        let cookies: Vec<Cookie> = self
            .entries()
            .filter(|(_, entry)| entry.remote.as_ref().map(RemoteIdentity::id) == Some(remote_id))
            .map(|(cookie, _)| cookie)
            .collect();

        cookies
            .into_iter()
            .filter(|cookie| self.unregister(*cookie).is_ok())
            .count()
    }

    /// Drops registrations whose remote identity has died.
    pub fn prune_dead(&mut self) -> usize {
        let dead: Vec<Cookie> = self
            .entries()
            .filter(|(_, entry)| !entry.is_live())
            .map(|(cookie, _)| cookie)
            .collect();

        dead.into_iter()
            .filter(|cookie| self.unregister(*cookie).is_ok())
            .count()
    }

    pub fn get(&self, cookie: Cookie) -> Option<&Arc<T>> {
        self.slots
            .get(cookie.index as usize)
            .filter(|slot| slot.generation == cookie.generation)
            .and_then(|slot| slot.entry.as_ref())
            .map(|entry| &entry.callbacks)
    }

    pub fn contains(&self, cookie: Cookie) -> bool {
        self.get(cookie).is_some()
    }

    /// Number of registrations, live or not.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn max_registrations(&self) -> usize {
        self.max_registrations
    }

    /// Invokes `f` on every live listener in registration order.
    pub fn for_each(&self, mut f: impl FnMut(&T)) {
        for (_, entry) in self.entries() {
            if entry.is_live() {
                f(&entry.callbacks);
            }
        }
    }

    /// Clones out every live listener in registration order.
    ///
    /// Lets callers release their lock before invoking listeners that may
    /// themselves register or unregister.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries()
            .filter(|(_, entry)| entry.is_live())
            .map(|(_, entry)| Arc::clone(&entry.callbacks))
            .collect()
    }

    pub fn clear(&mut self) {
        let cookies: Vec<Cookie> = self.entries().map(|(cookie, _)| cookie).collect();
        for cookie in cookies {
            let _ = self.unregister(cookie);
        }
    }

    fn entries(&self) -> impl Iterator<Item = (Cookie, &Entry<T>)> + '_ {
        self.order.iter().filter_map(move |&index| {
            let slot = self.slots.get(index as usize)?;
            let entry = slot.entry.as_ref()?;
            Some((
                Cookie {
                    index,
                    generation: slot.generation,
                },
                entry,
            ))
        })
    }
}

impl<T: ?Sized> Default for CallbackList<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REGISTRATIONS)
    }
}

fn same_object<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    trait Listener: Send + Sync + std::fmt::Debug {
        fn fire(&self, log: &Mutex<Vec<u32>>);
    }

    #[derive(Debug)]
    struct Tagged(u32);

    impl Listener for Tagged {
        fn fire(&self, log: &Mutex<Vec<u32>>) {
            log.lock().unwrap().push(self.0);
        }
    }

    fn tagged(tag: u32) -> Arc<dyn Listener> {
        Arc::new(Tagged(tag))
    }

    fn fire_all(list: &CallbackList<dyn Listener>) -> Vec<u32> {
        let log = Mutex::new(Vec::new());
        list.for_each(|cb| cb.fire(&log));
        log.into_inner().unwrap()
    }

    #[test]
    fn test_fan_out_in_registration_order() {
        let mut list: CallbackList<dyn Listener> = CallbackList::new(8);
        for tag in 1..=4 {
            list.register(tagged(tag), None).unwrap();
        }
        assert_eq!(fire_all(&list), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_unregister_leaves_others_firing() {
        let mut list: CallbackList<dyn Listener> = CallbackList::new(8);
        let cookies: Vec<Cookie> = (1..=3).map(|t| list.register(tagged(t), None).unwrap()).collect();

        list.unregister(cookies[1]).unwrap();
        assert_eq!(fire_all(&list), vec![1, 3]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_stale_cookie_cannot_alias_reused_slot() {
        let mut list: CallbackList<dyn Listener> = CallbackList::new(8);
        let old = list.register(tagged(1), None).unwrap();
        list.unregister(old).unwrap();

        let new = list.register(tagged(2), None).unwrap();
        assert_eq!(new.index(), old.index(), "slot should be reused");
        assert_ne!(new.generation(), old.generation());

        assert_eq!(list.unregister(old).unwrap_err(), BtError::NotFound);
        assert!(list.contains(new));
        assert_eq!(fire_all(&list), vec![2]);
    }

    #[test]
    fn test_reused_slot_keeps_registration_order() {
        let mut list: CallbackList<dyn Listener> = CallbackList::new(8);
        let first = list.register(tagged(1), None).unwrap();
        list.register(tagged(2), None).unwrap();
        list.unregister(first).unwrap();
        list.register(tagged(3), None).unwrap();

        assert_eq!(fire_all(&list), vec![2, 3]);
    }

    #[test]
    fn test_ceiling_returns_no_resources() {
        let mut list: CallbackList<dyn Listener> = CallbackList::new(2);
        list.register(tagged(1), None).unwrap();
        list.register(tagged(2), None).unwrap();
        assert_eq!(list.register(tagged(3), None).unwrap_err(), BtError::NoResources);
    }

    #[test]
    fn test_same_listener_twice_is_busy() {
        let mut list: CallbackList<dyn Listener> = CallbackList::new(4);
        let cb = tagged(1);
        list.register(Arc::clone(&cb), None).unwrap();
        assert_eq!(list.register(cb, None).unwrap_err(), BtError::Busy);
    }

    #[test]
    fn test_same_remote_twice_is_busy() {
        let mut list: CallbackList<dyn Listener> = CallbackList::new(4);
        let anchor = RemoteAnchor::new(7);
        list.register(tagged(1), Some(anchor.identity())).unwrap();
        assert_eq!(
            list.register(tagged(2), Some(anchor.identity())).unwrap_err(),
            BtError::Busy
        );
    }

    #[test]
    fn test_dead_remote_is_skipped_then_pruned() {
        let mut list: CallbackList<dyn Listener> = CallbackList::new(4);
        let anchor = RemoteAnchor::new(9);
        list.register(tagged(1), None).unwrap();
        list.register(tagged(2), Some(anchor.identity())).unwrap();
        assert_eq!(fire_all(&list), vec![1, 2]);

        drop(anchor);
        assert_eq!(fire_all(&list), vec![1]);
        assert_eq!(list.len(), 2);
        assert_eq!(list.prune_dead(), 1);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_unregister_remote() {
        let mut list: CallbackList<dyn Listener> = CallbackList::new(4);
        let a = RemoteAnchor::new(1);
        let b = RemoteAnchor::new(2);
        list.register(tagged(1), Some(a.identity())).unwrap();
        list.register(tagged(2), Some(b.identity())).unwrap();

        assert_eq!(list.unregister_remote(1), 1);
        assert_eq!(list.unregister_remote(1), 0);
        assert_eq!(fire_all(&list), vec![2]);
    }

    #[test]
    fn test_cookie_raw_form() {
        let mut list: CallbackList<dyn Listener> = CallbackList::new(4);
        let c = list.register(tagged(1), None).unwrap();
        list.unregister(c).unwrap();
        let c = list.register(tagged(2), None).unwrap();
        assert_eq!(Cookie::from_raw(c.to_raw()), c);
    }

    #[test]
    fn test_snapshot_and_clear() {
        let mut list: CallbackList<dyn Listener> = CallbackList::new(4);
        list.register(tagged(1), None).unwrap();
        list.register(tagged(2), None).unwrap();
        assert_eq!(list.snapshot().len(), 2);

        list.clear();
        assert!(list.is_empty());
        assert!(list.snapshot().is_empty());
    }
}
