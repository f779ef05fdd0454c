//! Listener registrations held by one socket connection.

use std::sync::Arc;

use bt_core::{BtError, BtResult, Cookie, HfpAgCallbacks, HfpHfCallbacks, ProfileId, RemoteAnchor};
use tracing::debug;

use crate::forward::{PushForwarder, PushSink};
use crate::manager::ProfileManager;

/// At most one cookie per profile, all tied to the connection's anchor.
///
/// Dropping the anchor kills the connection's remote identity, so the
/// multiplexer skips these listeners even before they are unregistered.
pub struct ConnectionRegistrations {
    anchor: RemoteAnchor,
    ag: Option<Cookie>,
    hf: Option<Cookie>,
}

impl ConnectionRegistrations {
    pub fn new(connection_id: u64) -> Self {
        Self {
            anchor: RemoteAnchor::new(connection_id),
            ag: None,
            hf: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ag.is_none() && self.hf.is_none()
    }

    pub fn cookie(&self, profile: ProfileId) -> Option<Cookie> {
        match profile {
            ProfileId::HfpAg => self.ag,
            ProfileId::HfpHf => self.hf,
        }
    }

    /// Registers `forwarder` with `profile` for this connection.
    ///
    /// # Errors
    ///
    /// - `BtError::Busy` if the connection already holds a cookie for `profile`
    /// - `BtError::ServiceNotFound` if the profile is not running
    /// - `BtError::NoResources` if the listener table is full
    pub fn register<S: PushSink>(
        &mut self,
        manager: &ProfileManager,
        profile: ProfileId,
        forwarder: Arc<PushForwarder<S>>,
    ) -> BtResult<Cookie> {
        if self.cookie(profile).is_some() {
            return Err(BtError::Busy);
        }
        if !manager.is_started(profile) {
            return Err(BtError::ServiceNotFound);
        }

        let identity = Some(self.anchor.identity());
        let cookie = match profile {
            ProfileId::HfpAg => {
                let cookie = manager
                    .ag()
                    .register(forwarder as Arc<dyn HfpAgCallbacks>, identity)?;
                self.ag = Some(cookie);
                cookie
            }
            ProfileId::HfpHf => {
                let cookie = manager
                    .hf()
                    .register(forwarder as Arc<dyn HfpHfCallbacks>, identity)?;
                self.hf = Some(cookie);
                cookie
            }
        };
        Ok(cookie)
    }

    /// Drops the connection's registration with `profile`.
    ///
    /// # Errors
    ///
    /// `BtError::NotFound` if the connection holds no cookie for `profile`.
    pub fn unregister(&mut self, manager: &ProfileManager, profile: ProfileId) -> BtResult<()> {
        let slot = match profile {
            ProfileId::HfpAg => &mut self.ag,
            ProfileId::HfpHf => &mut self.hf,
        };
        let cookie = slot.take().ok_or(BtError::NotFound)?;
        match profile {
            ProfileId::HfpAg => manager.ag().unregister(cookie),
            ProfileId::HfpHf => manager.hf().unregister(cookie),
        }
    }

    /// Kills the remote identity, then unregisters whatever is left.
    pub fn release(self, manager: &ProfileManager) {
        let Self { anchor, ag, hf } = self;
        let connection_id = anchor.id();
        drop(anchor);

        if let Some(cookie) = ag {
            if let Err(e) = manager.ag().unregister(cookie) {
                debug!(connection_id, error = %e, "AG listener already gone");
            }
        }
        if let Some(cookie) = hf {
            if let Err(e) = manager.hf().unregister(cookie) {
                debug!(connection_id, error = %e, "HF listener already gone");
            }
        }
    }
}
