//! Owns the profile services hosted by one daemon.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bt_core::{BtError, ProfileId};
use bt_protocol::{Reply, Request};
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::event_loop::{LoopError, LoopHandle};
use crate::profiles::ag::{AgService, AgStack};
use crate::profiles::hf::{HfService, HfStack};

/// Allocator for remote identities, shared by every RPC backend so ids
/// never collide inside one listener table. Ids start at 1.
#[derive(Debug, Clone, Default)]
pub struct RemoteIds(Arc<AtomicU64>);

impl RemoteIds {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// The AG and HF services bound to one event loop.
///
/// Cheap to clone; every clone addresses the same runtimes.
#[derive(Clone)]
pub struct ProfileManager {
    ag: AgService,
    hf: HfService,
    remote_ids: RemoteIds,
}

impl ProfileManager {
    pub fn new(
        loop_handle: LoopHandle,
        config: &ServiceConfig,
        ag_stack: Arc<dyn AgStack>,
        hf_stack: Arc<dyn HfStack>,
    ) -> Self {
        Self {
            ag: AgService::new(
                loop_handle.clone(),
                config.ag.clone(),
                config.max_callbacks,
                ag_stack,
            ),
            hf: HfService::new(loop_handle, config.hf.clone(), config.max_callbacks, hf_stack),
            remote_ids: RemoteIds::default(),
        }
    }

    pub fn ag(&self) -> &AgService {
        &self.ag
    }

    pub fn hf(&self) -> &HfService {
        &self.hf
    }

    pub fn remote_ids(&self) -> &RemoteIds {
        &self.remote_ids
    }

    pub fn is_started(&self, profile: ProfileId) -> bool {
        match profile {
            ProfileId::HfpAg => self.ag.is_started(),
            ProfileId::HfpHf => self.hf.is_started(),
        }
    }

    /// Runs one non-registration request on the event loop.
    ///
    /// A loop that has gone away answers `NotEnabled`.
    pub async fn execute(&self, request: Request) -> Reply {
        debug!(profile = %request.profile(), op = request.opcode(), "Executing request");
        let result = match request {
            Request::Ag(request) => {
                let svc = self.ag.clone();
                self.ag.loop_handle().call(move || svc.execute(request)).await
            }
            Request::Hf(request) => {
                let svc = self.hf.clone();
                self.hf.loop_handle().call(move || svc.execute(request)).await
            }
        };
        result.unwrap_or_else(|e| Reply::error(BtError::from(e)))
    }

    /// Starts every enabled profile. Returns the profiles that came up.
    pub async fn start_all(&self) -> Result<Vec<ProfileId>, LoopError> {
        let mut started = Vec::new();

        if self.ag.config().enabled {
            if self.ag.start().await? {
                started.push(ProfileId::HfpAg);
            } else {
                warn!(profile = %ProfileId::HfpAg, "Profile failed to start");
            }
        }

        if self.hf.config().enabled {
            if self.hf.start().await? {
                started.push(ProfileId::HfpHf);
            } else {
                warn!(profile = %ProfileId::HfpHf, "Profile failed to start");
            }
        }

        info!(profiles = ?started, "Profiles started");
        Ok(started)
    }

    /// Stops every running profile.
    pub async fn stop_all(&self) -> Result<(), LoopError> {
        if self.hf.is_started() {
            self.hf.stop().await?;
        }
        if self.ag.is_started() {
            self.ag.stop().await?;
        }
        info!("Profiles stopped");
        Ok(())
    }
}
