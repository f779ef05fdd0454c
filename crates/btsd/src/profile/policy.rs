//! Active device selection.
//!
//! The session at the front of the registry is the active device. An
//! [`ActivationPolicy`] decides which routed events promote their session
//! to the front; explicit `set_active_device` calls bypass it.

use bt_core::ProfileEvent;

use crate::config::ActiveDeviceMode;

pub trait ActivationPolicy: Send + Sync {
    /// Returns true if the session receiving `event` becomes active.
    fn should_activate(&self, event: &dyn ProfileEvent) -> bool;
}

/// The session whose audio path connected most recently wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct AudioConnectedPolicy;

impl ActivationPolicy for AudioConnectedPolicy {
    fn should_activate(&self, event: &dyn ProfileEvent) -> bool {
        event.is_audio_connected()
    }
}

/// Never promotes on its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualPolicy;

impl ActivationPolicy for ManualPolicy {
    fn should_activate(&self, _event: &dyn ProfileEvent) -> bool {
        false
    }
}

pub fn policy_for(mode: ActiveDeviceMode) -> Box<dyn ActivationPolicy> {
    match mode {
        ActiveDeviceMode::AudioConnected => Box::new(AudioConnectedPolicy),
        ActiveDeviceMode::Manual => Box::new(ManualPolicy),
    }
}
