//! Driver seam below the AG runtime.
//!
//! Every call is made from the event loop and must not block. A failure
//! only means the request was not accepted; outcomes arrive later as
//! stack events.

use bt_core::{BtAddress, BtResult, DeviceStatus, PhoneState, VolumeType};
use tracing::info;

use crate::profiles::CallLog;

/// AT result codes passed to `dial_response` and `error_response`.
pub mod at_result {
    pub const OK: u8 = 0;
    pub const TIMEOUT: u8 = 1;
    pub const ERROR: u8 = 2;
    pub const CME_OPERATION_NOT_SUPPORTED: u8 = 13;
}

pub trait AgStack: Send + Sync {
    fn init(&self, features: u32, max_connections: usize) -> BtResult<()>;

    fn cleanup(&self);

    fn connect(&self, addr: BtAddress) -> BtResult<()>;

    fn disconnect(&self, addr: BtAddress) -> BtResult<()>;

    fn connect_audio(&self, addr: BtAddress) -> BtResult<()>;

    fn disconnect_audio(&self, addr: BtAddress) -> BtResult<()>;

    /// Accepts an incoming SCO request.
    fn accept_audio(&self, addr: BtAddress) -> BtResult<()>;

    fn start_voice_recognition(&self, addr: BtAddress) -> BtResult<()>;

    fn stop_voice_recognition(&self, addr: BtAddress) -> BtResult<()>;

    fn phone_state_change(&self, addr: BtAddress, state: &PhoneState) -> BtResult<()>;

    fn device_status_changed(&self, addr: BtAddress, status: DeviceStatus) -> BtResult<()>;

    fn set_inband_ring_enable(&self, addr: BtAddress, enabled: bool) -> BtResult<()>;

    fn set_volume(&self, addr: BtAddress, kind: VolumeType, volume: u8) -> BtResult<()>;

    fn dial_response(&self, addr: BtAddress, result: u8) -> BtResult<()>;

    fn send_at_command(&self, addr: BtAddress, command: &str) -> BtResult<()>;

    fn error_response(&self, addr: BtAddress, result: u8) -> BtResult<()>;
}

/// Accepts every request and logs it. The daemon's default driver.
#[derive(Debug, Default)]
pub struct NullAgStack;

impl AgStack for NullAgStack {
    fn init(&self, features: u32, max_connections: usize) -> BtResult<()> {
        info!(features, max_connections, "AG stack init (null driver)");
        Ok(())
    }

    fn cleanup(&self) {
        info!("AG stack cleanup (null driver)");
    }

    fn connect(&self, addr: BtAddress) -> BtResult<()> {
        info!(addr = %addr, "AG connect (null driver)");
        Ok(())
    }

    fn disconnect(&self, addr: BtAddress) -> BtResult<()> {
        info!(addr = %addr, "AG disconnect (null driver)");
        Ok(())
    }

    fn connect_audio(&self, addr: BtAddress) -> BtResult<()> {
        info!(addr = %addr, "AG connect audio (null driver)");
        Ok(())
    }

    fn disconnect_audio(&self, addr: BtAddress) -> BtResult<()> {
        info!(addr = %addr, "AG disconnect audio (null driver)");
        Ok(())
    }

    fn accept_audio(&self, addr: BtAddress) -> BtResult<()> {
        info!(addr = %addr, "AG accept audio (null driver)");
        Ok(())
    }

    fn start_voice_recognition(&self, addr: BtAddress) -> BtResult<()> {
        info!(addr = %addr, "AG start voice recognition (null driver)");
        Ok(())
    }

    fn stop_voice_recognition(&self, addr: BtAddress) -> BtResult<()> {
        info!(addr = %addr, "AG stop voice recognition (null driver)");
        Ok(())
    }

    fn phone_state_change(&self, addr: BtAddress, state: &PhoneState) -> BtResult<()> {
        info!(addr = %addr, call_state = ?state.call_state, "AG phone state (null driver)");
        Ok(())
    }

    fn device_status_changed(&self, addr: BtAddress, status: DeviceStatus) -> BtResult<()> {
        info!(addr = %addr, status = ?status, "AG device status (null driver)");
        Ok(())
    }

    fn set_inband_ring_enable(&self, addr: BtAddress, enabled: bool) -> BtResult<()> {
        info!(addr = %addr, enabled, "AG inband ring (null driver)");
        Ok(())
    }

    fn set_volume(&self, addr: BtAddress, kind: VolumeType, volume: u8) -> BtResult<()> {
        info!(addr = %addr, kind = ?kind, volume, "AG set volume (null driver)");
        Ok(())
    }

    fn dial_response(&self, addr: BtAddress, result: u8) -> BtResult<()> {
        info!(addr = %addr, result, "AG dial response (null driver)");
        Ok(())
    }

    fn send_at_command(&self, addr: BtAddress, command: &str) -> BtResult<()> {
        info!(addr = %addr, command = command.trim(), "AG send AT (null driver)");
        Ok(())
    }

    fn error_response(&self, addr: BtAddress, result: u8) -> BtResult<()> {
        info!(addr = %addr, result, "AG error response (null driver)");
        Ok(())
    }
}

/// Records every call into a [`CallLog`].
#[derive(Debug, Default)]
pub struct RecordingAgStack {
    pub log: CallLog,
}

impl AgStack for RecordingAgStack {
    fn init(&self, features: u32, max_connections: usize) -> BtResult<()> {
        self.log.record("init", format!("{features} {max_connections}"))
    }

    fn cleanup(&self) {
        let _ = self.log.record("cleanup", "");
    }

    fn connect(&self, addr: BtAddress) -> BtResult<()> {
        self.log.record("connect", addr.to_string())
    }

    fn disconnect(&self, addr: BtAddress) -> BtResult<()> {
        self.log.record("disconnect", addr.to_string())
    }

    fn connect_audio(&self, addr: BtAddress) -> BtResult<()> {
        self.log.record("connect_audio", addr.to_string())
    }

    fn disconnect_audio(&self, addr: BtAddress) -> BtResult<()> {
        self.log.record("disconnect_audio", addr.to_string())
    }

    fn accept_audio(&self, addr: BtAddress) -> BtResult<()> {
        self.log.record("accept_audio", addr.to_string())
    }

    fn start_voice_recognition(&self, addr: BtAddress) -> BtResult<()> {
        self.log.record("start_voice_recognition", addr.to_string())
    }

    fn stop_voice_recognition(&self, addr: BtAddress) -> BtResult<()> {
        self.log.record("stop_voice_recognition", addr.to_string())
    }

    fn phone_state_change(&self, addr: BtAddress, state: &PhoneState) -> BtResult<()> {
        self.log.record(
            "phone_state_change",
            format!(
                "{addr} {} {} {:?}",
                state.num_active, state.num_held, state.call_state
            ),
        )
    }

    fn device_status_changed(&self, addr: BtAddress, status: DeviceStatus) -> BtResult<()> {
        self.log.record(
            "device_status_changed",
            format!("{addr} {} {}", status.signal, status.battery),
        )
    }

    fn set_inband_ring_enable(&self, addr: BtAddress, enabled: bool) -> BtResult<()> {
        self.log.record("set_inband_ring_enable", format!("{addr} {enabled}"))
    }

    fn set_volume(&self, addr: BtAddress, kind: VolumeType, volume: u8) -> BtResult<()> {
        self.log.record("set_volume", format!("{addr} {kind:?} {volume}"))
    }

    fn dial_response(&self, addr: BtAddress, result: u8) -> BtResult<()> {
        self.log.record("dial_response", format!("{addr} {result}"))
    }

    fn send_at_command(&self, addr: BtAddress, command: &str) -> BtResult<()> {
        self.log.record("send_at_command", format!("{addr} {command:?}"))
    }

    fn error_response(&self, addr: BtAddress, result: u8) -> BtResult<()> {
        self.log.record("error_response", format!("{addr} {result}"))
    }
}
