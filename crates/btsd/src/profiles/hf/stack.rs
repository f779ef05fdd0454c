//! Driver seam below the HF runtime.

use bt_core::{BtAddress, BtResult, CallControl, VolumeType};
use tracing::info;

use crate::profiles::CallLog;

/// AT command codes reported back through `StackCommandResult`.
pub mod at_cmd {
    pub const ATD: u32 = 0x02;
    pub const BLDN: u32 = 0x1A;

    /// The result value for a final `OK`.
    pub const RESULT_OK: u32 = 0;
}

pub trait HfStack: Send + Sync {
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

    /// `None` redials the last number.
    fn dial_number(&self, addr: BtAddress, number: Option<&str>) -> BtResult<()>;

    fn dial_memory(&self, addr: BtAddress, location: u32) -> BtResult<()>;

    fn answer_call(&self, addr: BtAddress) -> BtResult<()>;

    fn reject_call(&self, addr: BtAddress) -> BtResult<()>;

    fn hangup_call(&self, addr: BtAddress) -> BtResult<()>;

    fn call_control(&self, addr: BtAddress, chld: CallControl, index: u8) -> BtResult<()>;

    /// Asks the AG for its call list (AT+CLCC).
    fn get_current_calls(&self, addr: BtAddress) -> BtResult<()>;

    fn send_at_command(&self, addr: BtAddress, command: &str) -> BtResult<()>;

    fn send_battery_level(&self, addr: BtAddress, level: u8) -> BtResult<()>;

    fn send_dtmf(&self, addr: BtAddress, dtmf: char) -> BtResult<()>;

    fn set_volume(&self, addr: BtAddress, kind: VolumeType, volume: u8) -> BtResult<()>;
}

/// Accepts every request and logs it.
#[derive(Debug, Default)]
pub struct NullHfStack;

impl HfStack for NullHfStack {
    fn init(&self, features: u32, max_connections: usize) -> BtResult<()> {
        info!(features, max_connections, "HF stack init (null driver)");
        Ok(())
    }

    fn cleanup(&self) {
        info!("HF stack cleanup (null driver)");
    }

    fn connect(&self, addr: BtAddress) -> BtResult<()> {
        info!(addr = %addr, "HF connect (null driver)");
        Ok(())
    }

    fn disconnect(&self, addr: BtAddress) -> BtResult<()> {
        info!(addr = %addr, "HF disconnect (null driver)");
        Ok(())
    }

    fn connect_audio(&self, addr: BtAddress) -> BtResult<()> {
        info!(addr = %addr, "HF connect audio (null driver)");
        Ok(())
    }

    fn disconnect_audio(&self, addr: BtAddress) -> BtResult<()> {
        info!(addr = %addr, "HF disconnect audio (null driver)");
        Ok(())
    }

    fn accept_audio(&self, addr: BtAddress) -> BtResult<()> {
        info!(addr = %addr, "HF accept audio (null driver)");
        Ok(())
    }

    fn start_voice_recognition(&self, addr: BtAddress) -> BtResult<()> {
        info!(addr = %addr, "HF start voice recognition (null driver)");
        Ok(())
    }

    fn stop_voice_recognition(&self, addr: BtAddress) -> BtResult<()> {
        info!(addr = %addr, "HF stop voice recognition (null driver)");
        Ok(())
    }

    fn dial_number(&self, addr: BtAddress, number: Option<&str>) -> BtResult<()> {
        info!(addr = %addr, number = number.unwrap_or("<last>"), "HF dial (null driver)");
        Ok(())
    }

    fn dial_memory(&self, addr: BtAddress, location: u32) -> BtResult<()> {
        info!(addr = %addr, location, "HF dial memory (null driver)");
        Ok(())
    }

    fn answer_call(&self, addr: BtAddress) -> BtResult<()> {
        info!(addr = %addr, "HF answer (null driver)");
        Ok(())
    }

    fn reject_call(&self, addr: BtAddress) -> BtResult<()> {
        info!(addr = %addr, "HF reject (null driver)");
        Ok(())
    }

    fn hangup_call(&self, addr: BtAddress) -> BtResult<()> {
        info!(addr = %addr, "HF hangup (null driver)");
        Ok(())
    }

    fn call_control(&self, addr: BtAddress, chld: CallControl, index: u8) -> BtResult<()> {
        info!(addr = %addr, chld = ?chld, index, "HF call control (null driver)");
        Ok(())
    }

    fn get_current_calls(&self, addr: BtAddress) -> BtResult<()> {
        info!(addr = %addr, "HF query calls (null driver)");
        Ok(())
    }

    fn send_at_command(&self, addr: BtAddress, command: &str) -> BtResult<()> {
        info!(addr = %addr, command, "HF send AT (null driver)");
        Ok(())
    }

    fn send_battery_level(&self, addr: BtAddress, level: u8) -> BtResult<()> {
        info!(addr = %addr, level, "HF battery level (null driver)");
        Ok(())
    }

    fn send_dtmf(&self, addr: BtAddress, dtmf: char) -> BtResult<()> {
        info!(addr = %addr, %dtmf, "HF dtmf (null driver)");
        Ok(())
    }

    fn set_volume(&self, addr: BtAddress, kind: VolumeType, volume: u8) -> BtResult<()> {
        info!(addr = %addr, kind = ?kind, volume, "HF set volume (null driver)");
        Ok(())
    }
}

/// Records every call into a [`CallLog`].
#[derive(Debug, Default)]
pub struct RecordingHfStack {
    pub log: CallLog,
}

impl HfStack for RecordingHfStack {
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

    fn dial_number(&self, addr: BtAddress, number: Option<&str>) -> BtResult<()> {
        self.log
            .record("dial_number", format!("{addr} {}", number.unwrap_or("-")))
    }

    fn dial_memory(&self, addr: BtAddress, location: u32) -> BtResult<()> {
        self.log.record("dial_memory", format!("{addr} {location}"))
    }

    fn answer_call(&self, addr: BtAddress) -> BtResult<()> {
        self.log.record("answer_call", addr.to_string())
    }

    fn reject_call(&self, addr: BtAddress) -> BtResult<()> {
        self.log.record("reject_call", addr.to_string())
    }

    fn hangup_call(&self, addr: BtAddress) -> BtResult<()> {
        self.log.record("hangup_call", addr.to_string())
    }

    fn call_control(&self, addr: BtAddress, chld: CallControl, index: u8) -> BtResult<()> {
        self.log
            .record("call_control", format!("{addr} {} {index}", chld.as_u8()))
    }

    fn get_current_calls(&self, addr: BtAddress) -> BtResult<()> {
        self.log.record("get_current_calls", addr.to_string())
    }

    fn send_at_command(&self, addr: BtAddress, command: &str) -> BtResult<()> {
        self.log.record("send_at_command", format!("{addr} {command:?}"))
    }

    fn send_battery_level(&self, addr: BtAddress, level: u8) -> BtResult<()> {
        self.log.record("send_battery_level", format!("{addr} {level}"))
    }

    fn send_dtmf(&self, addr: BtAddress, dtmf: char) -> BtResult<()> {
        self.log.record("send_dtmf", format!("{addr} {dtmf}"))
    }

    fn set_volume(&self, addr: BtAddress, kind: VolumeType, volume: u8) -> BtResult<()> {
        self.log.record("set_volume", format!("{addr} {kind:?} {volume}"))
    }
}
