//! Best-effort sysfs access
//!
//! Everything here is fire-and-forget: a failed read returns `None`, a
//! failed write returns `false`, and the reason is logged at trace
//! level. Callers must treat `None` as "value currently unavailable",
//! never as zero. Retry policy, if any, belongs to the caller.
//!
//! # PWM values
//!
//! Raw duty ranges from 0 to the controller's `max_raw` (255 on
//! standard hwmon). The percent/raw conversion pair uses symmetric
//! rounding so repeated round trips are stable at percent granularity.

use std::fs;
use std::path::Path;
use tracing::trace;

use crate::constants::pwm;
use crate::data::{FanTach, PwmOutput, TempSensor};

/// Boundary between control logic and the sysfs tree.
///
/// Production code uses [`Sysfs`]; tests substitute an in-memory fake
/// keyed by the same paths.
pub trait SysfsIo: Send + Sync {
    /// Read a whole-number value from an attribute file
    fn read_int(&self, path: &Path) -> Option<i64>;

    /// Write a whole-number value to an attribute file
    fn write_int(&self, path: &Path, value: i64) -> bool;
}

/// Real sysfs-backed implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct Sysfs;

impl SysfsIo for Sysfs {
    fn read_int(&self, path: &Path) -> Option<i64> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                trace!(path = ?path, error = %e, "sysfs read failed");
                return None;
            }
        };
        match content.trim().parse::<i64>() {
            Ok(value) => Some(value),
            Err(e) => {
                trace!(path = ?path, error = %e, "non-numeric sysfs content");
                None
            }
        }
    }

    fn write_int(&self, path: &Path, value: i64) -> bool {
        match fs::write(path, value.to_string()) {
            Ok(()) => true,
            Err(e) => {
                trace!(path = ?path, value, error = %e, "sysfs write failed");
                false
            }
        }
    }
}

/// Convert a duty percentage to the controller's raw range
pub fn raw_from_percent(percent: u8, max_raw: u32) -> u32 {
    let percent = percent.min(pwm::MAX_PERCENT) as u32;
    (percent * max_raw + 50) / 100
}

/// Convert a raw duty value back to a percentage
pub fn percent_from_raw(raw: u32, max_raw: u32) -> u8 {
    if max_raw == 0 {
        return 0;
    }
    let raw = raw.min(max_raw);
    ((raw * 100 + max_raw / 2) / max_raw) as u8
}

/// Current temperature in millidegrees Celsius
pub fn read_milli_c(io: &dyn SysfsIo, temp: &TempSensor) -> Option<i64> {
    io.read_int(&temp.input_path)
}

/// Current fan speed in RPM
pub fn read_rpm(io: &dyn SysfsIo, fan: &FanTach) -> Option<u32> {
    io.read_int(&fan.input_path)
        .and_then(|value| u32::try_from(value).ok())
}

/// Current raw duty
pub fn read_raw(io: &dyn SysfsIo, pwm: &PwmOutput) -> Option<u32> {
    io.read_int(&pwm.pwm_path)
        .and_then(|value| u32::try_from(value).ok())
}

/// Current pwmN_enable value, `None` when the file is absent
pub fn read_enable(io: &dyn SysfsIo, pwm: &PwmOutput) -> Option<u8> {
    io.read_int(&pwm.enable_path)
        .and_then(|value| u8::try_from(value).ok())
}

/// Current pwmN_mode value, `None` when the controller has no mode file
pub fn read_mode(io: &dyn SysfsIo, pwm: &PwmOutput) -> Option<u8> {
    let mode_path = pwm.mode_path.as_deref()?;
    io.read_int(mode_path)
        .and_then(|value| u8::try_from(value).ok())
}

/// Switch the output to software-controlled duty.
///
/// Absence of a readable enable file is not a failure - some
/// controllers are always in manual mode. A write only happens when
/// the current value differs.
pub fn set_manual(io: &dyn SysfsIo, pwm: &PwmOutput) -> bool {
    match io.read_int(&pwm.enable_path) {
        None => true,
        Some(value) if value == i64::from(pwm::enable::MANUAL) => true,
        Some(_) => io.write_int(&pwm.enable_path, i64::from(pwm::enable::MANUAL)),
    }
}

/// Restore a pwmN_enable value
pub fn set_enable(io: &dyn SysfsIo, pwm: &PwmOutput, value: u8) -> bool {
    io.write_int(&pwm.enable_path, i64::from(value))
}

/// Write a pwmN_mode value; `false` when the controller has no mode file
pub fn set_mode(io: &dyn SysfsIo, pwm: &PwmOutput, value: u8) -> bool {
    match pwm.mode_path.as_deref() {
        Some(path) => io.write_int(path, i64::from(value)),
        None => false,
    }
}

/// Write a raw duty value, clamped to the controller's range
pub fn set_raw(io: &dyn SysfsIo, pwm: &PwmOutput, raw: u32) -> bool {
    io.write_int(&pwm.pwm_path, i64::from(raw.min(pwm.max_raw)))
}

/// Write a duty percentage
pub fn set_percent(io: &dyn SysfsIo, pwm: &PwmOutput, percent: u8) -> bool {
    set_raw(io, pwm, raw_from_percent(percent, pwm.max_raw))
}
