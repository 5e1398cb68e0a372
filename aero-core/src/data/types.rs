//! Core inventory types for aerod
//!
//! The [`Inventory`] is an immutable snapshot of the hwmon tree taken
//! at scan time. Every entry's path is a file that existed when the
//! scan ran; consumers hold a reference or copy, never a live file
//! handle, and re-validation happens lazily on read/write failure.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Hardware monitoring chip
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Chip {
    /// Index into `Inventory::chips`
    pub id: usize,
    /// Driver name from the chip's `name` file
    pub name: String,
    /// Raw contents of `device/vendor`, if present
    pub vendor: Option<String>,
}

/// Temperature sensor (tempN_input)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TempSensor {
    pub chip_id: usize,
    /// Base name, e.g. "temp1"
    pub name: String,
    /// Slot number parsed from the base name
    pub number: u32,
    pub input_path: PathBuf,
    pub label: Option<String>,
}

/// Fan tachometer (fanN_input)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FanTach {
    pub chip_id: usize,
    /// Base name, e.g. "fan1"
    pub name: String,
    /// Slot number parsed from the base name
    pub number: u32,
    pub input_path: PathBuf,
    pub label: Option<String>,
}

/// PWM output (pwmN)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PwmOutput {
    pub chip_id: usize,
    /// Base name, e.g. "pwm1"
    pub name: String,
    /// Slot number parsed from the base name
    pub number: u32,
    pub pwm_path: PathBuf,
    /// pwmN_enable path; the file may not exist on controllers that
    /// are always in manual mode
    pub enable_path: PathBuf,
    /// pwmN_mode path, only when the file existed at scan time
    pub mode_path: Option<PathBuf>,
    /// Raw duty ceiling (255 unless the driver reports otherwise)
    pub max_raw: u32,
}

/// Immutable snapshot of every sensor and control found at scan time
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Inventory {
    pub chips: Vec<Chip>,
    pub temps: Vec<TempSensor>,
    pub fans: Vec<FanTach>,
    pub pwms: Vec<PwmOutput>,
}

impl Inventory {
    /// "chipname/tempN" style display name, preferring the label
    pub fn temp_name(&self, index: usize) -> String {
        let temp = &self.temps[index];
        match &temp.label {
            Some(label) if !label.is_empty() => label.clone(),
            _ => self.stable_id(temp.chip_id, &temp.name),
        }
    }

    /// "chipname/fanN" style display name, preferring the label
    pub fn fan_name(&self, index: usize) -> String {
        let fan = &self.fans[index];
        match &fan.label {
            Some(label) if !label.is_empty() => label.clone(),
            _ => self.stable_id(fan.chip_id, &fan.name),
        }
    }

    /// "chipname/pwmN" stable identifier
    pub fn pwm_name(&self, index: usize) -> String {
        let pwm = &self.pwms[index];
        self.stable_id(pwm.chip_id, &pwm.name)
    }

    fn stable_id(&self, chip_id: usize, base_name: &str) -> String {
        let chip = self
            .chips
            .get(chip_id)
            .map(|c| c.name.as_str())
            .unwrap_or("unknown");
        format!("{}/{}", chip, base_name)
    }

    /// Resolve a profile PWM reference to an inventory index.
    ///
    /// Resolution order: stable "chipname/pwmN" identifier, then exact
    /// path, then substring containment against known PWM paths (the
    /// legacy form; first match wins, in inventory order).
    pub fn resolve_pwm(&self, reference: &str) -> Option<usize> {
        if reference.is_empty() {
            return None;
        }
        for (index, pwm) in self.pwms.iter().enumerate() {
            if self.stable_id(pwm.chip_id, &pwm.name) == reference {
                return Some(index);
            }
        }
        for (index, pwm) in self.pwms.iter().enumerate() {
            if pwm.pwm_path == Path::new(reference) {
                return Some(index);
            }
        }
        self.pwms
            .iter()
            .position(|pwm| pwm.pwm_path.to_string_lossy().contains(reference))
    }

    /// Resolve a profile temperature reference to an inventory index.
    ///
    /// Same ladder as [`resolve_pwm`], with an exact label match
    /// accepted alongside the stable identifier.
    ///
    /// [`resolve_pwm`]: Inventory::resolve_pwm
    pub fn resolve_temp(&self, reference: &str) -> Option<usize> {
        if reference.is_empty() {
            return None;
        }
        for (index, temp) in self.temps.iter().enumerate() {
            if self.stable_id(temp.chip_id, &temp.name) == reference
                || temp.label.as_deref() == Some(reference)
            {
                return Some(index);
            }
        }
        for (index, temp) in self.temps.iter().enumerate() {
            if temp.input_path == Path::new(reference) {
                return Some(index);
            }
        }
        self.temps
            .iter()
            .position(|temp| temp.input_path.to_string_lossy().contains(reference))
    }
}
