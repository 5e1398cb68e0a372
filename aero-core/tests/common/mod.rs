//! Shared in-memory hardware fake for integration tests
//!
//! `FakeIo` implements `SysfsIo` over a path-keyed map and keeps an
//! ordered log of every write. Wires model the physical coupling a
//! real rig would have: whenever a wired PWM's duty changes, the
//! attached tachometer file is recomputed proportionally. A fan with
//! no wire never changes, which is exactly what a dead or miswired
//! tachometer looks like from sysfs.

// Each test binary compiles this module separately and uses a
// different subset of it
#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aero_core::{Chip, FanTach, Inventory, PwmOutput, SysfsIo, TelemetrySink, TempSensor};

const FULL_SCALE_RAW: i64 = 255;

struct Wire {
    pwm: PathBuf,
    fan: PathBuf,
    full_rpm: i64,
}

#[derive(Default)]
pub struct FakeIo {
    state: Mutex<HashMap<PathBuf, i64>>,
    wires: Mutex<Vec<Wire>>,
    writes: Mutex<Vec<(PathBuf, i64)>>,
}

impl FakeIo {
    pub fn set(&self, path: impl Into<PathBuf>, value: i64) {
        self.state.lock().insert(path.into(), value);
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<i64> {
        self.state.lock().get(path.as_ref()).copied()
    }

    /// Make a file vanish, as a detached device's attributes do
    pub fn remove(&self, path: impl AsRef<Path>) {
        self.state.lock().remove(path.as_ref());
    }

    /// Couple a PWM duty file to a tachometer file: rpm = duty *
    /// full_rpm / 255, recomputed on every duty write.
    pub fn wire(&self, pwm: impl Into<PathBuf>, fan: impl Into<PathBuf>, full_rpm: i64) {
        self.wires.lock().push(Wire {
            pwm: pwm.into(),
            fan: fan.into(),
            full_rpm,
        });
    }

    pub fn writes_to(&self, path: impl AsRef<Path>) -> Vec<i64> {
        self.writes
            .lock()
            .iter()
            .filter(|(p, _)| p == path.as_ref())
            .map(|(_, v)| *v)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().clear();
    }
}

impl SysfsIo for FakeIo {
    fn read_int(&self, path: &Path) -> Option<i64> {
        self.state.lock().get(path).copied()
    }

    fn write_int(&self, path: &Path, value: i64) -> bool {
        let mut state = self.state.lock();
        if !state.contains_key(path) {
            // Mirrors sysfs: writing a file that does not exist fails
            return false;
        }
        state.insert(path.to_path_buf(), value);
        self.writes.lock().push((path.to_path_buf(), value));

        for wire in self.wires.lock().iter() {
            if wire.pwm == path {
                let rpm = value.clamp(0, FULL_SCALE_RAW) * wire.full_rpm / FULL_SCALE_RAW;
                state.insert(wire.fan.clone(), rpm);
            }
        }
        true
    }
}

/// A synthetic inventory plus the fake backend behind it
pub struct FakeRig {
    pub io: Arc<FakeIo>,
    pub inventory: Inventory,
}

impl FakeRig {
    pub fn new() -> Self {
        Self {
            io: Arc::new(FakeIo::default()),
            inventory: Inventory::default(),
        }
    }

    pub fn add_chip(&mut self, name: &str) -> usize {
        let id = self.inventory.chips.len();
        self.inventory.chips.push(Chip {
            id,
            name: name.to_string(),
            vendor: None,
        });
        id
    }

    pub fn add_temp(&mut self, chip_id: usize, number: u32, milli_c: i64) -> usize {
        let path = self.chip_file(chip_id, &format!("temp{}_input", number));
        self.io.set(&path, milli_c);
        self.inventory.temps.push(TempSensor {
            chip_id,
            name: format!("temp{}", number),
            number,
            input_path: path,
            label: None,
        });
        self.inventory.temps.len() - 1
    }

    pub fn add_fan(&mut self, chip_id: usize, number: u32, rpm: i64) -> usize {
        let path = self.chip_file(chip_id, &format!("fan{}_input", number));
        self.io.set(&path, rpm);
        self.inventory.fans.push(FanTach {
            chip_id,
            name: format!("fan{}", number),
            number,
            input_path: path,
            label: None,
        });
        self.inventory.fans.len() - 1
    }

    /// `enable`/`mode` control whether those files exist and their
    /// initial values
    pub fn add_pwm(
        &mut self,
        chip_id: usize,
        number: u32,
        raw: i64,
        enable: Option<i64>,
        mode: Option<i64>,
    ) -> usize {
        let pwm_path = self.chip_file(chip_id, &format!("pwm{}", number));
        let enable_path = self.chip_file(chip_id, &format!("pwm{}_enable", number));
        let mode_path = self.chip_file(chip_id, &format!("pwm{}_mode", number));

        self.io.set(&pwm_path, raw);
        if let Some(enable) = enable {
            self.io.set(&enable_path, enable);
        }
        if let Some(mode) = mode {
            self.io.set(&mode_path, mode);
        }

        self.inventory.pwms.push(PwmOutput {
            chip_id,
            name: format!("pwm{}", number),
            number,
            pwm_path,
            enable_path,
            mode_path: mode.map(|_| mode_path),
            max_raw: 255,
        });
        self.inventory.pwms.len() - 1
    }

    pub fn temp_path(&self, index: usize) -> PathBuf {
        self.inventory.temps[index].input_path.clone()
    }

    pub fn fan_path(&self, index: usize) -> PathBuf {
        self.inventory.fans[index].input_path.clone()
    }

    pub fn pwm_path(&self, index: usize) -> PathBuf {
        self.inventory.pwms[index].pwm_path.clone()
    }

    pub fn enable_path(&self, index: usize) -> PathBuf {
        self.inventory.pwms[index].enable_path.clone()
    }

    pub fn mode_path(&self, index: usize) -> Option<PathBuf> {
        self.inventory.pwms[index].mode_path.clone()
    }

    pub fn inventory(&self) -> Arc<Inventory> {
        Arc::new(self.inventory.clone())
    }

    fn chip_file(&self, chip_id: usize, file: &str) -> PathBuf {
        PathBuf::from(format!("/fake/hwmon{}/{}", chip_id, file))
    }
}

/// Telemetry sink that collects published lines
#[derive(Default)]
pub struct CollectSink {
    lines: Mutex<Vec<String>>,
}

impl CollectSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.lines.lock().last().cloned()
    }
}

impl TelemetrySink for CollectSink {
    fn publish(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}
