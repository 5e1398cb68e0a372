//! Inventory scanning for hwmon devices
//!
//! Walks the hwmon tree once and produces the immutable [`Inventory`]
//! snapshot everything else consumes. Scanning is best-effort and
//! never fails: unreadable chips are skipped, a missing `pwmN_max`
//! falls back to 255, and an empty tree yields an empty inventory.
//!
//! # Recognized nodes
//!
//! - `tempN_input` - temperature in millidegrees Celsius
//! - `fanN_input` - tachometer in RPM
//! - `pwmN` - duty output, with optional `pwmN_enable` / `pwmN_mode`

use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, trace};

use crate::constants::{paths, pwm};
use crate::data::{Chip, FanTach, Inventory, PwmOutput, TempSensor};
use crate::hw::SysfsIo;

fn temp_input_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^temp(\d+)_input$").expect("static regex"))
}

fn fan_input_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^fan(\d+)_input$").expect("static regex"))
}

fn pwm_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^pwm(\d+)$").expect("static regex"))
}

/// Scan the system hwmon tree
pub fn scan_inventory(io: &dyn SysfsIo) -> Inventory {
    scan_inventory_at(io, Path::new(paths::HWMON_BASE))
}

/// Scan an arbitrary hwmon-shaped tree (tests use a temp directory)
pub fn scan_inventory_at(io: &dyn SysfsIo, root: &Path) -> Inventory {
    let mut inventory = Inventory::default();

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(root = ?root, error = %e, "hwmon root not readable");
            return inventory;
        }
    };

    // Deterministic chip ids: sort by directory name (hwmon0, hwmon1, ...)
    let mut chip_dirs: Vec<_> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    chip_dirs.sort();

    for chip_path in chip_dirs {
        scan_chip(io, &chip_path, &mut inventory);
    }

    info!(
        chips = inventory.chips.len(),
        temps = inventory.temps.len(),
        fans = inventory.fans.len(),
        pwms = inventory.pwms.len(),
        "Inventory scan complete"
    );

    inventory
}

fn scan_chip(io: &dyn SysfsIo, chip_path: &Path, inventory: &mut Inventory) {
    let name = read_trimmed(&chip_path.join("name")).unwrap_or_else(|| {
        chip_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    });
    let vendor = read_trimmed(&chip_path.join("device/vendor"));

    let entries = match fs::read_dir(chip_path) {
        Ok(entries) => entries,
        Err(e) => {
            trace!(chip = %name, error = %e, "chip directory not readable");
            return;
        }
    };
    let mut files: Vec<String> = entries
        .flatten()
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    files.sort();

    let chip_id = inventory.chips.len();
    let mut temps = Vec::new();
    let mut fans = Vec::new();
    let mut pwms = Vec::new();

    for file in &files {
        if let Some(caps) = temp_input_re().captures(file) {
            let number: u32 = caps[1].parse().unwrap_or(0);
            let base = format!("temp{}", number);
            temps.push(TempSensor {
                chip_id,
                name: base.clone(),
                number,
                input_path: chip_path.join(file),
                label: read_trimmed(&chip_path.join(format!("{}_label", base))),
            });
        } else if let Some(caps) = fan_input_re().captures(file) {
            let number: u32 = caps[1].parse().unwrap_or(0);
            let base = format!("fan{}", number);
            fans.push(FanTach {
                chip_id,
                name: base.clone(),
                number,
                input_path: chip_path.join(file),
                label: read_trimmed(&chip_path.join(format!("{}_label", base))),
            });
        } else if let Some(caps) = pwm_re().captures(file) {
            let number: u32 = caps[1].parse().unwrap_or(0);
            let mode_path = chip_path.join(format!("{}_mode", file));
            let max_path = chip_path.join(format!("{}_max", file));
            let max_raw = io
                .read_int(&max_path)
                .and_then(|value| u32::try_from(value).ok())
                .filter(|max| *max > 0)
                .unwrap_or(pwm::DEFAULT_MAX_RAW);
            pwms.push(PwmOutput {
                chip_id,
                name: file.clone(),
                number,
                pwm_path: chip_path.join(file),
                enable_path: chip_path.join(format!("{}_enable", file)),
                mode_path: mode_path.exists().then_some(mode_path),
                max_raw,
            });
        }
    }

    if temps.is_empty() && fans.is_empty() && pwms.is_empty() {
        trace!(chip = %name, path = ?chip_path, "skipped chip with no usable sensors");
        return;
    }

    debug!(
        chip = %name,
        temps = temps.len(),
        fans = fans.len(),
        pwms = pwms.len(),
        "Found hwmon chip"
    );

    inventory.chips.push(Chip {
        id: chip_id,
        name,
        vendor,
    });
    inventory.temps.extend(temps);
    inventory.fans.extend(fans);
    inventory.pwms.extend(pwms);
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
}
