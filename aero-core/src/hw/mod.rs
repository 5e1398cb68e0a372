//! Hardware interaction modules
//!
//! Contains all low-level hwmon access: the sysfs boundary, inventory
//! scanning, per-PWM write leases, and the detection sweep.

mod detection;
mod inventory;
mod lease;
mod sysfs;

pub use detection::{DetectPhase, Detection, DetectionConfig, DetectionStatus, PwmMapping};
pub use inventory::{scan_inventory, scan_inventory_at};
pub use lease::{PwmLease, PwmLeases};
pub use sysfs::{
    percent_from_raw, raw_from_percent, read_enable, read_milli_c, read_mode, read_raw,
    read_rpm, set_enable, set_manual, set_mode, set_percent, set_raw, Sysfs, SysfsIo,
};
