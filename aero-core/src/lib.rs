//! aerod core library
//!
//! Monitors the hardware temperature and fan sensors exposed by the
//! kernel's hwmon subsystem and drives PWM fan outputs according to a
//! declarative profile, with an active probing sweep to discover which
//! output moves which fan on hardware with no static mapping.
//!
//! # Module structure
//!
//! - `hw/` - sysfs access, inventory scanning, PWM leases, detection
//! - `data/` - inventory and profile data types, validation
//! - `engine/` - profile compilation and per-tick evaluation
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use aero_core::{
//!     scan_inventory, Engine, EngineConfig, PwmLeases, Sysfs, TelemetrySink,
//! };
//!
//! struct Stdout;
//! impl TelemetrySink for Stdout {
//!     fn publish(&self, line: &str) {
//!         println!("{line}");
//!     }
//! }
//!
//! let io = Arc::new(Sysfs);
//! let inventory = Arc::new(scan_inventory(io.as_ref()));
//! let leases = PwmLeases::new();
//! let engine = Engine::new(inventory, io, leases, Arc::new(Stdout), EngineConfig::default());
//! engine.tick(0.5);
//! ```

// Grouped modules
pub mod data;
pub mod engine;
pub mod hw;

// Standalone modules
pub mod constants;

// Re-export the unified error types
pub use aero_error::{AeroError, Result};

// Re-export primary types from data/
pub use data::{
    validate_curve_points, validate_percent, validate_profile, Chip, ControlSpec, CurveKind,
    CurvePoint, FanCurveSpec, FanTach, Inventory, MixFunction, Profile, PwmOutput, TempSensor,
};

// Re-export engine types
pub use engine::{
    default_ramp, interp_percent, mix_percent, trigger_percent, Engine, EngineConfig,
    FanReading, PwmReport, TelemetryRecord, TelemetrySink, TempReading,
};

// Re-export hardware functions from hw/
pub use hw::{
    percent_from_raw, raw_from_percent, read_enable, read_milli_c, read_mode, read_raw,
    read_rpm, scan_inventory, scan_inventory_at, set_enable, set_manual, set_mode,
    set_percent, set_raw, DetectPhase, Detection, DetectionConfig, DetectionStatus,
    PwmLease, PwmLeases, PwmMapping, Sysfs, SysfsIo,
};
