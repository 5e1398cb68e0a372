//! Constants and configuration defaults for aerod
//!
//! Centralizes all magic numbers, paths, and tunable defaults.
//! Never use a magic number in another file - add it here first.

use std::time::Duration;

/// System paths
pub mod paths {
    /// Base path for hwmon devices
    pub const HWMON_BASE: &str = "/sys/class/hwmon";

    /// System-wide configuration directory
    pub const CONFIG_DIR: &str = "/etc/aerod";

    /// Profile configuration file
    pub const PROFILE_FILE: &str = "profile.json";
}

/// PWM duty-cycle handling
pub mod pwm {
    /// Lowest duty percentage
    pub const MIN_PERCENT: u8 = 0;

    /// Highest duty percentage
    pub const MAX_PERCENT: u8 = 100;

    /// Raw duty ceiling assumed when a controller does not report one
    pub const DEFAULT_MAX_RAW: u32 = 255;

    /// Values accepted by pwmN_enable
    pub mod enable {
        /// No PWM output
        pub const DISABLED: u8 = 0;

        /// Software-controlled duty
        pub const MANUAL: u8 = 1;

        /// Hardware thermal control
        pub const AUTOMATIC: u8 = 2;
    }
}

/// Temperature unit conversion
pub mod temperature {
    /// hwmon reports temperatures in millidegrees Celsius
    pub const MILLIDEGREES_PER_DEGREE: i64 = 1000;
}

/// Control-loop cadence
pub mod timing {
    use super::Duration;

    /// Default interval between engine ticks
    pub const TICK_INTERVAL: Duration = Duration::from_millis(1000);
}

/// Engine behavior
pub mod engine {
    /// Consecutive duty-write failures before an output is treated as
    /// not writable and dropped from the binding set
    pub const MAX_WRITE_FAILURES: u32 = 10;
}

/// Engine write gating
pub mod gating {
    /// Evaluation is forced after this long without an applied tick,
    /// even if no sensor moved
    pub const DEFAULT_FORCE_TICK_MS: u64 = 2000;

    /// Minimum per-sensor movement (degrees Celsius) that triggers
    /// evaluation before the force interval elapses
    pub const DEFAULT_DELTA_C: f32 = 0.5;
}

/// Curve evaluation
pub mod curve {
    /// Lower knee of the fallback ramp used for empty curves
    pub const DEFAULT_RAMP_LOW_C: f32 = 40.0;
    pub const DEFAULT_RAMP_LOW_PERCENT: u8 = 20;

    /// Upper knee of the fallback ramp
    pub const DEFAULT_RAMP_HIGH_C: f32 = 80.0;
    pub const DEFAULT_RAMP_HIGH_PERCENT: u8 = 100;
}

/// Detection sweep defaults
///
/// Observed hardware varies widely here (3-7s spin-up, 30-100 RPM
/// deltas); these are defaults, not hard constants - every one of them
/// is overridable through `DetectionConfig`.
pub mod detection {
    use super::Duration;

    /// Pause after restoring a PWM before testing the next one
    pub const SETTLE_DELAY: Duration = Duration::from_millis(1000);

    /// How long to wait for tachometer evidence after driving a PWM
    pub const SPINUP_WINDOW: Duration = Duration::from_millis(5000);

    /// Tachometer poll cadence during spin-up and measurement
    pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// Total measurement duration, anchored at the first drive write
    pub const MEASURE_DURATION: Duration = Duration::from_millis(7000);

    /// Minimum RPM rise over baseline that counts as a response
    pub const RPM_DELTA_THRESH: u32 = 50;

    /// First duty step of the ramped drive-up
    pub const RAMP_START_PERCENT: u8 = 30;

    /// Final duty of the drive-up
    pub const RAMP_END_PERCENT: u8 = 100;

    /// Wait after flipping a pwmN_mode file before re-driving
    pub const MODE_DWELL: Duration = Duration::from_millis(500);
}
