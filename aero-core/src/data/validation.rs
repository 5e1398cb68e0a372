//! Profile validation
//!
//! Used by profile loaders before a [`Profile`] reaches the engine.
//! The engine itself tolerates anything that deserializes - it drops
//! unresolvable references with a log - so these checks exist to give
//! the operator an actionable error at load time instead of a silently
//! inert control.
//!
//! [`Profile`]: crate::data::Profile

use aero_error::{AeroError, Result};

use crate::constants::pwm;
use crate::data::{CurvePoint, Profile};

/// Validates that a duty percentage is within 0-100
pub fn validate_percent(value: u8) -> Result<u8> {
    if value > pwm::MAX_PERCENT {
        return Err(AeroError::config(format!(
            "percentage {} out of range (0-100)",
            value
        )));
    }
    Ok(value)
}

/// Validates curve points: finite temperatures, ascending order,
/// in-range percentages. An empty list is accepted - evaluation falls
/// back to the default ramp.
pub fn validate_curve_points(points: &[CurvePoint]) -> Result<()> {
    for point in points {
        if !point.temp_c.is_finite() {
            return Err(AeroError::config(format!(
                "non-finite curve temperature {}",
                point.temp_c
            )));
        }
        validate_percent(point.percent)?;
    }
    for pair in points.windows(2) {
        if pair[1].temp_c < pair[0].temp_c {
            return Err(AeroError::config(format!(
                "curve points out of order: {}°C after {}°C",
                pair[1].temp_c, pair[0].temp_c
            )));
        }
    }
    Ok(())
}

/// Validates a whole profile: unique curve names, resolvable intra-
/// profile references, well-formed points and trigger configs.
///
/// Hardware references (`pwm_ref`, `temp_sensor_refs`) are NOT checked
/// here - they resolve against a live inventory at `apply_profile`
/// time and missing hardware is not a load error.
pub fn validate_profile(profile: &Profile) -> Result<()> {
    let mut names = std::collections::HashSet::new();
    for curve in &profile.fan_curves {
        if curve.name.is_empty() {
            return Err(AeroError::config("curve with empty name"));
        }
        if !names.insert(curve.name.as_str()) {
            return Err(AeroError::config_invalid(
                &curve.name,
                "duplicate curve name",
            ));
        }
        validate_curve_points(&curve.points)?;
        if let Some(percent) = curve.idle_percent {
            validate_percent(percent)?;
        }
        if let Some(percent) = curve.load_percent {
            validate_percent(percent)?;
        }
        for reference in &curve.mix_refs {
            if profile.fan_curves.iter().all(|c| &c.name != reference) {
                return Err(AeroError::config_invalid(
                    reference,
                    format!("mix curve '{}' references no curve in profile", curve.name),
                ));
            }
        }
        if curve.mix_refs.iter().any(|r| r == &curve.name) {
            return Err(AeroError::config_invalid(
                &curve.name,
                "mix curve references itself",
            ));
        }
    }

    for control in &profile.controls {
        validate_percent(control.min_percent)?;
        if control.pwm_ref.is_empty() {
            return Err(AeroError::config_invalid(
                &control.name,
                "control with empty PWM reference",
            ));
        }
        if profile
            .fan_curves
            .iter()
            .all(|c| c.name != control.curve_ref)
        {
            return Err(AeroError::config_invalid(
                &control.curve_ref,
                format!("control '{}' references no curve in profile", control.name),
            ));
        }
    }

    Ok(())
}
