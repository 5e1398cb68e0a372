//! Curve evaluation primitives
//!
//! Pure functions mapping a temperature to a duty percentage. The
//! engine composes these per binding; nothing here holds state.
//!
//! # Semantics
//!
//! - Below the first point: the first point's percentage
//! - Above the last point: the last point's percentage
//! - Between points: linear interpolation
//! - Empty curve: the default safety ramp (20% at 40°C and below,
//!   100% at 80°C and above)

use crate::constants::{curve as curve_const, pwm};
use crate::data::{CurvePoint, MixFunction};

/// Piecewise-linear interpolation over temperature-sorted points
pub fn interp_percent(points: &[CurvePoint], temp_c: f32) -> u8 {
    let first = match points.first() {
        Some(first) => first,
        None => return default_ramp(temp_c),
    };
    // Non-empty, so last always exists
    let last = points.last().expect("non-empty curve");

    if temp_c <= first.temp_c {
        return first.percent.min(pwm::MAX_PERCENT);
    }
    if temp_c >= last.temp_c {
        return last.percent.min(pwm::MAX_PERCENT);
    }

    for pair in points.windows(2) {
        let (lower, upper) = (&pair[0], &pair[1]);
        if temp_c >= lower.temp_c && temp_c <= upper.temp_c {
            return lerp_percent(
                lower.temp_c,
                lower.percent,
                upper.temp_c,
                upper.percent,
                temp_c,
            );
        }
    }

    // Unreachable with sorted points; clamp high if they were not
    last.percent.min(pwm::MAX_PERCENT)
}

/// Safety ramp used when a curve has no points
pub fn default_ramp(temp_c: f32) -> u8 {
    lerp_percent(
        curve_const::DEFAULT_RAMP_LOW_C,
        curve_const::DEFAULT_RAMP_LOW_PERCENT,
        curve_const::DEFAULT_RAMP_HIGH_C,
        curve_const::DEFAULT_RAMP_HIGH_PERCENT,
        temp_c,
    )
}

/// Two-point idle/load mapping, linear in between, clamped to the
/// nearer endpoint outside the range
pub fn trigger_percent(
    idle_c: f32,
    idle_percent: u8,
    load_c: f32,
    load_percent: u8,
    temp_c: f32,
) -> u8 {
    if idle_c <= load_c {
        lerp_percent(idle_c, idle_percent, load_c, load_percent, temp_c)
    } else {
        lerp_percent(load_c, load_percent, idle_c, idle_percent, temp_c)
    }
}

/// Aggregate mix member outputs; an empty member list yields 0%
pub fn mix_percent(function: MixFunction, parts: &[u8]) -> u8 {
    if parts.is_empty() {
        return 0;
    }
    match function {
        MixFunction::Max => *parts.iter().max().expect("non-empty"),
        MixFunction::Min => *parts.iter().min().expect("non-empty"),
        MixFunction::Avg => {
            let sum: u32 = parts.iter().map(|p| u32::from(*p)).sum();
            (sum / parts.len() as u32) as u8
        }
    }
}

fn lerp_percent(low_c: f32, low_percent: u8, high_c: f32, high_percent: u8, temp_c: f32) -> u8 {
    let low_percent = low_percent.min(pwm::MAX_PERCENT);
    let high_percent = high_percent.min(pwm::MAX_PERCENT);

    if temp_c <= low_c {
        return low_percent;
    }
    if temp_c >= high_c {
        return high_percent;
    }

    let span = high_c - low_c;
    if span <= f32::EPSILON {
        return low_percent;
    }

    let ratio = (temp_c - low_c) / span;
    let percent = f32::from(low_percent) + ratio * (f32::from(high_percent) - f32::from(low_percent));
    percent.round().clamp(0.0, f32::from(pwm::MAX_PERCENT)) as u8
}
