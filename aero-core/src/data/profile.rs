//! Declarative fan-control profiles
//!
//! A [`Profile`] names a set of curves and binds them to physical PWM
//! outputs. Profiles are owned by the profile I/O collaborator (the
//! daemon's loader, a GUI, an RPC client); the engine receives one by
//! value and never mutates or persists it.
//!
//! Serialized form follows the profile schema:
//! `{schema, name, description, fanCurves, controls, hwmons}`.

use serde::{Deserialize, Serialize};

/// A point on a fan curve
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurvePoint {
    pub temp_c: f32,
    /// Duty percentage, 0-100
    pub percent: u8,
}

/// How a curve derives its output
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CurveKind {
    /// Piecewise-linear interpolation over `points`
    #[default]
    Graph,
    /// Aggregation over other named curves
    Mix,
    /// Two-point idle/load mapping
    Trigger,
}

/// Aggregation function used by mix curves
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MixFunction {
    #[default]
    Max,
    Min,
    /// Integer average, truncated
    Avg,
}

/// Declarative curve, identified by name within its profile
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FanCurveSpec {
    pub name: String,
    pub kind: CurveKind,
    /// Temperature sources this curve reads; the first resolvable
    /// reference wins
    pub temp_sensor_refs: Vec<String>,
    pub points: Vec<CurvePoint>,
    pub mix_function: Option<MixFunction>,
    /// Names of member curves for mix aggregation
    pub mix_refs: Vec<String>,
    pub idle_c: Option<f32>,
    pub idle_percent: Option<u8>,
    pub load_c: Option<f32>,
    pub load_percent: Option<u8>,
}

/// Binds one named curve to one physical PWM output
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlSpec {
    pub name: String,
    /// Stable "chip/pwmN" identifier, exact path, or legacy substring
    pub pwm_ref: String,
    /// Name of a curve in the same profile
    pub curve_ref: String,
    /// Floor applied after evaluation
    pub min_percent: u8,
}

/// A complete, named control policy
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub schema: u32,
    pub name: String,
    pub description: String,
    pub fan_curves: Vec<FanCurveSpec>,
    pub controls: Vec<ControlSpec>,
    /// Chip names recorded by the profile builder; informational only
    pub hwmons: Vec<String>,
}
