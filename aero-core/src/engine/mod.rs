//! Control engine: profile compilation and per-tick evaluation
//!
//! [`Engine::apply_profile`] compiles a declarative [`Profile`] into
//! resolved bindings; [`Engine::tick`] evaluates them against live
//! readings and writes duty cycles when control is enabled. Binding
//! sets are replaced wholesale - a tick never observes a partially
//! applied profile, and applying a profile touches no hardware until
//! the next tick.
//!
//! # Gating
//!
//! A tick evaluates and writes only when enough time has passed since
//! the last applied tick (`force_tick_ms`) OR some sensor moved by at
//! least the caller's `delta_c`. Otherwise it publishes a reduced
//! telemetry line (temperatures only) and returns. This bounds sysfs
//! write frequency without starving responsiveness.
//!
//! # Failure behavior
//!
//! One sensor failing to read never fails the tick: a curve whose
//! source is unavailable falls back to the hottest currently-known
//! temperature, and with no readings at all it runs at the top of its
//! range. Unresolvable profile references are dropped at compile time
//! with a log, not an error.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

mod curve;
pub use curve::{default_ramp, interp_percent, mix_percent, trigger_percent};

use crate::constants::{curve as curve_const, engine as engine_const, gating, pwm, temperature};
use crate::data::{CurveKind, CurvePoint, FanCurveSpec, Inventory, MixFunction, Profile};
use crate::hw::{self, PwmLeases, SysfsIo};

/// Receives one telemetry line per tick.
///
/// Append-only and best-effort; the transport (file, socket, ring) is
/// the embedding process's concern.
pub trait TelemetrySink: Send + Sync {
    fn publish(&self, line: &str);
}

/// Engine tunables
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Evaluation is forced when this much time has passed since the
    /// last applied tick, regardless of temperature movement
    pub force_tick_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            force_tick_ms: gating::DEFAULT_FORCE_TICK_MS,
        }
    }
}

/// One member curve with its own resolved temperature source
struct CurveEval {
    points: Vec<CurvePoint>,
    temp_index: Option<usize>,
}

impl CurveEval {
    /// Evaluate against this member's own sensor, falling back to the
    /// hottest known temperature when the source is unavailable.
    fn eval(&self, temps_c: &[Option<f32>], hottest_c: Option<f32>) -> u8 {
        let own = self.temp_index.and_then(|index| temps_c.get(index).copied().flatten());
        match own.or(hottest_c) {
            Some(temp_c) => interp_percent(&self.points, temp_c),
            // No reading anywhere: run at the top of the range
            None => interp_percent(&self.points, f32::MAX),
        }
    }
}

enum Evaluator {
    Curve(CurveEval),
    Mix {
        function: MixFunction,
        members: Vec<CurveEval>,
    },
    Trigger {
        idle_c: f32,
        idle_percent: u8,
        load_c: f32,
        load_percent: u8,
        temp_index: Option<usize>,
    },
}

/// Resolved link from a physical PWM output to its evaluation logic
struct Binding {
    pwm_index: usize,
    min_percent: u8,
    evaluator: Evaluator,
    /// Consecutive failed duty writes; the binding is dropped once
    /// this reaches the not-writable threshold
    write_failures: u32,
}

impl Binding {
    fn eval(&self, temps_c: &[Option<f32>], hottest_c: Option<f32>) -> u8 {
        let percent = match &self.evaluator {
            Evaluator::Curve(member) => member.eval(temps_c, hottest_c),
            Evaluator::Mix { function, members } => {
                let parts: Vec<u8> = members
                    .iter()
                    .map(|member| member.eval(temps_c, hottest_c))
                    .collect();
                mix_percent(*function, &parts)
            }
            Evaluator::Trigger {
                idle_c,
                idle_percent,
                load_c,
                load_percent,
                temp_index,
            } => {
                let own = temp_index.and_then(|index| temps_c.get(index).copied().flatten());
                match own.or(hottest_c) {
                    Some(temp_c) => {
                        trigger_percent(*idle_c, *idle_percent, *load_c, *load_percent, temp_c)
                    }
                    None => (*load_percent).min(pwm::MAX_PERCENT),
                }
            }
        };
        percent.clamp(self.min_percent, pwm::MAX_PERCENT)
    }
}

struct GateState {
    last_applied: Option<Instant>,
    /// milli°C per inventory temp index at the last applied tick
    last_milli_c: Vec<Option<i64>>,
}

/// One telemetry line, serialized as JSON
#[derive(Debug, Serialize)]
pub struct TelemetryRecord {
    pub timestamp_ms: u64,
    /// Whether this tick evaluated and (with control enabled) wrote
    pub applied: bool,
    pub temps: Vec<TempReading>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fans: Vec<FanReading>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pwms: Vec<PwmReport>,
}

#[derive(Debug, Serialize)]
pub struct TempReading {
    pub name: String,
    pub celsius: f32,
}

#[derive(Debug, Serialize)]
pub struct FanReading {
    pub name: String,
    pub rpm: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct PwmReport {
    pub name: String,
    /// Percent actually written this tick, `None` when not written
    pub percent: Option<u8>,
}

/// The control engine. All public methods are thread-safe and
/// non-blocking apart from the sysfs calls themselves.
pub struct Engine {
    inventory: Arc<Inventory>,
    io: Arc<dyn SysfsIo>,
    leases: Arc<PwmLeases>,
    sink: Arc<dyn TelemetrySink>,
    config: EngineConfig,
    control_enabled: AtomicBool,
    bindings: RwLock<Vec<Binding>>,
    gate: Mutex<GateState>,
}

impl Engine {
    pub fn new(
        inventory: Arc<Inventory>,
        io: Arc<dyn SysfsIo>,
        leases: Arc<PwmLeases>,
        sink: Arc<dyn TelemetrySink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            inventory,
            io,
            leases,
            sink,
            config,
            control_enabled: AtomicBool::new(false),
            bindings: RwLock::new(Vec::new()),
            gate: Mutex::new(GateState {
                last_applied: None,
                last_milli_c: Vec::new(),
            }),
        }
    }

    /// Compile a profile into bindings, replacing the previous set
    /// wholesale. Touches no hardware; idempotent.
    ///
    /// Controls whose references do not resolve are dropped with a
    /// log - a profile written for other hardware still applies as
    /// far as it can.
    pub fn apply_profile(&self, profile: Profile) {
        let curves = curve_table(&profile);
        let mut bindings = Vec::new();
        let mut dropped = 0usize;

        for control in &profile.controls {
            let Some(pwm_index) = self.inventory.resolve_pwm(&control.pwm_ref) else {
                warn!(
                    control = %control.name,
                    reference = %control.pwm_ref,
                    "control references no known PWM output, dropping"
                );
                dropped += 1;
                continue;
            };
            let Some(spec) = curves.get(&control.curve_ref) else {
                warn!(
                    control = %control.name,
                    reference = %control.curve_ref,
                    "control references no curve in profile, dropping"
                );
                dropped += 1;
                continue;
            };

            bindings.push(Binding {
                pwm_index,
                min_percent: control.min_percent.min(pwm::MAX_PERCENT),
                evaluator: self.compile_evaluator(spec, &curves),
                write_failures: 0,
            });
        }

        info!(
            profile = %profile.name,
            bound = bindings.len(),
            dropped,
            "profile applied"
        );
        *self.bindings.write() = bindings;
    }

    /// Toggle whether `tick` may write hardware. Sensors are still
    /// read and telemetry still published when disabled.
    pub fn enable_control(&self, enabled: bool) {
        let was = self.control_enabled.swap(enabled, Ordering::SeqCst);
        if was != enabled {
            info!(enabled, "fan control toggled");
        }
    }

    pub fn control_enabled(&self) -> bool {
        self.control_enabled.load(Ordering::SeqCst)
    }

    /// Number of currently bound controls
    pub fn binding_count(&self) -> usize {
        self.bindings.read().len()
    }

    /// One control cycle: read sensors, decide whether to evaluate,
    /// write duties, publish telemetry.
    ///
    /// `delta_c` is the per-sensor movement (degrees Celsius) that
    /// forces evaluation before `force_tick_ms` elapses.
    pub fn tick(&self, delta_c: f32) {
        let io = self.io.as_ref();

        let milli_c: Vec<Option<i64>> = self
            .inventory
            .temps
            .iter()
            .map(|temp| hw::read_milli_c(io, temp))
            .collect();

        let proceed = {
            let gate = self.gate.lock();
            self.should_apply(&gate, &milli_c, delta_c)
        };

        if !proceed {
            debug!("tick gated, publishing reduced telemetry");
            self.publish(false, &milli_c, Vec::new(), Vec::new());
            return;
        }

        let temps_c: Vec<Option<f32>> = milli_c.iter().map(|m| m.map(to_celsius)).collect();
        let hottest_c = temps_c.iter().copied().flatten().reduce(f32::max);

        let mut written: HashMap<usize, u8> = HashMap::new();
        if self.control_enabled() {
            let mut bindings = self.bindings.write();
            for binding in bindings.iter_mut() {
                if self.leases.is_held(binding.pwm_index) {
                    debug!(
                        pwm = %self.inventory.pwm_name(binding.pwm_index),
                        "output leased by detection, skipping write"
                    );
                    continue;
                }
                let percent = binding.eval(&temps_c, hottest_c);
                let pwm = &self.inventory.pwms[binding.pwm_index];
                if !hw::set_manual(io, pwm) {
                    warn!(
                        pwm = %self.inventory.pwm_name(binding.pwm_index),
                        "could not confirm manual mode"
                    );
                }
                if hw::set_percent(io, pwm, percent) {
                    binding.write_failures = 0;
                    written.insert(binding.pwm_index, percent);
                } else {
                    binding.write_failures += 1;
                    warn!(
                        pwm = %self.inventory.pwm_name(binding.pwm_index),
                        percent,
                        failures = binding.write_failures,
                        "duty write failed"
                    );
                }
            }
            bindings.retain(|binding| {
                if binding.write_failures >= engine_const::MAX_WRITE_FAILURES {
                    warn!(
                        pwm = %self.inventory.pwm_name(binding.pwm_index),
                        "write capability not confirmed, excluding output from bindings"
                    );
                    false
                } else {
                    true
                }
            });
        }

        let fans: Vec<FanReading> = self
            .inventory
            .fans
            .iter()
            .enumerate()
            .map(|(index, fan)| FanReading {
                name: self.inventory.fan_name(index),
                rpm: hw::read_rpm(io, fan),
            })
            .collect();
        let pwms: Vec<PwmReport> = (0..self.inventory.pwms.len())
            .map(|index| PwmReport {
                name: self.inventory.pwm_name(index),
                percent: written.get(&index).copied(),
            })
            .collect();

        self.publish(true, &milli_c, fans, pwms);

        let mut gate = self.gate.lock();
        gate.last_applied = Some(Instant::now());
        gate.last_milli_c = milli_c;
    }

    fn should_apply(&self, gate: &GateState, milli_c: &[Option<i64>], delta_c: f32) -> bool {
        let Some(last_applied) = gate.last_applied else {
            return true;
        };
        if last_applied.elapsed() >= Duration::from_millis(self.config.force_tick_ms) {
            return true;
        }

        let threshold_milli = (delta_c * temperature::MILLIDEGREES_PER_DEGREE as f32) as i64;
        for (index, current) in milli_c.iter().enumerate() {
            let last = gate.last_milli_c.get(index).copied().flatten();
            match (current, last) {
                (Some(current), Some(last)) => {
                    if (current - last).abs() >= threshold_milli {
                        return true;
                    }
                }
                // A sensor appearing or vanishing counts as movement
                (Some(_), None) | (None, Some(_)) => return true,
                (None, None) => {}
            }
        }
        false
    }

    /// Mode selection: a spec is a mix when it declares members (or is
    /// marked as one), a trigger when it declares idle/load fields, and
    /// a plain curve otherwise.
    fn compile_evaluator(
        &self,
        spec: &FanCurveSpec,
        curves: &HashMap<String, FanCurveSpec>,
    ) -> Evaluator {
        if spec.kind == CurveKind::Mix || !spec.mix_refs.is_empty() {
            let members: Vec<CurveEval> = spec
                .mix_refs
                .iter()
                .filter_map(|reference| match curves.get(reference) {
                    Some(member) => Some(self.curve_eval(member)),
                    None => {
                        warn!(
                            curve = %spec.name,
                            reference = %reference,
                            "mix member does not resolve, skipping"
                        );
                        None
                    }
                })
                .collect();
            return Evaluator::Mix {
                function: spec.mix_function.unwrap_or_default(),
                members,
            };
        }

        if spec.kind == CurveKind::Trigger || spec.idle_c.is_some() || spec.load_c.is_some() {
            return Evaluator::Trigger {
                idle_c: spec.idle_c.unwrap_or(curve_const::DEFAULT_RAMP_LOW_C),
                idle_percent: spec
                    .idle_percent
                    .unwrap_or(curve_const::DEFAULT_RAMP_LOW_PERCENT)
                    .min(pwm::MAX_PERCENT),
                load_c: spec.load_c.unwrap_or(curve_const::DEFAULT_RAMP_HIGH_C),
                load_percent: spec
                    .load_percent
                    .unwrap_or(curve_const::DEFAULT_RAMP_HIGH_PERCENT)
                    .min(pwm::MAX_PERCENT),
                temp_index: self.resolve_source(spec),
            };
        }

        Evaluator::Curve(self.curve_eval(spec))
    }

    fn curve_eval(&self, spec: &FanCurveSpec) -> CurveEval {
        CurveEval {
            points: spec.points.clone(),
            temp_index: self.resolve_source(spec),
        }
    }

    fn resolve_source(&self, spec: &FanCurveSpec) -> Option<usize> {
        for reference in &spec.temp_sensor_refs {
            if let Some(index) = self.inventory.resolve_temp(reference) {
                return Some(index);
            }
        }
        if !spec.temp_sensor_refs.is_empty() {
            warn!(
                curve = %spec.name,
                refs = ?spec.temp_sensor_refs,
                "no temperature reference resolves, will fall back to hottest sensor"
            );
        }
        None
    }

    fn publish(
        &self,
        applied: bool,
        milli_c: &[Option<i64>],
        fans: Vec<FanReading>,
        pwms: Vec<PwmReport>,
    ) {
        let temps: Vec<TempReading> = milli_c
            .iter()
            .enumerate()
            .filter_map(|(index, reading)| {
                reading.map(|m| TempReading {
                    name: self.inventory.temp_name(index),
                    celsius: to_celsius(m),
                })
            })
            .collect();

        let record = TelemetryRecord {
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            applied,
            temps,
            fans,
            pwms,
        };

        match serde_json::to_string(&record) {
            Ok(line) => self.sink.publish(&line),
            Err(e) => warn!(error = %e, "telemetry serialization failed"),
        }
    }
}

/// Sort each curve's points by temperature and clamp percentages; the
/// table is keyed by curve name.
fn curve_table(profile: &Profile) -> HashMap<String, FanCurveSpec> {
    let mut curves = HashMap::new();
    for spec in &profile.fan_curves {
        let mut spec = spec.clone();
        spec.points.sort_by(|a, b| {
            a.temp_c
                .partial_cmp(&b.temp_c)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for point in &mut spec.points {
            point.percent = point.percent.min(pwm::MAX_PERCENT);
        }
        if curves.insert(spec.name.clone(), spec).is_some() {
            warn!("duplicate curve name in profile, last one wins");
        }
    }
    curves
}

fn to_celsius(milli_c: i64) -> f32 {
    milli_c as f32 / temperature::MILLIDEGREES_PER_DEGREE as f32
}
