//! Active PWM-to-fan detection
//!
//! Drives each PWM output in turn and watches the tachometers for a
//! response, producing the peak RPM each output can reach - or
//! `Unmapped` when nothing reacts. The sweep is hardware-disruptive:
//! every touched value (duty, enable, mode) is snapshotted first and
//! written back afterwards, on abort included.
//!
//! # Sweep sequence
//!
//! `Prepare -> {Spinup(i) -> Measure(i) -> Restore(i)}* -> RestoreAll -> Done`
//!
//! Abort is reachable from any state and always routes through
//! `RestoreAll`. Outputs are tested strictly one at a time: parallel
//! spin-up tests would cross-talk through shared airflow, and the
//! global fan-claiming fallback needs a total order.
//!
//! # Candidate selection
//!
//! For PWM `pwmN` the candidate tachometers are, in order of
//! preference: fans on the same chip whose slot matches `N`, any fan
//! on the same chip, and finally any fan in the whole inventory not
//! already claimed by an earlier output in this sweep. A fan matched
//! through the global fallback is claimed so two outputs cannot be
//! attributed to the same tachometer by coincidence.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use aero_error::{AeroError, Result};

use crate::constants::detection as det;
use crate::data::Inventory;
use crate::hw::{self, PwmLeases, SysfsIo};

/// Tunables for a detection sweep; immutable once the sweep starts
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Pause after restoring an output before testing the next one
    pub settle_delay: Duration,
    /// How long to wait for tachometer evidence after driving
    pub spinup_window: Duration,
    /// Tachometer poll cadence
    pub poll_interval: Duration,
    /// Total measurement duration, anchored at the first drive write
    pub measure_duration: Duration,
    /// Minimum RPM rise over baseline that counts as a response
    pub rpm_delta_thresh: u32,
    /// First duty step of the ramped drive-up
    pub ramp_start_percent: u8,
    /// Final duty of the drive-up
    pub ramp_end_percent: u8,
    /// Wait after flipping a pwmN_mode file before re-driving
    pub mode_dwell: Duration,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            settle_delay: det::SETTLE_DELAY,
            spinup_window: det::SPINUP_WINDOW,
            poll_interval: det::POLL_INTERVAL,
            measure_duration: det::MEASURE_DURATION,
            rpm_delta_thresh: det::RPM_DELTA_THRESH,
            ramp_start_percent: det::RAMP_START_PERCENT,
            ramp_end_percent: det::RAMP_END_PERCENT,
            mode_dwell: det::MODE_DWELL,
        }
    }
}

/// Where a sweep currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectPhase {
    Idle,
    Prepare,
    Spinup,
    Measure,
    Restore,
    RestoreAll,
    Done,
}

/// Point-in-time view of a sweep; safe to read from any thread
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DetectionStatus {
    pub running: bool,
    /// Inventory index of the output under test
    pub current_index: usize,
    /// Number of outputs in the sweep
    pub total: usize,
    pub phase: DetectPhase,
}

/// Outcome for one PWM output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PwmMapping {
    /// The output demonstrably drives `fan_index`; `peak_rpm` is the
    /// highest reading observed at full duty
    Mapped { peak_rpm: u32, fan_index: usize },
    /// No tachometer evidence within the spin-up window
    Unmapped,
}

/// Saved pre-test state of one PWM output
#[derive(Debug, Clone, Copy)]
struct PwmSnapshot {
    pwm_index: usize,
    raw: Option<u32>,
    enable: Option<u8>,
    mode: Option<u8>,
}

enum ProbeOutcome {
    Mapped {
        peak_rpm: u32,
        fan_index: usize,
        via_fallback: bool,
    },
    Unmapped,
    Aborted,
}

/// Cancelable PWM-to-fan detection worker.
///
/// One instance runs at most one sweep; `start` while a sweep is
/// active returns [`AeroError::AlreadyRunning`].
pub struct Detection {
    inner: Arc<DetectInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct DetectInner {
    inventory: Arc<Inventory>,
    io: Arc<dyn SysfsIo>,
    leases: Arc<PwmLeases>,
    config: DetectionConfig,
    running: AtomicBool,
    stop: AtomicBool,
    status: Mutex<DetectionStatus>,
    results: Mutex<BTreeMap<usize, PwmMapping>>,
}

impl Detection {
    pub fn new(
        inventory: Arc<Inventory>,
        io: Arc<dyn SysfsIo>,
        leases: Arc<PwmLeases>,
        config: DetectionConfig,
    ) -> Self {
        let total = inventory.pwms.len();
        Self {
            inner: Arc::new(DetectInner {
                inventory,
                io,
                leases,
                config,
                running: AtomicBool::new(false),
                stop: AtomicBool::new(false),
                status: Mutex::new(DetectionStatus {
                    running: false,
                    current_index: 0,
                    total,
                    phase: DetectPhase::Idle,
                }),
                results: Mutex::new(BTreeMap::new()),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Begin a sweep on a dedicated worker thread.
    pub fn start(&self) -> Result<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(AeroError::AlreadyRunning);
        }

        // Reap the previous worker, if any; it has already finished
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }

        self.inner.stop.store(false, Ordering::SeqCst);
        self.inner.results.lock().clear();
        *self.inner.status.lock() = DetectionStatus {
            running: true,
            current_index: 0,
            total: self.inner.inventory.pwms.len(),
            phase: DetectPhase::Prepare,
        };

        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("aero-detect".into())
            .spawn(move || {
                run_sweep(&inner);
                let mut status = inner.status.lock();
                status.running = false;
                status.phase = DetectPhase::Done;
                drop(status);
                inner.running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| AeroError::generic(format!("failed to spawn detection worker: {e}")))?;
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    /// Request cancellation. Non-blocking; the worker restores every
    /// touched output before exiting.
    pub fn abort(&self) {
        if self.inner.running.load(Ordering::SeqCst) {
            info!("detection abort requested");
        }
        self.inner.stop.store(true, Ordering::SeqCst);
    }

    /// Owned status snapshot
    pub fn status(&self) -> DetectionStatus {
        *self.inner.status.lock()
    }

    /// Owned copy of the results gathered so far. Outputs not yet
    /// reached are absent, not zeroed.
    pub fn results(&self) -> BTreeMap<usize, PwmMapping> {
        self.inner.results.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Block until the current sweep's worker has exited. Intended for
    /// embedders that run a sweep synchronously (and for tests).
    pub fn wait(&self) {
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

impl DetectInner {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn set_status(&self, current_index: usize, phase: DetectPhase) {
        let mut status = self.status.lock();
        status.current_index = current_index;
        status.phase = phase;
    }

    /// Sleep in short slices, checking the stop flag at each boundary.
    /// Returns `true` when a stop was requested.
    fn sleep_interruptible(&self, total: Duration) -> bool {
        let slice = self
            .config
            .poll_interval
            .min(Duration::from_millis(100))
            .max(Duration::from_millis(1));
        let started = Instant::now();
        loop {
            if self.stopped() {
                return true;
            }
            let remaining = total.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return false;
            }
            thread::sleep(remaining.min(slice));
        }
    }
}

fn run_sweep(inner: &DetectInner) {
    let inventory = inner.inventory.as_ref();
    let io = inner.io.as_ref();
    let total = inventory.pwms.len();

    info!(pwm_count = total, fan_count = inventory.fans.len(), "detection sweep starting");

    let mut touched: Vec<PwmSnapshot> = Vec::new();
    let mut claimed: HashSet<usize> = HashSet::new();

    for pwm_index in 0..total {
        if inner.stopped() {
            break;
        }

        let Some(_lease) = inner.leases.acquire(pwm_index) else {
            warn!(
                pwm = %inventory.pwm_name(pwm_index),
                "output already leased, skipping"
            );
            continue;
        };

        inner.set_status(pwm_index, DetectPhase::Spinup);

        let snapshot = take_snapshot(io, inventory, pwm_index);
        touched.push(snapshot);

        let outcome = probe_pwm(inner, pwm_index, snapshot.mode, &claimed);

        match outcome {
            ProbeOutcome::Mapped {
                peak_rpm,
                fan_index,
                via_fallback,
            } => {
                if via_fallback {
                    claimed.insert(fan_index);
                }
                info!(
                    pwm = %inventory.pwm_name(pwm_index),
                    fan = %inventory.fan_name(fan_index),
                    peak_rpm,
                    via_fallback,
                    "mapped PWM output to fan"
                );
                inner
                    .results
                    .lock()
                    .insert(pwm_index, PwmMapping::Mapped { peak_rpm, fan_index });
            }
            ProbeOutcome::Unmapped => {
                info!(
                    pwm = %inventory.pwm_name(pwm_index),
                    "no fan response detected, marking unmapped"
                );
                inner.results.lock().insert(pwm_index, PwmMapping::Unmapped);
            }
            // No result for an interrupted probe; restoration follows
            ProbeOutcome::Aborted => {}
        }

        inner.set_status(pwm_index, DetectPhase::Restore);
        restore_snapshot(io, inventory, &snapshot);

        if inner.stopped() {
            break;
        }
        if inner.sleep_interruptible(inner.config.settle_delay) {
            break;
        }
    }

    inner.set_status(inventory.pwms.len(), DetectPhase::RestoreAll);
    for snapshot in &touched {
        restore_snapshot(io, inventory, snapshot);
    }

    info!(
        results = inner.results.lock().len(),
        touched = touched.len(),
        aborted = inner.stopped(),
        "detection sweep finished"
    );
}

/// Read and remember everything the probe may overwrite
fn take_snapshot(io: &dyn SysfsIo, inventory: &Inventory, pwm_index: usize) -> PwmSnapshot {
    let pwm = &inventory.pwms[pwm_index];
    PwmSnapshot {
        pwm_index,
        raw: hw::read_raw(io, pwm),
        enable: hw::read_enable(io, pwm),
        mode: hw::read_mode(io, pwm),
    }
}

/// Write back the original duty, mode, and enable values.
///
/// Duty first while the output is still in manual mode, then mode,
/// then the enable value that may hand control back to firmware.
fn restore_snapshot(io: &dyn SysfsIo, inventory: &Inventory, snapshot: &PwmSnapshot) {
    let pwm = &inventory.pwms[snapshot.pwm_index];
    if let Some(raw) = snapshot.raw {
        if !hw::set_raw(io, pwm, raw) {
            warn!(pwm = %inventory.pwm_name(snapshot.pwm_index), "failed to restore duty");
        }
    }
    if let Some(mode) = snapshot.mode {
        if !hw::set_mode(io, pwm, mode) {
            warn!(pwm = %inventory.pwm_name(snapshot.pwm_index), "failed to restore mode");
        }
    }
    if let Some(enable) = snapshot.enable {
        if !hw::set_enable(io, pwm, enable) {
            warn!(pwm = %inventory.pwm_name(snapshot.pwm_index), "failed to restore enable");
        }
    }
    debug!(pwm = %inventory.pwm_name(snapshot.pwm_index), "output restored");
}

/// Candidate tachometers for one output, plus whether the global
/// fallback was used
fn candidate_fans(
    inventory: &Inventory,
    pwm_index: usize,
    claimed: &HashSet<usize>,
) -> (Vec<usize>, bool) {
    let pwm = &inventory.pwms[pwm_index];

    let same_chip: Vec<usize> = inventory
        .fans
        .iter()
        .enumerate()
        .filter(|(_, fan)| fan.chip_id == pwm.chip_id)
        .map(|(index, _)| index)
        .collect();

    let suffix_match: Vec<usize> = same_chip
        .iter()
        .copied()
        .filter(|index| inventory.fans[*index].number == pwm.number)
        .collect();
    if !suffix_match.is_empty() {
        return (suffix_match, false);
    }
    if !same_chip.is_empty() {
        return (same_chip, false);
    }

    let unclaimed: Vec<usize> = (0..inventory.fans.len())
        .filter(|index| !claimed.contains(index))
        .collect();
    (unclaimed, true)
}

/// Run the drive/spin-up/measure phases for one output. The caller
/// owns snapshotting and restoration.
fn probe_pwm(
    inner: &DetectInner,
    pwm_index: usize,
    prior_mode: Option<u8>,
    claimed: &HashSet<usize>,
) -> ProbeOutcome {
    let inventory = inner.inventory.as_ref();
    let io = inner.io.as_ref();
    let cfg = &inner.config;
    let pwm = &inventory.pwms[pwm_index];

    let (candidates, via_fallback) = candidate_fans(inventory, pwm_index, claimed);
    if candidates.is_empty() {
        debug!(
            pwm = %inventory.pwm_name(pwm_index),
            "no candidate tachometers available"
        );
        return ProbeOutcome::Unmapped;
    }
    debug!(
        pwm = %inventory.pwm_name(pwm_index),
        candidates = candidates.len(),
        via_fallback,
        "testing output"
    );

    let baseline = max_candidate_rpm(io, inventory, &candidates).unwrap_or(0);

    // Drive: manual mode, then a ramped duty-up to reduce mechanical
    // stress compared to a hard jump
    if !hw::set_manual(io, pwm) {
        warn!(
            pwm = %inventory.pwm_name(pwm_index),
            "could not confirm manual mode, driving anyway"
        );
    }
    let drive_started = Instant::now();
    hw::set_percent(io, pwm, cfg.ramp_start_percent);
    if inner.sleep_interruptible(cfg.poll_interval) {
        return ProbeOutcome::Aborted;
    }
    hw::set_percent(io, pwm, cfg.ramp_end_percent);

    let mut response = match wait_for_response(inner, &candidates, baseline) {
        Ok(response) => response,
        Err(()) => return ProbeOutcome::Aborted,
    };

    // A controller stuck in the wrong signal mode can ignore duty
    // writes entirely; if a mode file exists, try the alternate value
    // once before giving up on this output.
    if response.is_none() && pwm.mode_path.is_some() {
        let alternate = if prior_mode == Some(0) { 1 } else { 0 };
        debug!(
            pwm = %inventory.pwm_name(pwm_index),
            alternate,
            "no response, retrying with alternate PWM mode"
        );
        if hw::set_mode(io, pwm, alternate) {
            if inner.sleep_interruptible(cfg.mode_dwell) {
                return ProbeOutcome::Aborted;
            }
            hw::set_percent(io, pwm, cfg.ramp_end_percent);
            response = match wait_for_response(inner, &candidates, baseline) {
                Ok(response) => response,
                Err(()) => return ProbeOutcome::Aborted,
            };
        }
    }

    let Some((fan_index, first_rpm)) = response else {
        return ProbeOutcome::Unmapped;
    };

    // Measure window is anchored at the first drive write so a
    // late-responding output still gets its full measurement
    inner.set_status(pwm_index, DetectPhase::Measure);
    let mut peak_rpm = first_rpm;
    while drive_started.elapsed() < cfg.measure_duration {
        if inner.sleep_interruptible(cfg.poll_interval) {
            return ProbeOutcome::Aborted;
        }
        if let Some(rpm) = hw::read_rpm(io, &inventory.fans[fan_index]) {
            peak_rpm = peak_rpm.max(rpm);
        }
    }

    ProbeOutcome::Mapped {
        peak_rpm,
        fan_index,
        via_fallback,
    }
}

/// Poll the candidates until one rises past baseline + threshold or
/// the spin-up window elapses. `Err(())` means a stop was requested.
fn wait_for_response(
    inner: &DetectInner,
    candidates: &[usize],
    baseline: u32,
) -> std::result::Result<Option<(usize, u32)>, ()> {
    let inventory = inner.inventory.as_ref();
    let io = inner.io.as_ref();
    let threshold = baseline.saturating_add(inner.config.rpm_delta_thresh);
    let started = Instant::now();

    loop {
        for &fan_index in candidates {
            if let Some(rpm) = hw::read_rpm(io, &inventory.fans[fan_index]) {
                if rpm >= threshold {
                    debug!(
                        fan = %inventory.fan_name(fan_index),
                        rpm,
                        baseline,
                        "tachometer responded"
                    );
                    return Ok(Some((fan_index, rpm)));
                }
            }
        }
        if started.elapsed() >= inner.config.spinup_window {
            return Ok(None);
        }
        if inner.sleep_interruptible(inner.config.poll_interval) {
            return Err(());
        }
    }
}

fn max_candidate_rpm(io: &dyn SysfsIo, inventory: &Inventory, candidates: &[usize]) -> Option<u32> {
    candidates
        .iter()
        .filter_map(|index| hw::read_rpm(io, &inventory.fans[*index]))
        .max()
}
