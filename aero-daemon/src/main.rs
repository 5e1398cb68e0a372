//! aerod - privileged fan-control daemon
//!
//! Scans the hwmon inventory once at startup, loads the profile if one
//! exists, and drives the control engine at a fixed cadence until
//! SIGINT/SIGTERM. With no profile present and `AEROD_DETECT=1`, runs
//! one PWM-to-fan detection sweep first and logs the per-output
//! results for the profile builder to pick up.
//!
//! The RPC surface, PID-file handling, and log rotation belong to the
//! packaging around this binary, not here.

mod profile_io;
mod telemetry;

use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use aero_core::constants::{gating, timing};
use aero_core::{
    scan_inventory, Detection, DetectionConfig, Engine, EngineConfig, Inventory, PwmLeases,
    PwmMapping, Sysfs, SysfsIo,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_logging() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // Prefer journald when running under systemd, stderr otherwise
    if std::path::Path::new("/run/systemd/journal/socket").exists() {
        if let Ok(journald) = tracing_journald::layer() {
            let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
            tracing_subscriber::registry().with(filter).with(journald).init();
            return;
        }
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run one blocking detection sweep and log what it found
fn run_detection_sweep(
    inventory: Arc<Inventory>,
    io: Arc<dyn SysfsIo>,
    leases: Arc<PwmLeases>,
) {
    let detection = Detection::new(inventory.clone(), io, leases, DetectionConfig::default());
    if let Err(e) = detection.start() {
        error!(error = %e, "could not start detection sweep");
        return;
    }
    detection.wait();

    for (pwm_index, mapping) in detection.results() {
        match mapping {
            PwmMapping::Mapped { peak_rpm, fan_index } => info!(
                pwm = %inventory.pwm_name(pwm_index),
                fan = %inventory.fan_name(fan_index),
                peak_rpm,
                "detection result"
            ),
            PwmMapping::Unmapped => info!(
                pwm = %inventory.pwm_name(pwm_index),
                "detection result: unmapped"
            ),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    info!(version = VERSION, "aerod starting");

    // SAFETY: geteuid just returns the effective user ID of the process.
    if unsafe { libc::geteuid() } != 0 {
        warn!("not running as root - PWM writes will likely fail");
    }

    let io: Arc<dyn SysfsIo> = Arc::new(Sysfs);
    let inventory = Arc::new(scan_inventory(io.as_ref()));
    if inventory.pwms.is_empty() {
        warn!("no PWM outputs found - fan control not available");
    }

    let leases = PwmLeases::new();
    let engine = Arc::new(Engine::new(
        inventory.clone(),
        io.clone(),
        leases.clone(),
        Arc::new(telemetry::LogSink),
        EngineConfig::default(),
    ));

    match profile_io::load_default_profile() {
        Ok(Some(profile)) => {
            engine.apply_profile(profile);
            engine.enable_control(true);
        }
        Ok(None) => {
            info!(
                path = ?profile_io::default_profile_path(),
                "no profile found - monitoring only"
            );
            if std::env::var("AEROD_DETECT").as_deref() == Ok("1") {
                info!("AEROD_DETECT=1 - probing PWM-to-fan mappings");
                let (inventory, io, leases) = (inventory.clone(), io.clone(), leases.clone());
                tokio::task::spawn_blocking(move || run_detection_sweep(inventory, io, leases))
                    .await?;
            }
        }
        Err(e) => {
            error!(error = %e, "profile rejected - monitoring only");
        }
    }

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let delta_c = gating::DEFAULT_DELTA_C;

    info!(
        interval_ms = timing::TICK_INTERVAL.as_millis() as u64,
        controls = engine.binding_count(),
        "control loop starting"
    );

    loop {
        tokio::select! {
            _ = tokio::time::sleep(timing::TICK_INTERVAL) => {
                let engine = engine.clone();
                // Sysfs reads/writes are blocking file I/O
                if tokio::task::spawn_blocking(move || engine.tick(delta_c)).await.is_err() {
                    error!("tick task panicked");
                }
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down");
                break;
            }
        }
    }

    info!("aerod stopped");
    Ok(())
}
