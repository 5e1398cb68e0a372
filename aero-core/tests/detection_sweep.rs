//! Detection sweep behavior against the in-memory fake: mapping,
//! unmapped classification, claimed-fan exclusivity, and the
//! restore-everything invariant under abort.

mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use aero_core::{AeroError, DetectPhase, Detection, DetectionConfig, PwmLeases, PwmMapping};
use common::FakeRig;

/// Millisecond-scale tunables so a full sweep finishes quickly
fn fast_config() -> DetectionConfig {
    DetectionConfig {
        settle_delay: Duration::from_millis(5),
        spinup_window: Duration::from_millis(40),
        poll_interval: Duration::from_millis(2),
        measure_duration: Duration::from_millis(60),
        rpm_delta_thresh: 50,
        ramp_start_percent: 30,
        ramp_end_percent: 100,
        mode_dwell: Duration::from_millis(5),
    }
}

fn wait_until_done(detection: &Detection) {
    detection.wait();
    assert!(!detection.is_running());
}

#[test]
fn maps_responding_output_and_restores_state() {
    let mut rig = FakeRig::new();
    let chip = rig.add_chip("nct6799");
    let fan = rig.add_fan(chip, 1, 0);
    rig.add_pwm(chip, 1, 13, Some(2), Some(1));
    rig.io.wire(rig.pwm_path(0), rig.fan_path(0), 3000);

    let detection = Detection::new(
        rig.inventory(),
        rig.io.clone(),
        PwmLeases::new(),
        fast_config(),
    );
    detection.start().expect("sweep starts");
    wait_until_done(&detection);

    let results = detection.results();
    match results.get(&0) {
        Some(PwmMapping::Mapped { peak_rpm, fan_index }) => {
            assert_eq!(*fan_index, fan);
            assert_eq!(*peak_rpm, 3000);
        }
        other => panic!("expected mapped result, got {:?}", other),
    }

    // Everything the probe touched is back to its pre-test value
    assert_eq!(rig.io.get(rig.pwm_path(0)), Some(13));
    assert_eq!(rig.io.get(rig.enable_path(0)), Some(2));
    assert_eq!(rig.io.get(rig.mode_path(0).unwrap()), Some(1));

    let status = detection.status();
    assert!(!status.running);
    assert_eq!(status.phase, DetectPhase::Done);
}

#[test]
fn dead_tachometer_is_unmapped_and_sweep_continues() {
    let mut rig = FakeRig::new();
    let chip = rig.add_chip("nct6799");
    let live_fan = rig.add_fan(chip, 2, 0);
    rig.add_fan(chip, 1, 700); // static regardless of duty
    rig.add_pwm(chip, 1, 20, Some(2), Some(1));
    rig.add_pwm(chip, 2, 40, Some(2), None);
    rig.io.wire(rig.pwm_path(1), rig.fan_path(live_fan), 2400);

    let detection = Detection::new(
        rig.inventory(),
        rig.io.clone(),
        PwmLeases::new(),
        fast_config(),
    );
    detection.start().expect("sweep starts");
    wait_until_done(&detection);

    let results = detection.results();
    // pwm1's suffix candidate is the dead fan1: unmapped, including
    // after the alternate-mode retry
    assert_eq!(results.get(&0), Some(&PwmMapping::Unmapped));
    // The sweep kept going and mapped pwm2 to its live fan2
    match results.get(&1) {
        Some(PwmMapping::Mapped { fan_index, .. }) => assert_eq!(*fan_index, live_fan),
        other => panic!("expected mapped result, got {:?}", other),
    }

    // Both outputs restored
    assert_eq!(rig.io.get(rig.pwm_path(0)), Some(20));
    assert_eq!(rig.io.get(rig.pwm_path(1)), Some(40));
    assert_eq!(rig.io.get(rig.mode_path(0).unwrap()), Some(1));
}

#[test]
fn global_fallback_claims_fans_exclusively() {
    let mut rig = FakeRig::new();
    let pwm_chip = rig.add_chip("nct6799");
    let fan_chip = rig.add_chip("aux_tach");
    let shared_fan = rig.add_fan(fan_chip, 1, 100);
    rig.add_pwm(pwm_chip, 1, 0, Some(2), None);
    rig.add_pwm(pwm_chip, 2, 0, Some(2), None);
    // Both outputs physically spin the same tachometer
    rig.io.wire(rig.pwm_path(0), rig.fan_path(shared_fan), 2000);
    rig.io.wire(rig.pwm_path(1), rig.fan_path(shared_fan), 2000);

    let detection = Detection::new(
        rig.inventory(),
        rig.io.clone(),
        PwmLeases::new(),
        fast_config(),
    );
    detection.start().expect("sweep starts");
    wait_until_done(&detection);

    let results = detection.results();
    // First output claims the fan through the global fallback; the
    // second must not be attributed to the same tachometer
    assert_eq!(
        results.get(&0),
        Some(&PwmMapping::Mapped { peak_rpm: 2000, fan_index: shared_fan })
    );
    assert_eq!(results.get(&1), Some(&PwmMapping::Unmapped));

    let mapped_fans: Vec<usize> = results
        .values()
        .filter_map(|mapping| match mapping {
            PwmMapping::Mapped { fan_index, .. } => Some(*fan_index),
            PwmMapping::Unmapped => None,
        })
        .collect();
    let mut deduped = mapped_fans.clone();
    deduped.sort_unstable();
    deduped.dedup();
    assert_eq!(mapped_fans.len(), deduped.len(), "a fan was claimed twice");
}

#[test]
fn abort_restores_every_touched_output() {
    // The invariant must hold wherever the abort lands: during the
    // ramp, mid spin-up, mid measurement, or between outputs
    for abort_after_ms in [1u64, 20, 50, 110] {
        let mut rig = FakeRig::new();
        let chip = rig.add_chip("nct6799");
        for n in 1..=3u32 {
            let fan = rig.add_fan(chip, n, 0);
            let pwm = rig.add_pwm(chip, n, 10 * i64::from(n), Some(2), Some(0));
            rig.io.wire(rig.pwm_path(pwm), rig.fan_path(fan), 3000);
        }

        let mut config = fast_config();
        config.measure_duration = Duration::from_millis(80);
        let detection = Detection::new(rig.inventory(), rig.io.clone(), PwmLeases::new(), config);

        detection.start().expect("sweep starts");
        std::thread::sleep(Duration::from_millis(abort_after_ms));
        detection.abort();
        wait_until_done(&detection);

        for index in 0..3 {
            assert_eq!(
                rig.io.get(rig.pwm_path(index)),
                Some(10 * (index as i64 + 1)),
                "duty restored for pwm{} (abort at {}ms)",
                index + 1,
                abort_after_ms
            );
            assert_eq!(rig.io.get(rig.enable_path(index)), Some(2));
            assert_eq!(rig.io.get(rig.mode_path(index).unwrap()), Some(0));
        }

        // The interrupted probe produces no result; unreached outputs
        // are absent rather than zeroed
        assert!(detection.results().len() < 3);
        assert_eq!(detection.status().phase, DetectPhase::Done);
    }
}

#[test]
fn start_while_running_is_rejected() {
    let mut rig = FakeRig::new();
    let chip = rig.add_chip("nct6799");
    let fan = rig.add_fan(chip, 1, 0);
    rig.add_pwm(chip, 1, 0, Some(2), None);
    rig.io.wire(rig.pwm_path(0), rig.fan_path(fan), 3000);

    let mut config = fast_config();
    config.measure_duration = Duration::from_millis(300);
    let detection = Detection::new(rig.inventory(), rig.io.clone(), PwmLeases::new(), config);

    detection.start().expect("first start succeeds");
    assert!(matches!(
        detection.start(),
        Err(AeroError::AlreadyRunning)
    ));

    detection.abort();
    wait_until_done(&detection);

    // Once idle again, a new sweep may start
    detection.start().expect("restart after completion");
    wait_until_done(&detection);
}

#[test]
fn sweep_holds_the_lease_while_probing() {
    let mut rig = FakeRig::new();
    let chip = rig.add_chip("nct6799");
    let fan = rig.add_fan(chip, 1, 0);
    rig.add_pwm(chip, 1, 0, Some(2), None);
    rig.io.wire(rig.pwm_path(0), rig.fan_path(fan), 3000);

    let leases = PwmLeases::new();
    let mut config = fast_config();
    config.measure_duration = Duration::from_millis(300);
    let detection = Detection::new(rig.inventory(), rig.io.clone(), leases.clone(), config);

    detection.start().expect("sweep starts");
    std::thread::sleep(Duration::from_millis(50));
    assert!(leases.is_held(0), "probe holds the per-PWM lease");
    assert!(leases.acquire(0).is_none());

    detection.abort();
    wait_until_done(&detection);
    assert!(!leases.is_held(0), "lease released after restore");
}

#[test]
fn no_candidates_at_all_yields_unmapped() {
    let mut rig = FakeRig::new();
    let chip = rig.add_chip("nct6799");
    rig.add_pwm(chip, 1, 64, Some(2), None);

    let detection = Detection::new(
        rig.inventory(),
        rig.io.clone(),
        PwmLeases::new(),
        fast_config(),
    );
    detection.start().expect("sweep starts");
    wait_until_done(&detection);

    let expected: BTreeMap<usize, PwmMapping> =
        [(0usize, PwmMapping::Unmapped)].into_iter().collect();
    assert_eq!(detection.results(), expected);
    assert_eq!(rig.io.get(rig.pwm_path(0)), Some(64));
}
