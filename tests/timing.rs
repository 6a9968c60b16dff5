// tests/timing.rs

use std::time::Duration;

use inkpanel::timing::{
    TimingController, TimingKalmanFilter, normalize_sleep, phase_deviation, raw_sleep_secs,
};
use proptest::prelude::*;

/// Steady-state variance for Q = 0.5, R = 2.0: root of P² + QP − QR = 0.
const STEADY_VARIANCE: f64 = 0.780_776_406_404_415;

proptest! {
    #[test]
    fn constant_measurements_converge_monotonically(
        start in 0.0f64..120.0,
        variance in (STEADY_VARIANCE + 0.1)..50.0,
        measurement in 0.0f64..120.0,
    ) {
        let mut kf = TimingKalmanFilter::new(start, variance, 0.5, 2.0);
        let mut prev_gap = start - measurement;
        let mut prev_var = kf.variance();

        for _ in 0..20 {
            let estimate = kf.update(measurement);
            let gap = estimate - measurement;

            prop_assert!(gap.abs() <= prev_gap.abs() + 1e-12);
            prop_assert!(gap * prev_gap >= 0.0, "estimate overshot the measurement");
            prop_assert!(kf.variance() < prev_var, "{} !< {}", kf.variance(), prev_var);

            prev_gap = gap;
            prev_var = kf.variance();
        }
    }

    #[test]
    fn normalized_sleep_is_raw_plus_whole_intervals(
        interval in 1u64..600,
        estimate in 0.0f64..1200.0,
        current in 0u32..60,
        target in 0u32..60,
    ) {
        let raw = raw_sleep_secs(interval, estimate, current, target);
        let sleep = normalize_sleep(raw, interval);

        prop_assert!(sleep >= 0.0);
        let added = (sleep - raw) / interval as f64;
        prop_assert!((added - added.round()).abs() < 1e-6);
        prop_assert!(added.round() >= 0.0);
        if raw < 0.0 {
            prop_assert!(sleep < interval as f64);
        }
    }

    #[test]
    fn phase_deviation_stays_within_half_a_minute(current in 0u32..60, target in 0u32..60) {
        let diff = phase_deviation(current, target);
        prop_assert!((-30..=30).contains(&diff));
        prop_assert_eq!((diff - (current as i64 - target as i64)).rem_euclid(60), 0);
    }
}

#[test]
fn controller_settles_on_a_stable_sleep() {
    let mut controller = TimingController::new(60, 0);
    let mut last = None;

    // A cycle that always takes 12 s and always ends at second 12.
    for _ in 0..40 {
        let plan = controller.plan(Duration::from_secs(12), 12);
        last = Some(plan.sleep_secs);
    }

    let sleep = last.unwrap();
    assert!((sleep - 36.0).abs() < 1e-3, "{sleep}");
    assert!((controller.filter().estimate() - 12.0).abs() < 1e-3);
}
