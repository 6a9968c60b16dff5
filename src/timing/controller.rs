// src/timing/controller.rs

use std::time::Duration;

use tracing::info;

use crate::config::UpdateSection;
use crate::timing::kalman::TimingKalmanFilter;

/// What the driver should do after a cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SleepPlan {
    pub sleep: Duration,
    pub sleep_secs: f64,
    /// Filtered cycle duration the plan was based on.
    pub estimate: f64,
    /// How far the cycle's completion second is from the target, in
    /// `[-30, 30]`. Observability only.
    pub diff_sec: i64,
}

/// Schedules refreshes so they complete near a fixed second of the minute.
#[derive(Debug, Clone)]
pub struct TimingController {
    interval: u64,
    target_second: u32,
    filter: TimingKalmanFilter,
}

impl TimingController {
    pub fn new(interval: u64, target_second: u32) -> Self {
        Self::with_filter(interval, target_second, TimingKalmanFilter::default())
    }

    pub fn with_filter(interval: u64, target_second: u32, filter: TimingKalmanFilter) -> Self {
        Self {
            interval: interval.max(1),
            target_second,
            filter,
        }
    }

    pub fn from_config(section: &UpdateSection) -> Self {
        Self::new(section.interval, section.target_second)
    }

    pub fn filter(&self) -> &TimingKalmanFilter {
        &self.filter
    }

    /// Feed the measured cycle duration and plan the next sleep.
    ///
    /// `current_second` is the wall-clock second of the minute (0..=59) at
    /// which the cycle finished.
    pub fn plan(&mut self, elapsed: Duration, current_second: u32) -> SleepPlan {
        let estimate = self.filter.update(elapsed.as_secs_f64());

        let raw = raw_sleep_secs(self.interval, estimate, current_second, self.target_second);
        let sleep_secs = normalize_sleep(raw, self.interval);
        let diff_sec = phase_deviation(current_second, self.target_second);

        info!(
            elapsed_secs = elapsed.as_secs_f64(),
            estimate,
            current_second,
            sleep_secs,
            diff_sec,
            "planned next refresh"
        );

        SleepPlan {
            sleep: Duration::from_secs_f64(sleep_secs),
            sleep_secs,
            estimate,
            diff_sec,
        }
    }
}

/// `interval - estimate - current_second`, shifted by a non-zero target.
pub fn raw_sleep_secs(interval: u64, estimate: f64, current_second: u32, target_second: u32) -> f64 {
    let mut sleep = interval as f64 - estimate - current_second as f64;
    if target_second > 0 {
        sleep += target_second as f64;
    }
    sleep
}

/// Add whole intervals until the value is no longer negative.
pub fn normalize_sleep(mut sleep: f64, interval: u64) -> f64 {
    let interval = interval.max(1) as f64;
    if !sleep.is_finite() {
        return 0.0;
    }
    while sleep < 0.0 {
        sleep += interval;
    }
    sleep
}

/// Signed distance from `target` to `current`, wrapped into `[-30, 30]`.
pub fn phase_deviation(current_second: u32, target_second: u32) -> i64 {
    let diff = current_second as i64 - target_second as i64;
    if diff > 30 {
        diff - 60
    } else if diff < -30 {
        diff + 60
    } else {
        diff
    }
}
