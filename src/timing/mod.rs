// src/timing/mod.rs

//! Refresh pacing for the display loop.
//!
//! Cycle durations are noisy (external data sources), so the next sleep is
//! planned from a Kalman-filtered estimate rather than the last raw value.

pub mod controller;
pub mod kalman;

pub use controller::{SleepPlan, TimingController, normalize_sleep, phase_deviation, raw_sleep_secs};
pub use kalman::TimingKalmanFilter;
