// src/timing/kalman.rs

/// One-dimensional Kalman filter over a quantity assumed roughly constant.
///
/// There is no dynamics term: the prediction step only grows the variance by
/// the process noise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingKalmanFilter {
    estimate: f64,
    variance: f64,
    process_noise: f64,
    measurement_noise: f64,
}

impl Default for TimingKalmanFilter {
    fn default() -> Self {
        Self::new(30.0, 10.0, 0.5, 2.0)
    }
}

impl TimingKalmanFilter {
    pub fn new(
        initial_estimate: f64,
        initial_variance: f64,
        process_noise: f64,
        measurement_noise: f64,
    ) -> Self {
        Self {
            estimate: initial_estimate,
            variance: initial_variance,
            process_noise,
            measurement_noise,
        }
    }

    /// Fold in one measurement and return the new estimate.
    pub fn update(&mut self, measurement: f64) -> f64 {
        let x_pred = self.estimate;
        let p_pred = self.variance + self.process_noise;

        let gain = p_pred / (p_pred + self.measurement_noise);
        self.estimate = x_pred + gain * (measurement - x_pred);
        self.variance = (1.0 - gain) * p_pred;

        self.estimate
    }

    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }
}
