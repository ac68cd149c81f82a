//! Simplified linear Kalman filter over `[lat, lon, v_lat, v_lon]`.
//!
//! Gains and covariance updates are per-axis (diagonal only). In `predict`
//! only the x/vx block of the covariance is propagated. Both are kept as-is
//! so smoothed output stays identical to earlier recordings.

use serde::{Deserialize, Serialize};

use crate::config::TrackingConfig;
use crate::types::{AxisGain4, FixMeasurement, FixNoise, StateMat4, StateVec4};

/// Ceiling for the propagated x/vx covariance block. `update` never shrinks
/// the cross terms, so they double on every one-second step. The cap is
/// reached after about 22 fixes, and every longer recording runs capped.
/// The position gain is within 1e-6 of 1 by then.
const MAX_COVARIANCE: f64 = 1.0e6;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FusionFilterState {
    pub latitude: f64,
    pub longitude: f64,
    /// (v_lat, v_lon) in degrees per second
    pub velocity: (f64, f64),
    /// Magnitude of `velocity` (degrees per second)
    pub speed: f64,
}

#[derive(Clone, Debug)]
pub struct SensorFusionFilter {
    state: StateVec4,
    covariance: StateMat4,
    process_noise: StateMat4,
    measurement_noise: FixNoise,
    initial_covariance: f64,
    last_timestamp: Option<i64>,
    update_count: u64,
}

impl SensorFusionFilter {
    pub fn new(process_noise: f64, measurement_noise: f64, initial_covariance: f64) -> Self {
        Self {
            state: StateVec4::zeros(),
            covariance: StateMat4::identity() * initial_covariance,
            process_noise: StateMat4::identity() * process_noise,
            measurement_noise: FixNoise::identity() * measurement_noise,
            initial_covariance,
            last_timestamp: None,
            update_count: 0,
        }
    }

    pub fn from_config(config: &TrackingConfig) -> Self {
        Self::new(
            config.process_noise,
            config.measurement_noise,
            config.initial_covariance,
        )
    }

    /// Advance the state to `timestamp_ms`.
    ///
    /// The first call only records the timestamp. Out-of-order timestamps are
    /// treated as a zero step.
    pub fn predict(&mut self, timestamp_ms: i64) {
        let last = match self.last_timestamp {
            Some(last) => last,
            None => {
                self.last_timestamp = Some(timestamp_ms);
                return;
            }
        };

        let dt = ((timestamp_ms - last) as f64 / 1000.0).max(0.0);
        self.last_timestamp = Some(timestamp_ms.max(last));

        self.state[0] += self.state[2] * dt;
        self.state[1] += self.state[3] * dt;

        // Sequential on purpose: P[2][0] sees the already-updated P[0][0].
        let p = &mut self.covariance;
        p[(0, 0)] += dt * p[(2, 0)];
        p[(0, 2)] += dt * p[(2, 2)];
        p[(2, 0)] += dt * p[(0, 0)];
        p[(2, 2)] += dt * p[(2, 2)];
        for (r, c) in [(0, 0), (0, 2), (2, 0), (2, 2)] {
            p[(r, c)] = p[(r, c)].min(MAX_COVARIANCE);
        }

        for i in 0..4 {
            p[(i, i)] += self.process_noise[(i, i)];
        }
    }

    /// Blend an observation `[lat, lon, v_lat, v_lon]` into the state.
    pub fn update(&mut self, measurement: &FixMeasurement) {
        let gain = self.kalman_gain();
        let innovation = measurement - self.state;

        for i in 0..4 {
            self.state[i] += gain[i] * innovation[i];
            self.covariance[(i, i)] *= 1.0 - gain[i];
        }
        self.update_count += 1;
    }

    /// Start the state at `measurement` instead of blending it against zero.
    pub fn seed(&mut self, measurement: &FixMeasurement) {
        self.state = *measurement;
    }

    fn kalman_gain(&self) -> AxisGain4 {
        AxisGain4::from_fn(|i, _| {
            let p = self.covariance[(i, i)];
            p / (p + self.measurement_noise[(i, i)])
        })
    }

    pub fn get_state(&self) -> FusionFilterState {
        let vx = self.state[2];
        let vy = self.state[3];
        FusionFilterState {
            latitude: self.state[0],
            longitude: self.state[1],
            velocity: (vx, vy),
            speed: (vx * vx + vy * vy).sqrt(),
        }
    }

    pub fn covariance(&self) -> &StateMat4 {
        &self.covariance
    }

    pub fn is_initialized(&self) -> bool {
        self.last_timestamp.is_some()
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn reset(&mut self) {
        self.state = StateVec4::zeros();
        self.covariance = StateMat4::identity() * self.initial_covariance;
        self.last_timestamp = None;
        self.update_count = 0;
    }
}

impl Default for SensorFusionFilter {
    fn default() -> Self {
        Self::from_config(&TrackingConfig::default())
    }
}
