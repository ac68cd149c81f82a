use std::collections::VecDeque;

use crate::config::TrackingConfig;

/// Why a speed sample was thrown away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    NonFinite,
    Negative,
    /// Jump from the last valid speed exceeds the continuity limit
    Jump,
    /// Above the plausible ceiling for the vehicle class
    TooFast,
}

/// Plausibility checks plus a weighted moving average for display speed.
///
/// Weights are right-aligned to the current window length and are not
/// renormalised, so a short window reads low until it fills up.
pub struct SpeedValidator {
    window: VecDeque<f64>,
    weights: Vec<f64>,
    max_jump_mps: f64,
    max_speed_kmh: f64,
    min_speed_kmh: f64,
    reanchor_after: u32,
    last_valid: Option<f64>,
    consecutive_rejections: u32,
}

impl SpeedValidator {
    pub fn new(config: &TrackingConfig) -> Self {
        SpeedValidator {
            window: VecDeque::with_capacity(config.smoothing_weights.len()),
            weights: config.smoothing_weights.clone(),
            max_jump_mps: config.max_speed_jump_mps,
            max_speed_kmh: config.max_speed_kmh,
            min_speed_kmh: config.min_display_speed_kmh,
            reanchor_after: config.speed_reanchor_after,
            last_valid: None,
            consecutive_rejections: 0,
        }
    }

    /// Check `speed` (m/s) against `last_valid_speed`.
    pub fn check_speed(&self, speed: f64, last_valid_speed: Option<f64>) -> Result<(), RejectReason> {
        if !speed.is_finite() {
            return Err(RejectReason::NonFinite);
        }
        if speed < 0.0 {
            return Err(RejectReason::Negative);
        }
        if speed * 3.6 > self.max_speed_kmh {
            return Err(RejectReason::TooFast);
        }
        if let Some(last) = last_valid_speed {
            if (speed - last).abs() > self.max_jump_mps {
                return Err(RejectReason::Jump);
            }
        }
        Ok(())
    }

    pub fn is_valid_speed(&self, speed: f64, last_valid_speed: Option<f64>) -> bool {
        self.check_speed(speed, last_valid_speed).is_ok()
    }

    /// Push a sample and return the weighted average of the window.
    pub fn smooth(&mut self, new_speed: f64) -> f64 {
        self.window.push_back(new_speed);
        while self.window.len() > self.weights.len() {
            self.window.pop_front();
        }

        let offset = self.weights.len() - self.window.len();
        self.window
            .iter()
            .zip(self.weights[offset..].iter())
            .map(|(value, weight)| value * weight)
            .sum()
    }

    /// Validate, smooth and floor one sample. Rejected or sub-threshold
    /// speeds come back as exactly 0.0.
    pub fn process(&mut self, speed: f64) -> f64 {
        match self.check_speed(speed, self.last_valid) {
            Ok(()) => {
                self.last_valid = Some(speed);
                self.consecutive_rejections = 0;
            }
            Err(RejectReason::Jump)
                if self.reanchor_after > 0
                    && self.consecutive_rejections + 1 >= self.reanchor_after =>
            {
                log::debug!(
                    "speed {:.2} m/s re-anchors validator after {} rejected jumps",
                    speed,
                    self.consecutive_rejections + 1
                );
                self.window.clear();
                self.last_valid = Some(speed);
                self.consecutive_rejections = 0;
            }
            Err(reason) => {
                self.consecutive_rejections += 1;
                log::debug!("speed {:.2} m/s rejected: {:?}", speed, reason);
                return 0.0;
            }
        }

        let smoothed = self.smooth(speed);
        if smoothed * 3.6 < self.min_speed_kmh {
            0.0
        } else {
            smoothed
        }
    }

    pub fn last_valid_speed(&self) -> Option<f64> {
        self.last_valid
    }

    pub fn consecutive_rejections(&self) -> u32 {
        self.consecutive_rejections
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.last_valid = None;
        self.consecutive_rejections = 0;
    }
}

impl Default for SpeedValidator {
    fn default() -> Self {
        Self::new(&TrackingConfig::default())
    }
}
