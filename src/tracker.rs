// tracker.rs: raw fix → smoothed TrackedStatus
//
// Owns the position filter and the display-speed validator. The stake shown
// here is a live estimate for display; the ledger keeps its own, separately
// validated distance and is the authority for recorded stakes.

use std::sync::Arc;

use crate::config::TrackingConfig;
use crate::error::TrackerError;
use crate::filters::SensorFusionFilter;
use crate::geodesy::{haversine_distance, velocity_to_degrees};
use crate::listeners::{DeliveryReport, ListenerSet, StatusListener};
use crate::smoothing::SpeedValidator;
use crate::stake::{Stake, ZERO_STAKE};
use crate::types::{Direction, FixMeasurement, PositionSample, RawFix, TrackedStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    Active,
}

/// Result of feeding one fix through an active tracker.
#[derive(Clone, Debug)]
pub struct TrackerUpdate {
    pub status: TrackedStatus,
    /// Speed before validation and smoothing: the receiver's value, or the
    /// filtered displacement over time when the fix carries none.
    pub raw_speed_mps: f64,
    pub report: DeliveryReport,
}

pub struct PositionTracker {
    filter: SensorFusionFilter,
    validator: SpeedValidator,
    listeners: ListenerSet,
    state: TrackerState,
    direction: Direction,
    stake_m: f64,
    last_raw: Option<RawFix>,
    last_filtered: Option<PositionSample>,
    status: Option<TrackedStatus>,
    fixes_accepted: u64,
}

impl PositionTracker {
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            filter: SensorFusionFilter::from_config(config),
            validator: SpeedValidator::new(config),
            listeners: ListenerSet::new(),
            state: TrackerState::Idle,
            direction: Direction::Increasing,
            stake_m: 0.0,
            last_raw: None,
            last_filtered: None,
            status: None,
            fixes_accepted: 0,
        }
    }

    pub fn add_status_listener(&mut self, listener: Arc<dyn StatusListener>) -> bool {
        self.listeners.add(listener)
    }

    pub fn remove_status_listener(&mut self, listener: &Arc<dyn StatusListener>) -> bool {
        self.listeners.remove(listener)
    }

    /// Idle → Active. Restarting an active tracker begins a fresh run.
    pub fn start_record(&mut self, initial_stake: &str, direction: Direction) -> Result<(), TrackerError> {
        let stake: Stake = initial_stake
            .parse()
            .map_err(|_| TrackerError::InvalidStakeFormat(initial_stake.to_string()))?;

        if self.state == TrackerState::Active {
            self.stop_record();
        }

        self.filter.reset();
        self.validator.reset();
        self.stake_m = stake.total_meters() as f64;
        self.direction = direction;
        self.last_raw = None;
        self.last_filtered = None;
        self.fixes_accepted = 0;
        self.state = TrackerState::Active;
        log::info!("tracker active at {} ({:?})", stake, direction);
        Ok(())
    }

    /// Active → Idle. The last status stays readable.
    pub fn stop_record(&mut self) {
        if self.state == TrackerState::Active {
            log::info!("tracker idle after {} fixes", self.fixes_accepted);
        }
        self.state = TrackerState::Idle;
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn get_status(&self) -> Option<&TrackedStatus> {
        self.status.as_ref()
    }

    /// Replace the live stake and restart distance accumulation from the
    /// current position.
    pub fn calibrate_stake(&mut self, new_stake: &str) -> Result<(), TrackerError> {
        let stake: Stake = new_stake
            .parse()
            .map_err(|_| TrackerError::InvalidStakeFormat(new_stake.to_string()))?;

        self.stake_m = stake.total_meters() as f64;
        if let Some(status) = self.status.as_mut() {
            status.stake = stake.to_string();
            self.last_filtered = Some(status.position());
        }
        log::info!("tracker stake calibrated to {}", stake);
        Ok(())
    }

    /// Feed one raw fix. Returns `None` while idle or for unusable fixes.
    pub fn handle_fix(&mut self, fix: &RawFix) -> Option<TrackerUpdate> {
        if self.state != TrackerState::Active {
            log::debug!("fix at {} ignored: tracker idle", fix.timestamp_ms);
            return None;
        }
        if !fix.latitude.is_finite() || !fix.longitude.is_finite() {
            log::warn!("fix at {} has non-finite coordinates", fix.timestamp_ms);
            return None;
        }

        let measurement = self.measurement_for(fix);
        self.filter.predict(fix.timestamp_ms);
        if self.filter.update_count() == 0 {
            self.filter.seed(&measurement);
        }
        self.filter.update(&measurement);

        let filtered = self.filter.get_state();
        let position = PositionSample::new(filtered.latitude, filtered.longitude, fix.timestamp_ms);

        let candidate = self.candidate_speed(fix, &position);
        let speed_mps = self.validator.process(candidate);

        if let Some(prev) = self.last_filtered {
            let distance = haversine_distance(
                prev.latitude,
                prev.longitude,
                position.latitude,
                position.longitude,
            );
            self.stake_m += self.direction.sign() * distance;
        }

        let status = TrackedStatus {
            latitude: position.latitude,
            longitude: position.longitude,
            speed_mps,
            accuracy_m: fix.accuracy_m.unwrap_or(0.0),
            satellites: fix.satellites.unwrap_or(0),
            stake: self.stake_text(),
            direction: self.direction,
            timestamp_ms: fix.timestamp_ms,
        };

        self.last_raw = Some(fix.clone());
        self.last_filtered = Some(position);
        self.status = Some(status.clone());
        self.fixes_accepted += 1;

        let report = self.listeners.notify(&status);
        Some(TrackerUpdate {
            status,
            raw_speed_mps: candidate,
            report,
        })
    }

    fn measurement_for(&self, fix: &RawFix) -> FixMeasurement {
        let (v_lat, v_lon) = match (fix.speed_mps, fix.heading_rad) {
            (Some(speed), Some(heading)) if speed.is_finite() && heading.is_finite() => {
                velocity_to_degrees(speed, heading, fix.latitude)
            }
            _ => match &self.last_raw {
                Some(prev) if fix.timestamp_ms > prev.timestamp_ms => {
                    let dt = (fix.timestamp_ms - prev.timestamp_ms) as f64 / 1000.0;
                    (
                        (fix.latitude - prev.latitude) / dt,
                        (fix.longitude - prev.longitude) / dt,
                    )
                }
                _ => (0.0, 0.0),
            },
        };
        FixMeasurement::new(fix.latitude, fix.longitude, v_lat, v_lon)
    }

    /// Receiver speed when reported, otherwise filtered displacement over time.
    fn candidate_speed(&self, fix: &RawFix, position: &PositionSample) -> f64 {
        if let Some(speed) = fix.speed_mps {
            return speed;
        }
        match self.last_filtered {
            Some(prev) if position.timestamp_ms > prev.timestamp_ms => {
                let dt = (position.timestamp_ms - prev.timestamp_ms) as f64 / 1000.0;
                haversine_distance(
                    prev.latitude,
                    prev.longitude,
                    position.latitude,
                    position.longitude,
                ) / dt
            }
            _ => self.validator.last_valid_speed().unwrap_or(0.0),
        }
    }

    fn stake_text(&self) -> String {
        match Stake::from_meters(self.stake_m) {
            Ok(stake) => stake.to_string(),
            Err(e) => {
                log::warn!("live stake unavailable ({}), showing {}", e, ZERO_STAKE);
                ZERO_STAKE.to_string()
            }
        }
    }
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new(&TrackingConfig::default())
    }
}
