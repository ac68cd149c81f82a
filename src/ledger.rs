//! Session bookkeeping: accepted distance, stake labels, calibrations and
//! chapters for one recording.
//!
//! The ledger keeps its own speed pipeline (acceleration clamp plus
//! exponential smoothing). It is the authoritative source for stake and
//! distance; the tracker's validator only feeds the live display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TrackingConfig;
use crate::error::{ExportError, LedgerError};
use crate::export::{self, SessionSummary};
use crate::geodesy::haversine_distance;
use crate::stake::{add_stake_offset, Stake, ZERO_STAKE};
use crate::subtitles;
use crate::types::{Calibration, Direction, GeoPoint, PositionSample, TrackPoint};

#[derive(Clone, Copy, Debug, PartialEq)]
struct SpeedSample {
    speed_mps: f64,
    timestamp_ms: i64,
}

#[derive(Clone, Debug)]
struct Session {
    media_id: String,
    chapter: u32,
    started_at_ms: i64,
    ended_at_ms: Option<i64>,
    direction: Direction,
    /// `None` when the track was started without a stake.
    initial_stake: Option<String>,
    accumulated_distance_m: f64,
    /// Last accepted point (or calibration point / origin).
    baseline: Option<PositionSample>,
    last_speed: Option<SpeedSample>,
    track_points: Vec<TrackPoint>,
    calibrations: Vec<Calibration>,
}

/// Snapshot of the running session for status displays.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub point_count: usize,
    pub current_chapter: u32,
    /// Video time of the last point
    pub duration_ms: i64,
    pub last_stake: Option<String>,
    pub last_speed_mps: f64,
    pub accumulated_distance_m: f64,
}

/// Stake mapping state a host can persist and inspect after a crash.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerCheckpoint {
    pub media_id: String,
    pub initial_stake: Option<String>,
    pub calibrations: Vec<Calibration>,
    pub accumulated_distance_m: f64,
    pub direction: Direction,
}

pub struct StakeLedger {
    config: TrackingConfig,
    recording: bool,
    session: Option<Session>,
    sessions_started: u64,
}

impl StakeLedger {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            config,
            recording: false,
            session: None,
            sessions_started: 0,
        }
    }

    /// Begin a fresh session and return its media id.
    ///
    /// An empty `initial_stake` leaves the stake unset; labels then read
    /// `0+000` until the first calibration. Any other text must be a valid
    /// stake and is stored in canonical form. `origin`, when known, becomes
    /// the first distance baseline.
    pub fn start_new_track(
        &mut self,
        initial_stake: &str,
        direction: Direction,
        started_at_ms: i64,
        origin: Option<GeoPoint>,
    ) -> Result<&str, LedgerError> {
        let initial_stake = match initial_stake.trim() {
            "" => None,
            text => Some(canonical_stake(text)?),
        };
        self.sessions_started += 1;
        let media_id = make_media_id(started_at_ms, self.sessions_started);

        let initial = Calibration {
            timestamp_ms: started_at_ms,
            stake: initial_stake.clone().unwrap_or_else(|| ZERO_STAKE.to_string()),
            latitude: origin.map(|o| o.latitude).unwrap_or(0.0),
            longitude: origin.map(|o| o.longitude).unwrap_or(0.0),
            video_time_ms: 0,
            chapter: 1,
            is_initial: true,
        };

        log::info!(
            "Track {} started at stake {} ({:?})",
            media_id,
            initial.stake,
            direction
        );

        self.recording = true;
        let session = self.session.insert(Session {
            media_id,
            chapter: 1,
            started_at_ms,
            ended_at_ms: None,
            direction,
            initial_stake,
            accumulated_distance_m: 0.0,
            baseline: origin.map(|o| PositionSample::new(o.latitude, o.longitude, started_at_ms)),
            last_speed: None,
            track_points: Vec::new(),
            calibrations: vec![initial],
        });
        Ok(session.media_id.as_str())
    }

    /// Record one fix. Always appends exactly one point while recording.
    pub fn add_track_point(
        &mut self,
        position: &PositionSample,
        raw_speed_mps: f64,
    ) -> Result<TrackPoint, LedgerError> {
        if !self.recording {
            return Err(LedgerError::NoActiveSession);
        }
        let config = &self.config;
        let session = self.session.as_mut().ok_or(LedgerError::NoActiveSession)?;

        let speed = process_speed(config, raw_speed_mps, position.timestamp_ms, session.last_speed);
        let reference_speed = session.last_speed.map(|s| s.speed_mps).unwrap_or(speed);
        session.last_speed = Some(SpeedSample {
            speed_mps: speed,
            timestamp_ms: position.timestamp_ms,
        });

        match session.baseline {
            None => session.baseline = Some(*position),
            Some(base) if speed <= 0.0 => {
                session.baseline = Some(PositionSample {
                    timestamp_ms: position.timestamp_ms,
                    ..base
                });
            }
            Some(base) => {
                let distance = haversine_distance(
                    base.latitude,
                    base.longitude,
                    position.latitude,
                    position.longitude,
                );
                let elapsed_s = (position.timestamp_ms - base.timestamp_ms) as f64 / 1000.0;
                if distance_plausible(config, distance, reference_speed, elapsed_s) {
                    session.accumulated_distance_m += distance;
                    session.baseline = Some(*position);
                } else {
                    log::debug!(
                        "Distance rejected: {:.1} m over {:.1} s at {:.2} m/s",
                        distance,
                        elapsed_s,
                        reference_speed
                    );
                }
            }
        }

        let pin_ms = config.calibration_pin_ms;
        let stake = session
            .calibrations
            .last()
            .filter(|c| position.timestamp_ms - c.timestamp_ms < pin_ms)
            .map(|c| c.stake.clone())
            .unwrap_or_else(|| current_stake(session));

        let point = TrackPoint {
            timestamp_ms: position.timestamp_ms,
            latitude: position.latitude,
            longitude: position.longitude,
            speed_mps: speed,
            video_time_ms: position.timestamp_ms - session.started_at_ms,
            chapter: session.chapter,
            stake,
            accumulated_distance_m: session.accumulated_distance_m,
        };
        session.track_points.push(point.clone());
        Ok(point)
    }

    /// Pin `position` to `new_stake` and restart distance accumulation there.
    pub fn calibrate_stake(
        &mut self,
        new_stake: &str,
        position: &PositionSample,
    ) -> Result<Calibration, LedgerError> {
        let new_stake = canonical_stake(new_stake)?;
        if !self.recording {
            return Err(LedgerError::NoActiveSession);
        }
        let session = self.session.as_mut().ok_or(LedgerError::NoActiveSession)?;

        let calibration = Calibration {
            timestamp_ms: position.timestamp_ms,
            stake: new_stake.clone(),
            latitude: position.latitude,
            longitude: position.longitude,
            video_time_ms: position.timestamp_ms - session.started_at_ms,
            chapter: session.chapter,
            is_initial: false,
        };
        session.calibrations.push(calibration.clone());
        session.initial_stake = Some(new_stake.clone());
        session.accumulated_distance_m = 0.0;
        session.baseline = Some(*position);

        log::info!(
            "Stake calibrated to {} (chapter {})",
            new_stake,
            session.chapter
        );
        Ok(calibration)
    }

    /// The external recorder rolled to a new file. Returns the new chapter.
    pub fn handle_video_chapter(&mut self) -> Result<u32, LedgerError> {
        if !self.recording {
            return Err(LedgerError::NoActiveSession);
        }
        let session = self.session.as_mut().ok_or(LedgerError::NoActiveSession)?;
        session.chapter += 1;
        log::info!("Video chapter {}", session.chapter);
        Ok(session.chapter)
    }

    /// Stop recording and summarize the session. History stays in memory,
    /// so calling this again returns the same summary.
    pub fn end_track(&mut self, now_ms: i64) -> Result<SessionSummary, LedgerError> {
        let session = self.session.as_mut().ok_or(LedgerError::NoActiveSession)?;
        if self.recording {
            log::info!(
                "Track {} ended with {} points",
                session.media_id,
                session.track_points.len()
            );
        }
        self.recording = false;
        let ended_at = *session.ended_at_ms.get_or_insert(now_ms);

        Ok(SessionSummary {
            media_id: session.media_id.clone(),
            total_chapters: session.chapter,
            duration_ms: (ended_at - session.started_at_ms).max(0),
            track_points: session.track_points.clone(),
            calibrations: session.calibrations.clone(),
            subtitle_text: subtitles::generate_srt(&session.track_points, self.config.subtitle_cue_ms),
        })
    }

    pub fn generate_subtitles(&self) -> String {
        self.session
            .as_ref()
            .map(|s| subtitles::generate_srt(&s.track_points, self.config.subtitle_cue_ms))
            .unwrap_or_default()
    }

    pub fn current_info(&self) -> Option<TrackInfo> {
        let session = self.session.as_ref()?;
        let last = session.track_points.last();
        Some(TrackInfo {
            point_count: session.track_points.len(),
            current_chapter: session.chapter,
            duration_ms: last.map(|p| p.video_time_ms).unwrap_or(0),
            last_stake: last.map(|p| p.stake.clone()),
            last_speed_mps: last.map(|p| p.speed_mps).unwrap_or(0.0),
            accumulated_distance_m: session.accumulated_distance_m,
        })
    }

    /// Relabel stored points from their governing calibration plus the raw
    /// distance walked since the first point after it. Returns the number of
    /// points whose label changed.
    pub fn recompute_stakes(&mut self) -> usize {
        let Some(session) = self.session.as_mut() else {
            return 0;
        };
        let sign = session.direction.sign();
        let mut changed = 0;

        for (idx, calibration) in session.calibrations.iter().enumerate() {
            let next_ts = session.calibrations.get(idx + 1).map(|c| c.timestamp_ms);
            let points = &mut session.track_points;
            let start = points.partition_point(|p| p.timestamp_ms < calibration.timestamp_ms);
            let end = next_ts
                .map(|ts| points.partition_point(|p| p.timestamp_ms < ts))
                .unwrap_or(points.len());

            let mut walked = 0.0;
            for i in start..end {
                if i > start {
                    let (a, b) = (&points[i - 1], &points[i]);
                    walked += haversine_distance(a.latitude, a.longitude, b.latitude, b.longitude);
                }
                let stake = offset_or_zero(&calibration.stake, sign * walked);
                if points[i].stake != stake {
                    points[i].stake = stake;
                    changed += 1;
                }
            }
        }
        changed
    }

    pub fn checkpoint(&self) -> Option<LedgerCheckpoint> {
        self.session.as_ref().map(|s| LedgerCheckpoint {
            media_id: s.media_id.clone(),
            initial_stake: s.initial_stake.clone(),
            calibrations: s.calibrations.clone(),
            accumulated_distance_m: s.accumulated_distance_m,
            direction: s.direction,
        })
    }

    /// Full history as a versioned JSON document.
    pub fn export_track_json(&self, now_ms: i64) -> Result<String, ExportError> {
        let session = self.session.as_ref().ok_or(ExportError::InsufficientTrackData)?;
        let summary = SessionSummary {
            media_id: session.media_id.clone(),
            total_chapters: session.chapter,
            duration_ms: (session.ended_at_ms.unwrap_or(now_ms) - session.started_at_ms).max(0),
            track_points: session.track_points.clone(),
            calibrations: session.calibrations.clone(),
            subtitle_text: String::new(),
        };
        export::track_document(&summary, now_ms)
    }

    pub fn clear(&mut self) {
        self.recording = false;
        self.session = None;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn media_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.media_id.as_str())
    }

    pub fn chapter(&self) -> u32 {
        self.session.as_ref().map(|s| s.chapter).unwrap_or(0)
    }

    pub fn direction(&self) -> Option<Direction> {
        self.session.as_ref().map(|s| s.direction)
    }

    pub fn accumulated_distance_m(&self) -> f64 {
        self.session
            .as_ref()
            .map(|s| s.accumulated_distance_m)
            .unwrap_or(0.0)
    }

    pub fn track_points(&self) -> &[TrackPoint] {
        self.session
            .as_ref()
            .map(|s| s.track_points.as_slice())
            .unwrap_or(&[])
    }

    pub fn calibrations(&self) -> &[Calibration] {
        self.session
            .as_ref()
            .map(|s| s.calibrations.as_slice())
            .unwrap_or(&[])
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }
}

impl Default for StakeLedger {
    fn default() -> Self {
        Self::new(TrackingConfig::default())
    }
}

fn make_media_id(started_at_ms: i64, sequence: u64) -> String {
    let stamp = DateTime::<Utc>::from_timestamp_millis(started_at_ms)
        .map(|t| t.format("%Y%m%d%H%M%S").to_string())
        .unwrap_or_else(|| started_at_ms.to_string());
    format!("{}_{:04}", stamp, sequence % 10_000)
}

fn canonical_stake(text: &str) -> Result<String, LedgerError> {
    text.parse::<Stake>()
        .map(|stake| stake.to_string())
        .map_err(|_| LedgerError::InvalidStakeFormat(text.to_string()))
}

/// Accept `distance_m` only when it clears the update floor and stays
/// within the configured ratio of the distance `speed_mps` covers in
/// `elapsed_s`. Both ratio bounds are inclusive.
fn distance_plausible(
    config: &TrackingConfig,
    distance_m: f64,
    speed_mps: f64,
    elapsed_s: f64,
) -> bool {
    if distance_m < config.min_update_distance_m {
        return false;
    }
    let ratio = distance_m / (speed_mps * elapsed_s);
    ratio >= config.min_distance_ratio && ratio <= config.max_distance_ratio
}

/// Clamp acceleration, smooth toward the new sample, zero crawl speeds.
fn process_speed(
    config: &TrackingConfig,
    raw_mps: f64,
    timestamp_ms: i64,
    last: Option<SpeedSample>,
) -> f64 {
    if !raw_mps.is_finite() || raw_mps < 0.0 {
        return 0.0;
    }

    let mut speed = raw_mps;
    if let Some(prev) = last {
        let dt = (timestamp_ms - prev.timestamp_ms) as f64 / 1000.0;
        let delta = speed - prev.speed_mps;
        if dt <= 0.0 || delta.abs() / dt > config.max_acceleration_mps2 {
            let max_change = config.max_acceleration_mps2 * dt.max(0.0);
            speed = prev.speed_mps + delta.signum() * max_change;
        }
        let alpha = config.speed_smoothing_factor;
        speed = prev.speed_mps * (1.0 - alpha) + speed * alpha;
    }

    if speed * 3.6 < config.min_speed_kmh {
        0.0
    } else {
        speed
    }
}

fn current_stake(session: &Session) -> String {
    match session.initial_stake.as_deref() {
        None => ZERO_STAKE.to_string(),
        Some(initial) => offset_or_zero(
            initial,
            session.direction.sign() * session.accumulated_distance_m,
        ),
    }
}

fn offset_or_zero(stake: &str, offset_m: f64) -> String {
    add_stake_offset(stake, offset_m).unwrap_or_else(|e| {
        log::warn!("Stake arithmetic failed ({}), falling back to {}", e, ZERO_STAKE);
        ZERO_STAKE.to_string()
    })
}
