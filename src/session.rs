use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::TrackingConfig;
use crate::error::{ExportError, LedgerError, SessionError, SessionResult};
use crate::export::{self, SessionSummary};
use crate::ledger::{StakeLedger, TrackInfo};
use crate::listeners::{DeliveryReport, StatusListener};
use crate::sampler::{TrackSampler, TrackSegment};
use crate::stake::{is_valid_stake, ZERO_STAKE};
use crate::tracker::PositionTracker;
use crate::types::{Direction, GeoPoint, PositionSample, RawFix, TrackPoint, TrackedStatus};

/// What one fix produced on its way through the pipeline.
#[derive(Clone, Debug)]
pub struct FixOutcome {
    pub status: TrackedStatus,
    /// Present while recording
    pub point: Option<TrackPoint>,
    /// The point was kept by the sampler; refresh the map
    pub new_sample: bool,
    pub report: DeliveryReport,
}

/// Export payloads of a finished recording.
#[derive(Clone, Debug)]
pub struct RecordingExport {
    pub summary: SessionSummary,
    pub geojson: String,
    pub subtitles: String,
}

impl RecordingExport {
    pub fn geojson_file_name(&self) -> String {
        format!("track_{}.geojson", self.summary.media_id)
    }

    pub fn subtitle_file_name(&self) -> String {
        format!("subtitle_{}.srt", self.summary.media_id)
    }

    pub fn document_file_name(&self) -> String {
        format!("track_{}.json", self.summary.media_id)
    }
}

/// Wires tracker → ledger → sampler for one recorder.
pub struct RecordingSession {
    tracker: PositionTracker,
    ledger: StakeLedger,
    sampler: TrackSampler,
    direction: Direction,
    origin: Option<GeoPoint>,
    finished: Option<SessionSummary>,
}

impl RecordingSession {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            tracker: PositionTracker::new(&config),
            sampler: TrackSampler::new(&config),
            ledger: StakeLedger::new(config),
            direction: Direction::Increasing,
            origin: None,
            finished: None,
        }
    }

    pub fn add_status_listener(&mut self, listener: Arc<dyn StatusListener>) -> bool {
        self.tracker.add_status_listener(listener)
    }

    pub fn remove_status_listener(&mut self, listener: &Arc<dyn StatusListener>) -> bool {
        self.tracker.remove_status_listener(listener)
    }

    /// Start tracker and ledger together; returns the new media id.
    /// An empty stake starts unset and displays as `0+000`.
    pub fn start_recording(
        &mut self,
        initial_stake: &str,
        direction: Direction,
        now_ms: i64,
        origin: Option<GeoPoint>,
    ) -> SessionResult<String> {
        let display_stake = match initial_stake.trim() {
            "" => ZERO_STAKE,
            s => s,
        };
        self.tracker.start_record(display_stake, direction)?;

        self.direction = direction;
        self.origin = origin;
        self.finished = None;
        self.sampler.clear();
        let media_id = self
            .ledger
            .start_new_track(initial_stake, direction, now_ms, origin)?
            .to_string();
        Ok(media_id)
    }

    /// Run one raw fix through the pipeline. `None` while not recording.
    pub fn handle_fix(&mut self, fix: &RawFix) -> SessionResult<Option<FixOutcome>> {
        let Some(update) = self.tracker.handle_fix(fix) else {
            return Ok(None);
        };

        let (point, new_sample) = if self.ledger.is_recording() {
            let point = self
                .ledger
                .add_track_point(&update.status.position(), update.raw_speed_mps)?;
            let new_sample = self.sampler.add_point(&point);
            (Some(point), new_sample)
        } else {
            (None, false)
        };

        Ok(Some(FixOutcome {
            status: update.status,
            point,
            new_sample,
            report: update.report,
        }))
    }

    /// Pin the current position to `stake` in both ledger and tracker, or
    /// in neither.
    pub fn calibrate(&mut self, stake: &str, now_ms: i64) -> SessionResult<()> {
        if !is_valid_stake(stake) {
            return Err(LedgerError::InvalidStakeFormat(stake.to_string()).into());
        }
        if !self.ledger.is_recording() {
            return Err(LedgerError::NoActiveSession.into());
        }
        let here = self
            .tracker
            .get_status()
            .map(|s| s.position().point())
            .or(self.origin)
            .ok_or(SessionError::NoPosition)?;

        let position = PositionSample::new(here.latitude, here.longitude, now_ms);
        self.ledger.calibrate_stake(stake, &position)?;
        self.tracker.calibrate_stake(stake)?;
        Ok(())
    }

    pub fn handle_video_chapter(&mut self) -> SessionResult<u32> {
        Ok(self.ledger.handle_video_chapter()?)
    }

    /// Flip the travel direction for the next recording.
    pub fn toggle_direction(&mut self) -> SessionResult<Direction> {
        if self.ledger.is_recording() {
            return Err(SessionError::DirectionLocked);
        }
        self.direction = self.direction.reversed();
        Ok(self.direction)
    }

    /// Stop both components and build the export payloads. The history is
    /// kept, so a failed export can be retried with [`Self::export`].
    pub fn stop_recording(&mut self, now_ms: i64) -> SessionResult<RecordingExport> {
        self.tracker.stop_record();
        let summary = self.ledger.end_track(now_ms)?;
        log::info!(
            "Recording {} stopped: {} points, {} samples, {} chapters",
            summary.media_id,
            summary.track_points.len(),
            self.sampler.sampled_points().len(),
            summary.total_chapters
        );
        self.finished = Some(summary);
        self.export()
    }

    pub fn export(&self) -> SessionResult<RecordingExport> {
        let summary = self.finished.as_ref().ok_or(SessionError::NothingToExport)?;
        if !self.sampler.has_samples() {
            return Err(ExportError::InsufficientTrackData.into());
        }
        let geojson =
            export::track_geojson_string(self.sampler.sampled_points(), &summary.calibrations)?;
        Ok(RecordingExport {
            summary: summary.clone(),
            geojson,
            subtitles: summary.subtitle_text.clone(),
        })
    }

    /// Versioned JSON document of the full history.
    pub fn export_track_json(&self, now_ms: i64) -> SessionResult<String> {
        Ok(self.ledger.export_track_json(now_ms)?)
    }

    pub fn render_segments(&mut self) -> Vec<TrackSegment> {
        self.sampler.get_unrendered_segments()
    }

    pub fn current_info(&self) -> Option<TrackInfo> {
        self.ledger.current_info()
    }

    pub fn is_recording(&self) -> bool {
        self.ledger.is_recording()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn status(&self) -> Option<&TrackedStatus> {
        self.tracker.get_status()
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    pub fn ledger(&self) -> &StakeLedger {
        &self.ledger
    }

    pub fn sampler(&self) -> &TrackSampler {
        &self.sampler
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new(TrackingConfig::default())
    }
}

/// Thread-safe handle for hosts that deliver fixes from several threads.
#[derive(Clone)]
pub struct SharedRecorder {
    inner: Arc<Mutex<RecordingSession>>,
}

impl SharedRecorder {
    pub fn new(session: RecordingSession) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    fn lock(&self) -> SessionResult<MutexGuard<'_, RecordingSession>> {
        self.inner.lock().map_err(|_| SessionError::LockPoisoned)
    }

    /// Run `f` with exclusive access to the session.
    pub fn with<R>(&self, f: impl FnOnce(&mut RecordingSession) -> SessionResult<R>) -> SessionResult<R> {
        let mut session = self.lock()?;
        f(&mut session)
    }

    pub fn handle_fix(&self, fix: &RawFix) -> SessionResult<Option<FixOutcome>> {
        self.lock()?.handle_fix(fix)
    }

    pub fn calibrate(&self, stake: &str, now_ms: i64) -> SessionResult<()> {
        self.lock()?.calibrate(stake, now_ms)
    }

    pub fn stop_recording(&self, now_ms: i64) -> SessionResult<RecordingExport> {
        self.lock()?.stop_recording(now_ms)
    }

    pub fn is_recording(&self) -> SessionResult<bool> {
        Ok(self.lock()?.is_recording())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::offset_meters;
    use crate::stake::Stake;
    use std::thread;

    const T0: i64 = 1_700_000_000_000;

    fn origin() -> GeoPoint {
        GeoPoint::new(30.0, 120.0)
    }

    /// Northbound at 12 m/s, one fix per second, first fix at `T0 + 1s`.
    fn fixes(count: usize) -> Vec<RawFix> {
        (1..=count)
            .map(|i| {
                let p = offset_meters(&origin(), 12.0 * i as f64, 0.0);
                RawFix::new(p.latitude, p.longitude, T0 + i as i64 * 1000)
                    .with_speed(12.0)
                    .with_heading(0.0)
                    .with_accuracy(4.0, 10)
            })
            .collect()
    }

    fn recording() -> RecordingSession {
        let mut session = RecordingSession::default();
        session
            .start_recording("10+000", Direction::Increasing, T0, Some(origin()))
            .unwrap();
        session
    }

    #[test]
    fn test_idle_session_ignores_fixes() {
        let mut session = RecordingSession::default();
        assert!(session.handle_fix(&fixes(1)[0]).unwrap().is_none());
    }

    #[test]
    fn test_fix_flows_through_pipeline() {
        let mut session = recording();
        let outcome = session.handle_fix(&fixes(1)[0]).unwrap().unwrap();
        let point = outcome.point.unwrap();
        assert!(outcome.new_sample);
        assert_eq!(point.chapter, 1);
        assert_eq!(point.video_time_ms, 1000);
        assert_eq!(session.ledger().track_points().len(), 1);
        assert_eq!(session.sampler().sampled_points().len(), 1);
        assert_eq!(outcome.status.signal_strength(), 4);
    }

    #[test]
    fn test_drive_accumulates_distance() {
        let mut session = recording();
        for fix in fixes(60) {
            session.handle_fix(&fix).unwrap();
        }
        let info = session.current_info().unwrap();
        assert_eq!(info.point_count, 60);
        // 60 m accepted every fifth fix
        assert!((info.accumulated_distance_m - 720.0).abs() < 1.0, "{:?}", info);
        let last: Stake = info.last_stake.unwrap().parse().unwrap();
        assert!((10_715..=10_721).contains(&last.total_meters()), "{last}");
        assert!(!session.render_segments().is_empty());
    }

    #[test]
    fn test_ledger_sees_receiver_speed() {
        let mut session = RecordingSession::default();
        session
            .start_recording("10+000", Direction::Increasing, T0, Some(origin()))
            .unwrap();

        let mut outcomes = Vec::new();
        for i in 1..=3i64 {
            let p = offset_meters(&origin(), 100.2 * i as f64, 0.0);
            let fix = RawFix::new(p.latitude, p.longitude, T0 + 20_000 * i)
                .with_speed(5.01)
                .with_heading(0.0);
            outcomes.push(session.handle_fix(&fix).unwrap().unwrap());
        }

        // the display speed still ramps up through its window
        assert!(outcomes[0].status.speed_mps < 2.0);
        let first = outcomes[0].point.as_ref().unwrap();
        assert!((first.speed_mps - 5.01).abs() < 1e-9);

        let info = session.current_info().unwrap();
        assert!((info.accumulated_distance_m - 300.6).abs() < 0.5, "{:?}", info);
        assert_eq!(info.last_stake.as_deref(), Some("10+300"));

        let export = session.stop_recording(T0 + 61_000).unwrap();
        assert_eq!(export.subtitles.matches(" --> ").count(), 3);
        assert!(export.subtitles.contains("K10+300"));
    }

    #[test]
    fn test_calibrate_is_all_or_nothing() {
        let mut session = recording();
        session.handle_fix(&fixes(1)[0]).unwrap();

        let err = session.calibrate("x+1", T0 + 1500).unwrap_err();
        assert!(matches!(err, SessionError::Ledger(LedgerError::InvalidStakeFormat(_))));
        assert_eq!(session.ledger().calibrations().len(), 1);
        assert_eq!(session.status().unwrap().stake, "10+000");

        session.calibrate("20+000", T0 + 1500).unwrap();
        assert_eq!(session.ledger().calibrations().len(), 2);
        assert_eq!(session.status().unwrap().stake, "20+000");

        let outcome = session.handle_fix(&fixes(2)[1]).unwrap().unwrap();
        assert_eq!(outcome.point.unwrap().stake, "20+000");
    }

    #[test]
    fn test_calibrate_before_first_fix_uses_origin() {
        let mut session = recording();
        session.calibrate("11+000", T0 + 100).unwrap();
        let cal = &session.ledger().calibrations()[1];
        assert_eq!(cal.latitude, 30.0);

        let mut session = RecordingSession::default();
        session.start_recording("1+000", Direction::Increasing, T0, None).unwrap();
        assert!(matches!(
            session.calibrate("2+000", T0),
            Err(SessionError::NoPosition)
        ));
    }

    #[test]
    fn test_direction_locked_while_recording() {
        let mut session = RecordingSession::default();
        assert_eq!(session.toggle_direction().unwrap(), Direction::Decreasing);
        session
            .start_recording("1+000", Direction::Decreasing, T0, Some(origin()))
            .unwrap();
        assert!(matches!(session.toggle_direction(), Err(SessionError::DirectionLocked)));
        session.handle_fix(&fixes(1)[0]).unwrap();
        session.stop_recording(T0 + 2000).unwrap();
        assert_eq!(session.toggle_direction().unwrap(), Direction::Increasing);
    }

    #[test]
    fn test_chapters() {
        let mut session = recording();
        assert!(session.handle_video_chapter().is_ok());
        let outcome = session.handle_fix(&fixes(1)[0]).unwrap().unwrap();
        assert_eq!(outcome.point.unwrap().chapter, 2);
    }

    #[test]
    fn test_stop_builds_export() {
        let mut session = recording();
        for fix in fixes(5) {
            session.handle_fix(&fix).unwrap();
        }
        let export = session.stop_recording(T0 + 6000).unwrap();
        assert!(!session.is_recording());
        assert_eq!(export.summary.track_points.len(), 5);
        assert_eq!(export.summary.duration_ms, 6000);
        assert_eq!(export.subtitles.matches(" --> ").count(), 5);
        assert!(export.geojson.contains("\"LineString\""));
        assert_eq!(
            export.subtitle_file_name(),
            format!("subtitle_{}.srt", export.summary.media_id)
        );

        let retry = session.export().unwrap();
        assert_eq!(retry.summary, export.summary);
        assert!(session.handle_fix(&fixes(6)[5]).unwrap().is_none());
    }

    #[test]
    fn test_stop_without_samples() {
        let mut session = recording();
        let err = session.stop_recording(T0 + 1000).unwrap_err();
        assert!(matches!(err, SessionError::Export(ExportError::InsufficientTrackData)));
        assert!(!session.is_recording());
        assert!(matches!(
            RecordingSession::default().export(),
            Err(SessionError::NothingToExport)
        ));
    }

    #[test]
    fn test_invalid_start_stake() {
        let mut session = RecordingSession::default();
        assert!(session
            .start_recording("1+0", Direction::Increasing, T0, None)
            .is_err());
        assert!(!session.is_recording());

        session.start_recording("", Direction::Increasing, T0, None).unwrap();
        assert!(session.is_recording());
    }

    #[test]
    fn test_shared_recorder_across_threads() {
        let recorder = SharedRecorder::new(RecordingSession::default());
        recorder
            .with(|s| s.start_recording("0+000", Direction::Increasing, T0, Some(origin())))
            .unwrap();

        let worker = recorder.clone();
        let handle = thread::spawn(move || {
            for fix in fixes(10) {
                worker.handle_fix(&fix).unwrap();
            }
        });
        handle.join().unwrap();

        assert!(recorder.is_recording().unwrap());
        let export = recorder.stop_recording(T0 + 11_000).unwrap();
        assert_eq!(export.summary.track_points.len(), 10);
    }
}
