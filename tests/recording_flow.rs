use std::fs;
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use stake_tracker_rs::geodesy::meters_per_degree_lat;
use stake_tracker_rs::listeners::ChannelListener;
use stake_tracker_rs::{
    Direction, GeoPoint, PositionSample, RawFix, RecordingSession, SessionError, StakeLedger,
    TrackingConfig,
};

const T0: i64 = 1_700_000_000_000;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn origin() -> GeoPoint {
    GeoPoint::new(31.2, 121.4)
}

/// `meters` due north of the origin.
fn north_of_origin(meters: f64) -> GeoPoint {
    let o = origin();
    GeoPoint::new(o.latitude + meters / meters_per_degree_lat(), o.longitude)
}

#[test]
fn ledger_three_fixes_end_to_end() {
    init_logging();
    let mut ledger = StakeLedger::default();
    ledger
        .start_new_track("10+000", Direction::Increasing, T0, Some(origin()))
        .unwrap();

    for i in 1..=3 {
        let p = north_of_origin(100.2 * i as f64);
        let position = PositionSample::new(p.latitude, p.longitude, T0 + 20_000 * i);
        ledger.add_track_point(&position, 5.01).unwrap();
    }

    let summary = ledger.end_track(T0 + 60_000).unwrap();
    assert_abs_diff_eq!(ledger.accumulated_distance_m(), 300.6, epsilon = 0.5);
    assert_eq!(summary.track_points.last().unwrap().stake, "10+300");

    let cues: Vec<&str> = summary.subtitle_text.trim_end().split("\n\n").collect();
    assert_eq!(cues.len(), 3);
    for (i, cue) in cues.iter().enumerate() {
        assert!(cue.starts_with(&format!("{}\n", i + 1)));
    }
    assert!(cues[0].contains("00:00:20,000 --> 00:00:21,000"));
}

#[test]
fn recorded_drive_exports_to_disk() {
    init_logging();
    let mut session = RecordingSession::new(TrackingConfig::default());
    let (listener, rx) = ChannelListener::new();
    session.add_status_listener(listener);

    session
        .start_recording("3+500", Direction::Decreasing, T0, Some(origin()))
        .unwrap();

    let fixes: Vec<RawFix> = (1..=90)
        .map(|i| {
            let p = north_of_origin(12.0 * i as f64);
            RawFix::new(p.latitude, p.longitude, T0 + i * 1000)
                .with_speed(12.0)
                .with_heading(0.0)
                .with_accuracy(6.0, 11)
        })
        .collect();

    for (i, fix) in fixes.iter().enumerate() {
        if i == 45 {
            session.handle_video_chapter().unwrap();
        }
        let outcome = session.handle_fix(fix).unwrap().unwrap();
        assert!(outcome.report.all_delivered());
    }
    assert_eq!(rx.try_iter().count(), 90);

    let segments = session.render_segments();
    assert!(!segments.is_empty());

    let export = session.stop_recording(T0 + 91_000).unwrap();
    let summary = &export.summary;
    assert_eq!(summary.total_chapters, 2);
    assert_eq!(summary.track_points.len(), 90);

    // 1080 m counted down from 3+500
    assert_abs_diff_eq!(summary.final_distance_m(), 1080.0, epsilon = 5.0);
    let last: stake_tracker_rs::Stake = summary.track_points.last().unwrap().stake.parse().unwrap();
    assert!((2_415..=2_425).contains(&last.total_meters()), "last stake {}", last);

    let dir = tempfile::tempdir().unwrap();
    let geojson_path = dir.path().join(export.geojson_file_name());
    let srt_path = dir.path().join(export.subtitle_file_name());
    fs::write(&geojson_path, &export.geojson).unwrap();
    fs::write(&srt_path, &export.subtitles).unwrap();

    let geojson: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&geojson_path).unwrap()).unwrap();
    let features = geojson["features"].as_array().unwrap();
    assert_eq!(features[0]["geometry"]["type"], "LineString");
    assert_eq!(features.last().unwrap()["properties"]["type"], "calibration");

    let srt = fs::read_to_string(&srt_path).unwrap();
    assert_eq!(srt.matches(" --> ").count(), 90);
    assert!(srt.contains("桩号: K3+500"));
}

#[test]
fn calibration_mid_drive_rebases_labels() {
    init_logging();
    let mut session = RecordingSession::default();
    session
        .start_recording("0+000", Direction::Increasing, T0, Some(origin()))
        .unwrap();

    let fix_at = |i: i64| {
        let p = north_of_origin(12.0 * i as f64);
        RawFix::new(p.latitude, p.longitude, T0 + i * 1000)
            .with_speed(12.0)
            .with_heading(0.0)
    };

    for i in 1..=20 {
        session.handle_fix(&fix_at(i)).unwrap();
    }
    session.calibrate("7+000", T0 + 20_500).unwrap();
    let pinned = session.handle_fix(&fix_at(21)).unwrap().unwrap();
    assert_eq!(pinned.point.unwrap().stake, "7+000");

    for i in 22..=40 {
        session.handle_fix(&fix_at(i)).unwrap();
    }
    let info = session.current_info().unwrap();
    // 60 m accepted at fixes 25, 30, 35 and 40
    assert_abs_diff_eq!(info.accumulated_distance_m, 240.0, epsilon = 1.0);
    let stake: stake_tracker_rs::Stake = info.last_stake.unwrap().parse().unwrap();
    assert!((7_235..=7_241).contains(&stake.total_meters()), "stake {}", stake);

    assert!(matches!(
        session.calibrate("7+00", T0 + 41_000),
        Err(SessionError::Ledger(_))
    ));
    let calibrations = session.ledger().calibrations();
    assert_eq!(calibrations.len(), 2);
    assert!(calibrations[0].is_initial);
    assert!(!calibrations[1].is_initial);
}

#[test]
fn shared_listener_survives_restart() {
    init_logging();
    let mut session = RecordingSession::default();
    let (listener, rx) = ChannelListener::new();
    let listener: Arc<dyn stake_tracker_rs::listeners::StatusListener> = listener;
    assert!(session.add_status_listener(listener.clone()));

    for run in 0..2 {
        session
            .start_recording("1+000", Direction::Increasing, T0 + run * 100_000, Some(origin()))
            .unwrap();
        let fix = RawFix::new(31.2, 121.4, T0 + run * 100_000 + 1000).with_speed(0.0);
        session.handle_fix(&fix).unwrap();
        session.stop_recording(T0 + run * 100_000 + 2000).unwrap();
    }
    assert_eq!(rx.try_iter().count(), 2);
    assert!(session.remove_status_listener(&listener));
}
