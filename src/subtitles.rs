//! SRT subtitle generation keyed to elapsed video time.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::types::TrackPoint;

/// `HH:MM:SS,mmm` for a video offset in milliseconds.
pub fn format_srt_time(ms: i64) -> String {
    let ms = ms.max(0);
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let secs = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// One cue per point, grouped by chapter in ascending order and numbered
/// sequentially across the whole file.
pub fn generate_srt(points: &[TrackPoint], cue_ms: i64) -> String {
    let mut chapters: BTreeMap<u32, Vec<&TrackPoint>> = BTreeMap::new();
    for point in points {
        chapters.entry(point.chapter).or_default().push(point);
    }

    let mut srt = String::new();
    let mut index = 1;
    for point in chapters.values().flatten() {
        // writing into a String cannot fail
        let _ = write!(
            srt,
            "{}\n{} --> {}\n桩号: K{} 速度: {:.1}km/h\n\n",
            index,
            format_srt_time(point.video_time_ms),
            format_srt_time(point.video_time_ms + cue_ms),
            point.stake,
            point.speed_kmh()
        );
        index += 1;
    }
    srt
}
