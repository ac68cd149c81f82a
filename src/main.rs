use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::json;

use stake_tracker_rs::{Direction, RawFix, RecordingSession, TrackingConfig};

#[derive(Parser, Debug)]
#[command(name = "stake_tracker")]
#[command(about = "Replay a GPS fix log into stake-tagged track and subtitle files", long_about = None)]
struct Args {
    /// Fix log: JSON array of fixes (.json or .json.gz)
    #[arg(value_name = "LOG")]
    log: PathBuf,

    /// Stake at the first fix, e.g. 12+340
    #[arg(long, default_value = "0+000")]
    stake: String,

    /// Stakes count down along the route
    #[arg(long, default_value_t = false)]
    decreasing: bool,

    /// Roll to a new video chapter every N fixes
    #[arg(long)]
    chapter_every: Option<usize>,

    /// Calibrate at a fix index, e.g. 120=13+000 (repeatable)
    #[arg(long, value_parser = parse_calibration)]
    calibrate: Vec<(usize, String)>,

    /// Output directory
    #[arg(long, default_value = "stake_tracker_sessions")]
    output_dir: PathBuf,

    /// JSON file overriding tracking parameters
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FixLog {
    Bare(Vec<RawFix>),
    Wrapped { fixes: Vec<RawFix> },
}

impl FixLog {
    fn into_fixes(self) -> Vec<RawFix> {
        match self {
            FixLog::Bare(fixes) | FixLog::Wrapped { fixes } => fixes,
        }
    }
}

fn parse_calibration(s: &str) -> Result<(usize, String), String> {
    let (index, stake) = s
        .split_once('=')
        .ok_or_else(|| format!("expected <fix_index>=<stake>, got {s:?}"))?;
    let index = index
        .trim()
        .parse()
        .map_err(|e| format!("bad fix index {index:?}: {e}"))?;
    Ok((index, stake.trim().to_string()))
}

fn load_log(path: &Path) -> Result<Vec<RawFix>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader: Box<dyn Read> = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let log: FixLog = serde_json::from_reader(BufReader::new(reader))
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(log.into_fixes())
}

fn load_config(path: Option<&Path>) -> Result<TrackingConfig> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            TrackingConfig::from_json(&text).context("parsing config")
        }
        None => Ok(TrackingConfig::default()),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    let fixes = load_log(&args.log)?;
    let Some(first) = fixes.first() else {
        bail!("{} contains no fixes", args.log.display());
    };
    let started_at = first.timestamp_ms;
    let origin = first.position().point();
    let calibrations: BTreeMap<usize, String> = args.calibrate.iter().cloned().collect();

    let mut session = RecordingSession::new(config);
    let direction = Direction::from_increasing(!args.decreasing);
    let media_id = session.start_recording(&args.stake, direction, started_at, Some(origin))?;
    log::info!("Replaying {} fixes from {} as {}", fixes.len(), args.log.display(), media_id);

    let mut listener_failures = 0;
    for (idx, fix) in fixes.iter().enumerate() {
        if let Some(n) = args.chapter_every.filter(|n| *n > 0) {
            if idx > 0 && idx % n == 0 {
                session.handle_video_chapter()?;
            }
        }
        if let Some(stake) = calibrations.get(&idx) {
            session
                .calibrate(stake, fix.timestamp_ms)
                .with_context(|| format!("calibrating fix {idx} to {stake}"))?;
        }
        if let Some(outcome) = session.handle_fix(fix)? {
            listener_failures += outcome.report.failures();
        }
    }

    let ended_at = fixes.last().map(|f| f.timestamp_ms).unwrap_or(started_at) + 1000;
    let export = session.stop_recording(ended_at)?;
    let document = session.export_track_json(ended_at)?;

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;
    let outputs = [
        (export.geojson_file_name(), export.geojson.as_str()),
        (export.subtitle_file_name(), export.subtitles.as_str()),
        (export.document_file_name(), document.as_str()),
    ];
    for (name, contents) in &outputs {
        let path = args.output_dir.join(name);
        fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
        log::info!("Wrote {}", path.display());
    }

    let summary = &export.summary;
    let report = json!({
        "media_id": summary.media_id,
        "fixes": fixes.len(),
        "track_points": summary.track_points.len(),
        "samples": session.sampler().sampled_points().len(),
        "calibrations": summary.calibrations.len(),
        "chapters": summary.total_chapters,
        "duration_s": summary.duration_ms as f64 / 1000.0,
        "final_stake": summary.track_points.last().map(|p| p.stake.clone()),
        "distance_since_calibration_m": summary.final_distance_m(),
        "listener_failures": listener_failures,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
