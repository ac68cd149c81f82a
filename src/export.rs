use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ExportError;
use crate::types::{Calibration, TrackPoint};

/// Everything `end_track` hands back for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub media_id: String,
    pub total_chapters: u32,
    pub duration_ms: i64,
    pub track_points: Vec<TrackPoint>,
    pub calibrations: Vec<Calibration>,
    pub subtitle_text: String,
}

impl SessionSummary {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Accumulated distance of the last point, meters since the last calibration.
    pub fn final_distance_m(&self) -> f64 {
        self.track_points
            .last()
            .map(|p| p.accumulated_distance_m)
            .unwrap_or(0.0)
    }
}

/// GeoJSON `FeatureCollection`: one track `LineString` followed by one
/// `Point` per calibration.
pub fn track_geojson(points: &[TrackPoint], calibrations: &[Calibration]) -> Result<Value, ExportError> {
    if points.is_empty() {
        return Err(ExportError::InsufficientTrackData);
    }

    let coordinates: Vec<[f64; 2]> = points.iter().map(|p| [p.longitude, p.latitude]).collect();
    let properties: Vec<Value> = points
        .iter()
        .map(|p| {
            json!({
                "time": p.timestamp_ms,
                "speed": p.speed_mps,
                "stake": p.stake,
                "chapter": p.chapter,
            })
        })
        .collect();

    let mut features = vec![json!({
        "type": "Feature",
        "geometry": {
            "type": "LineString",
            "coordinates": coordinates,
        },
        "properties": {
            "type": "track",
            "points": properties,
        },
    })];

    features.extend(calibrations.iter().map(|c| {
        json!({
            "type": "Feature",
            "geometry": {
                "type": "Point",
                "coordinates": [c.longitude, c.latitude],
            },
            "properties": {
                "type": "calibration",
                "stake": c.stake,
                "time": c.timestamp_ms,
            },
        })
    }));

    Ok(json!({
        "type": "FeatureCollection",
        "features": features,
    }))
}

pub fn track_geojson_string(points: &[TrackPoint], calibrations: &[Calibration]) -> Result<String, ExportError> {
    let value = track_geojson(points, calibrations)?;
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Versioned JSON document with the full point and calibration history.
pub fn track_document(summary: &SessionSummary, record_time_ms: i64) -> Result<String, ExportError> {
    let record_time = DateTime::<Utc>::from_timestamp_millis(record_time_ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default();

    let doc = json!({
        "version": "1.0",
        "recordTime": record_time,
        "videoInfo": {
            "mediaId": summary.media_id,
            "totalChapters": summary.total_chapters,
        },
        "track": {
            "points": summary.track_points,
            "calibrations": summary.calibrations,
        },
    });
    Ok(serde_json::to_string_pretty(&doc)?)
}
