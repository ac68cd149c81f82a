pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// One raw location reading as delivered by the positioning subsystem.
///
/// Speed and heading are optional: many receivers omit them on the first
/// fixes after a cold start.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawFix {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "speed", default)]
    pub speed_mps: Option<f64>,
    /// Course over ground, radians clockwise from true north.
    #[serde(rename = "heading", default)]
    pub heading_rad: Option<f64>,
    #[serde(rename = "accuracy", default)]
    pub accuracy_m: Option<f64>,
    #[serde(default)]
    pub satellites: Option<u32>,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
}

impl RawFix {
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            speed_mps: None,
            heading_rad: None,
            accuracy_m: None,
            satellites: None,
            timestamp_ms,
        }
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = Some(speed_mps);
        self
    }

    pub fn with_heading(mut self, heading_rad: f64) -> Self {
        self.heading_rad = Some(heading_rad);
        self
    }

    pub fn with_accuracy(mut self, accuracy_m: f64, satellites: u32) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self.satellites = Some(satellites);
        self
    }

    pub fn position(&self) -> PositionSample {
        PositionSample::new(self.latitude, self.longitude, self.timestamp_ms)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A position tagged with the time it was observed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
}

impl PositionSample {
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp_ms,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Direction in which stake values run while travelling forward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Increasing,
    Decreasing,
}

impl Direction {
    pub fn from_increasing(is_increasing: bool) -> Self {
        if is_increasing {
            Direction::Increasing
        } else {
            Direction::Decreasing
        }
    }

    /// +1.0 for increasing stakes, -1.0 for decreasing.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Increasing => 1.0,
            Direction::Decreasing => -1.0,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Direction::Increasing => Direction::Decreasing,
            Direction::Decreasing => Direction::Increasing,
        }
    }
}

/// Smoothed, externally visible snapshot produced for every accepted fix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackedStatus {
    pub latitude: f64,
    pub longitude: f64,
    pub speed_mps: f64,
    pub accuracy_m: f64,
    pub satellites: u32,
    pub stake: String,
    pub direction: Direction,
    pub timestamp_ms: i64,
}

impl TrackedStatus {
    pub fn position(&self) -> PositionSample {
        PositionSample::new(self.latitude, self.longitude, self.timestamp_ms)
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed_mps * 3.6
    }

    /// Coarse 0-4 signal grade for status displays.
    pub fn signal_strength(&self) -> u8 {
        if self.satellites == 0 {
            return 0;
        }
        if self.satellites < 4 {
            return 1;
        }
        if self.accuracy_m > 50.0 {
            return 2;
        }
        if self.accuracy_m > 20.0 {
            return 3;
        }
        4
    }
}

/// One recorded point of a session. Field names on the wire follow the
/// layout of earlier track exports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "speed")]
    pub speed_mps: f64,
    #[serde(rename = "videoTime")]
    pub video_time_ms: i64,
    pub chapter: u32,
    pub stake: String,
    #[serde(rename = "distance")]
    pub accumulated_distance_m: f64,
}

impl TrackPoint {
    pub fn speed_kmh(&self) -> f64 {
        self.speed_mps * 3.6
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Anchor that resets the distance-to-stake mapping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    pub stake: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "videoTime")]
    pub video_time_ms: i64,
    pub chapter: u32,
    #[serde(rename = "isInitial", default)]
    pub is_initial: bool,
}
