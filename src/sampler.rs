//! Distance/speed adaptive down-sampling and speed-colored segments for
//! progressive map rendering.

use serde::{Deserialize, Serialize};

use crate::config::TrackingConfig;
use crate::geodesy::haversine_distance;
use crate::types::{GeoPoint, TrackPoint};

/// Fixed km/h color bands, slowest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SpeedBand {
    /// ≤ 20 km/h
    Crawl,
    /// ≤ 40 km/h
    Slow,
    /// ≤ 60 km/h
    Moderate,
    /// ≤ 80 km/h
    Fast,
    /// > 80 km/h
    VeryFast,
}

impl SpeedBand {
    pub fn from_kmh(kmh: f64) -> Self {
        if kmh <= 20.0 {
            SpeedBand::Crawl
        } else if kmh <= 40.0 {
            SpeedBand::Slow
        } else if kmh <= 60.0 {
            SpeedBand::Moderate
        } else if kmh <= 80.0 {
            SpeedBand::Fast
        } else {
            SpeedBand::VeryFast
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            SpeedBand::Crawl => "#4CAF50",
            SpeedBand::Slow => "#2196F3",
            SpeedBand::Moderate => "#FFC107",
            SpeedBand::Fast => "#FF9800",
            SpeedBand::VeryFast => "#F44336",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackSegment {
    pub points: Vec<GeoPoint>,
    pub band: SpeedBand,
}

impl TrackSegment {
    pub fn color(&self) -> &'static str {
        self.band.color()
    }
}

#[derive(Clone, Debug)]
pub struct TrackSampler {
    min_distance_m: f64,
    speed_step_kmh: f64,
    raw_points: Vec<TrackPoint>,
    sampled_points: Vec<TrackPoint>,
    render_cursor: usize,
}

impl TrackSampler {
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            min_distance_m: config.min_sampling_distance_m,
            speed_step_kmh: config.sampling_speed_step_kmh,
            raw_points: Vec::new(),
            sampled_points: Vec::new(),
            render_cursor: 0,
        }
    }

    /// Record `point`; returns true when it also became a new sample.
    pub fn add_point(&mut self, point: &TrackPoint) -> bool {
        self.raw_points.push(point.clone());
        let keep = self.should_keep_point(point);
        if keep {
            self.sampled_points.push(point.clone());
        }
        keep
    }

    /// Minimum spacing from the last sample grows with speed: one extra
    /// `min_distance_m` per `speed_step_kmh` above the first step.
    pub fn should_keep_point(&self, point: &TrackPoint) -> bool {
        let Some(last) = self.sampled_points.last() else {
            return true;
        };
        let distance = haversine_distance(last.latitude, last.longitude, point.latitude, point.longitude);
        let factor = (point.speed_kmh() / self.speed_step_kmh).max(1.0);
        distance >= self.min_distance_m * factor
    }

    /// Samples added since the previous call, split into runs of one speed
    /// band. Each run after the first starts with the last point of the
    /// run before it. Fewer than two new samples yields nothing and leaves
    /// them pending.
    pub fn get_unrendered_segments(&mut self) -> Vec<TrackSegment> {
        let new_points = &self.sampled_points[self.render_cursor..];
        if new_points.len() < 2 {
            return Vec::new();
        }

        let mut segments = Vec::new();
        let mut current = TrackSegment {
            points: vec![new_points[0].point()],
            band: SpeedBand::from_kmh(new_points[0].speed_kmh()),
        };

        for pair in new_points.windows(2) {
            let (prev, point) = (&pair[0], &pair[1]);
            let band = SpeedBand::from_kmh(point.speed_kmh());
            if band != current.band {
                let next = TrackSegment {
                    points: vec![prev.point()],
                    band,
                };
                segments.push(std::mem::replace(&mut current, next));
            }
            current.points.push(point.point());
        }
        segments.push(current);

        self.render_cursor = self.sampled_points.len();
        segments
    }

    pub fn clear(&mut self) {
        self.raw_points.clear();
        self.sampled_points.clear();
        self.render_cursor = 0;
    }

    pub fn raw_points(&self) -> &[TrackPoint] {
        &self.raw_points
    }

    pub fn sampled_points(&self) -> &[TrackPoint] {
        &self.sampled_points
    }

    pub fn has_samples(&self) -> bool {
        !self.sampled_points.is_empty()
    }
}

impl Default for TrackSampler {
    fn default() -> Self {
        Self::new(&TrackingConfig::default())
    }
}
