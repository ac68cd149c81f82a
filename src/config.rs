use serde::{Deserialize, Serialize};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Tunables for every stage of the pipeline. Defaults reproduce the
/// behaviour of existing field recordings; change them only when
/// compatibility with prior exports is not needed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    // ── Position filter ──
    pub process_noise: f64,
    pub measurement_noise: f64,
    pub initial_covariance: f64,

    // ── Display speed validation ──
    pub max_speed_jump_mps: f64,
    pub max_speed_kmh: f64,
    pub min_display_speed_kmh: f64,
    pub smoothing_weights: Vec<f64>,
    /// Rejected jumps in a row before the validator adopts the new speed.
    /// 0 keeps the prior valid speed forever.
    pub speed_reanchor_after: u32,

    // ── Ledger distance acceptance ──
    pub min_update_distance_m: f64,
    pub min_speed_kmh: f64,
    pub speed_smoothing_factor: f64,
    pub max_acceleration_mps2: f64,
    pub min_distance_ratio: f64,
    pub max_distance_ratio: f64,
    pub calibration_pin_ms: i64,

    // ── Render sampling ──
    pub min_sampling_distance_m: f64,
    pub sampling_speed_step_kmh: f64,

    // ── Subtitles ──
    pub subtitle_cue_ms: i64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            process_noise: 0.1,
            measurement_noise: 1.0,
            initial_covariance: 1.0,
            max_speed_jump_mps: 5.0,
            max_speed_kmh: 200.0,
            min_display_speed_kmh: 2.0,
            smoothing_weights: vec![0.1, 0.15, 0.2, 0.25, 0.3],
            speed_reanchor_after: 0,
            min_update_distance_m: 50.0,
            min_speed_kmh: 2.0,
            speed_smoothing_factor: 0.3,
            max_acceleration_mps2: 2.78,
            min_distance_ratio: 0.5,
            max_distance_ratio: 1.5,
            calibration_pin_ms: 2000,
            min_sampling_distance_m: 5.0,
            sampling_speed_step_kmh: 20.0,
            subtitle_cue_ms: 1000,
        }
    }
}

impl TrackingConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
