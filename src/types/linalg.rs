//! Linear algebra type aliases for the position filter
//!
//! Fixed 4-state layout `[x, y, vx, vy]`, where x/y are latitude/longitude
//! treated as locally linear coordinates.

use nalgebra::{SMatrix, SVector};

// ===== State Dimensions =====
pub const STATE_DIM_4: usize = 4;

// ===== Measurement Dimensions =====
pub const MEASURE_DIM_FIX: usize = 4; // (lat, lon, vlat, vlon)

// ===== 4-State Filter Types =====
pub type StateVec4 = SVector<f64, STATE_DIM_4>;
pub type StateMat4 = SMatrix<f64, STATE_DIM_4, STATE_DIM_4>;

// Measurement types
pub type FixMeasurement = SVector<f64, MEASURE_DIM_FIX>;
pub type FixNoise = SMatrix<f64, MEASURE_DIM_FIX, MEASURE_DIM_FIX>;

// Per-axis gain (diagonal only)
pub type AxisGain4 = SVector<f64, STATE_DIM_4>;
