pub mod kalman;

pub use kalman::{FusionFilterState, SensorFusionFilter};
