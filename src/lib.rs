//! Stake (chainage) tracking for road-survey recordings.
//!
//! Raw GPS fixes flow through [`tracker::PositionTracker`] (Kalman smoothing
//! and speed validation), into [`ledger::StakeLedger`] (authoritative
//! distance and stake bookkeeping) and [`sampler::TrackSampler`] (rendering
//! samples). [`session::RecordingSession`] wires the three together and
//! builds the GeoJSON / SRT exports.

pub mod config;
pub mod error;
pub mod export;
pub mod filters;
pub mod geodesy;
pub mod ledger;
pub mod listeners;
pub mod sampler;
pub mod session;
pub mod smoothing;
pub mod stake;
pub mod subtitles;
pub mod tracker;
pub mod types;

pub use config::TrackingConfig;
pub use error::{ExportError, LedgerError, SessionError, SessionResult, StakeError, TrackerError};
pub use export::SessionSummary;
pub use ledger::{StakeLedger, TrackInfo};
pub use sampler::{SpeedBand, TrackSampler, TrackSegment};
pub use session::{FixOutcome, RecordingExport, RecordingSession, SharedRecorder};
pub use stake::Stake;
pub use tracker::PositionTracker;
pub use types::{Calibration, Direction, GeoPoint, PositionSample, RawFix, TrackPoint, TrackedStatus};
