use thiserror::Error;

/// Stake text/arithmetic errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StakeError {
    #[error("Invalid stake format: {0:?} (expected <km>+<mmm>)")]
    InvalidFormat(String),

    #[error("Stake arithmetic produced a negative total: {total_m} m")]
    Negative { total_m: f64 },
}

/// Errors surfaced by the stake ledger
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Invalid stake format: {0:?}")]
    InvalidStakeFormat(String),

    #[error("No active recording session")]
    NoActiveSession,
}

/// Errors surfaced by the position tracker
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    #[error("Invalid stake format: {0:?}")]
    InvalidStakeFormat(String),
}

/// Export errors
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("No sampled track points to export")]
    InsufficientTrackData,

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by the recording coordinator
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("Direction cannot change while recording")]
    DirectionLocked,

    #[error("No position available to calibrate against")]
    NoPosition,

    #[error("No finished recording to export")]
    NothingToExport,

    #[error("Recorder lock poisoned")]
    LockPoisoned,
}

pub type SessionResult<T> = Result<T, SessionError>;
