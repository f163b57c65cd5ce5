use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureError {
    #[error("occupancy count for {team} must be non-negative, got {count}")]
    NegativeOccupancy { team: &'static str, count: i64 },
    #[error("tick delta must be finite and non-negative, got {seconds}")]
    InvalidTickDelta { seconds: f32 },
    #[error("invalid capture state: {reason}")]
    InvalidState { reason: String },
    #[error("invalid rate model: {reason}")]
    InvalidRateModel { reason: String },
    #[error("invalid loop config: {field} {reason}")]
    InvalidLoopConfig {
        field: &'static str,
        reason: &'static str,
    },
    #[error("unknown capture zone '{zone}'")]
    UnknownZone { zone: String },
    #[error("duplicate capture zone '{zone}'")]
    DuplicateZone { zone: String },
}
