//! Server-authoritative capture point contest resolution.
//!
//! A [`CapturePoint`] moves between neutral, being captured and held based on
//! how many members of each [`Team`] stand inside it. [`CapturePoint::advance`]
//! is a pure per-tick transition; [`CaptureHost`] runs it on a fixed timestep
//! for every zone of a match and forwards [`CaptureEvent`]s to listeners.

pub mod error;
pub mod events;
pub mod host;
pub mod metrics;
pub mod occupancy;
pub mod point;
pub mod rate;
pub mod snapshot;
pub mod team;

pub use error::CaptureError;
pub use events::{CaptureEvent, CaptureEventSink, EventLog, LoggedEvent};
pub use host::{
    clamp_frame_delta, plan_sim_steps, CaptureHost, FrameReport, LoopConfig, StepPlan, TickReport,
};
pub use metrics::{HostMetricsSnapshot, MetricsHandle};
pub use occupancy::{
    count_occupants, Occupancy, OccupancySampler, SamplerUnavailable, TeamClassifier, TickClock,
    ZoneId,
};
pub use point::{advance, CapturePoint, TickDelta, TickOutcome, MAX_PERCENTAGE, MIN_PERCENTAGE};
pub use rate::{RateModel, DEFAULT_INFLUENCE_CAP};
pub use snapshot::{CaptureSnapshot, ContestPhase};
pub use team::{team_label, Team};
