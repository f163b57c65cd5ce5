use std::fmt;

use serde::{Deserialize, Serialize};

use crate::occupancy::ZoneId;
use crate::team::Team;

/// Ownership transition produced by a tick. Fired once per transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CaptureEvent {
    PointCaptured { team: Team },
    /// `by` is the side that pushed progress back to zero.
    PointNeutralized { by: Team },
}

impl CaptureEvent {
    pub fn name(self) -> &'static str {
        match self {
            Self::PointCaptured { .. } => "point_captured",
            Self::PointNeutralized { .. } => "point_neutralized",
        }
    }

    pub fn team(self) -> Team {
        match self {
            Self::PointCaptured { team } => team,
            Self::PointNeutralized { by } => by,
        }
    }
}

impl fmt::Display for CaptureEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.team())
    }
}

/// Subscriber for transitions raised by the host.
pub trait CaptureEventSink {
    fn on_capture_event(&mut self, tick: u64, zone: &ZoneId, event: CaptureEvent);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub tick: u64,
    pub zone: ZoneId,
    #[serde(flatten)]
    pub event: CaptureEvent,
}

/// Sink that keeps every event in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventLog {
    entries: Vec<LoggedEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[LoggedEvent] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<LoggedEvent> {
        self.entries
    }
}

impl CaptureEventSink for EventLog {
    fn on_capture_event(&mut self, tick: u64, zone: &ZoneId, event: CaptureEvent) {
        self.entries.push(LoggedEvent {
            tick,
            zone: zone.clone(),
            event,
        });
    }
}

impl<S: CaptureEventSink + ?Sized> CaptureEventSink for &mut S {
    fn on_capture_event(&mut self, tick: u64, zone: &ZoneId, event: CaptureEvent) {
        (**self).on_capture_event(tick, zone, event);
    }
}
