use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::CaptureError;
use crate::team::Team;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub String);

impl ZoneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-team head count inside a capture volume at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Occupancy {
    pub blue: u32,
    pub red: u32,
}

impl Occupancy {
    pub const EMPTY: Occupancy = Occupancy { blue: 0, red: 0 };

    pub fn new(blue: u32, red: u32) -> Self {
        Self { blue, red }
    }

    /// Checked conversion for callers holding signed counts. Negative values
    /// are a caller bug and are rejected instead of clamped.
    pub fn from_signed(blue: i64, red: i64) -> Result<Self, CaptureError> {
        Ok(Self {
            blue: checked_count(Team::Blue, blue)?,
            red: checked_count(Team::Red, red)?,
        })
    }

    pub fn count(self, team: Team) -> u32 {
        match team {
            Team::Blue => self.blue,
            Team::Red => self.red,
        }
    }

    pub fn add_one(&mut self, team: Team) {
        match team {
            Team::Blue => self.blue = self.blue.saturating_add(1),
            Team::Red => self.red = self.red.saturating_add(1),
        }
    }

    /// Team with a strictly larger head count, if any.
    pub fn majority(self) -> Option<Team> {
        match self.blue.cmp(&self.red) {
            std::cmp::Ordering::Greater => Some(Team::Blue),
            std::cmp::Ordering::Less => Some(Team::Red),
            std::cmp::Ordering::Equal => None,
        }
    }
}

fn checked_count(team: Team, count: i64) -> Result<u32, CaptureError> {
    if count < 0 {
        return Err(CaptureError::NegativeOccupancy {
            team: team.as_str(),
            count,
        });
    }
    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("occupancy sampler unavailable for zone '{zone}': {reason}")]
pub struct SamplerUnavailable {
    pub zone: ZoneId,
    pub reason: String,
}

/// Position of a tick on the simulation timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickClock {
    pub tick: u64,
    pub elapsed: Duration,
}

/// Answers "who is standing in this zone right now".
pub trait OccupancySampler {
    /// Called once per tick before any zone is sampled.
    fn begin_tick(&mut self, _clock: TickClock) {}

    fn sample(&mut self, zone: &ZoneId) -> Result<Occupancy, SamplerUnavailable>;
}

/// Resolves an agent reference to its team. `None` marks a non-combatant.
pub trait TeamClassifier<A: ?Sized> {
    fn classify(&self, agent: &A) -> Option<Team>;
}

pub fn count_occupants<'a, A, I, C>(agents: I, classifier: &C) -> Occupancy
where
    A: ?Sized + 'a,
    I: IntoIterator<Item = &'a A>,
    C: TeamClassifier<A> + ?Sized,
{
    let mut occupancy = Occupancy::EMPTY;
    for agent in agents {
        if let Some(team) = classifier.classify(agent) {
            occupancy.add_one(team);
        }
    }
    occupancy
}
