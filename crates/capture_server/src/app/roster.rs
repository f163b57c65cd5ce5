use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use capture_core::{
    count_occupants, Occupancy, OccupancySampler, SamplerUnavailable, Team, TeamClassifier,
    TickClock, ZoneId,
};
use tracing::{debug, info};

use super::scenario::{keyframes_by_zone, AgentId, PresenceKeyframe, SamplerOutage, Scenario};

/// Team membership of every agent in the match.
#[derive(Debug, Clone, Default)]
pub(crate) struct Roster {
    teams: HashMap<AgentId, Option<Team>>,
}

impl Roster {
    pub(crate) fn from_scenario(scenario: &Scenario) -> Self {
        let teams = scenario
            .agents
            .iter()
            .map(|agent| (agent.id, Team::from_tag(&agent.team)))
            .collect::<HashMap<_, _>>();
        let non_combatants = teams.values().filter(|team| team.is_none()).count();
        info!(agents = teams.len(), non_combatants, "roster_loaded");
        Self { teams }
    }

    pub(crate) fn len(&self) -> usize {
        self.teams.len()
    }
}

impl TeamClassifier<AgentId> for Roster {
    fn classify(&self, agent: &AgentId) -> Option<Team> {
        self.teams.get(agent).copied().flatten()
    }
}

/// Replays the scenario timeline as per-zone occupancy.
#[derive(Debug)]
pub(crate) struct ScriptedSampler {
    roster: Roster,
    keyframes: BTreeMap<String, Vec<PresenceKeyframe>>,
    outages: Vec<SamplerOutage>,
    now_seconds: f32,
}

impl ScriptedSampler {
    pub(crate) fn from_scenario(scenario: &Scenario) -> Self {
        Self {
            roster: Roster::from_scenario(scenario),
            keyframes: keyframes_by_zone(scenario),
            outages: scenario.sampler_outages.clone(),
            now_seconds: 0.0,
        }
    }

    pub(crate) fn roster(&self) -> &Roster {
        &self.roster
    }

    fn set_time(&mut self, elapsed: Duration) {
        self.now_seconds = elapsed.as_secs_f32();
    }

    fn active_keyframe(&self, zone: &ZoneId) -> Option<&PresenceKeyframe> {
        self.keyframes
            .get(zone.as_str())?
            .iter()
            .take_while(|keyframe| keyframe.at_seconds <= self.now_seconds)
            .last()
    }

    fn in_outage(&self, zone: &ZoneId) -> bool {
        self.outages.iter().any(|outage| {
            outage.zone == zone.as_str()
                && self.now_seconds >= outage.from_seconds
                && self.now_seconds < outage.until_seconds
        })
    }
}

impl OccupancySampler for ScriptedSampler {
    fn begin_tick(&mut self, clock: TickClock) {
        self.set_time(clock.elapsed);
    }

    fn sample(&mut self, zone: &ZoneId) -> Result<Occupancy, SamplerUnavailable> {
        if self.in_outage(zone) {
            return Err(SamplerUnavailable {
                zone: zone.clone(),
                reason: format!("scripted outage at {:.3}s", self.now_seconds),
            });
        }

        let Some(keyframe) = self.active_keyframe(zone) else {
            return Ok(Occupancy::EMPTY);
        };
        let occupancy = count_occupants(keyframe.present.iter(), &self.roster);
        debug!(
            zone = %zone,
            at_seconds = self.now_seconds,
            blue = occupancy.blue,
            red = occupancy.red,
            "occupancy_sampled"
        );
        Ok(occupancy)
    }
}
